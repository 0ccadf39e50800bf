//! Second analysis pass: walks function bodies with a stack of local scopes
//! and binds each call expression to the one function it statically calls.

use std::cell::Cell;
use std::collections::HashMap;
use std::path::Path;
use tracing::trace;
use tree_sitter::Node;

use super::declarator::{
    base_type, field_children, named_children, node_text, qualified_name, unwrap_declarator,
    QualifiedName, TypeReader,
};
use super::entity::{FileId, FunctionEntity, FunctionIndex, FunctionKind};
use super::overload::{select, CallSite, Selection};
use super::preprocessor::is_conditional;
use super::scope::{Lookup, ScopeId, TypeTarget};
use super::types::{arithmetic_rank, ArithmeticKind, ExprType, Inferred, Reference, TypeInfo, TypeSpeller};
use super::unit::{Diagnostic, NodeKey, ParsedUnit, Severity};

const CASTS: [&str; 4] = ["static_cast", "dynamic_cast", "const_cast", "reinterpret_cast"];

/// Expressions nested deeper than this have an unknown type.
const MAX_INFERENCE_DEPTH: usize = 128;

/// Pending step of a body walk. Tasks run in reverse push order.
enum Task<'t> {
    Visit(Node<'t>),
    PopFrame,
    DeclareVariable { declaration: Node<'t>, declarator: Node<'t> },
    DeclareRangeVariable(Node<'t>),
    ResolveCall(Node<'t>),
}

/// What became of one call expression.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Callee {
    Resolved(FunctionIndex),
    /// Not a static call: pointers, virtual dispatch, dependent names,
    /// constructions and other forms without a direct callee
    Dropped(&'static str),
    /// The program is ill-formed at this call
    Failed(String),
}

/// Resolutions and diagnostics produced for one file.
pub struct Resolved {
    pub calls: HashMap<NodeKey, FunctionIndex>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Facts about the function whose body is being walked.
struct BodyContext {
    scope: ScopeId,
    class: Option<ScopeId>,
    template_params: Vec<String>,
    /// Inside a function template or a member of a class template
    dependent: bool,
    /// Inside a member of a class template
    in_class_template: bool,
    /// `this` is const
    const_this: bool,
}

pub struct Resolver<'a> {
    unit: &'a ParsedUnit,
    reader: TypeReader<'a>,
    file: FileId,
    path: &'a Path,
    source: &'a str,
    frames: Vec<HashMap<String, TypeInfo>>,
    context: Option<BodyContext>,
    calls: HashMap<NodeKey, FunctionIndex>,
    diagnostics: Vec<Diagnostic>,
    inference_depth: Cell<usize>,
}

impl<'a> Resolver<'a> {
    pub fn new(
        unit: &'a ParsedUnit,
        speller: &'a TypeSpeller,
        file: FileId,
        path: &'a Path,
        source: &'a str,
    ) -> Self {
        Self {
            unit,
            reader: TypeReader::new(source, speller),
            file,
            path,
            source,
            frames: Vec::new(),
            context: None,
            calls: HashMap::new(),
            diagnostics: Vec::new(),
            inference_depth: Cell::new(0),
        }
    }

    /// Resolve every call inside every function definition of a file.
    pub fn resolve(mut self, root: Node<'_>) -> Resolved {
        self.visit_definitions(root);
        Resolved {
            calls: self.calls,
            diagnostics: self.diagnostics,
        }
    }

    fn visit_definitions(&mut self, root: Node<'_>) {
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if node.kind() == "function_definition" {
                if let Some(index) = self.unit.definition_at(self.file, node) {
                    self.resolve_definition(node, index);
                    continue;
                }
            }
            stack.extend(self.compiled_children(node).into_iter().rev());
        }
    }

    /// Named children, or the compiled branch contents of a conditional.
    fn compiled_children<'t>(&self, node: Node<'t>) -> Vec<Node<'t>> {
        if is_conditional(node.kind()) {
            self.unit.preprocessor.compiled(self.file, node)
        } else {
            named_children(node)
        }
    }

    fn resolve_definition(&mut self, definition: Node<'_>, index: FunctionIndex) {
        let function = self.unit.function(index);
        self.context = Some(BodyContext {
            scope: function.scope,
            class: function.class,
            template_params: function.template_params.clone(),
            dependent: function.is_template || function.in_class_template,
            in_class_template: function.in_class_template,
            const_this: function.is_const,
        });

        // Parameters are read from this definition; a folded specialization
        // may name them differently from the entity.
        let mut parameters = HashMap::new();
        if let Some(list) = definition
            .child_by_field_name("declarator")
            .and_then(|d| unwrap_declarator(d).function)
            .and_then(|f| f.child_by_field_name("parameters"))
        {
            for param in self.reader.params(list, &function.template_params).params {
                if !param.name.is_empty() {
                    parameters.insert(param.name, adjusted_parameter(param.ty));
                }
            }
        }
        self.frames = vec![parameters];

        for child in named_children(definition) {
            if matches!(
                child.kind(),
                "compound_statement" | "field_initializer_list" | "try_statement"
            ) {
                self.walk(child);
            }
        }

        self.frames.clear();
        self.context = None;
    }

    fn ctx(&self) -> &BodyContext {
        self.context
            .as_ref()
            .unwrap_or_else(|| unreachable!("bodies are only walked inside a definition"))
    }

    fn walk(&mut self, root: Node<'_>) {
        let mut tasks = vec![Task::Visit(root)];
        while let Some(task) = tasks.pop() {
            match task {
                Task::Visit(node) => self.visit(node, &mut tasks),
                Task::PopFrame => {
                    self.frames.pop();
                }
                Task::DeclareVariable { declaration, declarator } => {
                    self.declare_variable(declaration, declarator)
                }
                Task::DeclareRangeVariable(node) => self.declare_range_variable(node),
                Task::ResolveCall(node) => self.resolve_call(node),
            }
        }
    }

    fn visit<'t>(&mut self, node: Node<'t>, tasks: &mut Vec<Task<'t>>) {
        match node.kind() {
            "compound_statement" | "if_statement" | "while_statement" | "for_statement"
            | "switch_statement" | "do_statement" | "try_statement" => {
                self.frames.push(HashMap::new());
                tasks.push(Task::PopFrame);
                push_visits(tasks, named_children(node));
            }
            "for_range_loop" => {
                self.frames.push(HashMap::new());
                tasks.push(Task::PopFrame);
                tasks.extend(node.child_by_field_name("body").map(Task::Visit));
                tasks.push(Task::DeclareRangeVariable(node));
                tasks.extend(node.child_by_field_name("right").map(Task::Visit));
            }
            "catch_clause" => {
                self.frames.push(HashMap::new());
                self.declare_parameters(node.child_by_field_name("parameters"));
                tasks.push(Task::PopFrame);
                tasks.extend(node.child_by_field_name("body").map(Task::Visit));
            }
            "lambda_expression" => {
                self.frames.push(HashMap::new());
                self.declare_parameters(
                    node.child_by_field_name("declarator")
                        .and_then(|d| d.child_by_field_name("parameters")),
                );
                tasks.push(Task::PopFrame);
                tasks.extend(node.child_by_field_name("body").map(Task::Visit));
            }
            "declaration" => {
                let mut steps = Vec::new();
                for declarator_node in field_children(node, "declarator") {
                    let declarator = unwrap_declarator(declarator_node);
                    if declarator.declares_function() {
                        continue;
                    }
                    if let Some(value) = declarator.value {
                        steps.push(Task::Visit(value));
                    }
                    if declarator.name.is_some() {
                        steps.push(Task::DeclareVariable {
                            declaration: node,
                            declarator: declarator_node,
                        });
                    }
                }
                tasks.extend(steps.into_iter().rev());
            }
            "call_expression" => {
                // Inner calls first, so their results can type this call's arguments.
                tasks.push(Task::ResolveCall(node));
                let function = node.child_by_field_name("function").filter(|function| {
                    !matches!(
                        function.kind(),
                        "identifier" | "qualified_identifier" | "template_function"
                    )
                });
                tasks.extend(function.map(Task::Visit));
                if let Some(arguments) = node.child_by_field_name("arguments") {
                    push_visits(tasks, named_children(arguments));
                }
            }
            "class_specifier" | "struct_specifier" | "union_specifier" => {}
            _ => push_visits(tasks, self.compiled_children(node)),
        }
    }

    fn declare_local(&mut self, name: String, ty: TypeInfo) {
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(name, ty);
        }
    }

    fn local(&self, name: &str) -> Option<&TypeInfo> {
        self.frames.iter().rev().find_map(|frame| frame.get(name))
    }

    fn declare_variable(&mut self, declaration: Node<'_>, declarator_node: Node<'_>) {
        let declarator = unwrap_declarator(declarator_node);
        let Some(name) = declarator.name else {
            return;
        };
        let type_node = declaration.child_by_field_name("type");
        let mut ty = self
            .reader
            .declared_type(declaration, type_node, &declarator, &self.ctx().template_params);
        if ty.is_auto && ty.function_pointer.is_none() {
            if let Some(value) = declarator.value {
                ty = self.deduce_auto(ty, value);
            }
        }
        let name = node_text(name, self.source).to_string();
        self.declare_local(name, ty);
    }

    /// Type of an `auto` variable from its initializer.
    fn deduce_auto(&self, declared: TypeInfo, value: Node<'_>) -> TypeInfo {
        let value = match value.kind() {
            "initializer_list" | "argument_list" => match named_children(value).as_slice() {
                [single] => *single,
                _ => return declared,
            },
            _ => value,
        };
        match self.infer(value) {
            Inferred::Known(expr) => {
                let mut ty = expr.ty;
                ty.is_const |= declared.is_const;
                ty.pointer_depth = ty.pointer_depth.max(declared.pointer_depth);
                ty.reference = declared.reference;
                ty
            }
            Inferred::Dependent => {
                let mut ty = declared;
                ty.is_dependent = true;
                ty
            }
            Inferred::Unknown => declared,
        }
    }

    fn declare_range_variable(&mut self, node: Node<'_>) {
        let Some(declarator) = node.child_by_field_name("declarator").map(unwrap_declarator) else {
            return;
        };
        if let Some(name) = declarator.name {
            let ty = self.reader.declared_type(
                node,
                node.child_by_field_name("type"),
                &declarator,
                &self.ctx().template_params,
            );
            self.declare_local(node_text(name, self.source).to_string(), ty);
        }
    }

    fn declare_parameters(&mut self, list: Option<Node<'_>>) {
        let Some(list) = list else {
            return;
        };
        for param in self.reader.params(list, &self.ctx().template_params).params {
            if !param.name.is_empty() {
                self.declare_local(param.name, adjusted_parameter(param.ty));
            }
        }
    }

    fn resolve_call(&mut self, node: Node<'_>) {
        let Some(function) = node.child_by_field_name("function") else {
            return;
        };
        let args: Vec<Node<'_>> = node
            .child_by_field_name("arguments")
            .map(named_children)
            .unwrap_or_default();

        match self.resolve_callee(function, &args) {
            Callee::Resolved(index) => {
                trace!(
                    "Resolved call at {}:{} to {}",
                    node.start_position().row + 1,
                    node.start_position().column + 1,
                    self.unit.function(index).qualified_name
                );
                self.calls.insert((self.file, node.id()), index);
            }
            Callee::Dropped(reason) => {
                trace!(
                    "Dropped call at {}:{} ({})",
                    node.start_position().row + 1,
                    node.start_position().column + 1,
                    reason
                );
            }
            Callee::Failed(message) => {
                self.diagnostics
                    .push(Diagnostic::at(Severity::Error, message, self.path, function));
            }
        }
    }

    fn resolve_callee(&self, function: Node<'_>, args: &[Node<'_>]) -> Callee {
        match function.kind() {
            "identifier" | "qualified_identifier" | "template_function" => {
                let Some(name) = qualified_name(function, self.source) else {
                    return Callee::Dropped("unsupported callee name");
                };
                if name.destructor {
                    return Callee::Dropped("explicit destructor call");
                }
                if name.path.is_empty() && CASTS.contains(&name.name.as_str()) {
                    return Callee::Dropped("cast");
                }
                self.resolve_name(&name, args)
            }
            "field_expression" => self.resolve_member(function, args),
            "parenthesized_expression" => {
                let mut inner = function;
                while inner.kind() == "parenthesized_expression" {
                    match named_children(inner).first() {
                        Some(next) => inner = *next,
                        None => return Callee::Dropped("empty parentheses"),
                    }
                }
                self.resolve_callee(inner, args)
            }
            "primitive_type" | "type_identifier" | "sized_type_specifier" | "template_type" => {
                Callee::Dropped("functional cast")
            }
            _ => Callee::Dropped("indirect call"),
        }
    }

    fn resolve_name(&self, name: &QualifiedName, args: &[Node<'_>]) -> Callee {
        let ctx = self.ctx();
        let unqualified = name.path.is_empty() && !name.rooted;

        if unqualified {
            if self.unit.preprocessor.is_macro(&name.name) {
                return Callee::Dropped("macro");
            }
            if let Some(ty) = self.local(&name.name) {
                return self.call_object(ExprType::object(ty.clone()), args);
            }
            if ctx.template_params.contains(&name.name) {
                return Callee::Dropped("dependent callable");
            }
            let lookup = self.unit.scopes.lookup(ctx.scope, &name.name);
            return self.apply_lookup(lookup, name, args, true);
        }

        if name.path.iter().any(|part| ctx.template_params.contains(part)) {
            return Callee::Dropped("dependent scope");
        }
        let scope = if name.path.is_empty() {
            Some(self.unit.scopes.global())
        } else {
            self.unit.scopes.lookup_path(ctx.scope, &name.path, name.rooted)
        };
        match scope {
            Some(scope) => {
                let lookup = self.unit.scopes.find_in(scope, &name.name);
                self.apply_lookup(lookup, name, args, false)
            }
            None => Callee::Failed(format!(
                "use of undeclared identifier '{}'",
                name.path.join("::")
            )),
        }
    }

    fn apply_lookup(&self, lookup: Lookup, name: &QualifiedName, args: &[Node<'_>], unqualified: bool) -> Callee {
        match lookup {
            Lookup::Functions(candidates) => self.choose(&candidates, name, args, unqualified),
            Lookup::Variable(ty) => self.call_object(ExprType::object(ty), args),
            Lookup::Type(_) => Callee::Dropped("construction"),
            Lookup::NotFound => {
                let arg_types = self.infer_args(args);
                if self.ctx().dependent && arg_types.iter().any(|a| matches!(a, Inferred::Dependent)) {
                    return Callee::Dropped("dependent name");
                }
                Callee::Failed(format!("use of undeclared identifier '{}'", name.display()))
            }
        }
    }

    fn choose(&self, candidates: &[FunctionIndex], name: &QualifiedName, args: &[Node<'_>], unqualified: bool) -> Callee {
        let functions = self.unit.functions();
        let candidates: Vec<FunctionIndex> = candidates
            .iter()
            .copied()
            .filter(|index| {
                let f = &functions[index.0];
                f.kind != FunctionKind::Destructor && (!name.explicit_template || f.is_template)
            })
            .collect();
        if candidates.is_empty() {
            return Callee::Failed(format!("no matching function for call to '{}'", name.display()));
        }

        let ctx = self.ctx();
        let implicit_member = unqualified && candidates.iter().any(|i| functions[i.0].is_instance_member());
        if implicit_member && ctx.in_class_template {
            return Callee::Dropped("member of class template");
        }

        let arg_types = self.infer_args(args);
        let site = CallSite {
            args: &arg_types,
            object_const: implicit_member.then_some(ctx.const_this),
            scope: ctx.scope,
        };
        match select(&candidates, functions, &self.unit.scopes, &site) {
            Selection::Chosen(index) => {
                let f = &functions[index.0];
                if unqualified && f.is_instance_member() && f.is_virtual {
                    Callee::Dropped("virtual call through this")
                } else {
                    Callee::Resolved(index)
                }
            }
            Selection::Dependent => Callee::Dropped("dependent arguments"),
            Selection::Undecidable => Callee::Dropped("argument types unknown"),
            Selection::Ambiguous => {
                Callee::Failed(format!("call to '{}' is ambiguous", name.display()))
            }
            Selection::NoViable => {
                Callee::Failed(format!("no matching function for call to '{}'", name.display()))
            }
        }
    }

    fn resolve_member(&self, field_expression: Node<'_>, args: &[Node<'_>]) -> Callee {
        let (Some(object), Some(field)) = (
            field_expression.child_by_field_name("argument"),
            field_expression.child_by_field_name("field"),
        ) else {
            return Callee::Dropped("incomplete member access");
        };
        let arrow = field_expression
            .child_by_field_name("operator")
            .map(|op| node_text(op, self.source) == "->")
            .unwrap_or(false);

        let (name, explicit_template, qualifier) = match field.kind() {
            "field_identifier" => (node_text(field, self.source).to_string(), false, None),
            "template_method" => match field.child_by_field_name("name") {
                Some(inner) => (node_text(inner, self.source).to_string(), true, None),
                None => return Callee::Dropped("unsupported member name"),
            },
            "qualified_identifier" => match qualified_name(field, self.source) {
                Some(q) if !q.destructor => (q.name.clone(), q.explicit_template, Some(q)),
                _ => return Callee::Dropped("unsupported member name"),
            },
            "destructor_name" => return Callee::Dropped("explicit destructor call"),
            _ => return Callee::Dropped("dependent member name"),
        };

        let object_type = match self.infer(object) {
            Inferred::Known(expr) => expr,
            Inferred::Dependent => return Callee::Dropped("dependent object"),
            Inferred::Unknown => return Callee::Dropped("object type unknown"),
        };
        let (class_type, dynamic) = if arrow {
            match object_type.ty.dereferenced() {
                Some(pointee) if pointee.decayed_depth() == 0 => (pointee, true),
                _ => return Callee::Dropped("overloaded arrow"),
            }
        } else {
            if object_type.ty.decayed_depth() > 0 {
                return Callee::Dropped("member access on pointer");
            }
            (object_type.ty.clone(), !object_type.exact)
        };
        if class_type.is_dependent {
            return Callee::Dropped("dependent object");
        }

        let ctx = self.ctx();
        let class_type = self.unit.scopes.canonical_type(ctx.scope, &class_type);
        let Some(class) = self.unit.scopes.resolve_type(ctx.scope, &class_type) else {
            return Callee::Dropped("object type not declared");
        };
        let lookup_scope = match &qualifier {
            Some(q) => match self.unit.scopes.lookup_path(class, &q.path, q.rooted) {
                Some(scope) => scope,
                None => return Callee::Dropped("unknown member qualifier"),
            },
            None => class,
        };

        match self.unit.scopes.find_in(lookup_scope, &name) {
            Lookup::Functions(candidates) => {
                let functions = self.unit.functions();
                let candidates: Vec<FunctionIndex> = candidates
                    .into_iter()
                    .filter(|index| !explicit_template || functions[index.0].is_template)
                    .collect();
                let arg_types = self.infer_args(args);
                let site = CallSite {
                    args: &arg_types,
                    object_const: Some(class_type.is_const),
                    scope: ctx.scope,
                };
                let display = format!("{}::{}", self.unit.scopes.qualified_name(class), name);
                match select(&candidates, functions, &self.unit.scopes, &site) {
                    Selection::Chosen(index) => {
                        let f = &functions[index.0];
                        if f.is_virtual && dynamic && qualifier.is_none() {
                            Callee::Dropped("virtual dispatch")
                        } else {
                            Callee::Resolved(index)
                        }
                    }
                    Selection::Dependent => Callee::Dropped("dependent arguments"),
                    Selection::Undecidable => Callee::Dropped("argument types unknown"),
                    Selection::Ambiguous => Callee::Failed(format!("call to '{}' is ambiguous", display)),
                    Selection::NoViable => {
                        Callee::Failed(format!("no matching member function for call to '{}'", name))
                    }
                }
            }
            Lookup::Variable(ty) => self.call_object(ExprType::object(ty), args),
            Lookup::Type(_) => Callee::Dropped("construction"),
            Lookup::NotFound => {
                if self.unit.scopes.get(class).is_template {
                    return Callee::Dropped("member of class template");
                }
                Callee::Failed(format!(
                    "no member named '{}' in '{}'",
                    name,
                    self.unit.scopes.qualified_name(class)
                ))
            }
        }
    }

    /// Call of an object: a function pointer, a closure or a class with
    /// `operator()`.
    fn call_object(&self, object: ExprType, args: &[Node<'_>]) -> Callee {
        let ctx = self.ctx();
        let ty = self.unit.scopes.canonical_type(ctx.scope, &object.ty);
        if ty.is_dependent {
            return Callee::Dropped("dependent callable");
        }
        if ty.function_pointer.is_some() || ty.decayed_depth() > 0 || ty.is_auto {
            return Callee::Dropped("call through pointer or closure");
        }
        let Some(class) = self.unit.scopes.resolve_type(ctx.scope, &ty) else {
            return Callee::Dropped("callable of unknown type");
        };
        let Lookup::Functions(candidates) = self.unit.scopes.find_in(class, "operator()") else {
            return Callee::Dropped("object without call operator");
        };
        let arg_types = self.infer_args(args);
        let site = CallSite {
            args: &arg_types,
            object_const: Some(ty.is_const),
            scope: ctx.scope,
        };
        match select(&candidates, self.unit.functions(), &self.unit.scopes, &site) {
            Selection::Chosen(index) => {
                if self.unit.function(index).is_virtual && !object.exact {
                    Callee::Dropped("virtual dispatch")
                } else {
                    Callee::Resolved(index)
                }
            }
            _ => Callee::Dropped("call operator not selected"),
        }
    }

    fn infer_args(&self, args: &[Node<'_>]) -> Vec<Inferred> {
        args.iter().map(|arg| self.infer(*arg)).collect()
    }

    /// Static type of an expression, as far as the local model knows it.
    fn infer(&self, expr: Node<'_>) -> Inferred {
        let depth = self.inference_depth.get();
        if depth >= MAX_INFERENCE_DEPTH {
            return Inferred::Unknown;
        }
        self.inference_depth.set(depth + 1);
        let inferred = self.infer_expression(expr);
        self.inference_depth.set(depth);
        inferred
    }

    fn infer_expression(&self, expr: Node<'_>) -> Inferred {
        let ctx = self.ctx();
        match expr.kind() {
            "number_literal" => Inferred::Known(number_literal(node_text(expr, self.source))),
            "string_literal" | "raw_string_literal" | "concatenated_string" => {
                let mut literal = ExprType::value(TypeInfo::pointer_to("char").with_const());
                literal.lvalue = true;
                Inferred::Known(literal)
            }
            "char_literal" => Inferred::Known(ExprType::value(TypeInfo::named("char"))),
            "true" | "false" => Inferred::Known(ExprType::value(TypeInfo::named("bool"))),
            "null" | "nullptr" => {
                let text = node_text(expr, self.source);
                let mut value = if text == "nullptr" {
                    ExprType::value(TypeInfo::named("std::nullptr_t"))
                } else {
                    ExprType::value(TypeInfo::named("long"))
                };
                value.null_constant = true;
                Inferred::Known(value)
            }
            "this" => match ctx.class {
                Some(_) if ctx.in_class_template => Inferred::Dependent,
                Some(class) => {
                    let mut ty = TypeInfo::pointer_to(self.unit.scopes.qualified_name(class));
                    ty.is_const = ctx.const_this;
                    let mut this = ExprType::value(ty);
                    this.exact = false;
                    Inferred::Known(this)
                }
                None => Inferred::Unknown,
            },
            "identifier" => self.infer_name(node_text(expr, self.source)),
            "qualified_identifier" => {
                let Some(name) = qualified_name(expr, self.source) else {
                    return Inferred::Unknown;
                };
                let scope = if name.path.is_empty() {
                    Some(self.unit.scopes.global())
                } else {
                    self.unit.scopes.lookup_path(ctx.scope, &name.path, name.rooted)
                };
                let Some(scope) = scope else {
                    return Inferred::Unknown;
                };
                match self.unit.scopes.find_in(scope, &name.name) {
                    Lookup::Variable(ty) => self.object_of(ty),
                    _ => Inferred::Unknown,
                }
            }
            "field_expression" => self.infer_field(expr),
            "call_expression" => self.infer_call(expr),
            "parenthesized_expression" => match named_children(expr).last() {
                Some(inner) => self.infer(*inner),
                None => Inferred::Unknown,
            },
            "pointer_expression" => self.infer_pointer_expression(expr),
            "subscript_expression" => match expr.child_by_field_name("argument").map(|a| self.infer(a)) {
                // Only elements of a true array have a known dynamic type.
                Some(Inferred::Known(array)) => match array.ty.dereferenced() {
                    Some(element) => Inferred::Known(ExprType {
                        exact: array.ty.is_array && element.decayed_depth() == 0,
                        ty: element,
                        lvalue: true,
                        null_constant: false,
                    }),
                    None => Inferred::Unknown,
                },
                Some(Inferred::Dependent) => Inferred::Dependent,
                _ => Inferred::Unknown,
            },
            "unary_expression" => self.infer_unary(expr),
            "binary_expression" => self.infer_binary(expr),
            "update_expression" => match expr.child_by_field_name("argument") {
                Some(arg) => self.infer(arg),
                None => Inferred::Unknown,
            },
            "assignment_expression" => match expr.child_by_field_name("left") {
                Some(left) => self.infer(left),
                None => Inferred::Unknown,
            },
            "comma_expression" => match expr.child_by_field_name("right") {
                Some(right) => self.infer(right),
                None => Inferred::Unknown,
            },
            "conditional_expression" => {
                let consequence = expr.child_by_field_name("consequence").map(|c| self.infer(c));
                let alternative = expr.child_by_field_name("alternative").map(|a| self.infer(a));
                match (consequence, alternative) {
                    (Some(Inferred::Known(a)), Some(Inferred::Known(b))) if a.ty == b.ty => {
                        Inferred::Known(ExprType::value(a.ty))
                    }
                    (Some(Inferred::Dependent), _) | (_, Some(Inferred::Dependent)) => Inferred::Dependent,
                    _ => Inferred::Unknown,
                }
            }
            "cast_expression" | "compound_literal_expression" => {
                match expr.child_by_field_name("type") {
                    Some(descriptor) => self.typed_value(self.reader.type_descriptor(descriptor, &ctx.template_params)),
                    None => Inferred::Unknown,
                }
            }
            "sizeof_expression" | "alignof_expression" => {
                Inferred::Known(ExprType::value(TypeInfo::named("unsigned long")))
            }
            "new_expression" => match expr.child_by_field_name("type") {
                Some(type_node) => {
                    let mut ty = base_type(type_node, self.source, self.reader.speller);
                    ty.mark_dependent(&ctx.template_params);
                    ty.pointer_depth += 1;
                    self.typed_value(ty)
                }
                None => Inferred::Unknown,
            },
            _ => Inferred::Unknown,
        }
    }

    fn typed_value(&self, ty: TypeInfo) -> Inferred {
        if ty.is_dependent {
            Inferred::Dependent
        } else if ty.is_auto {
            Inferred::Unknown
        } else {
            let lvalue = ty.reference == Reference::LValue;
            let mut value = ExprType::value(ty);
            if lvalue {
                value.ty.reference = Reference::None;
                value.lvalue = true;
                value.exact = false;
            }
            Inferred::Known(value)
        }
    }

    fn object_of(&self, ty: TypeInfo) -> Inferred {
        if ty.is_dependent {
            return Inferred::Dependent;
        }
        if ty.is_auto {
            return Inferred::Unknown;
        }
        let ty = self.unit.scopes.canonical_type(self.ctx().scope, &ty);
        Inferred::Known(ExprType::object(ty))
    }

    fn infer_name(&self, name: &str) -> Inferred {
        if let Some(ty) = self.local(name) {
            return self.object_of(ty.clone());
        }
        let ctx = self.ctx();
        if ctx.template_params.iter().any(|p| p == name) {
            return Inferred::Dependent;
        }
        match self.unit.scopes.lookup(ctx.scope, name) {
            Lookup::Variable(ty) => {
                if ctx.in_class_template && self.is_member_of_current_class(name) {
                    return Inferred::Dependent;
                }
                self.object_of(ty)
            }
            Lookup::Functions(candidates) => match candidates.as_slice() {
                [single] => Inferred::Known(ExprType::value(function_pointer_type(self.unit.function(*single)))),
                _ => Inferred::Unknown,
            },
            _ => Inferred::Unknown,
        }
    }

    fn is_member_of_current_class(&self, name: &str) -> bool {
        let Some(class) = self.ctx().class else {
            return false;
        };
        matches!(self.unit.scopes.find_in(class, name), Lookup::Variable(_))
    }

    fn infer_field(&self, expr: Node<'_>) -> Inferred {
        let (Some(object), Some(field)) = (
            expr.child_by_field_name("argument"),
            expr.child_by_field_name("field"),
        ) else {
            return Inferred::Unknown;
        };
        let arrow = expr
            .child_by_field_name("operator")
            .map(|op| node_text(op, self.source) == "->")
            .unwrap_or(false);
        let object = match self.infer(object) {
            Inferred::Known(object) => object,
            other => return other,
        };
        let class_type = if arrow {
            match object.ty.dereferenced() {
                Some(pointee) => pointee,
                None => return Inferred::Unknown,
            }
        } else {
            object.ty
        };
        if class_type.is_dependent {
            return Inferred::Dependent;
        }
        let ctx = self.ctx();
        let class_type = self.unit.scopes.canonical_type(ctx.scope, &class_type);
        let Some(class) = self.unit.scopes.resolve_type(ctx.scope, &class_type) else {
            return Inferred::Unknown;
        };
        match self.unit.scopes.find_in(class, node_text(field, self.source)) {
            Lookup::Variable(ty) => self.object_of(ty),
            _ => Inferred::Unknown,
        }
    }

    fn infer_call(&self, expr: Node<'_>) -> Inferred {
        if let Some(index) = self.calls.get(&(self.file, expr.id())) {
            return self.typed_value(self.unit.function(*index).return_type.clone());
        }
        let Some(function) = expr.child_by_field_name("function") else {
            return Inferred::Unknown;
        };
        let ctx = self.ctx();
        match function.kind() {
            "template_function" => {
                let is_cast = function
                    .child_by_field_name("name")
                    .map(|n| CASTS.contains(&node_text(n, self.source)))
                    .unwrap_or(false);
                if !is_cast {
                    return Inferred::Unknown;
                }
                function
                    .child_by_field_name("arguments")
                    .and_then(|list| named_children(list).into_iter().next())
                    .filter(|arg| arg.kind() == "type_descriptor")
                    .map(|descriptor| self.typed_value(self.reader.type_descriptor(descriptor, &ctx.template_params)))
                    .unwrap_or(Inferred::Unknown)
            }
            "primitive_type" | "sized_type_specifier" => {
                self.typed_value(TypeInfo::named(self.reader.speller.normalize(node_text(function, self.source))))
            }
            "identifier" | "qualified_identifier" | "type_identifier" => {
                // `Widget(...)` constructs a temporary of the named class.
                let Some(name) = qualified_name(function, self.source) else {
                    return Inferred::Unknown;
                };
                let found = if name.path.is_empty() && !name.rooted {
                    if self.local(&name.name).is_some() {
                        return Inferred::Unknown;
                    }
                    self.unit.scopes.lookup(ctx.scope, &name.name)
                } else {
                    match self.unit.scopes.lookup_path(ctx.scope, &name.path, name.rooted) {
                        Some(scope) => self.unit.scopes.find_in(scope, &name.name),
                        None => Lookup::NotFound,
                    }
                };
                match found {
                    Lookup::Type(TypeTarget::Class(class)) => {
                        self.typed_value(TypeInfo::named(self.unit.scopes.qualified_name(class)))
                    }
                    Lookup::Type(TypeTarget::Alias(alias)) => self.typed_value(alias),
                    _ => Inferred::Unknown,
                }
            }
            _ => Inferred::Unknown,
        }
    }

    fn infer_pointer_expression(&self, expr: Node<'_>) -> Inferred {
        let Some(argument) = expr.child_by_field_name("argument") else {
            return Inferred::Unknown;
        };
        let operator = expr
            .child_by_field_name("operator")
            .map(|op| node_text(op, self.source))
            .unwrap_or("");
        match (operator, self.infer(argument)) {
            ("*", Inferred::Known(pointer)) => match pointer.ty.dereferenced() {
                Some(pointee) => Inferred::Known(ExprType {
                    ty: pointee,
                    lvalue: true,
                    exact: false,
                    null_constant: false,
                }),
                None => Inferred::Unknown,
            },
            ("&", Inferred::Known(object)) => Inferred::Known(ExprType::value(object.ty.address_of())),
            (_, Inferred::Dependent) => Inferred::Dependent,
            _ => Inferred::Unknown,
        }
    }

    fn infer_unary(&self, expr: Node<'_>) -> Inferred {
        let operator = expr
            .child_by_field_name("operator")
            .map(|op| node_text(op, self.source))
            .unwrap_or("");
        if operator == "!" {
            return Inferred::Known(ExprType::value(TypeInfo::named("bool")));
        }
        match expr.child_by_field_name("argument").map(|a| self.infer(a)) {
            Some(Inferred::Known(operand)) => Inferred::Known(ExprType::value(promoted(operand.ty))),
            Some(other) => other,
            None => Inferred::Unknown,
        }
    }

    /// Left-nested chains such as `a + b + c` are folded from the innermost
    /// operand outwards.
    fn infer_binary(&self, expr: Node<'_>) -> Inferred {
        let mut chain = vec![expr];
        let mut leftmost = expr.child_by_field_name("left");
        while let Some(left) = leftmost.filter(|left| left.kind() == "binary_expression") {
            chain.push(left);
            leftmost = left.child_by_field_name("left");
        }
        let Some(leftmost) = leftmost else {
            return Inferred::Unknown;
        };

        let mut value = self.infer(leftmost);
        for node in chain.into_iter().rev() {
            let operator = node
                .child_by_field_name("operator")
                .map(|op| node_text(op, self.source))
                .unwrap_or("");
            let Some(right) = node.child_by_field_name("right") else {
                return Inferred::Unknown;
            };
            value = binary_result(operator, value, self.infer(right));
        }
        value
    }
}

fn binary_result(operator: &str, left: Inferred, right: Inferred) -> Inferred {
    if matches!(left, Inferred::Dependent) || matches!(right, Inferred::Dependent) {
        return Inferred::Dependent;
    }
    if matches!(operator, "==" | "!=" | "<" | ">" | "<=" | ">=" | "&&" | "||") {
        return Inferred::Known(ExprType::value(TypeInfo::named("bool")));
    }
    let (Inferred::Known(left), Inferred::Known(right)) = (left, right) else {
        return Inferred::Unknown;
    };
    if left.ty.decayed_depth() > 0 && right.ty.decayed_depth() == 0 {
        return Inferred::Known(ExprType::value(left.ty));
    }
    if right.ty.decayed_depth() > 0 && left.ty.decayed_depth() == 0 && operator == "+" {
        return Inferred::Known(ExprType::value(right.ty));
    }
    if matches!(operator, "<<" | ">>") {
        return match arithmetic_rank(&left.ty.base) {
            Some(_) => Inferred::Known(ExprType::value(promoted(left.ty))),
            None => Inferred::Unknown,
        };
    }
    match usual_arithmetic(&left.ty, &right.ty) {
        Some(ty) => Inferred::Known(ExprType::value(ty)),
        None => Inferred::Unknown,
    }
}

fn push_visits<'t>(tasks: &mut Vec<Task<'t>>, nodes: Vec<Node<'t>>) {
    tasks.extend(nodes.into_iter().rev().map(Task::Visit));
}

/// Array parameters are pointers.
fn adjusted_parameter(mut ty: TypeInfo) -> TypeInfo {
    if ty.is_array {
        ty.is_array = false;
        ty.pointer_depth += 1;
    }
    ty
}

/// Type of a numeric literal from its spelling.
fn number_literal(text: &str) -> ExprType {
    let lower = text.to_ascii_lowercase().replace('\'', "");
    let hex = lower.starts_with("0x");
    let floating = !hex && (lower.contains('.') || lower.contains('e'));
    let base = if floating {
        if lower.ends_with('f') {
            "float"
        } else if lower.ends_with('l') {
            "long double"
        } else {
            "double"
        }
    } else {
        let suffix: String = lower
            .chars()
            .rev()
            .take_while(|c| matches!(c, 'u' | 'l' | 'z'))
            .collect();
        let unsigned = suffix.contains('u');
        let longs = suffix.matches('l').count();
        match (unsigned, longs) {
            (false, 0) => "int",
            (true, 0) => "unsigned int",
            (false, 1) => "long",
            (true, 1) => "unsigned long",
            (false, _) => "long long",
            (true, _) => "unsigned long long",
        }
    };
    let mut literal = ExprType::value(TypeInfo::named(base));
    literal.null_constant = !floating && lower.trim_end_matches(['u', 'l']) == "0";
    literal
}

/// Integral promotion of an operand.
fn promoted(ty: TypeInfo) -> TypeInfo {
    match arithmetic_rank(&ty.base) {
        Some((ArithmeticKind::Bool | ArithmeticKind::Character, _)) | Some((ArithmeticKind::Integer, 0..=2))
            if ty.decayed_depth() == 0 =>
        {
            TypeInfo::named("int")
        }
        _ => {
            let mut ty = ty;
            ty.is_const = false;
            ty
        }
    }
}

fn usual_arithmetic(left: &TypeInfo, right: &TypeInfo) -> Option<TypeInfo> {
    let (left_kind, left_rank) = arithmetic_rank(&left.base)?;
    let (right_kind, right_rank) = arithmetic_rank(&right.base)?;
    let left_float = left_kind == ArithmeticKind::Floating;
    let right_float = right_kind == ArithmeticKind::Floating;
    let winner = match (left_float, right_float) {
        (true, false) => left,
        (false, true) => right,
        (true, true) if left_rank >= right_rank => left,
        (true, true) => right,
        (false, false) if left_rank >= right_rank => left,
        (false, false) => right,
    };
    Some(promoted(TypeInfo::named(winner.base.clone())))
}

/// `int (*)(int)` style type of a function used as a value.
fn function_pointer_type(function: &FunctionEntity) -> TypeInfo {
    let params: Vec<String> = function.params.iter().map(|p| p.ty.spelling()).collect();
    let mut ty = function.return_type.clone();
    ty.function_pointer = Some(format!(
        "{} (*)({})",
        function.return_type.spelling(),
        params.join(", ")
    ));
    ty
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_literal_types() {
        assert_eq!(number_literal("42").ty.base, "int");
        assert_eq!(number_literal("42u").ty.base, "unsigned int");
        assert_eq!(number_literal("42UL").ty.base, "unsigned long");
        assert_eq!(number_literal("1.5").ty.base, "double");
        assert_eq!(number_literal("1.5f").ty.base, "float");
        assert_eq!(number_literal("0x1F").ty.base, "int");
        assert!(number_literal("0").null_constant);
        assert!(!number_literal("0.0").null_constant);
    }

    #[test]
    fn test_promotion() {
        assert_eq!(promoted(TypeInfo::named("char")).base, "int");
        assert_eq!(promoted(TypeInfo::named("short")).base, "int");
        assert_eq!(promoted(TypeInfo::named("long")).base, "long");
        assert_eq!(promoted(TypeInfo::named("float")).base, "float");
    }

    #[test]
    fn test_usual_arithmetic() {
        let ty = usual_arithmetic(&TypeInfo::named("int"), &TypeInfo::named("double")).unwrap();
        assert_eq!(ty.base, "double");
        let ty = usual_arithmetic(&TypeInfo::named("char"), &TypeInfo::named("short")).unwrap();
        assert_eq!(ty.base, "int");
    }
}
