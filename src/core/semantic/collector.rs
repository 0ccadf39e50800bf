//! First analysis pass: records namespaces, classes, type names and every
//! function declaration, merging redeclarations into one entity.

use std::path::Path;
use tracing::{debug, trace, warn};
use tree_sitter::Node;

use crate::core::languages::SourceLanguage;
use super::declarator::{
    all_children, field_children, has_specifier, has_virtual, named_children, node_text,
    qualified_name, unwrap_declarator, Declarator, ParamList, QualifiedName, TypeReader,
};
use super::entity::{
    DeclId, FileId, FunctionEntity, FunctionIndex, FunctionKind, Position, SyntaxRange,
};
use super::preprocessor::{branch_body, branches, is_conditional, Branch};
use super::scope::{Lookup, ScopeId, ScopeKind};
use super::types::{TypeInfo, TypeSpeller};
use super::unit::{Diagnostic, ParsedUnit, Severity};

/// Declarations nested deeper than this are skipped.
const MAX_NESTING: usize = 256;

/// `using ns::name;` applied once every file is collected.
#[derive(Debug, Clone)]
pub struct PendingUsing {
    scope: ScopeId,
    name: QualifiedName,
}

#[derive(Debug, Clone)]
struct Context {
    scope: ScopeId,
    /// Template parameters of every enclosing template
    template_params: Vec<String>,
    in_class_template: bool,
    /// Parameters of the template header directly around the next item
    own_template: Option<Vec<String>>,
    /// Inside a `#if` branch that may not be compiled
    undecided: bool,
    depth: usize,
}

impl Context {
    fn nested(&self, scope: ScopeId) -> Self {
        Self {
            scope,
            template_params: self.template_params.clone(),
            in_class_template: self.in_class_template,
            own_template: None,
            undecided: self.undecided,
            depth: self.depth + 1,
        }
    }
}

pub struct Collector<'a> {
    unit: &'a mut ParsedUnit,
    speller: &'a TypeSpeller,
    reader: TypeReader<'a>,
    file: FileId,
    path: &'a Path,
    source: &'a str,
    too_deep: bool,
    usings: &'a mut Vec<PendingUsing>,
}

impl<'a> Collector<'a> {
    pub fn new(
        unit: &'a mut ParsedUnit,
        speller: &'a TypeSpeller,
        file: FileId,
        path: &'a Path,
        source: &'a str,
        usings: &'a mut Vec<PendingUsing>,
    ) -> Self {
        Self {
            unit,
            speller,
            reader: TypeReader::new(source, speller),
            file,
            path,
            source,
            too_deep: false,
            usings,
        }
    }

    /// Collect every declaration in a translation unit root.
    pub fn collect(mut self, root: Node<'_>) {
        let context = Context {
            scope: self.unit.scopes.global(),
            template_params: Vec::new(),
            in_class_template: false,
            own_template: None,
            undecided: false,
            depth: 0,
        };
        self.collect_items(root, &context);
        debug!(
            "Collected {} with {} functions so far",
            self.path.display(),
            self.unit.functions.len()
        );
    }

    fn collect_items(&mut self, node: Node<'_>, ctx: &Context) {
        for child in named_children(node) {
            self.collect_item(child, ctx);
        }
    }

    fn collect_item(&mut self, node: Node<'_>, ctx: &Context) {
        if ctx.depth > MAX_NESTING {
            if !self.too_deep {
                self.too_deep = true;
                warn!("Declarations nested too deeply in {}", self.path.display());
                self.unit.push_diagnostic(Diagnostic::at(
                    Severity::Warning,
                    "declarations nested too deeply; inner declarations are ignored",
                    self.path,
                    node,
                ));
            }
            return;
        }
        match node.kind() {
            "namespace_definition" => self.collect_namespace(node, ctx),
            "linkage_specification" => {
                if let Some(body) = node.child_by_field_name("body") {
                    if body.kind() == "declaration_list" {
                        self.collect_items(body, ctx);
                    } else {
                        self.collect_item(body, ctx);
                    }
                }
            }
            "declaration_list" | "ERROR" => self.collect_items(node, ctx),
            kind if is_conditional(kind) => self.collect_conditional(node, ctx),
            "template_declaration" => self.collect_template(node, ctx),
            "function_definition" => self.collect_function_definition(node, ctx),
            "declaration" | "field_declaration" => self.collect_declaration(node, ctx),
            "friend_declaration" => {
                let namespace = self.enclosing_namespace(ctx.scope);
                let friend_ctx = ctx.nested(namespace);
                for child in named_children(node) {
                    if matches!(child.kind(), "function_definition" | "declaration") {
                        self.collect_item(child, &friend_ctx);
                    }
                }
            }
            "class_specifier" | "struct_specifier" | "union_specifier" => {
                self.collect_class(node, ctx, None);
            }
            "enum_specifier" => self.collect_enum(node, ctx),
            "type_definition" => self.collect_typedef(node, ctx),
            "alias_declaration" => self.collect_alias(node, ctx),
            "using_declaration" => self.collect_using(node, ctx),
            _ => {}
        }
    }

    fn collect_namespace(&mut self, node: Node<'_>, ctx: &Context) {
        let scope = match node.child_by_field_name("name") {
            None => self.unit.scopes.anonymous_namespace(ctx.scope),
            Some(name) => {
                let text = node_text(name, self.source);
                let mut scope = ctx.scope;
                for part in text.split("::").map(str::trim).filter(|p| !p.is_empty()) {
                    let part = part.trim_start_matches("inline").trim();
                    scope = self.unit.scopes.child(scope, part, ScopeKind::Namespace);
                }
                if all_children(node).iter().any(|c| c.kind() == "inline") {
                    self.unit.scopes.add_using_directive(ctx.scope, scope);
                }
                scope
            }
        };
        if let Some(body) = node.child_by_field_name("body") {
            self.collect_items(body, &ctx.nested(scope));
        }
    }

    /// Compiled branches are collected as usual. Undecided ones too, so
    /// their declarations stay visible, without redefinition errors.
    fn collect_conditional(&mut self, node: Node<'_>, ctx: &Context) {
        for branch in branches(node) {
            let decision = self.unit.preprocessor.branch(self.file, branch);
            if decision == Branch::Inactive {
                continue;
            }
            let inner = Context {
                undecided: ctx.undecided || decision == Branch::Undecided,
                depth: ctx.depth + 1,
                ..ctx.clone()
            };
            for item in branch_body(branch) {
                self.collect_item(item, &inner);
            }
        }
    }

    fn collect_template(&mut self, node: Node<'_>, ctx: &Context) {
        let params = node
            .child_by_field_name("parameters")
            .map(|list| self.template_param_names(list))
            .unwrap_or_default();
        let mut inner = ctx.clone();
        inner.template_params.extend(params.iter().cloned());
        inner.own_template = Some(params);

        for child in named_children(node) {
            if matches!(child.kind(), "template_parameter_list" | "requires_clause") {
                continue;
            }
            self.collect_item(child, &inner);
        }
    }

    fn template_param_names(&self, list: Node<'_>) -> Vec<String> {
        named_children(list)
            .into_iter()
            .filter_map(|param| self.template_param_name(param))
            .collect()
    }

    fn template_param_name(&self, param: Node<'_>) -> Option<String> {
        if let Some(name) = param.child_by_field_name("name") {
            return Some(node_text(name, self.source).to_string());
        }
        if let Some(declarator) = param.child_by_field_name("declarator") {
            let name = unwrap_declarator(declarator).name?;
            return Some(node_text(name, self.source).to_string());
        }
        named_children(param)
            .into_iter()
            .rev()
            .find_map(|child| match child.kind() {
                "type_identifier" => Some(node_text(child, self.source).to_string()),
                "type_parameter_declaration" => self.template_param_name(child),
                _ => None,
            })
    }

    fn collect_function_definition(&mut self, node: Node<'_>, ctx: &Context) {
        let Some(declarator_node) = node.child_by_field_name("declarator") else {
            return;
        };
        let declarator = unwrap_declarator(declarator_node);
        if declarator.declares_function() {
            self.declare_function(node, node.child_by_field_name("type"), &declarator, ctx, true);
        }
    }

    fn collect_declaration(&mut self, node: Node<'_>, ctx: &Context) {
        let type_node = node.child_by_field_name("type");
        if let Some(ty) = type_node {
            match ty.kind() {
                "class_specifier" | "struct_specifier" | "union_specifier"
                    if ty.child_by_field_name("body").is_some() =>
                {
                    self.collect_class(ty, ctx, None);
                }
                "enum_specifier" => self.collect_enum(ty, ctx),
                _ => {}
            }
        }

        for declarator_node in field_children(node, "declarator") {
            let declarator = unwrap_declarator(declarator_node);
            if declarator.declares_function() {
                self.declare_function(node, type_node, &declarator, ctx, false);
                continue;
            }
            let Some(name) = declarator.name else {
                continue;
            };
            if !matches!(name.kind(), "identifier" | "field_identifier") {
                continue;
            }
            let ty = self.reader.declared_type(node, type_node, &declarator, &ctx.template_params);
            let name = node_text(name, self.source).to_string();
            self.unit.scopes.get_mut(ctx.scope).variables.insert(name, ty);
        }
    }

    fn collect_class(&mut self, node: Node<'_>, ctx: &Context, fallback_name: Option<&str>) -> Option<ScopeId> {
        let qname = match node.child_by_field_name("name") {
            Some(name) => qualified_name(name, self.source)?,
            None => QualifiedName {
                path: Vec::new(),
                name: fallback_name?.to_string(),
                rooted: false,
                explicit_template: false,
                destructor: false,
            },
        };
        let parent = if qname.path.is_empty() {
            ctx.scope
        } else {
            self.unit
                .scopes
                .lookup_path(ctx.scope, &qname.path, qname.rooted)
                .unwrap_or(ctx.scope)
        };
        let scope = self.unit.scopes.child(parent, &qname.name, ScopeKind::Class);

        let Some(body) = node.child_by_field_name("body") else {
            return Some(scope);
        };

        let is_template = ctx.own_template.is_some() || ctx.in_class_template;
        if is_template {
            self.unit.scopes.get_mut(scope).is_template = true;
        }

        if let Some(clause) = all_children(node).into_iter().find(|c| c.kind() == "base_class_clause") {
            for base in named_children(clause) {
                if matches!(base.kind(), "type_identifier" | "qualified_identifier" | "template_type") {
                    let spelled = self.speller.normalize(node_text(base, self.source));
                    self.unit.scopes.get_mut(scope).base_names.push(spelled);
                }
            }
        }

        let mut inner = ctx.nested(scope);
        if let Some(own) = &ctx.own_template {
            inner.template_params.extend(own.iter().cloned());
        }
        inner.in_class_template = is_template;
        trace!("Collecting class {}", self.unit.scopes.qualified_name(scope));
        self.collect_items(body, &inner);
        Some(scope)
    }

    fn collect_enum(&mut self, node: Node<'_>, ctx: &Context) {
        let Some(name) = node.child_by_field_name("name") else {
            return;
        };
        let name = node_text(name, self.source).to_string();
        self.unit.scopes.get_mut(ctx.scope).enums.insert(name.clone());

        let scoped = all_children(node)
            .into_iter()
            .any(|c| matches!(c.kind(), "class" | "struct"));
        if scoped {
            return;
        }
        if let Some(body) = node.child_by_field_name("body") {
            for enumerator in named_children(body) {
                if let Some(value) = enumerator.child_by_field_name("name") {
                    let value = node_text(value, self.source).to_string();
                    self.unit
                        .scopes
                        .get_mut(ctx.scope)
                        .variables
                        .insert(value, TypeInfo::named(name.clone()));
                }
            }
        }
    }

    fn collect_typedef(&mut self, node: Node<'_>, ctx: &Context) {
        let type_node = node.child_by_field_name("type");
        let declarators: Vec<Declarator<'_>> = field_children(node, "declarator")
            .into_iter()
            .map(unwrap_declarator)
            .collect();
        let first_name = declarators
            .first()
            .and_then(|d| d.name)
            .map(|n| node_text(n, self.source).to_string());

        if let Some(ty) = type_node {
            match ty.kind() {
                "class_specifier" | "struct_specifier" | "union_specifier"
                    if ty.child_by_field_name("body").is_some() =>
                {
                    self.collect_class(ty, ctx, first_name.as_deref());
                }
                "enum_specifier" => {
                    self.collect_enum(ty, ctx);
                    if ty.child_by_field_name("name").is_none() {
                        if let Some(name) = &first_name {
                            self.unit.scopes.get_mut(ctx.scope).enums.insert(name.clone());
                        }
                    }
                }
                _ => {}
            }
        }

        for declarator in &declarators {
            let Some(name) = declarator.name else {
                continue;
            };
            let name = node_text(name, self.source).to_string();
            let mut ty = self.reader.declared_type(node, type_node, declarator, &ctx.template_params);
            // An anonymous struct takes the typedef name.
            if ty.base == "(unnamed)" {
                ty.base = name.clone();
            }
            if ty.base == name && ty.decayed_depth() == 0 {
                continue;
            }
            self.unit.scopes.get_mut(ctx.scope).aliases.insert(name, ty);
        }
    }

    fn collect_alias(&mut self, node: Node<'_>, ctx: &Context) {
        let (Some(name), Some(descriptor)) = (
            node.child_by_field_name("name"),
            node.child_by_field_name("type"),
        ) else {
            return;
        };
        let name = node_text(name, self.source).to_string();
        let ty = self.reader.type_descriptor(descriptor, &ctx.template_params);
        self.unit.scopes.get_mut(ctx.scope).aliases.insert(name, ty);
    }

    fn collect_using(&mut self, node: Node<'_>, ctx: &Context) {
        let is_directive = all_children(node).iter().any(|c| c.kind() == "namespace");
        let Some(target) = named_children(node)
            .into_iter()
            .find(|c| matches!(c.kind(), "identifier" | "qualified_identifier"))
        else {
            return;
        };
        let Some(qname) = qualified_name(target, self.source) else {
            return;
        };

        if is_directive {
            let mut path = qname.path.clone();
            path.push(qname.name.clone());
            if let Some(namespace) = self.unit.scopes.lookup_path(ctx.scope, &path, qname.rooted) {
                self.unit.scopes.add_using_directive(ctx.scope, namespace);
            }
        } else {
            self.usings.push(PendingUsing {
                scope: ctx.scope,
                name: qname,
            });
        }
    }

    fn declare_function(
        &mut self,
        owner: Node<'_>,
        type_node: Option<Node<'_>>,
        declarator: &Declarator<'_>,
        ctx: &Context,
        is_definition: bool,
    ) {
        let (Some(name_node), Some(function_node)) = (declarator.name, declarator.function) else {
            return;
        };
        let Some(qname) = qualified_name(name_node, self.source) else {
            return;
        };

        let target = self.target_scope(ctx, &qname, name_node);
        let class = self.unit.scopes.get(target).is_class().then_some(target);
        let kind = match class {
            Some(class) if qname.name == self.unit.scopes.get(class).name => FunctionKind::Constructor,
            Some(_) if qname.destructor => FunctionKind::Destructor,
            Some(_) => FunctionKind::Method,
            None => FunctionKind::Free,
        };

        let out_of_line = target != ctx.scope;
        let class_is_template = class
            .map(|c| self.unit.scopes.get(c).is_template)
            .unwrap_or(false);
        let in_class_template = ctx.in_class_template || class_is_template;
        // `template<class T> void A<T>::f()` belongs to the class template.
        let is_template = ctx.own_template.is_some() && !(out_of_line && class_is_template);
        let template_params = ctx.template_params.clone();

        let return_type = match kind {
            FunctionKind::Constructor | FunctionKind::Destructor => TypeInfo::named("void"),
            _ => {
                let ty = self.reader.declared_type(owner, type_node, declarator, &template_params);
                match trailing_return(function_node) {
                    Some(descriptor) if ty.is_auto => {
                        self.reader.type_descriptor(descriptor, &template_params)
                    }
                    _ => ty,
                }
            }
        };

        let list = function_node
            .child_by_field_name("parameters")
            .map(|params| self.reader.params(params, &template_params))
            .unwrap_or_else(ParamList::empty);
        let unspecified_params = self.unit.language == SourceLanguage::C
            && list.params.is_empty()
            && !list.explicit_void
            && !list.variadic;

        let is_virtual = has_virtual(owner, self.source)
            || all_children(function_node)
                .iter()
                .any(|c| c.kind() == "virtual_specifier");
        let is_static = has_specifier(owner, "storage_class_specifier", "static", self.source);
        let is_const = has_specifier(function_node, "type_qualifier", "const", self.source);

        let start = name_node.start_position();
        let position = Position {
            file: self.file,
            line: start.row + 1,
            column: start.column + 1,
        };
        let range = SyntaxRange {
            file: self.file,
            start: owner.start_byte(),
            end: owner.end_byte(),
        };

        if qname.explicit_template {
            if let Some(primary) = self.find_primary_template(target, &qname.name) {
                trace!("Folding specialization of {} into its primary template", qname.name);
                if is_definition {
                    self.unit.definitions.insert((self.file, owner.id()), primary);
                }
                return;
            }
        }

        let keys: Vec<String> = list.params.iter().map(|p| p.ty.signature_key()).collect();
        let existing = self.find_redeclaration(target, &qname.name, kind, &keys, is_const, is_template);

        let index = match existing {
            Some(index) => {
                if is_definition && !ctx.undecided && self.unit.functions[index.0].is_defined {
                    let name = self.unit.functions[index.0].qualified_name.clone();
                    self.unit.push_diagnostic(Diagnostic::at(
                        Severity::Error,
                        format!("redefinition of '{}'", name),
                        self.path,
                        name_node,
                    ));
                }
                self.merge_redeclaration(index, list, is_definition, position, range, is_virtual, is_static);
                index
            }
            None => {
                let id = self.unit.next_decl_id();
                let params = list
                    .params
                    .into_iter()
                    .map(|mut p| {
                        p.id = self.unit.next_decl_id();
                        p
                    })
                    .collect();
                let global = self.unit.scopes.global();
                let entity = FunctionEntity {
                    id,
                    qualified_name: self.unit.scopes.qualify(target, &qname.name),
                    name: qname.name.clone(),
                    kind,
                    return_type,
                    params,
                    scope: target,
                    class,
                    template_params,
                    is_template: is_template || qname.explicit_template,
                    in_class_template,
                    variadic: list.variadic,
                    unspecified_params,
                    is_virtual,
                    is_static,
                    is_const,
                    is_entry_point: kind == FunctionKind::Free && qname.name == "main" && target == global,
                    is_defined: is_definition,
                    position,
                    range,
                };
                let index = FunctionIndex(self.unit.functions.len());
                trace!("Declared {} as {}", entity.qualified_name, entity.id);
                self.unit.functions.push(entity);
                let scope = self.unit.scopes.get_mut(target);
                if kind == FunctionKind::Constructor {
                    scope.constructors.push(index);
                } else {
                    scope.functions.entry(qname.name.clone()).or_default().push(index);
                }
                index
            }
        };

        if is_definition {
            self.unit.definitions.insert((self.file, owner.id()), index);
        }
    }

    fn target_scope(&mut self, ctx: &Context, qname: &QualifiedName, name_node: Node<'_>) -> ScopeId {
        if qname.path.is_empty() && !qname.rooted {
            return ctx.scope;
        }
        if qname.path.is_empty() {
            return self.unit.scopes.global();
        }
        if let Some(scope) = self.unit.scopes.lookup_path(ctx.scope, &qname.path, qname.rooted) {
            return scope;
        }

        let missing = qname.path.join("::");
        self.unit.push_diagnostic(Diagnostic::at(
            Severity::Error,
            format!("use of undeclared identifier '{}'", missing),
            self.path,
            name_node,
        ));
        let mut scope = if qname.rooted { self.unit.scopes.global() } else { ctx.scope };
        for part in &qname.path {
            scope = self.unit.scopes.child(scope, part, ScopeKind::Class);
        }
        scope
    }

    fn find_primary_template(&self, scope: ScopeId, name: &str) -> Option<FunctionIndex> {
        self.unit
            .scopes
            .get(scope)
            .functions
            .get(name)?
            .iter()
            .copied()
            .find(|index| self.unit.functions[index.0].is_template)
    }

    fn find_redeclaration(
        &self,
        scope: ScopeId,
        name: &str,
        kind: FunctionKind,
        keys: &[String],
        is_const: bool,
        is_template: bool,
    ) -> Option<FunctionIndex> {
        let scope = self.unit.scopes.get(scope);
        let candidates: &[FunctionIndex] = if kind == FunctionKind::Constructor {
            &scope.constructors
        } else {
            scope.functions.get(name).map(Vec::as_slice).unwrap_or(&[])
        };
        // C has no overloading, so one name is one function.
        if self.unit.language == SourceLanguage::C {
            return candidates.first().copied();
        }
        candidates.iter().copied().find(|index| {
            let f = &self.unit.functions[index.0];
            f.is_const == is_const && f.is_template == is_template && f.signature_keys() == keys
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn merge_redeclaration(
        &mut self,
        index: FunctionIndex,
        list: ParamList,
        is_definition: bool,
        position: Position,
        range: SyntaxRange,
        is_virtual: bool,
        is_static: bool,
    ) {
        let replace_params = self.unit.functions[index.0].params.len() != list.params.len();
        let fresh_ids: Vec<DeclId> = if replace_params {
            list.params.iter().map(|_| self.unit.next_decl_id()).collect()
        } else {
            Vec::new()
        };

        let function = &mut self.unit.functions[index.0];
        function.is_virtual |= is_virtual;
        function.is_static |= is_static;

        if replace_params {
            // A prototype without parameters completed by its definition.
            function.params = list
                .params
                .into_iter()
                .zip(fresh_ids)
                .map(|(mut p, id)| {
                    p.id = id;
                    p
                })
                .collect();
            function.variadic = list.variadic;
            function.unspecified_params = false;
        } else {
            for (existing, incoming) in function.params.iter_mut().zip(list.params) {
                existing.has_default |= incoming.has_default;
                if is_definition && !incoming.name.is_empty() {
                    existing.name = incoming.name;
                }
            }
        }

        if is_definition && !function.is_defined {
            function.is_defined = true;
            function.position = position;
            function.range = range;
        }
    }

    fn enclosing_namespace(&self, scope: ScopeId) -> ScopeId {
        let mut current = scope;
        while self.unit.scopes.get(current).is_class() {
            match self.unit.scopes.get(current).parent {
                Some(parent) => current = parent,
                None => break,
            }
        }
        current
    }
}

fn trailing_return(function: Node<'_>) -> Option<Node<'_>> {
    let trailing = all_children(function)
        .into_iter()
        .find(|c| c.kind() == "trailing_return_type")?;
    named_children(trailing)
        .into_iter()
        .find(|c| c.kind() == "type_descriptor")
}

/// Resolve class bases, apply `using` declarations and propagate
/// virtualness to overriders. Runs once after every file is collected.
pub fn finalize(unit: &mut ParsedUnit, usings: Vec<PendingUsing>) {
    unit.scopes.resolve_bases();

    for using in usings {
        let found = if using.name.path.is_empty() {
            Lookup::NotFound
        } else {
            match unit
                .scopes
                .lookup_path(using.scope, &using.name.path, using.name.rooted)
            {
                Some(scope) => unit.scopes.find_in(scope, &using.name.name),
                None => Lookup::NotFound,
            }
        };
        if let Lookup::Functions(list) = found {
            let entry = unit
                .scopes
                .get_mut(using.scope)
                .functions
                .entry(using.name.name.clone())
                .or_default();
            for index in list {
                if !entry.contains(&index) {
                    entry.push(index);
                }
            }
        }
    }

    // Overriders of virtual functions are virtual even without the keyword.
    loop {
        let mut changed = false;
        for index in 0..unit.functions.len() {
            let function = &unit.functions[index];
            if function.is_virtual {
                continue;
            }
            let Some(class) = function.class else {
                continue;
            };
            if !matches!(function.kind, FunctionKind::Method | FunctionKind::Destructor) {
                continue;
            }
            let overrides = unit.scopes.all_bases(class).into_iter().any(|base| {
                let scope = unit.scopes.get(base);
                let candidates: Vec<FunctionIndex> = if function.kind == FunctionKind::Destructor {
                    scope
                        .functions
                        .iter()
                        .filter(|(name, _)| name.starts_with('~'))
                        .flat_map(|(_, list)| list.iter().copied())
                        .collect()
                } else {
                    scope.functions.get(&function.name).cloned().unwrap_or_default()
                };
                candidates.into_iter().any(|candidate| {
                    let other = &unit.functions[candidate.0];
                    other.is_virtual
                        && (function.kind == FunctionKind::Destructor
                            || (other.is_const == function.is_const
                                && other.signature_keys() == function.signature_keys()))
                })
            });
            if overrides {
                unit.functions[index].is_virtual = true;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
}
