//! Helpers for reading declarators and names out of the C/C++ syntax tree.

use tree_sitter::Node;

use super::entity::{DeclId, ParamEntity};
use super::types::{Reference, TypeInfo, TypeSpeller};

/// Source text of a node, empty if the range is not valid UTF-8.
pub fn node_text<'a>(node: Node<'_>, source: &'a str) -> &'a str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}

/// Named children of a node, comments excluded.
pub fn named_children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|child| child.kind() != "comment")
        .collect()
}

/// All children, anonymous tokens included.
pub fn all_children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.children(&mut cursor).collect()
}

/// Children that fill a repeated field, e.g. every `declarator` of a
/// declaration.
pub fn field_children<'t>(node: Node<'t>, field: &str) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.children_by_field_name(field, &mut cursor).collect()
}

/// True when `owner` has a direct child of `kind` whose text is `text`.
pub fn has_specifier(owner: Node<'_>, kind: &str, text: &str, source: &str) -> bool {
    all_children(owner)
        .into_iter()
        .any(|child| child.kind() == kind && node_text(child, source).trim() == text)
}

/// True when a direct child reads `virtual`.
pub fn has_virtual(owner: Node<'_>, source: &str) -> bool {
    all_children(owner).into_iter().any(|child| {
        matches!(child.kind(), "virtual" | "virtual_function_specifier")
            && node_text(child, source).trim() == "virtual"
    })
}

#[derive(Debug, Clone, Copy)]
enum Layer<'t> {
    Pointer,
    Reference(Reference),
    Array,
    Paren,
    Function(Node<'t>),
}

/// A declarator with its pointer, reference and function layers peeled off.
#[derive(Debug, Clone, Default)]
pub struct Declarator<'t> {
    /// Innermost name node, absent for abstract declarators
    pub name: Option<Node<'t>>,
    pub pointer_depth: u8,
    pub reference: Reference,
    pub is_array: bool,
    /// `function_declarator` when the declarator declares a function
    pub function: Option<Node<'t>>,
    /// `function_declarator` when the declarator is a pointer to function
    pub function_pointer: Option<Node<'t>>,
    /// Initializer of an `init_declarator`
    pub value: Option<Node<'t>>,
}

impl<'t> Declarator<'t> {
    pub fn declares_function(&self) -> bool {
        self.function.is_some()
    }
}

/// Peel a declarator down to its name.
pub fn unwrap_declarator(node: Node<'_>) -> Declarator<'_> {
    let mut layers = Vec::new();
    let mut value = None;
    let mut name = None;
    let mut current = Some(node);

    while let Some(node) = current {
        current = match node.kind() {
            "init_declarator" => {
                value = node.child_by_field_name("value");
                node.child_by_field_name("declarator")
            }
            "pointer_declarator" | "abstract_pointer_declarator" => {
                layers.push(Layer::Pointer);
                node.child_by_field_name("declarator")
            }
            "reference_declarator" | "abstract_reference_declarator" => {
                let rvalue = all_children(node)
                    .into_iter()
                    .any(|child| child.kind() == "&&");
                layers.push(Layer::Reference(if rvalue {
                    Reference::RValue
                } else {
                    Reference::LValue
                }));
                let count = node.named_child_count();
                if count > 0 {
                    node.named_child(count - 1)
                } else {
                    None
                }
            }
            "array_declarator" | "abstract_array_declarator" => {
                layers.push(Layer::Array);
                node.child_by_field_name("declarator")
            }
            "parenthesized_declarator" | "abstract_parenthesized_declarator" => {
                layers.push(Layer::Paren);
                node.named_child(0)
            }
            "function_declarator" | "abstract_function_declarator" => {
                layers.push(Layer::Function(node));
                node.child_by_field_name("declarator")
            }
            "attributed_declarator" => node.named_child(0),
            "variadic_declarator" => node.named_child(0),
            _ => {
                name = Some(node);
                None
            }
        };
    }

    let mut declarator = Declarator {
        name,
        value,
        ..Declarator::default()
    };

    let function_at = layers
        .iter()
        .enumerate()
        .rev()
        .find_map(|(position, layer)| match layer {
            Layer::Function(function) => Some((position, *function)),
            _ => None,
        });
    let applied: &[Layer<'_>] = match function_at {
        Some((position, function)) => {
            let through_pointer = layers[position + 1..]
                .iter()
                .any(|layer| matches!(layer, Layer::Pointer | Layer::Reference(_)));
            if through_pointer {
                declarator.function_pointer = Some(function);
                &[]
            } else {
                declarator.function = Some(function);
                &layers[..position]
            }
        }
        None => &layers,
    };
    for layer in applied {
        match layer {
            Layer::Pointer => declarator.pointer_depth += 1,
            Layer::Reference(kind) => declarator.reference = *kind,
            Layer::Array => declarator.is_array = true,
            Layer::Paren | Layer::Function(_) => {}
        }
    }
    declarator
}

/// A possibly qualified name such as `::ns::Widget::run`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedName {
    pub path: Vec<String>,
    pub name: String,
    /// Starts with `::`
    pub rooted: bool,
    /// Leaf carries explicit template arguments
    pub explicit_template: bool,
    /// Leaf is a destructor name
    pub destructor: bool,
}

impl QualifiedName {
    pub fn display(&self) -> String {
        let mut out = String::new();
        if self.rooted {
            out.push_str("::");
        }
        for part in &self.path {
            out.push_str(part);
            out.push_str("::");
        }
        out.push_str(&self.name);
        out
    }
}

/// Read a declarator or callee name node.
pub fn qualified_name(node: Node<'_>, source: &str) -> Option<QualifiedName> {
    let mut path = Vec::new();
    let mut rooted = false;
    let mut current = node;
    let mut first = true;

    while current.kind() == "qualified_identifier" {
        match current.child_by_field_name("scope") {
            Some(scope) => path.push(scope_component(scope, source)),
            None if first => rooted = true,
            None => {}
        }
        first = false;
        current = current.child_by_field_name("name")?;
    }

    let (name, explicit_template) = match current.kind() {
        "template_function" | "template_method" | "template_type" => {
            let inner = current.child_by_field_name("name")?;
            (simple_name(inner, source)?, true)
        }
        _ => (simple_name(current, source)?, false),
    };
    Some(QualifiedName {
        destructor: name.starts_with('~'),
        path,
        name,
        rooted,
        explicit_template,
    })
}

fn scope_component(scope: Node<'_>, source: &str) -> String {
    match scope.kind() {
        "template_type" => scope
            .child_by_field_name("name")
            .map(|name| node_text(name, source).to_string())
            .unwrap_or_else(|| node_text(scope, source).to_string()),
        _ => node_text(scope, source).trim().to_string(),
    }
}

fn simple_name(node: Node<'_>, source: &str) -> Option<String> {
    let text = node_text(node, source);
    match node.kind() {
        "identifier" | "field_identifier" | "type_identifier" | "namespace_identifier" => {
            Some(text.to_string())
        }
        "destructor_name" => {
            let stripped: String = text.chars().filter(|c| !c.is_whitespace() && *c != '~').collect();
            Some(format!("~{}", stripped))
        }
        "operator_name" => Some(operator_name(text)),
        "operator_cast" => {
            let collapsed: Vec<&str> = text.split_whitespace().collect();
            Some(collapsed.join(" "))
        }
        _ => None,
    }
}

/// `operator ()` becomes `operator()`, `operator  new [ ]` becomes `operator new[]`.
pub fn operator_name(text: &str) -> String {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    let rest = compact.strip_prefix("operator").unwrap_or(&compact);
    if rest.starts_with(|c: char| c.is_alphabetic()) {
        format!("operator {}", rest)
    } else {
        format!("operator{}", rest)
    }
}

/// Base type named by a `type` field, before declarator layers apply.
pub fn base_type(type_node: Node<'_>, source: &str, speller: &TypeSpeller) -> TypeInfo {
    match type_node.kind() {
        "placeholder_type_specifier" | "auto" | "decltype" => TypeInfo::placeholder(),
        "struct_specifier" | "class_specifier" | "union_specifier" | "enum_specifier" => {
            let name = type_node
                .child_by_field_name("name")
                .map(|name| speller.normalize(node_text(name, source)))
                .unwrap_or_else(|| "(unnamed)".to_string());
            TypeInfo::named(name)
        }
        "dependent_type" => {
            let text = node_text(type_node, source);
            let stripped = text.trim().trim_start_matches("typename").trim();
            let mut ty = TypeInfo::named(speller.normalize(stripped));
            ty.is_dependent = true;
            ty
        }
        _ => TypeInfo::named(speller.normalize(node_text(type_node, source))),
    }
}

/// Apply a peeled declarator's layers to a base type.
pub fn apply_declarator(mut base: TypeInfo, declarator: &Declarator<'_>) -> TypeInfo {
    base.pointer_depth += declarator.pointer_depth;
    if declarator.reference != Reference::None {
        base.reference = declarator.reference;
    }
    base.is_array |= declarator.is_array;
    base
}

/// Parameters read from a `parameter_list`.
pub struct ParamList {
    pub params: Vec<ParamEntity>,
    pub variadic: bool,
    /// Written as `(void)`
    pub explicit_void: bool,
}

impl ParamList {
    pub fn empty() -> Self {
        Self {
            params: Vec::new(),
            variadic: false,
            explicit_void: false,
        }
    }
}

/// Builds `TypeInfo` values from declarations in one source text.
pub struct TypeReader<'a> {
    pub source: &'a str,
    pub speller: &'a TypeSpeller,
}

impl<'a> TypeReader<'a> {
    pub fn new(source: &'a str, speller: &'a TypeSpeller) -> Self {
        Self { source, speller }
    }

    /// Full type of a declared entity: base type, qualifiers of the owning
    /// declaration and the declarator's layers.
    pub fn declared_type(
        &self,
        owner: Node<'_>,
        type_node: Option<Node<'_>>,
        declarator: &Declarator<'_>,
        template_params: &[String],
    ) -> TypeInfo {
        let mut base = type_node
            .map(|t| base_type(t, self.source, self.speller))
            .unwrap_or_else(|| TypeInfo::named("int"));
        if has_specifier(owner, "type_qualifier", "const", self.source) {
            base.is_const = true;
        }
        let mut ty = match declarator.function_pointer {
            Some(function) => {
                let params = function
                    .child_by_field_name("parameters")
                    .map(|list| self.params(list, template_params))
                    .map(|list| {
                        let mut types: Vec<String> = list.params.iter().map(|p| p.ty.spelling()).collect();
                        if list.variadic {
                            types.push("...".to_string());
                        }
                        types.join(", ")
                    })
                    .unwrap_or_default();
                let mut ty = base.clone();
                ty.function_pointer = Some(format!("{} (*)({})", base.spelling(), params));
                ty
            }
            None => apply_declarator(base, declarator),
        };
        ty.mark_dependent(template_params);
        ty
    }

    /// Type of a `type_descriptor`, as used by aliases, casts and trailing
    /// return types.
    pub fn type_descriptor(&self, descriptor: Node<'_>, template_params: &[String]) -> TypeInfo {
        let base = descriptor
            .child_by_field_name("type")
            .map(|t| base_type(t, self.source, self.speller))
            .unwrap_or_else(TypeInfo::placeholder);
        let declarator = descriptor
            .child_by_field_name("declarator")
            .map(unwrap_declarator)
            .unwrap_or_default();
        let mut ty = apply_declarator(base, &declarator);
        if has_specifier(descriptor, "type_qualifier", "const", self.source) {
            ty.is_const = true;
        }
        ty.mark_dependent(template_params);
        ty
    }

    /// Parameters of a `parameter_list`. Ids are left unassigned.
    pub fn params(&self, list: Node<'_>, template_params: &[String]) -> ParamList {
        let mut result = ParamList::empty();
        let children = named_children(list);
        let single = children.len() == 1;

        for child in children {
            let kind = child.kind();
            match kind {
                "parameter_declaration" | "optional_parameter_declaration" | "variadic_parameter_declaration" => {
                    let declarator = child
                        .child_by_field_name("declarator")
                        .map(unwrap_declarator)
                        .unwrap_or_default();
                    let ty = self.declared_type(
                        child,
                        child.child_by_field_name("type"),
                        &declarator,
                        template_params,
                    );
                    if kind == "parameter_declaration" && single && declarator.name.is_none() && ty.is_void() {
                        result.explicit_void = true;
                        continue;
                    }
                    let is_pack = kind == "variadic_parameter_declaration";
                    result.variadic |= is_pack;
                    result.params.push(ParamEntity {
                        id: DeclId(0),
                        name: declarator
                            .name
                            .map(|n| node_text(n, self.source).to_string())
                            .unwrap_or_default(),
                        ty,
                        has_default: kind == "optional_parameter_declaration",
                        is_pack,
                    });
                }
                "variadic_parameter" => result.variadic = true,
                _ => {}
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::languages::{CppFrontend, LanguageFrontend, SourceLanguage};

    fn first_declarator(source: &str) -> (tree_sitter::Tree, String) {
        let mut frontend = CppFrontend::new(SourceLanguage::Cpp).unwrap();
        let tree = frontend.parse(source).unwrap();
        (tree, source.to_string())
    }

    #[test]
    fn test_pointer_return_function() {
        let (tree, source) = first_declarator("int *make(int n);");
        let declaration = tree.root_node().named_child(0).unwrap();
        let node = declaration.child_by_field_name("declarator").unwrap();
        let declarator = unwrap_declarator(node);
        assert!(declarator.declares_function());
        assert_eq!(declarator.pointer_depth, 1);
        assert_eq!(node_text(declarator.name.unwrap(), &source), "make");
    }

    #[test]
    fn test_function_pointer_variable() {
        let (tree, source) = first_declarator("void (*callback)(int);");
        let declaration = tree.root_node().named_child(0).unwrap();
        let node = declaration.child_by_field_name("declarator").unwrap();
        let declarator = unwrap_declarator(node);
        assert!(!declarator.declares_function());
        assert!(declarator.function_pointer.is_some());
        assert_eq!(node_text(declarator.name.unwrap(), &source), "callback");
    }

    #[test]
    fn test_reference_with_initializer() {
        let (tree, source) = first_declarator("int &alias = value;");
        let declaration = tree.root_node().named_child(0).unwrap();
        let node = declaration.child_by_field_name("declarator").unwrap();
        let declarator = unwrap_declarator(node);
        assert_eq!(declarator.reference, Reference::LValue);
        assert!(declarator.value.is_some());
        assert_eq!(node_text(declarator.name.unwrap(), &source), "alias");
    }

    #[test]
    fn test_qualified_out_of_line_name() {
        let (tree, source) = first_declarator("void ns::Widget::draw() {}");
        let definition = tree.root_node().named_child(0).unwrap();
        let declarator = unwrap_declarator(definition.child_by_field_name("declarator").unwrap());
        let name = qualified_name(declarator.name.unwrap(), &source).unwrap();
        assert_eq!(name.path, vec!["ns", "Widget"]);
        assert_eq!(name.name, "draw");
        assert!(!name.rooted);
    }

    #[test]
    fn test_operator_names() {
        assert_eq!(operator_name("operator ()"), "operator()");
        assert_eq!(operator_name("operator  new [ ]"), "operator new[]");
        assert_eq!(operator_name("operator<<"), "operator<<");
    }
}
