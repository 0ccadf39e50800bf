use serde::{Deserialize, Serialize};
use std::fmt;

use super::scope::ScopeId;
use super::types::TypeInfo;

/// Identity of a declaration within one parsed unit.
///
/// Functions and parameters draw from the same counter, so ids are unique
/// across both. Redeclarations of a function share the id of the first one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeclId(pub u32);

impl fmt::Display for DeclId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index of a function entity in `ParsedUnit::functions`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionIndex(pub usize);

/// Index of a file in `ParsedUnit::files`. The main buffer is always 0.
pub type FileId = usize;

/// 1-based line and column inside a unit file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub file: FileId,
    pub line: usize,
    pub column: usize,
}

/// Byte range of a declaration, used for structural dumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyntaxRange {
    pub file: FileId,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Free,
    Method,
    Constructor,
    Destructor,
}

#[derive(Debug, Clone)]
pub struct ParamEntity {
    pub id: DeclId,
    pub name: String,
    pub ty: TypeInfo,
    pub has_default: bool,
    /// Function parameter pack (`Args... args`)
    pub is_pack: bool,
}

/// A function as recorded by the declaration collector.
#[derive(Debug, Clone)]
pub struct FunctionEntity {
    pub id: DeclId,
    pub name: String,
    pub qualified_name: String,
    pub kind: FunctionKind,
    pub return_type: TypeInfo,
    pub params: Vec<ParamEntity>,
    /// Scope the function is a member of
    pub scope: ScopeId,
    /// Owning class for methods, constructors and destructors
    pub class: Option<ScopeId>,
    /// Template parameters visible inside the function body
    pub template_params: Vec<String>,
    /// The function itself is a template
    pub is_template: bool,
    /// Member of a class template
    pub in_class_template: bool,
    /// Accepts C varargs or a parameter pack
    pub variadic: bool,
    /// C declaration with an empty parameter list
    pub unspecified_params: bool,
    pub is_virtual: bool,
    pub is_static: bool,
    pub is_const: bool,
    pub is_entry_point: bool,
    pub is_defined: bool,
    pub position: Position,
    pub range: SyntaxRange,
}

impl FunctionEntity {
    /// Number of arguments a call must supply at least.
    pub fn required_arity(&self) -> usize {
        self.params
            .iter()
            .filter(|p| !p.has_default && !p.is_pack)
            .count()
    }

    /// Number of named non-pack parameters.
    pub fn declared_arity(&self) -> usize {
        self.params.iter().filter(|p| !p.is_pack).count()
    }

    pub fn accepts_arity(&self, count: usize) -> bool {
        if self.unspecified_params {
            return true;
        }
        count >= self.required_arity() && (count <= self.declared_arity() || self.variadic)
    }

    /// Instance member that needs an object.
    pub fn is_instance_member(&self) -> bool {
        matches!(self.kind, FunctionKind::Method | FunctionKind::Destructor) && !self.is_static
    }

    /// Parameter type keys used to merge redeclarations.
    pub fn signature_keys(&self) -> Vec<String> {
        self.params.iter().map(|p| p.ty.signature_key()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(params: Vec<ParamEntity>, variadic: bool) -> FunctionEntity {
        FunctionEntity {
            id: DeclId(1),
            name: "f".to_string(),
            qualified_name: "f".to_string(),
            kind: FunctionKind::Free,
            return_type: TypeInfo::named("void"),
            params,
            scope: ScopeId(0),
            class: None,
            template_params: Vec::new(),
            is_template: false,
            in_class_template: false,
            variadic,
            unspecified_params: false,
            is_virtual: false,
            is_static: false,
            is_const: false,
            is_entry_point: false,
            is_defined: true,
            position: Position { file: 0, line: 1, column: 1 },
            range: SyntaxRange { file: 0, start: 0, end: 0 },
        }
    }

    fn param(id: u32, has_default: bool) -> ParamEntity {
        ParamEntity {
            id: DeclId(id),
            name: format!("p{}", id),
            ty: TypeInfo::named("int"),
            has_default,
            is_pack: false,
        }
    }

    #[test]
    fn test_arity_with_defaults() {
        let f = entity(vec![param(2, false), param(3, true)], false);
        assert!(!f.accepts_arity(0));
        assert!(f.accepts_arity(1));
        assert!(f.accepts_arity(2));
        assert!(!f.accepts_arity(3));
    }

    #[test]
    fn test_arity_with_varargs() {
        let f = entity(vec![param(2, false)], true);
        assert!(f.accepts_arity(1));
        assert!(f.accepts_arity(5));
        assert!(!f.accepts_arity(0));
    }
}
