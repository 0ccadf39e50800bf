//! Minimal C/C++ type model used for printing declarations and ranking
//! overload candidates.

use regex::Regex;
use std::fmt;

use crate::error::{CallscopeError, Result};

/// Reference qualifier of a declared type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Reference {
    #[default]
    None,
    LValue,
    RValue,
}

/// A declared or inferred type.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TypeInfo {
    /// Base spelling without cv-qualifiers, pointers or references
    pub base: String,
    pub is_const: bool,
    pub pointer_depth: u8,
    pub reference: Reference,
    pub is_array: bool,
    /// Printed signature when the type is a pointer to function
    pub function_pointer: Option<String>,
    /// `auto`, `decltype(...)` and other placeholders
    pub is_auto: bool,
    /// Mentions a template parameter in scope
    pub is_dependent: bool,
}

/// Coarse classification used by the conversion ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Void,
    Arithmetic(ArithmeticKind, u8),
    Pointer,
    NullPointer,
    FunctionPointer,
    Named,
    Placeholder,
    Dependent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticKind {
    Bool,
    Character,
    Integer,
    Floating,
}

/// Implicit conversion sequence rank, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConversionRank {
    Exact,
    Promotion,
    Conversion,
    UserDefined,
    Ellipsis,
}

/// Facts about named types that only the scope tree knows.
pub trait TypeEnvironment {
    fn is_enum(&self, base: &str) -> bool;
    fn is_class(&self, base: &str) -> bool;
    fn is_derived_from(&self, derived: &str, base: &str) -> bool;
}

/// Expression type as seen at a call site.
#[derive(Debug, Clone, PartialEq)]
pub struct ExprType {
    pub ty: TypeInfo,
    pub lvalue: bool,
    /// The dynamic type is known to equal the static type
    pub exact: bool,
    /// Integer literal `0`, `NULL` or `nullptr`
    pub null_constant: bool,
}

/// Outcome of inferring the type of an argument expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Inferred {
    Known(ExprType),
    Dependent,
    Unknown,
}

impl TypeInfo {
    pub fn named(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            ..Self::default()
        }
    }

    pub fn pointer_to(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            pointer_depth: 1,
            ..Self::default()
        }
    }

    pub fn placeholder() -> Self {
        Self {
            base: "auto".to_string(),
            is_auto: true,
            ..Self::default()
        }
    }

    pub fn with_const(mut self) -> Self {
        self.is_const = true;
        self
    }

    pub fn is_void(&self) -> bool {
        self.base == "void"
            && self.pointer_depth == 0
            && self.reference == Reference::None
            && self.function_pointer.is_none()
    }

    pub fn is_pointer_like(&self) -> bool {
        self.pointer_depth > 0 || self.is_array
    }

    /// Effective pointer depth after array-to-pointer decay.
    pub fn decayed_depth(&self) -> u8 {
        self.pointer_depth + u8::from(self.is_array)
    }

    /// Printed spelling, e.g. `const char *` or `hello &`.
    pub fn spelling(&self) -> String {
        if let Some(signature) = &self.function_pointer {
            return signature.clone();
        }
        let mut out = String::new();
        if self.is_const {
            out.push_str("const ");
        }
        out.push_str(&self.base);
        if self.pointer_depth > 0 {
            out.push(' ');
            for _ in 0..self.pointer_depth {
                out.push('*');
            }
        }
        if self.is_array {
            out.push_str(" []");
        }
        match self.reference {
            Reference::None => {}
            Reference::LValue => out.push_str(" &"),
            Reference::RValue => out.push_str(" &&"),
        }
        out
    }

    /// Spelling used to match redeclarations: top-level const on by-value
    /// parameters is dropped and arrays decay to pointers.
    pub fn signature_key(&self) -> String {
        let mut key = self.clone();
        if key.is_array {
            key.is_array = false;
            key.pointer_depth += 1;
        }
        if key.pointer_depth == 0 && key.reference == Reference::None {
            key.is_const = false;
        }
        key.spelling()
    }

    pub fn category(&self) -> TypeCategory {
        if self.is_dependent {
            return TypeCategory::Dependent;
        }
        if self.function_pointer.is_some() {
            return TypeCategory::FunctionPointer;
        }
        if self.is_auto {
            return TypeCategory::Placeholder;
        }
        if self.decayed_depth() > 0 {
            return TypeCategory::Pointer;
        }
        if self.base == "std::nullptr_t" || self.base == "nullptr_t" {
            return TypeCategory::NullPointer;
        }
        if self.base == "void" {
            return TypeCategory::Void;
        }
        match arithmetic_rank(&self.base) {
            Some((kind, rank)) => TypeCategory::Arithmetic(kind, rank),
            None => TypeCategory::Named,
        }
    }

    /// Base name with template arguments removed, split at `::`.
    pub fn name_path(&self) -> Vec<String> {
        split_qualified(&strip_template_args(&self.base))
    }

    /// The type that remains after dereferencing one pointer level.
    pub fn dereferenced(&self) -> Option<TypeInfo> {
        if self.decayed_depth() == 0 {
            return None;
        }
        let mut inner = self.clone();
        if inner.is_array {
            inner.is_array = false;
        } else {
            inner.pointer_depth -= 1;
        }
        inner.reference = Reference::None;
        Some(inner)
    }

    /// The type of `&expr` for an expression of this type.
    pub fn address_of(&self) -> TypeInfo {
        let mut outer = self.clone();
        outer.reference = Reference::None;
        outer.pointer_depth += 1;
        outer
    }

    /// Mark the type dependent when its spelling mentions any of `params`.
    pub fn mark_dependent(&mut self, params: &[String]) {
        if params.is_empty() {
            return;
        }
        let mentions = identifier_tokens(&self.base)
            .any(|token| params.iter().any(|p| p == token))
            || self
                .function_pointer
                .as_deref()
                .map(|sig| identifier_tokens(sig).any(|t| params.iter().any(|p| p == t)))
                .unwrap_or(false);
        if mentions {
            self.is_dependent = true;
        }
    }
}

impl fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.spelling())
    }
}

impl ExprType {
    /// A prvalue (temporary or literal) of the given type.
    pub fn value(ty: TypeInfo) -> Self {
        Self {
            ty,
            lvalue: false,
            exact: true,
            null_constant: false,
        }
    }

    /// A named object of the given declared type.
    pub fn object(mut ty: TypeInfo) -> Self {
        let exact = ty.reference == Reference::None && ty.decayed_depth() == 0;
        ty.reference = Reference::None;
        Self {
            ty,
            lvalue: true,
            exact,
            null_constant: false,
        }
    }
}

/// Arithmetic kind and integer conversion rank of a builtin spelling.
pub fn arithmetic_rank(base: &str) -> Option<(ArithmeticKind, u8)> {
    use ArithmeticKind::*;
    let entry = match base {
        "bool" | "_Bool" => (Bool, 0),
        "char" | "signed char" | "unsigned char" | "char8_t" | "int8_t" | "uint8_t"
        | "std::int8_t" | "std::uint8_t" => (Character, 1),
        "wchar_t" | "char16_t" => (Character, 2),
        "char32_t" => (Character, 3),
        "short" | "unsigned short" | "int16_t" | "uint16_t" | "std::int16_t"
        | "std::uint16_t" => (Integer, 2),
        "int" | "unsigned int" | "int32_t" | "uint32_t" | "std::int32_t" | "std::uint32_t" => {
            (Integer, 3)
        }
        "long" | "unsigned long" | "size_t" | "std::size_t" | "ssize_t" | "ptrdiff_t"
        | "std::ptrdiff_t" | "intptr_t" | "uintptr_t" => (Integer, 4),
        "long long" | "unsigned long long" | "int64_t" | "uint64_t" | "std::int64_t"
        | "std::uint64_t" => (Integer, 5),
        "float" => (Floating, 1),
        "double" => (Floating, 2),
        "long double" => (Floating, 3),
        _ => return None,
    };
    Some(entry)
}

/// Rank the implicit conversion of `arg` to a parameter of type `param`.
/// `None` means the conversion is impossible.
pub fn conversion_rank(
    arg: &ExprType,
    param: &TypeInfo,
    env: &dyn TypeEnvironment,
) -> Option<ConversionRank> {
    use ConversionRank::*;

    if param.is_dependent || param.is_auto {
        return Some(Exact);
    }
    // A non-const lvalue reference cannot bind to a temporary.
    if param.reference == Reference::LValue && !param.is_const && !arg.lvalue {
        return None;
    }

    let arg_ty = &arg.ty;
    match (arg_ty.category(), param.category()) {
        (_, TypeCategory::FunctionPointer) => match arg_ty.category() {
            TypeCategory::FunctionPointer => Some(Exact),
            TypeCategory::NullPointer => Some(Conversion),
            _ if arg.null_constant => Some(Conversion),
            _ => None,
        },
        (TypeCategory::FunctionPointer, TypeCategory::Arithmetic(ArithmeticKind::Bool, _)) => {
            Some(Conversion)
        }
        (TypeCategory::FunctionPointer, _) => None,
        (TypeCategory::NullPointer, TypeCategory::Pointer) => Some(Conversion),
        (TypeCategory::NullPointer, TypeCategory::NullPointer) => Some(Exact),
        (TypeCategory::NullPointer, TypeCategory::Arithmetic(ArithmeticKind::Bool, _)) => {
            Some(Conversion)
        }
        (TypeCategory::NullPointer, _) => None,
        (TypeCategory::Arithmetic(..), TypeCategory::Pointer) if arg.null_constant => {
            Some(Conversion)
        }
        (TypeCategory::Pointer, TypeCategory::Pointer) => pointer_rank(arg_ty, param, env),
        (TypeCategory::Pointer, TypeCategory::Arithmetic(ArithmeticKind::Bool, _)) => {
            Some(Conversion)
        }
        (TypeCategory::Pointer, TypeCategory::Named) if env.is_class(&param.base) => {
            Some(UserDefined)
        }
        (TypeCategory::Pointer, _) | (_, TypeCategory::Pointer) => None,
        (TypeCategory::Arithmetic(from_kind, from_rank), TypeCategory::Arithmetic(to_kind, to_rank)) => {
            Some(arithmetic_conversion(
                &arg_ty.base,
                &param.base,
                (from_kind, from_rank),
                (to_kind, to_rank),
            ))
        }
        (TypeCategory::Named, TypeCategory::Named) => {
            if arg_ty.base == param.base {
                Some(Exact)
            } else if env.is_derived_from(&arg_ty.base, &param.base) {
                Some(Conversion)
            } else if env.is_enum(&arg_ty.base) || env.is_enum(&param.base) {
                None
            } else {
                Some(UserDefined)
            }
        }
        (TypeCategory::Named, TypeCategory::Arithmetic(kind, _)) => {
            if env.is_enum(&arg_ty.base) {
                match kind {
                    ArithmeticKind::Integer => Some(Promotion),
                    _ => Some(Conversion),
                }
            } else {
                Some(UserDefined)
            }
        }
        (TypeCategory::Arithmetic(..), TypeCategory::Named) => {
            if env.is_enum(&param.base) {
                None
            } else {
                Some(UserDefined)
            }
        }
        (TypeCategory::Void, _) | (_, TypeCategory::Void) => None,
        (TypeCategory::Dependent, _) | (TypeCategory::Placeholder, _) => Some(Exact),
        _ => Some(UserDefined),
    }
}

fn pointer_rank(arg: &TypeInfo, param: &TypeInfo, env: &dyn TypeEnvironment) -> Option<ConversionRank> {
    use ConversionRank::*;

    if arg.decayed_depth() != param.decayed_depth() {
        if param.base == "void" && param.decayed_depth() == 1 {
            return Some(Conversion);
        }
        return None;
    }
    // Dropping const from the pointee is never implicit.
    if arg.is_const && !param.is_const {
        return None;
    }
    if arg.base == param.base {
        return Some(Exact);
    }
    if param.base == "void" {
        return Some(Conversion);
    }
    if param.decayed_depth() == 1 && env.is_derived_from(&arg.base, &param.base) {
        return Some(Conversion);
    }
    None
}

fn arithmetic_conversion(
    from: &str,
    to: &str,
    (from_kind, from_rank): (ArithmeticKind, u8),
    (to_kind, to_rank): (ArithmeticKind, u8),
) -> ConversionRank {
    use ArithmeticKind::*;

    if from == to {
        return ConversionRank::Exact;
    }
    let promotes = match (from_kind, to_kind) {
        (Bool | Character, Integer) => to == "int",
        (Integer, Integer) => from_rank < 3 && to == "int",
        (Floating, Floating) => from == "float" && to == "double",
        _ => false,
    };
    if promotes && from_rank <= to_rank {
        ConversionRank::Promotion
    } else {
        ConversionRank::Conversion
    }
}

/// Remove template argument lists, `std::vector<int>` becomes `std::vector`.
pub fn strip_template_args(spelling: &str) -> String {
    let mut out = String::with_capacity(spelling.len());
    let mut depth = 0usize;
    for ch in spelling.chars() {
        match ch {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(ch),
            _ => {}
        }
    }
    out.trim().to_string()
}

/// Split a qualified name at top-level `::`.
pub fn split_qualified(name: &str) -> Vec<String> {
    name.split("::")
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

fn identifier_tokens(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|token| !token.is_empty())
}

/// Normalizes type spellings the way a compiler would print them.
pub struct TypeSpeller {
    whitespace: Regex,
    punctuation: Regex,
    comma: Regex,
}

impl TypeSpeller {
    pub fn new() -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern)
                .map_err(|e| CallscopeError::Frontend(format!("Invalid type pattern: {}", e)))
        };
        Ok(Self {
            whitespace: compile(r"\s+")?,
            punctuation: compile(r"\s*(::|<|>|\(|\))\s*")?,
            comma: compile(r"\s*,\s*")?,
        })
    }

    /// Collapse whitespace and canonicalize builtin integer spellings.
    pub fn normalize(&self, text: &str) -> String {
        let collapsed = self.whitespace.replace_all(text.trim(), " ");
        let tight = self.punctuation.replace_all(&collapsed, "$1");
        let spaced = self.comma.replace_all(&tight, ", ");
        canonical_builtin(&spaced).unwrap_or_else(|| spaced.into_owned())
    }
}

fn canonical_builtin(spelling: &str) -> Option<String> {
    let canonical = match spelling {
        "unsigned" | "unsigned int" => "unsigned int",
        "signed" | "signed int" => "int",
        "short int" | "signed short" | "signed short int" | "short" => "short",
        "unsigned short int" | "unsigned short" => "unsigned short",
        "long int" | "signed long" | "signed long int" | "long" => "long",
        "unsigned long int" | "unsigned long" => "unsigned long",
        "long long int" | "signed long long" | "long long" => "long long",
        "unsigned long long int" | "unsigned long long" => "unsigned long long",
        "long double" => "long double",
        _ => return None,
    };
    Some(canonical.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoClasses;

    impl TypeEnvironment for NoClasses {
        fn is_enum(&self, _base: &str) -> bool {
            false
        }
        fn is_class(&self, base: &str) -> bool {
            arithmetic_rank(base).is_none()
        }
        fn is_derived_from(&self, derived: &str, base: &str) -> bool {
            derived == "Derived" && base == "Base"
        }
    }

    fn literal(base: &str) -> ExprType {
        ExprType::value(TypeInfo::named(base))
    }

    #[test]
    fn test_spelling() {
        let mut ty = TypeInfo::pointer_to("char").with_const();
        assert_eq!(ty.spelling(), "const char *");
        ty.pointer_depth = 0;
        ty.reference = Reference::LValue;
        assert_eq!(ty.spelling(), "const char &");
        assert_eq!(TypeInfo::named("int").spelling(), "int");
    }

    #[test]
    fn test_signature_key_ignores_top_level_const() {
        let a = TypeInfo::named("int").with_const();
        let b = TypeInfo::named("int");
        assert_eq!(a.signature_key(), b.signature_key());

        let c = TypeInfo::pointer_to("int").with_const();
        let d = TypeInfo::pointer_to("int");
        assert_ne!(c.signature_key(), d.signature_key());
    }

    #[test]
    fn test_arithmetic_ranks() {
        let env = NoClasses;
        let int_param = TypeInfo::named("int");
        let double_param = TypeInfo::named("double");

        assert_eq!(conversion_rank(&literal("int"), &int_param, &env), Some(ConversionRank::Exact));
        assert_eq!(conversion_rank(&literal("char"), &int_param, &env), Some(ConversionRank::Promotion));
        assert_eq!(conversion_rank(&literal("float"), &double_param, &env), Some(ConversionRank::Promotion));
        assert_eq!(conversion_rank(&literal("int"), &double_param, &env), Some(ConversionRank::Conversion));
    }

    #[test]
    fn test_pointer_ranks() {
        let env = NoClasses;
        let text = ExprType::value(TypeInfo::pointer_to("char").with_const());

        assert_eq!(
            conversion_rank(&text, &TypeInfo::pointer_to("char").with_const(), &env),
            Some(ConversionRank::Exact)
        );
        assert_eq!(conversion_rank(&text, &TypeInfo::pointer_to("char"), &env), None);
        assert_eq!(conversion_rank(&text, &TypeInfo::named("int"), &env), None);
        assert_eq!(
            conversion_rank(&text, &TypeInfo::named("std::string"), &env),
            Some(ConversionRank::UserDefined)
        );

        let derived = ExprType::value(TypeInfo::pointer_to("Derived"));
        assert_eq!(
            conversion_rank(&derived, &TypeInfo::pointer_to("Base"), &env),
            Some(ConversionRank::Conversion)
        );
    }

    #[test]
    fn test_temporary_does_not_bind_to_mutable_reference() {
        let env = NoClasses;
        let mut param = TypeInfo::named("int");
        param.reference = Reference::LValue;
        assert_eq!(conversion_rank(&literal("int"), &param, &env), None);

        param.is_const = true;
        assert_eq!(conversion_rank(&literal("int"), &param, &env), Some(ConversionRank::Exact));
    }

    #[test]
    fn test_null_constant_converts_to_pointer() {
        let env = NoClasses;
        let mut zero = literal("int");
        zero.null_constant = true;
        assert_eq!(
            conversion_rank(&zero, &TypeInfo::pointer_to("int"), &env),
            Some(ConversionRank::Conversion)
        );
    }

    #[test]
    fn test_mark_dependent() {
        let params = vec!["T".to_string()];
        let mut ty = TypeInfo::named("vector<T>");
        ty.mark_dependent(&params);
        assert!(ty.is_dependent);

        let mut other = TypeInfo::named("Tree");
        other.mark_dependent(&params);
        assert!(!other.is_dependent);
    }

    #[test]
    fn test_normalize_spelling() {
        let speller = TypeSpeller::new().unwrap();
        assert_eq!(speller.normalize("unsigned   long int"), "unsigned long");
        assert_eq!(speller.normalize("std :: map< int ,  std::string >"), "std::map<int, std::string>");
        assert_eq!(speller.normalize("unsigned"), "unsigned int");
    }

    #[test]
    fn test_strip_template_args() {
        assert_eq!(strip_template_args("std::vector<std::pair<int, int>>"), "std::vector");
        assert_eq!(split_qualified("::ns::Widget"), vec!["ns", "Widget"]);
    }
}
