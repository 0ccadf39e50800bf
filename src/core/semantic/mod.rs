//! Semantic model of a C/C++ translation unit
//!
//! Declarations are collected from every syntax tree first, then function
//! bodies are walked and each call expression is bound to its direct callee.
//! Only branches of `#if` chains known to be compiled take part.

pub(crate) mod collector;
pub(crate) mod declarator;
mod entity;
mod overload;
pub(crate) mod preprocessor;
pub(crate) mod resolver;
mod scope;
mod types;
mod unit;

pub use entity::{DeclId, FileId, FunctionEntity, FunctionIndex, FunctionKind, ParamEntity, Position, SyntaxRange};
pub use scope::{Lookup, Scope, ScopeArena, ScopeId, ScopeKind, TypeTarget};
pub use types::{Reference, TypeInfo, TypeSpeller};
pub use unit::{Diagnostic, ParsedUnit, Severity, SourceFile};
