//! Language front ends for the source analyzer
//!
//! A front end turns source text into a concrete syntax tree. Semantic
//! analysis on top of the tree lives in `core::semantic`.

mod cpp;

pub use cpp::CppFrontend;

use std::fmt;
use std::path::Path;
use serde::{Deserialize, Serialize};
use tree_sitter::Tree;

use crate::error::Result;

/// Source languages understood by the analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SourceLanguage {
    C,
    #[default]
    Cpp,
}

impl SourceLanguage {
    /// Infer language from file extension.
    pub fn from_extension(ext: &str) -> Option<SourceLanguage> {
        match ext.to_lowercase().as_str() {
            "c" | "h" => Some(SourceLanguage::C),
            "cc" | "cpp" | "cxx" | "c++" | "hpp" | "hh" | "hxx" | "ipp" | "tpp" => {
                Some(SourceLanguage::Cpp)
            }
            _ => None,
        }
    }

    /// Infer language from a file name, defaulting to C++.
    pub fn from_file_name(name: &str) -> SourceLanguage {
        Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
            .unwrap_or_default()
    }

    pub fn name(&self) -> &'static str {
        match self {
            SourceLanguage::C => "C",
            SourceLanguage::Cpp => "C++",
        }
    }
}

impl fmt::Display for SourceLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Trait that all language front ends must implement
pub trait LanguageFrontend {
    /// Parse source text into a syntax tree. `None` means the parser gave up.
    fn parse(&mut self, content: &str) -> Option<Tree>;

    /// Get the file extensions this front end handles
    fn file_extensions(&self) -> &[&str];

    /// Get the language name
    fn language_name(&self) -> &str;
}

/// Create the front end for a language.
pub fn frontend_for(language: SourceLanguage) -> Result<Box<dyn LanguageFrontend>> {
    // The C++ grammar is a superset of the C constructs the analyzer needs.
    let frontend = CppFrontend::new(language)?;
    Ok(Box::new(frontend))
}
