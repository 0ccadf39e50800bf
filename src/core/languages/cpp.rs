use tree_sitter::{Parser, Tree};

use crate::error::{CallscopeError, Result};
use super::{LanguageFrontend, SourceLanguage};

/// C/C++ front end using Tree-sitter
pub struct CppFrontend {
    parser: Parser,
    language: SourceLanguage,
}

impl CppFrontend {
    pub fn new(language: SourceLanguage) -> Result<Self> {
        let mut parser = Parser::new();
        let cpp_language = tree_sitter_cpp::language();
        parser.set_language(&cpp_language)
            .map_err(|e| CallscopeError::Frontend(format!("Failed to set C++ language: {}", e)))?;

        Ok(Self { parser, language })
    }
}

impl LanguageFrontend for CppFrontend {
    fn parse(&mut self, content: &str) -> Option<Tree> {
        self.parser.parse(content, None)
    }

    fn file_extensions(&self) -> &[&str] {
        match self.language {
            SourceLanguage::C => &["c", "h"],
            SourceLanguage::Cpp => &["cpp", "cc", "cxx", "hpp", "hh", "hxx"],
        }
    }

    fn language_name(&self) -> &str {
        self.language.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_function_definition() {
        let mut frontend = CppFrontend::new(SourceLanguage::Cpp).unwrap();
        let tree = frontend.parse("int main() { return 0; }").unwrap();
        let root = tree.root_node();
        assert_eq!(root.kind(), "translation_unit");
        assert_eq!(root.named_child(0).unwrap().kind(), "function_definition");
    }

    #[test]
    fn test_broken_source_still_yields_tree() {
        let mut frontend = CppFrontend::new(SourceLanguage::Cpp).unwrap();
        let tree = frontend.parse("int main( { return").unwrap();
        assert!(tree.root_node().has_error());
    }
}
