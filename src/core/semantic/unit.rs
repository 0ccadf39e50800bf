use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tree_sitter::{Node, Tree};

use crate::core::languages::SourceLanguage;
use super::entity::{DeclId, FileId, FunctionEntity, FunctionIndex, FunctionKind};
use super::preprocessor::Preprocessor;
use super::scope::ScopeArena;

/// One file of a unit: the main buffer or a resolved include.
pub struct SourceFile {
    pub path: PathBuf,
    pub text: String,
    /// `None` when the parser gave up entirely
    pub tree: Option<Tree>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// A front-end or semantic problem found while analyzing a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub file: String,
    pub line: usize,
    pub column: usize,
}

impl Diagnostic {
    pub fn at(severity: Severity, message: impl Into<String>, file: &Path, node: Node<'_>) -> Self {
        let start = node.start_position();
        Self {
            severity,
            message: message.into(),
            file: file.display().to_string(),
            line: start.row + 1,
            column: start.column + 1,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: {}: {}",
            self.file, self.line, self.column, self.severity, self.message
        )
    }
}

/// Key of a syntax node inside a unit.
pub(crate) type NodeKey = (FileId, usize);

/// The result of analyzing one source buffer: its syntax trees, the
/// functions it declares and the direct callee of every resolved call.
///
/// A unit never fails to exist. Broken input yields a unit with
/// diagnostics and whatever could be recovered.
pub struct ParsedUnit {
    pub(crate) language: SourceLanguage,
    pub(crate) files: Vec<SourceFile>,
    pub(crate) scopes: ScopeArena,
    pub(crate) functions: Vec<FunctionEntity>,
    pub(crate) definitions: HashMap<NodeKey, FunctionIndex>,
    pub(crate) resolutions: HashMap<NodeKey, FunctionIndex>,
    pub(crate) diagnostics: Vec<Diagnostic>,
    pub(crate) preprocessor: Preprocessor,
    pub(crate) next_id: u32,
}

impl ParsedUnit {
    pub(crate) fn new(language: SourceLanguage) -> Self {
        Self {
            language,
            files: Vec::new(),
            scopes: ScopeArena::new(),
            functions: Vec::new(),
            definitions: HashMap::new(),
            resolutions: HashMap::new(),
            diagnostics: Vec::new(),
            preprocessor: Preprocessor::new(),
            next_id: 1,
        }
    }

    pub(crate) fn next_decl_id(&mut self) -> DeclId {
        let id = DeclId(self.next_id);
        self.next_id += 1;
        id
    }

    pub(crate) fn push_diagnostic(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn language(&self) -> SourceLanguage {
        self.language
    }

    pub fn files(&self) -> &[SourceFile] {
        &self.files
    }

    pub fn file_path(&self, file: FileId) -> String {
        self.files
            .get(file)
            .map(|f| f.path.display().to_string())
            .unwrap_or_default()
    }

    pub fn functions(&self) -> &[FunctionEntity] {
        &self.functions
    }

    pub fn function(&self, index: FunctionIndex) -> &FunctionEntity {
        &self.functions[index.0]
    }

    pub fn function_by_id(&self, id: DeclId) -> Option<FunctionIndex> {
        self.functions
            .iter()
            .position(|f| f.id == id)
            .map(FunctionIndex)
    }

    pub fn scopes(&self) -> &ScopeArena {
        &self.scopes
    }

    /// The global `main`, if the unit declares one.
    pub fn entry_point(&self) -> Option<FunctionIndex> {
        self.functions
            .iter()
            .position(|f| f.is_entry_point)
            .map(FunctionIndex)
    }

    /// Function whose definition is the given `function_definition` node.
    pub fn definition_at(&self, file: FileId, node: Node<'_>) -> Option<FunctionIndex> {
        self.definitions.get(&(file, node.id())).copied()
    }

    /// Statically known callee of a `call_expression` node. Calls through
    /// pointers, virtual dispatch and unresolved template-dependent calls
    /// have none.
    pub fn direct_callee(&self, file: FileId, node: Node<'_>) -> Option<FunctionIndex> {
        self.resolutions.get(&(file, node.id())).copied()
    }

    pub fn resolved_call_count(&self) -> usize {
        self.resolutions.len()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity == Severity::Error)
    }

    /// Structural dump of a function's declaration subtree.
    pub fn structural_dump(&self, function: &FunctionEntity) -> String {
        let kind = match function.kind {
            FunctionKind::Free => "FunctionDecl",
            FunctionKind::Method => "CXXMethodDecl",
            FunctionKind::Constructor => "CXXConstructorDecl",
            FunctionKind::Destructor => "CXXDestructorDecl",
        };
        let header = format!(
            "{} {} <{}:{}:{}>",
            kind,
            function.qualified_name,
            self.file_path(function.position.file),
            function.position.line,
            function.position.column
        );

        let range = function.range;
        let subtree = self
            .files
            .get(range.file)
            .and_then(|file| file.tree.as_ref())
            .and_then(|tree| {
                let mut node = tree.root_node().descendant_for_byte_range(range.start, range.end)?;
                while node.start_byte() > range.start || node.end_byte() < range.end {
                    node = node.parent()?;
                }
                Some(node.to_sexp())
            });

        match subtree {
            Some(sexp) => format!("{}\n{}", header, sexp),
            None => header,
        }
    }
}

impl fmt::Debug for ParsedUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParsedUnit")
            .field("language", &self.language)
            .field("files", &self.files.len())
            .field("functions", &self.functions.len())
            .field("resolved_calls", &self.resolutions.len())
            .field("diagnostics", &self.diagnostics.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decl_ids_are_sequential() {
        let mut unit = ParsedUnit::new(SourceLanguage::Cpp);
        assert_eq!(unit.next_decl_id(), DeclId(1));
        assert_eq!(unit.next_decl_id(), DeclId(2));
    }

    #[test]
    fn test_diagnostic_display() {
        let diagnostic = Diagnostic {
            severity: Severity::Error,
            message: "use of undeclared identifier 'g'".to_string(),
            file: "main.cpp".to_string(),
            line: 3,
            column: 5,
        };
        assert_eq!(
            diagnostic.to_string(),
            "main.cpp:3:5: error: use of undeclared identifier 'g'"
        );
    }
}
