// Source analysis
pub mod analyzer;
pub mod languages;
pub mod semantic;

// Declaration snapshots and the call graph built from them
pub mod call_graph;
pub mod declaration;

// Interactive view for a renderer
pub mod presentation;

mod differ;
mod engine;

pub use analyzer::SourceAnalyzer;
pub use call_graph::{CallEdge, CallGraph, CallGraphExtractor, CallGraphStats, GraphFormat, NodeIndex};
pub use declaration::{FunctionDeclaration, ParameterDeclaration, SourceLocation};
pub use differ::SourceDiffer;
pub use presentation::{FunctionFilter, PresentationGraph, Vec2, Viewport};
pub use semantic::{DeclId, Diagnostic, ParsedUnit, Severity};

// Export the main engine
pub use engine::{Engine, Snapshot};
