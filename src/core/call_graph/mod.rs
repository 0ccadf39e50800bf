//! Call-graph extraction and the read-only graph model
//!
//! The extractor walks every syntax tree of a `ParsedUnit` and records one
//! edge per call expression the unit could bind to a single declaration.

mod call_graph;
mod exporter;
mod extractor;

pub use call_graph::{CallEdge, CallGraph, CallGraphStats, NodeIndex};
pub use exporter::{export, render, GraphFormat};
pub use extractor::CallGraphExtractor;
