use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

use crate::error::{CallscopeError, Result};
use super::call_graph::CallGraph;

/// Output formats for a call graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphFormat {
    Text,
    Dot,
    Json,
}

impl GraphFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            GraphFormat::Text => "txt",
            GraphFormat::Dot => "dot",
            GraphFormat::Json => "json",
        }
    }
}

impl FromStr for GraphFormat {
    type Err = CallscopeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Ok(GraphFormat::Text),
            "dot" | "graphviz" => Ok(GraphFormat::Dot),
            "json" => Ok(GraphFormat::Json),
            other => Err(CallscopeError::Export(format!("Unknown output format: {}", other))),
        }
    }
}

/// Render a call graph in the given format.
pub fn render(graph: &CallGraph, format: GraphFormat) -> Result<String> {
    match format {
        GraphFormat::Text => Ok(graph.to_string()),
        GraphFormat::Dot => Ok(render_dot(graph)),
        GraphFormat::Json => Ok(serde_json::to_string_pretty(graph)?),
    }
}

/// Render a call graph and write it to a file.
pub fn export(graph: &CallGraph, format: GraphFormat, path: &Path) -> Result<()> {
    let rendered = render(graph, format)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, rendered)?;
    info!("Wrote {:?} call graph to {}", format, path.display());
    Ok(())
}

fn render_dot(graph: &CallGraph) -> String {
    let mut out = String::from("digraph callgraph {\n    node [shape=box];\n");
    for (index, node) in graph.nodes().iter().enumerate() {
        let shape = if node.is_program_entry_point() { ", peripheries=2" } else { "" };
        let _ = writeln!(
            out,
            "    n{} [label=\"{}\"{}];",
            index,
            escape(&node.signature()),
            shape
        );
    }
    for edge in graph.edges() {
        let _ = writeln!(out, "    n{} -> n{};", edge.caller, edge.callee);
    }
    out.push_str("}\n");
    out
}

fn escape(label: &str) -> String {
    label.replace('\\', "\\\\").replace('"', "\\\"")
}
