#![allow(dead_code)]

use std::sync::Arc;

use callscope::config::{AnalysisConfig, NodeInclusion, PresentationConfig};
use callscope::core::{CallGraph, CallGraphExtractor, NodeIndex, PresentationGraph, SourceAnalyzer};

pub fn call_graph(source: &str) -> CallGraph {
    let mut analyzer = SourceAnalyzer::new(&AnalysisConfig::default()).unwrap();
    let unit = analyzer.analyze(source, &[]);
    CallGraphExtractor::new(NodeInclusion::CallParticipants).extract(&unit)
}

pub fn presentation(source: &str) -> PresentationGraph {
    PresentationGraph::build(Arc::new(call_graph(source)), PresentationConfig::default())
}

pub fn index_of(graph: &CallGraph, name: &str) -> NodeIndex {
    graph
        .nodes()
        .iter()
        .position(|decl| decl.qualified_name() == name)
        .map(NodeIndex)
        .unwrap_or_else(|| panic!("no node named {}", name))
}

/// Edges as sorted (caller signature, callee signature) pairs.
pub fn edge_signatures(graph: &CallGraph) -> Vec<(String, String)> {
    let mut edges: Vec<(String, String)> = graph
        .edges()
        .iter()
        .map(|edge| {
            (
                graph.node(edge.caller).unwrap().signature(),
                graph.node(edge.callee).unwrap().signature(),
            )
        })
        .collect();
    edges.sort();
    edges
}

pub fn assert_no_dangling_edges(graph: &CallGraph) {
    for edge in graph.edges() {
        assert!(graph.node(edge.caller).is_some(), "dangling caller {}", edge.caller);
        assert!(graph.node(edge.callee).is_some(), "dangling callee {}", edge.callee);
    }
}
