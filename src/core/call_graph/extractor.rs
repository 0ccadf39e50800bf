use tracing::{debug, info};
use tree_sitter::Node;

use crate::config::NodeInclusion;
use crate::core::declaration::FunctionDeclaration;
use crate::core::semantic::{FileId, FunctionIndex, ParsedUnit};
use super::call_graph::{CallGraph, NodeIndex};

/// Builds a `CallGraph` from the resolved calls of a `ParsedUnit`.
pub struct CallGraphExtractor {
    inclusion: NodeInclusion,
}

impl CallGraphExtractor {
    pub fn new(inclusion: NodeInclusion) -> Self {
        Self { inclusion }
    }

    pub fn extract(&self, unit: &ParsedUnit) -> CallGraph {
        let mut graph = CallGraph::new();

        for (file, source) in unit.files().iter().enumerate() {
            if let Some(tree) = source.tree.as_ref() {
                self.visit(unit, file, tree.root_node(), &mut graph);
            }
        }
        debug!(
            "Extracted {} call participants and {} edges",
            graph.nodes().len(),
            graph.edges().len()
        );

        if self.inclusion == NodeInclusion::AllFunctions {
            for (position, function) in unit.functions().iter().enumerate() {
                if function.is_defined {
                    node_for(unit, FunctionIndex(position), &mut graph);
                }
            }
        }

        if let Some(entry) = graph.entry_point() {
            graph.swap_nodes(NodeIndex(0), entry);
        }

        let stats = graph.stats();
        info!(
            "Call graph: {} functions, {} calls, {} self-loops",
            stats.total_functions, stats.total_calls, stats.self_loops
        );
        graph
    }

    /// Pre-order walk tracking the innermost enclosing function definition.
    /// Lambdas are not definitions, so their calls belong to the function
    /// around them.
    fn visit(&self, unit: &ParsedUnit, file: FileId, root: Node<'_>, graph: &mut CallGraph) {
        let mut stack: Vec<(Node<'_>, Option<FunctionIndex>)> = vec![(root, None)];
        while let Some((node, enclosing)) = stack.pop() {
            let enclosing = match node.kind() {
                "function_definition" => unit.definition_at(file, node).or(enclosing),
                _ => enclosing,
            };

            if node.kind() == "call_expression" {
                if let (Some(caller), Some(callee)) = (enclosing, unit.direct_callee(file, node)) {
                    let caller = node_for(unit, caller, graph);
                    let callee = node_for(unit, callee, graph);
                    graph.add_edge(caller, callee);
                }
            }

            let mut cursor = node.walk();
            let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
            stack.extend(children.into_iter().rev().map(|child| (child, enclosing)));
        }
    }
}

impl Default for CallGraphExtractor {
    fn default() -> Self {
        Self::new(NodeInclusion::CallParticipants)
    }
}

fn node_for(unit: &ParsedUnit, index: FunctionIndex, graph: &mut CallGraph) -> NodeIndex {
    let function = unit.function(index);
    graph.ensure_node(function.id, || FunctionDeclaration::from_entity(unit, function))
}
