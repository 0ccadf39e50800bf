use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::core::declaration::FunctionDeclaration;
use crate::core::semantic::DeclId;

/// Position of a node in its `CallGraph`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeIndex(pub usize);

impl fmt::Display for NodeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One resolved call site, from caller to callee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallEdge {
    pub caller: NodeIndex,
    pub callee: NodeIndex,
}

impl CallEdge {
    pub fn is_self_loop(&self) -> bool {
        self.caller == self.callee
    }
}

/// Function declarations and the calls between them.
///
/// Nodes are kept in discovery order, except that the program entry point
/// (when it is a node) sits at index 0. Edges always refer to nodes of the
/// same graph; parallel edges and self-loops are kept.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CallGraph {
    nodes: Vec<FunctionDeclaration>,
    edges: Vec<CallEdge>,
    #[serde(skip)]
    by_id: HashMap<DeclId, NodeIndex>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallGraphStats {
    pub total_functions: usize,
    pub total_calls: usize,
    pub self_loops: usize,
    pub entry_point: Option<String>,
    pub max_in_degree: usize,
    pub max_out_degree: usize,
}

impl CallGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nodes(&self) -> &[FunctionDeclaration] {
        &self.nodes
    }

    pub fn edges(&self) -> &[CallEdge] {
        &self.edges
    }

    pub fn node(&self, index: NodeIndex) -> Option<&FunctionDeclaration> {
        self.nodes.get(index.0)
    }

    pub fn node_index(&self, id: DeclId) -> Option<NodeIndex> {
        self.by_id.get(&id).copied()
    }

    /// Declaration with the given id, if it is a node of this graph.
    pub fn find_node_with_id(&self, id: DeclId) -> Option<&FunctionDeclaration> {
        self.node_index(id).and_then(|index| self.node(index))
    }

    /// Callees of a node, once per call site.
    pub fn callees_of(&self, index: NodeIndex) -> Vec<NodeIndex> {
        self.edges
            .iter()
            .filter(|edge| edge.caller == index)
            .map(|edge| edge.callee)
            .collect()
    }

    /// Callers of a node, once per call site.
    pub fn callers_of(&self, index: NodeIndex) -> Vec<NodeIndex> {
        self.edges
            .iter()
            .filter(|edge| edge.callee == index)
            .map(|edge| edge.caller)
            .collect()
    }

    pub fn entry_point(&self) -> Option<NodeIndex> {
        self.nodes
            .iter()
            .position(|node| node.is_program_entry_point())
            .map(NodeIndex)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn stats(&self) -> CallGraphStats {
        let mut in_degree = vec![0usize; self.nodes.len()];
        let mut out_degree = vec![0usize; self.nodes.len()];
        for edge in &self.edges {
            out_degree[edge.caller.0] += 1;
            in_degree[edge.callee.0] += 1;
        }

        CallGraphStats {
            total_functions: self.nodes.len(),
            total_calls: self.edges.len(),
            self_loops: self.edges.iter().filter(|edge| edge.is_self_loop()).count(),
            entry_point: self
                .entry_point()
                .and_then(|index| self.node(index))
                .map(|node| node.qualified_name().to_string()),
            max_in_degree: in_degree.into_iter().max().unwrap_or(0),
            max_out_degree: out_degree.into_iter().max().unwrap_or(0),
        }
    }

    /// Node for a declaration, created on first sight.
    pub(crate) fn ensure_node(
        &mut self,
        id: DeclId,
        declaration: impl FnOnce() -> FunctionDeclaration,
    ) -> NodeIndex {
        if let Some(index) = self.by_id.get(&id) {
            return *index;
        }
        let index = NodeIndex(self.nodes.len());
        self.nodes.push(declaration());
        self.by_id.insert(id, index);
        index
    }

    pub(crate) fn add_edge(&mut self, caller: NodeIndex, callee: NodeIndex) {
        debug_assert!(caller.0 < self.nodes.len() && callee.0 < self.nodes.len());
        self.edges.push(CallEdge { caller, callee });
    }

    /// Exchange two nodes, remapping every edge that touches them.
    pub(crate) fn swap_nodes(&mut self, a: NodeIndex, b: NodeIndex) {
        if a == b {
            return;
        }
        self.nodes.swap(a.0, b.0);
        self.by_id.insert(self.nodes[a.0].id(), a);
        self.by_id.insert(self.nodes[b.0].id(), b);

        let remap = |index: NodeIndex| {
            if index == a {
                b
            } else if index == b {
                a
            } else {
                index
            }
        };
        for edge in &mut self.edges {
            edge.caller = remap(edge.caller);
            edge.callee = remap(edge.callee);
        }
    }
}

impl fmt::Display for CallGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--NODES--")?;
        for node in &self.nodes {
            writeln!(f, "Node:")?;
            writeln!(f, "{}", node)?;
        }
        writeln!(f)?;
        writeln!(f, "--EDGES--")?;
        for edge in &self.edges {
            writeln!(f, "Edge:")?;
            let caller = &self.nodes[edge.caller.0];
            let callee = &self.nodes[edge.callee.0];
            writeln!(f, "caller {} {}", caller.id(), caller.qualified_name())?;
            writeln!(f, "callee {} {}", callee.id(), callee.qualified_name())?;
            writeln!(f)?;
        }
        Ok(())
    }
}
