use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, trace};

use crate::config::PresentationConfig;
use crate::core::call_graph::{CallEdge, CallGraph, NodeIndex};
use crate::core::declaration::FunctionDeclaration;
use crate::core::semantic::DeclId;
use super::layout::{ScrollDirection, Vec2, ViewState, Viewport};

/// Visibility and layout state of one call-graph node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PresentationNode {
    index: NodeIndex,
    depth: Option<usize>,
    expanded: bool,
    active_parents: usize,
    display_name: String,
    position: Vec2,
}

impl PresentationNode {
    fn new(index: NodeIndex) -> Self {
        Self {
            index,
            depth: None,
            expanded: false,
            active_parents: 0,
            display_name: String::new(),
            position: Vec2::ZERO,
        }
    }

    pub fn index(&self) -> NodeIndex {
        self.index
    }

    /// Hops from the root; `None` when the root cannot reach the node.
    pub fn depth(&self) -> Option<usize> {
        self.depth
    }

    pub fn is_expanded(&self) -> bool {
        self.expanded
    }

    pub fn active_parents(&self) -> usize {
        self.active_parents
    }

    pub fn is_visible(&self) -> bool {
        self.active_parents > 0 && self.depth.is_some()
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Top-left corner from the last `layout`, without scroll.
    pub fn position(&self) -> Vec2 {
        self.position
    }
}

/// Everything a tooltip shows for a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeDetails {
    pub name: String,
    pub qualified_name: String,
    pub id: DeclId,
    pub return_type: String,
    /// `(type, name)` pairs in declaration order
    pub parameters: Vec<(String, String)>,
}

/// Interactive view over a `CallGraph`.
///
/// Node `i` here is node `i` of the call graph. A node is visible while at
/// least one expanded neighbour reveals it; the root keeps one implicit
/// reveal of its own. Every edge counts once, so a caller with two call
/// sites to the same callee reveals it twice.
pub struct PresentationGraph {
    call_graph: Arc<CallGraph>,
    config: PresentationConfig,
    nodes: Vec<PresentationNode>,
    /// Callees per node, one entry per edge
    neighbors: Vec<Vec<NodeIndex>>,
    root: Option<NodeIndex>,
    order: Vec<NodeIndex>,
    view: ViewState,
    last_clicked: Option<NodeIndex>,
    hovered: Option<NodeIndex>,
}

impl PresentationGraph {
    pub fn build(call_graph: Arc<CallGraph>, config: PresentationConfig) -> Self {
        let count = call_graph.nodes().len();
        let mut neighbors = vec![Vec::new(); count];
        for edge in call_graph.edges() {
            neighbors[edge.caller.0].push(edge.callee);
        }
        let root = call_graph
            .entry_point()
            .or_else(|| (count > 0).then_some(NodeIndex(0)));

        let mut graph = Self {
            nodes: (0..count).map(|i| PresentationNode::new(NodeIndex(i))).collect(),
            view: ViewState::new(&config),
            call_graph,
            config,
            neighbors,
            root,
            order: Vec::new(),
            last_clicked: None,
            hovered: None,
        };
        graph.initialize();
        graph
    }

    /// Reset visibility to "root only" and recompute depths and ordering.
    fn initialize(&mut self) {
        let length = self.config.display_name_length;
        for node in &mut self.nodes {
            node.active_parents = 0;
            node.expanded = false;
            node.depth = None;
            node.display_name = self
                .call_graph
                .node(node.index)
                .map(|decl| decl.name().chars().take(length).collect())
                .unwrap_or_default();
        }
        if let Some(root) = self.root {
            self.nodes[root.0].active_parents = 1;
            self.calculate_depth(root);
        }
        self.refresh_order();
        debug!(
            "Presentation initialized: {} nodes, root {:?}",
            self.nodes.len(),
            self.root_declaration().map(|d| d.qualified_name())
        );
    }

    /// Breadth-first depth from the root along caller to callee edges.
    fn calculate_depth(&mut self, root: NodeIndex) {
        let mut visited: HashSet<DeclId> = HashSet::new();
        let mut queue = VecDeque::from([(root, 0usize)]);
        while let Some((index, depth)) = queue.pop_front() {
            let Some(decl) = self.call_graph.node(index) else {
                continue;
            };
            if !visited.insert(decl.id()) {
                continue;
            }
            self.nodes[index.0].depth = Some(depth);
            for neighbor in &self.neighbors[index.0] {
                queue.push_back((*neighbor, depth + 1));
            }
        }
    }

    fn refresh_order(&mut self) {
        let mut order: Vec<NodeIndex> = (0..self.nodes.len()).map(NodeIndex).collect();
        order.sort_by(|a, b| self.nodes[b.0].active_parents.cmp(&self.nodes[a.0].active_parents));
        self.order = order;
    }

    pub fn call_graph(&self) -> &Arc<CallGraph> {
        &self.call_graph
    }

    pub fn root(&self) -> Option<NodeIndex> {
        self.root
    }

    pub fn root_declaration(&self) -> Option<&FunctionDeclaration> {
        self.root.and_then(|root| self.call_graph.node(root))
    }

    /// Re-root the view on the node for `id`. Unknown ids change nothing.
    pub fn pin_root(&mut self, id: DeclId) -> bool {
        match self.call_graph.node_index(id) {
            Some(index) => {
                self.root = Some(index);
                self.initialize();
                true
            }
            None => false,
        }
    }

    /// Re-root on the node whose signature matches.
    pub fn pin_root_by_signature(&mut self, signature: &str) -> bool {
        let found = self
            .call_graph
            .nodes()
            .iter()
            .find(|decl| decl.signature() == signature)
            .map(|decl| decl.id());
        match found {
            Some(id) => self.pin_root(id),
            None => false,
        }
    }

    pub fn nodes(&self) -> &[PresentationNode] {
        &self.nodes
    }

    pub fn node(&self, index: NodeIndex) -> Option<&PresentationNode> {
        self.nodes.get(index.0)
    }

    pub fn depth(&self, index: NodeIndex) -> Option<usize> {
        self.node(index).and_then(|node| node.depth)
    }

    pub fn is_visible(&self, index: NodeIndex) -> bool {
        self.node(index).map(|node| node.is_visible()).unwrap_or(false)
    }

    /// Node indices by descending reference count as of the last
    /// (re)initialization.
    pub fn display_order(&self) -> &[NodeIndex] {
        &self.order
    }

    pub fn visible_nodes(&self) -> Vec<NodeIndex> {
        self.order
            .iter()
            .copied()
            .filter(|index| self.is_visible(*index))
            .collect()
    }

    /// Edges drawn right now: both ends visible and the caller expanded.
    pub fn visible_edges(&self) -> Vec<CallEdge> {
        self.call_graph
            .edges()
            .iter()
            .copied()
            .filter(|edge| {
                self.nodes[edge.caller.0].expanded
                    && self.is_visible(edge.caller)
                    && self.is_visible(edge.callee)
            })
            .collect()
    }

    pub fn details(&self, index: NodeIndex) -> Option<NodeDetails> {
        let decl = self.call_graph.node(index)?;
        Some(NodeDetails {
            name: decl.name().to_string(),
            qualified_name: decl.qualified_name().to_string(),
            id: decl.id(),
            return_type: decl.return_type().to_string(),
            parameters: decl
                .parameters()
                .iter()
                .map(|p| (p.type_name().to_string(), p.name().to_string()))
                .collect(),
        })
    }

    /// Reveal every callee of a node, once per edge.
    pub fn expand(&mut self, index: NodeIndex) {
        let Some(node) = self.nodes.get_mut(index.0) else {
            return;
        };
        if node.expanded {
            return;
        }
        node.expanded = true;
        for neighbor in &self.neighbors[index.0] {
            self.nodes[neighbor.0].active_parents += 1;
        }
        trace!("Expanded node {}", index);
    }

    /// Hide the callees of a node. Callees left with no reveal that were
    /// expanded themselves collapse too.
    pub fn collapse(&mut self, index: NodeIndex) {
        match self.nodes.get_mut(index.0) {
            Some(node) if node.expanded => node.expanded = false,
            _ => return,
        }
        let mut stack = vec![index];
        while let Some(current) = stack.pop() {
            for neighbor in &self.neighbors[current.0] {
                let node = &mut self.nodes[neighbor.0];
                node.active_parents = node.active_parents.saturating_sub(1);
                if node.active_parents == 0 && node.expanded {
                    node.expanded = false;
                    stack.push(*neighbor);
                }
            }
        }
        trace!("Collapsed node {}", index);
    }

    /// Click behaviour: flip a visible node between expanded and collapsed.
    /// Returns whether anything changed.
    pub fn toggle(&mut self, index: NodeIndex) -> bool {
        if !self.is_visible(index) {
            return false;
        }
        if self.nodes[index.0].expanded {
            self.collapse(index);
        } else {
            self.expand(index);
        }
        true
    }

    /// Expand every node reachable from the root. Repeating it changes
    /// nothing.
    pub fn show_full_graph(&mut self) {
        let Some(root) = self.root else {
            return;
        };
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([root]);
        while let Some(index) = queue.pop_front() {
            if !visited.insert(index) {
                continue;
            }
            self.expand(index);
            queue.extend(self.neighbors[index.0].iter().copied());
        }
    }

    /// Collapse everything; only the root stays visible.
    pub fn shrink_to_root(&mut self) {
        for node in &mut self.nodes {
            node.active_parents = 0;
            node.expanded = false;
        }
        if let Some(root) = self.root {
            self.nodes[root.0].active_parents = 1;
        }
    }

    /// Place reachable nodes in columns by depth and rows by display order.
    /// Returns the on-screen position, scroll included, of each visible node.
    pub fn layout(&mut self, viewport: Viewport) -> Vec<(NodeIndex, Vec2)> {
        let spacing = self.view.spacing();
        let mut layers = vec![0usize; self.nodes.len()];
        for index in &self.order {
            let node = &mut self.nodes[index.0];
            let Some(depth) = node.depth else {
                continue;
            };
            node.position = Vec2::new(
                viewport.position.x + self.config.left_distance + depth as f32 * spacing,
                viewport.position.y + self.config.top_distance + layers[depth] as f32 * spacing,
            );
            layers[depth] += 1;
        }

        self.visible_nodes()
            .into_iter()
            .map(|index| (index, self.nodes[index.0].position + self.view.scroll))
            .collect()
    }

    /// Scroll so the first visible node matching `name` sits in the middle
    /// of the viewport. Invisible or unknown names change nothing.
    pub fn focus_by_name(&mut self, name: &str, viewport: Viewport) -> Option<Vec2> {
        let target = self.order.iter().copied().find(|index| {
            self.is_visible(*index)
                && self.call_graph.node(*index).is_some_and(|decl| {
                    decl.name() == name || decl.qualified_name() == name || decl.signature() == name
                })
        })?;

        self.layout(viewport);
        let relative = self.nodes[target.0].position - viewport.position;
        let half = self.view.node_size() / 2.0;
        let center = viewport.center();
        let scroll = Vec2::new(center.x - relative.x - half, center.y - relative.y - half);
        self.view.scroll = scroll;
        debug!("Focused {} at scroll {:?}", name, scroll);
        Some(scroll)
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn scroll_by(&mut self, direction: ScrollDirection) {
        self.view.scroll_by(direction);
    }

    pub fn zoom(&mut self, wheel: f32) {
        self.view.zoom(wheel);
    }

    /// A click on a node reported by the renderer.
    pub fn node_clicked(&mut self, index: NodeIndex) -> bool {
        if self.node(index).is_none() {
            return false;
        }
        self.last_clicked = Some(index);
        self.toggle(index)
    }

    pub fn node_hovered(&mut self, index: Option<NodeIndex>) {
        self.hovered = index.filter(|i| self.node(*i).is_some());
    }

    pub fn last_clicked(&self) -> Option<NodeIndex> {
        self.last_clicked
    }

    pub fn hovered(&self) -> Option<NodeIndex> {
        self.hovered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AnalysisConfig, NodeInclusion};
    use crate::core::analyzer::SourceAnalyzer;
    use crate::core::call_graph::CallGraphExtractor;

    fn presentation(source: &str) -> PresentationGraph {
        let mut analyzer = SourceAnalyzer::new(&AnalysisConfig::default()).unwrap();
        let unit = analyzer.analyze(source, &[]);
        let graph = CallGraphExtractor::new(NodeInclusion::CallParticipants).extract(&unit);
        PresentationGraph::build(Arc::new(graph), PresentationConfig::default())
    }

    fn index_of(graph: &PresentationGraph, name: &str) -> NodeIndex {
        let position = graph
            .call_graph()
            .nodes()
            .iter()
            .position(|decl| decl.name() == name)
            .unwrap();
        NodeIndex(position)
    }

    #[test]
    fn test_empty_graph() {
        let mut graph = presentation("");
        assert!(graph.root().is_none());
        assert!(graph.visible_nodes().is_empty());
        graph.show_full_graph();
        graph.shrink_to_root();
        assert!(graph.focus_by_name("main", Viewport::default()).is_none());
    }

    #[test]
    fn test_depths_from_root() {
        let graph = presentation(
            "void b() {}\nvoid a() { b(); }\nvoid c() {}\nint main() { a(); c(); return 0; }\n",
        );
        assert_eq!(graph.depth(index_of(&graph, "main")), Some(0));
        assert_eq!(graph.depth(index_of(&graph, "a")), Some(1));
        assert_eq!(graph.depth(index_of(&graph, "c")), Some(1));
        assert_eq!(graph.depth(index_of(&graph, "b")), Some(2));
    }

    #[test]
    fn test_root_defaults_to_first_node_without_main() {
        let graph = presentation("void leaf() {}\nvoid start() { leaf(); }\n");
        let root = graph.root().unwrap();
        assert_eq!(root, NodeIndex(0));
        assert_eq!(graph.root_declaration().unwrap().name(), "start");
        assert_eq!(graph.visible_nodes(), vec![root]);
    }

    #[test]
    fn test_display_names_are_truncated() {
        let graph = presentation(
            "void a_really_long_function_name() {}\nint main() { a_really_long_function_name(); return 0; }\n",
        );
        let index = index_of(&graph, "a_really_long_function_name");
        assert_eq!(graph.node(index).unwrap().display_name(), "a_really_l");
    }

    #[test]
    fn test_toggle_ignores_hidden_nodes() {
        let mut graph = presentation("void helper() {}\nint main() { helper(); return 0; }\n");
        let helper = index_of(&graph, "helper");
        assert!(!graph.toggle(helper));
        assert!(!graph.node(helper).unwrap().is_expanded());

        let main = index_of(&graph, "main");
        assert!(graph.node_clicked(main));
        assert_eq!(graph.last_clicked(), Some(main));
        assert!(graph.is_visible(helper));
        assert_eq!(graph.visible_edges().len(), 1);

        assert!(graph.node_clicked(main));
        assert!(!graph.is_visible(helper));
        assert!(graph.visible_edges().is_empty());
    }

    #[test]
    fn test_collapse_cascades_through_unreferenced_nodes() {
        let mut graph = presentation(
            "void leaf() {}\nvoid mid() { leaf(); }\nint main() { mid(); return 0; }\n",
        );
        let (main, mid, leaf) = (
            index_of(&graph, "main"),
            index_of(&graph, "mid"),
            index_of(&graph, "leaf"),
        );
        graph.expand(main);
        graph.expand(mid);
        assert!(graph.is_visible(leaf));

        graph.collapse(main);
        assert!(!graph.is_visible(mid));
        assert!(!graph.node(mid).unwrap().is_expanded());
        assert!(!graph.is_visible(leaf));
        assert_eq!(graph.node(leaf).unwrap().active_parents(), 0);
    }

    #[test]
    fn test_self_loop_collapse_terminates() {
        let mut graph = presentation("int f(int n){ return n<=0?0:f(n-1); }\n");
        let f = NodeIndex(0);
        graph.expand(f);
        assert_eq!(graph.node(f).unwrap().active_parents(), 2);
        graph.collapse(f);
        assert_eq!(graph.node(f).unwrap().active_parents(), 1);
        assert!(graph.is_visible(f));
    }

    #[test]
    fn test_shrink_to_root() {
        let mut graph = presentation("void helper() {}\nint main() { helper(); return 0; }\n");
        graph.show_full_graph();
        assert_eq!(graph.visible_nodes().len(), 2);
        graph.shrink_to_root();
        assert_eq!(graph.visible_nodes(), vec![index_of(&graph, "main")]);
        assert!(graph.nodes().iter().all(|n| !n.is_expanded()));
    }

    #[test]
    fn test_pin_root_by_signature() {
        let mut graph = presentation(
            "void leaf() {}\nvoid mid() { leaf(); }\nint main() { mid(); return 0; }\n",
        );
        graph.show_full_graph();
        assert!(graph.pin_root_by_signature("mid()"));
        let mid = index_of(&graph, "mid");
        assert_eq!(graph.root(), Some(mid));
        assert_eq!(graph.depth(mid), Some(0));
        assert_eq!(graph.depth(index_of(&graph, "leaf")), Some(1));
        assert_eq!(graph.depth(index_of(&graph, "main")), None);
        assert_eq!(graph.visible_nodes(), vec![mid]);
        assert_eq!(graph.display_order()[0], mid);
        assert!(!graph.pin_root_by_signature("nothing()"));
    }

    #[test]
    fn test_layout_columns_and_rows() {
        let mut graph = presentation(
            "void a() {}\nvoid b() {}\nint main() { a(); b(); return 0; }\n",
        );
        graph.show_full_graph();
        let viewport = Viewport::new(Vec2::new(100.0, 50.0), Vec2::new(800.0, 600.0));
        let positions = graph.layout(viewport);
        assert_eq!(positions.len(), 3);

        let main = graph.node(index_of(&graph, "main")).unwrap().position();
        assert_eq!(main, Vec2::new(125.0, 90.0));
        let a = graph.node(index_of(&graph, "a")).unwrap().position();
        let b = graph.node(index_of(&graph, "b")).unwrap().position();
        assert_eq!(a.x, 125.0 + 90.0);
        assert_eq!(b.x, a.x);
        assert_eq!((a.y - b.y).abs(), 90.0);
    }

    #[test]
    fn test_focus_centers_visible_node() {
        let mut graph = presentation("void helper() {}\nint main() { helper(); return 0; }\n");
        let viewport = Viewport::new(Vec2::new(0.0, 0.0), Vec2::new(400.0, 300.0));

        assert!(graph.focus_by_name("helper", viewport).is_none());
        assert_eq!(graph.view().scroll, Vec2::ZERO);

        let scroll = graph.focus_by_name("main", viewport).unwrap();
        assert_eq!(scroll, Vec2::new(200.0 - 25.0 - 30.0, 150.0 - 40.0 - 30.0));
        assert_eq!(graph.view().scroll, scroll);
    }

    #[test]
    fn test_details() {
        let graph = presentation("int helper(int x) { return x; }\nint main() { return helper(1); }\n");
        let details = graph.details(index_of(&graph, "helper")).unwrap();
        assert_eq!(details.return_type, "int");
        assert_eq!(details.parameters, vec![("int".to_string(), "x".to_string())]);
        assert!(graph.details(NodeIndex(9)).is_none());
    }
}
