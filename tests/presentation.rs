mod common;

use callscope::core::{Vec2, Viewport};
use common::{index_of, presentation};

const TREE: &str = "void b() {}\nvoid a() { b(); }\nvoid c() {}\nint main() { a(); c(); return 0; }\n";
const DIAMOND: &str = "void a() {}\nvoid b() { a(); }\nint main() { a(); b(); return 0; }\n";

#[test]
fn depths_follow_breadth_first_order() {
    let view = presentation(TREE);
    let graph = view.call_graph().clone();
    assert_eq!(view.depth(index_of(&graph, "main")), Some(0));
    assert_eq!(view.depth(index_of(&graph, "a")), Some(1));
    assert_eq!(view.depth(index_of(&graph, "c")), Some(1));
    assert_eq!(view.depth(index_of(&graph, "b")), Some(2));
}

#[test]
fn shared_callee_stays_visible_while_one_caller_is_expanded() {
    let mut view = presentation(DIAMOND);
    let graph = view.call_graph().clone();
    let (main, a, b) = (index_of(&graph, "main"), index_of(&graph, "a"), index_of(&graph, "b"));

    assert_eq!(view.visible_nodes(), vec![main]);
    view.expand(main);
    view.expand(b);
    assert_eq!(view.node(a).unwrap().active_parents(), 2);

    view.collapse(b);
    assert!(view.is_visible(a));
    assert!(view.is_visible(b));

    view.collapse(main);
    assert!(!view.is_visible(a));
    assert!(!view.is_visible(b));
    assert!(view.is_visible(main));
}

#[test]
fn collapsing_the_root_cascades() {
    let mut view = presentation(DIAMOND);
    let graph = view.call_graph().clone();
    let (main, a, b) = (index_of(&graph, "main"), index_of(&graph, "a"), index_of(&graph, "b"));

    view.expand(main);
    view.expand(b);
    view.collapse(main);
    assert_eq!(view.node(a).unwrap().active_parents(), 0);
    assert!(!view.node(b).unwrap().is_expanded());
    assert_eq!(view.visible_nodes(), vec![main]);
}

#[test]
fn full_reveal_is_idempotent() {
    let mut view = presentation(DIAMOND);
    view.show_full_graph();
    let once = view.visible_nodes();
    let counts: Vec<usize> = view.nodes().iter().map(|n| n.active_parents()).collect();

    view.show_full_graph();
    assert_eq!(view.visible_nodes(), once);
    let again: Vec<usize> = view.nodes().iter().map(|n| n.active_parents()).collect();
    assert_eq!(counts, again);
    assert_eq!(once.len(), 3);
}

#[test]
fn shrink_hides_everything_but_the_root() {
    let mut view = presentation(TREE);
    view.show_full_graph();
    assert_eq!(view.visible_nodes().len(), 4);
    view.shrink_to_root();
    assert_eq!(view.visible_nodes(), vec![view.root().unwrap()]);
}

#[test]
fn focus_on_hidden_node_changes_nothing() {
    let mut view = presentation(TREE);
    let viewport = Viewport::new(Vec2::ZERO, Vec2::new(640.0, 480.0));
    assert!(view.focus_by_name("b", viewport).is_none());
    assert_eq!(view.view().scroll, Vec2::ZERO);

    view.show_full_graph();
    assert!(view.focus_by_name("b", viewport).is_some());
    assert_ne!(view.view().scroll, Vec2::ZERO);
}

#[test]
fn click_toggles_visible_nodes_only() {
    let mut view = presentation(TREE);
    let graph = view.call_graph().clone();
    let (main, a) = (index_of(&graph, "main"), index_of(&graph, "a"));

    assert!(!view.node_clicked(a));
    assert!(view.node_clicked(main));
    assert_eq!(view.last_clicked(), Some(main));
    assert!(view.is_visible(a));

    view.node_hovered(Some(a));
    assert_eq!(view.hovered(), Some(a));
}

#[test]
fn layout_places_only_visible_nodes() {
    let mut view = presentation(TREE);
    let viewport = Viewport::new(Vec2::ZERO, Vec2::new(640.0, 480.0));
    assert_eq!(view.layout(viewport).len(), 1);
    view.show_full_graph();
    assert_eq!(view.layout(viewport).len(), 4);
}
