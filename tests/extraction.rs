mod common;

use callscope::core::NodeIndex;
use common::{assert_no_dangling_edges, call_graph, edge_signatures, index_of};

const SAMPLE: &str = r#"
namespace util { int parse(const char *s) { return 0; } }
int helper(int x) { return x + util::parse("1"); }
int fib(int n) { return n <= 1 ? n : fib(n - 1) + fib(n - 2); }
int main() {
    int total = helper(5) + helper(6);
    return total + fib(10);
}
"#;

#[test]
fn helper_called_twice_from_main() {
    let graph = call_graph("int helper(int x){return x+1;} int main(){return helper(5)+helper(6);}");
    assert_eq!(graph.nodes().len(), 2);
    assert_eq!(graph.nodes()[0].qualified_name(), "main");
    assert!(graph.nodes()[0].is_program_entry_point());

    let helper = index_of(&graph, "helper");
    assert_eq!(graph.edges().len(), 2);
    assert!(graph
        .edges()
        .iter()
        .all(|edge| edge.caller == NodeIndex(0) && edge.callee == helper));
}

#[test]
fn repeated_extraction_is_isomorphic() {
    let first = call_graph(SAMPLE);
    let second = call_graph(SAMPLE);

    let signatures = |graph: &callscope::core::CallGraph| {
        let mut names: Vec<String> = graph.nodes().iter().map(|decl| decl.signature()).collect();
        names.sort();
        names
    };
    assert_eq!(signatures(&first), signatures(&second));
    assert_eq!(edge_signatures(&first), edge_signatures(&second));
}

#[test]
fn edges_never_dangle() {
    let graph = call_graph(SAMPLE);
    assert!(!graph.edges().is_empty());
    assert_no_dangling_edges(&graph);
}

#[test]
fn direct_recursion_is_a_self_loop() {
    let graph = call_graph(SAMPLE);
    let fib = index_of(&graph, "fib");
    let self_loops: Vec<_> = graph.edges().iter().filter(|edge| edge.is_self_loop()).collect();
    assert_eq!(self_loops.len(), 2);
    assert!(self_loops.iter().all(|edge| edge.caller == fib));
}

#[test]
fn function_pointer_call_is_dropped() {
    let graph = call_graph(
        "void target() {}\nvoid other() {}\nint main() { void (*p)() = target; p(); other(); return 0; }\n",
    );
    assert_eq!(
        edge_signatures(&graph),
        vec![("main()".to_string(), "other()".to_string())]
    );
    assert!(graph.nodes().iter().all(|decl| decl.name() != "target"));
}

#[test]
fn call_in_disabled_block_has_no_edge() {
    let graph = call_graph("void helper() {}\nint main() {\n#if 0\n    helper();\n#endif\n    return 0;\n}\n");
    assert!(graph.edges().is_empty());
    assert!(graph.is_empty());
}

#[test]
fn ifdef_without_define_takes_else_branch() {
    let graph = call_graph(
        r#"
void trace() {}
#ifdef DEBUG
void log() { trace(); }
#else
void log() {}
#endif
int main() { log(); return 0; }
"#,
    );
    assert_eq!(
        edge_signatures(&graph),
        vec![("main()".to_string(), "log()".to_string())]
    );
    assert!(graph.nodes().iter().all(|decl| decl.name() != "trace"));
}

#[test]
fn ifdef_with_define_takes_first_branch() {
    let graph = call_graph(
        r#"
#define DEBUG
void trace() {}
#ifdef DEBUG
void log() { trace(); }
#else
void log() {}
#endif
int main() { log(); return 0; }
"#,
    );
    assert_eq!(
        edge_signatures(&graph),
        vec![
            ("log()".to_string(), "trace()".to_string()),
            ("main()".to_string(), "log()".to_string()),
        ]
    );
    assert_no_dangling_edges(&graph);
}

#[test]
fn elif_chain_keeps_the_first_true_branch() {
    let graph = call_graph(
        r#"
#define LEVEL 2
void low() {}
void mid() {}
void high() {}
int main() {
#if LEVEL > 2
    high();
#elif LEVEL == 2
    mid();
#else
    low();
#endif
    return 0;
}
"#,
    );
    assert_eq!(
        edge_signatures(&graph),
        vec![("main()".to_string(), "mid()".to_string())]
    );
}

#[test]
fn calls_under_unevaluable_condition_are_dropped() {
    let graph = call_graph(
        r#"
#define CHECK(x) (x)
void fast() {}
void slow() {}
int main() {
#if CHECK(1)
    fast();
#else
    slow();
#endif
    return 0;
}
"#,
    );
    assert!(graph.edges().is_empty());
}

#[test]
fn macro_named_callee_is_dropped() {
    let graph = call_graph(
        "#define helper real\nvoid real() {}\nvoid helper() {}\nvoid other() {}\nint main() { helper(); other(); return 0; }\n",
    );
    assert_eq!(
        edge_signatures(&graph),
        vec![("main()".to_string(), "other()".to_string())]
    );
}

#[test]
fn long_binary_expression_argument_is_resolved() {
    let sum = vec!["1"; 3000].join(" + ");
    let source = format!("int g(int v) {{ return v; }}\nint main() {{ return g(0 + {}); }}\n", sum);
    let graph = call_graph(&source);
    assert_eq!(
        edge_signatures(&graph),
        vec![("main()".to_string(), "g(int)".to_string())]
    );
}

#[test]
fn deeply_nested_blocks_are_walked() {
    let depth = 2000;
    let source = format!(
        "void leaf() {{}}\nint main() {{ {} leaf(); {} return 0; }}\n",
        "{".repeat(depth),
        "}".repeat(depth)
    );
    let graph = call_graph(&source);
    assert_eq!(
        edge_signatures(&graph),
        vec![("main()".to_string(), "leaf()".to_string())]
    );
}

#[test]
fn overloads_become_separate_nodes() {
    let graph = call_graph(
        r#"
void log(int v) {}
void log(const char *s) {}
void log(double d, int precision) {}
int main() { log(1); log("text"); log(1.5, 2); return 0; }
"#,
    );
    let mut callees: Vec<String> = edge_signatures(&graph).into_iter().map(|(_, callee)| callee).collect();
    callees.sort();
    assert_eq!(callees, vec!["log(const char *)", "log(double, int)", "log(int)"]);
}

#[test]
fn ambiguous_overload_has_no_edge() {
    let graph = call_graph("void f(int a) {}\nvoid f(double a) {}\nint main() { f(1L); return 0; }\n");
    assert!(graph.edges().is_empty());
}

#[test]
fn virtual_call_through_pointer_is_dropped() {
    let graph = call_graph(
        r#"
struct Base { virtual void run() {} };
struct Derived : Base { void run() override { Base::run(); } };
void through_pointer(Base *b) { b->run(); }
void through_value() { Derived d; d.run(); }
int main() { through_pointer(0); through_value(); return 0; }
"#,
    );
    let edges = edge_signatures(&graph);
    assert!(edges.contains(&("through_value()".to_string(), "Derived::run()".to_string())));
    assert!(edges.contains(&("Derived::run()".to_string(), "Base::run()".to_string())));
    assert!(edges.iter().all(|(caller, _)| caller != "through_pointer(Base *)"));
}

#[test]
fn virtual_call_through_pointer_subscript_is_dropped() {
    let graph = call_graph(
        r#"
struct Base { virtual void run() {} };
struct Derived : Base { void run() override {} };
int main() { Base *p = new Derived; p[0].run(); return 0; }
"#,
    );
    assert!(graph.edges().is_empty());
}

#[test]
fn namespace_and_static_member_calls() {
    let graph = call_graph(
        r#"
namespace util { int parse(const char *s) { return 0; } }
namespace app {
    using namespace util;
    int run() { return parse("1"); }
}
struct Counter { static int next() { return 1; } };
int main() { return app::run() + Counter::next(); }
"#,
    );
    let edges = edge_signatures(&graph);
    assert_eq!(
        edges,
        vec![
            ("app::run()".to_string(), "util::parse(const char *)".to_string()),
            ("main()".to_string(), "Counter::next()".to_string()),
            ("main()".to_string(), "app::run()".to_string()),
        ]
    );
}

#[test]
fn dependent_template_calls_are_dropped() {
    let graph = call_graph(
        r#"
int g(int x) { return x; }
template <typename T> T apply(T value) { return process(value) + g(1); }
int main() { return 0; }
"#,
    );
    assert_eq!(graph.edges().len(), 1);
    assert_eq!(graph.node(graph.edges()[0].callee).unwrap().name(), "g");
}

#[test]
fn global_initializer_call_has_no_edge() {
    let graph = call_graph("int seed() { return 4; }\nint value = seed();\nint main() { return 0; }\n");
    assert!(graph.is_empty());
}

#[test]
fn forward_declaration_and_definition_are_one_node() {
    let graph = call_graph("int later(int);\nint main() { return later(1); }\nint later(int v) { return v; }\n");
    assert_eq!(graph.nodes().len(), 2);
    assert_eq!(graph.stats().total_calls, 1);
}
