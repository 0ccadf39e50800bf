use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace, warn};
use tree_sitter::Node;

use crate::config::AnalysisConfig;
use crate::error::Result;
use super::languages::{frontend_for, LanguageFrontend, SourceLanguage};
use super::semantic::collector::{finalize, Collector, PendingUsing};
use super::semantic::declarator::{named_children, node_text};
use super::semantic::preprocessor::{branch_body, is_conditional, Branch};
use super::semantic::resolver::Resolver;
use super::semantic::{Diagnostic, FileId, ParsedUnit, Severity, SourceFile, TypeSpeller};

/// Includes nested deeper than this are not followed.
const MAX_INCLUDE_DEPTH: usize = 16;

/// An `#include` directive waiting to be located.
#[derive(Debug, Clone)]
struct IncludeRequest {
    target: String,
    angled: bool,
    from: FileId,
    line: usize,
    column: usize,
}

/// Files of the unit being built, in the order they were first included.
struct FileSet<'p> {
    files: Vec<SourceFile>,
    depths: Vec<usize>,
    loaded: HashSet<PathBuf>,
    include_paths: &'p [PathBuf],
}

/// Semantic front end: turns one source buffer into a `ParsedUnit`.
pub struct SourceAnalyzer {
    frontend: Box<dyn LanguageFrontend>,
    language: SourceLanguage,
    file_name: PathBuf,
    speller: TypeSpeller,
}

impl SourceAnalyzer {
    pub fn new(config: &AnalysisConfig) -> Result<Self> {
        let language = SourceLanguage::from_file_name(&config.file_name);
        let frontend = frontend_for(language)?;
        debug!("Created {} analyzer for {}", frontend.language_name(), config.file_name);

        Ok(Self {
            frontend,
            language,
            file_name: PathBuf::from(&config.file_name),
            speller: TypeSpeller::new()?,
        })
    }

    pub fn language(&self) -> SourceLanguage {
        self.language
    }

    /// Analyze a complete translation unit held in memory.
    ///
    /// Never fails: syntax errors, missing includes and unresolvable names
    /// end up as diagnostics on the returned unit.
    pub fn analyze(&mut self, source: &str, include_paths: &[PathBuf]) -> ParsedUnit {
        let mut unit = ParsedUnit::new(self.language);
        let mut usings: Vec<PendingUsing> = Vec::new();

        let main_tree = self.frontend.parse(source);
        if main_tree.is_none() {
            warn!("Front end produced no syntax tree for {}", self.file_name.display());
            unit.push_diagnostic(Diagnostic {
                severity: Severity::Error,
                message: "unable to parse source".to_string(),
                file: self.file_name.display().to_string(),
                line: 1,
                column: 1,
            });
        }
        let mut set = FileSet {
            files: vec![SourceFile {
                path: self.file_name.clone(),
                text: source.to_string(),
                tree: main_tree,
            }],
            depths: vec![0],
            loaded: HashSet::from([self.file_name.clone()]),
            include_paths,
        };

        // Directives in translation order, includes loaded where they appear.
        self.preprocess(&mut unit, &mut set, 0);
        let files = set.files;

        // Declaration pass over the main file and everything it includes.
        for (file, current) in files.iter().enumerate() {
            let Some(tree) = current.tree.as_ref() else {
                continue;
            };
            let root = tree.root_node();
            report_syntax_errors(&mut unit, file, &current.path, &current.text, root);
            Collector::new(&mut unit, &self.speller, file, &current.path, &current.text, &mut usings)
                .collect(root);
        }

        finalize(&mut unit, usings);

        // Resolution pass.
        for (file, current) in files.iter().enumerate() {
            let Some(tree) = current.tree.as_ref() else {
                continue;
            };
            let resolved = Resolver::new(&unit, &self.speller, file, &current.path, &current.text)
                .resolve(tree.root_node());
            unit.resolutions.extend(resolved.calls);
            unit.diagnostics.extend(resolved.diagnostics);
        }
        unit.files = files;

        info!(
            "Analyzed {}: {} files, {} functions, {} resolved calls, {} diagnostics",
            self.file_name.display(),
            unit.files.len(),
            unit.functions.len(),
            unit.resolved_call_count(),
            unit.diagnostics.len()
        );
        unit
    }

    /// Apply the directives of one file in source order: macro definitions,
    /// conditionals and includes, descending only into compiled branches.
    fn preprocess(&mut self, unit: &mut ParsedUnit, set: &mut FileSet<'_>, file: FileId) {
        let Some(tree) = set.files[file].tree.clone() else {
            return;
        };
        let text = set.files[file].text.clone();

        let mut stack = vec![tree.root_node()];
        while let Some(node) = stack.pop() {
            match node.kind() {
                "preproc_include" => {
                    let Some(request) = include_request(node, &text, file) else {
                        continue;
                    };
                    if let Some(included) = self.follow_include(unit, set, request) {
                        self.preprocess(unit, set, included);
                    }
                }
                "preproc_def" | "preproc_function_def" => unit.preprocessor.define(node, &text),
                "preproc_call" => unit.preprocessor.directive(node, &text),
                kind if is_conditional(kind) => {
                    let mut compiled = Vec::new();
                    for (branch, decision) in unit.preprocessor.decide(file, node, &text) {
                        match decision {
                            Branch::Active => compiled.extend(branch_body(branch)),
                            Branch::Undecided => trace!(
                                "Undecided branch at {}:{}",
                                set.files[file].path.display(),
                                branch.start_position().row + 1
                            ),
                            Branch::Inactive => {}
                        }
                    }
                    stack.extend(compiled.into_iter().rev());
                }
                _ => stack.extend(named_children(node).into_iter().rev()),
            }
        }
    }

    /// Locate, read and parse an include. Returns the new file, or `None`
    /// when it was missing, unreadable, too deep or already loaded.
    fn follow_include(&mut self, unit: &mut ParsedUnit, set: &mut FileSet<'_>, request: IncludeRequest) -> Option<FileId> {
        let from_path = set.files[request.from].path.clone();
        let depth = set.depths[request.from] + 1;
        let diagnostic = |severity, message: String| Diagnostic {
            severity,
            message,
            file: from_path.display().to_string(),
            line: request.line,
            column: request.column,
        };

        // Quoted includes look next to an included file first; the main
        // buffer has no directory of its own.
        let own_dir = if request.angled || request.from == 0 {
            None
        } else {
            from_path.parent().map(Path::to_path_buf)
        };
        let Some(path) = find_include(&request.target, own_dir.as_deref(), set.include_paths) else {
            debug!("Include '{}' not found from {}", request.target, from_path.display());
            let severity = if request.angled { Severity::Warning } else { Severity::Error };
            unit.push_diagnostic(diagnostic(severity, format!("'{}' file not found", request.target)));
            return None;
        };

        if !set.loaded.insert(path.clone()) {
            return None;
        }
        if depth > MAX_INCLUDE_DEPTH {
            unit.push_diagnostic(diagnostic(
                Severity::Error,
                format!("#include nested too deeply: '{}'", request.target),
            ));
            return None;
        }

        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to read include {}: {}", path.display(), e);
                unit.push_diagnostic(diagnostic(
                    Severity::Error,
                    format!("unable to read '{}': {}", path.display(), e),
                ));
                return None;
            }
        };
        debug!("Including {}", path.display());
        let tree = self.frontend.parse(&text);
        set.files.push(SourceFile { path, text, tree });
        set.depths.push(depth);
        Some(set.files.len() - 1)
    }
}

fn include_request(node: Node<'_>, source: &str, from: FileId) -> Option<IncludeRequest> {
    let path = node.child_by_field_name("path")?;
    let text = node_text(path, source).trim();
    let (target, angled) = match path.kind() {
        "system_lib_string" => (text.trim_start_matches('<').trim_end_matches('>'), true),
        "string_literal" => (text.trim_matches('"'), false),
        _ => return None,
    };
    let start = node.start_position();
    Some(IncludeRequest {
        target: target.to_string(),
        angled,
        from,
        line: start.row + 1,
        column: start.column + 1,
    })
}

/// First existing candidate for an include target.
fn find_include(target: &str, own_dir: Option<&Path>, include_paths: &[PathBuf]) -> Option<PathBuf> {
    own_dir
        .into_iter()
        .chain(include_paths.iter().map(PathBuf::as_path))
        .map(|dir| dir.join(target))
        .find(|candidate| candidate.is_file())
}

/// One diagnostic per outermost ERROR node and per MISSING node, outside
/// branches that are not compiled.
fn report_syntax_errors(unit: &mut ParsedUnit, file: FileId, path: &Path, source: &str, root: Node<'_>) {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if !node.has_error() {
            continue;
        }
        if node.is_missing() {
            unit.push_diagnostic(Diagnostic::at(
                Severity::Error,
                format!("expected '{}'", node.kind()),
                path,
                node,
            ));
            continue;
        }
        if node.is_error() {
            let text = node.utf8_text(source.as_bytes()).unwrap_or_default();
            let token = text.split_whitespace().next().unwrap_or_default();
            let message = if token.is_empty() {
                "syntax error".to_string()
            } else {
                format!("syntax error near '{}'", token.chars().take(32).collect::<String>())
            };
            unit.push_diagnostic(Diagnostic::at(Severity::Error, message, path, node));
            continue;
        }
        if is_conditional(node.kind()) && unit.preprocessor.branch(file, node) == Branch::Inactive {
            stack.extend(node.child_by_field_name("alternative"));
            continue;
        }
        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn analyzer(file_name: &str) -> SourceAnalyzer {
        let config = AnalysisConfig {
            file_name: file_name.to_string(),
            ..AnalysisConfig::default()
        };
        SourceAnalyzer::new(&config).unwrap()
    }

    fn callee_names(unit: &ParsedUnit) -> Vec<String> {
        let mut names: Vec<String> = unit
            .resolutions
            .values()
            .map(|index| unit.function(*index).qualified_name.clone())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_language_follows_file_name() {
        assert_eq!(analyzer("main.c").language(), SourceLanguage::C);
        assert_eq!(analyzer("main.cpp").language(), SourceLanguage::Cpp);
    }

    #[test]
    fn test_direct_calls_are_resolved() {
        let mut analyzer = analyzer("main.cpp");
        let unit = analyzer.analyze(
            "int helper(int x) { return x + 1; }\nint main() { return helper(5) + helper(6); }\n",
            &[],
        );
        assert_eq!(unit.functions().len(), 2);
        assert_eq!(unit.resolved_call_count(), 2);
        assert!(unit.diagnostics().is_empty());
        assert!(unit.entry_point().is_some());
    }

    #[test]
    fn test_syntax_error_is_reported() {
        let mut analyzer = analyzer("main.cpp");
        let unit = analyzer.analyze("int main( { return 0; }", &[]);
        assert!(unit.has_errors());
    }

    #[test]
    fn test_undeclared_function_is_reported() {
        let mut analyzer = analyzer("main.cpp");
        let unit = analyzer.analyze("int main() { return missing(1); }", &[]);
        assert_eq!(unit.resolved_call_count(), 0);
        assert!(unit
            .diagnostics()
            .iter()
            .any(|d| d.message == "use of undeclared identifier 'missing'"));
    }

    #[test]
    fn test_missing_include_is_reported() {
        let mut analyzer = analyzer("main.cpp");
        let unit = analyzer.analyze("#include \"nowhere.h\"\nint main() { return 0; }\n", &[]);
        assert!(unit
            .diagnostics()
            .iter()
            .any(|d| d.message == "'nowhere.h' file not found" && d.line == 1));
    }

    #[test]
    fn test_include_contributes_declarations() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("util.h"), "int twice(int x) { return 2 * x; }\n").unwrap();

        let mut analyzer = analyzer("main.cpp");
        let unit = analyzer.analyze(
            "#include \"util.h\"\n#include \"util.h\"\nint main() { return twice(2); }\n",
            &[dir.path().to_path_buf()],
        );
        assert_eq!(unit.files().len(), 2);
        assert_eq!(callee_names(&unit), vec!["twice"]);
    }

    #[test]
    fn test_overloads_resolved_by_argument_type() {
        let mut analyzer = analyzer("main.cpp");
        let unit = analyzer.analyze(
            r#"
void log(int v) {}
void log(const char *s) {}
void log(double d, int precision) {}
int main() {
    log(1);
    log("text");
    log(1.5, 2);
    return 0;
}
"#,
            &[],
        );
        let mut signatures: Vec<String> = unit
            .resolutions
            .values()
            .map(|index| {
                let f = unit.function(*index);
                f.params.iter().map(|p| p.ty.spelling()).collect::<Vec<_>>().join(",")
            })
            .collect();
        signatures.sort();
        assert_eq!(signatures, vec!["const char *", "double,int", "int"]);
    }

    #[test]
    fn test_ambiguous_overload_is_dropped() {
        let mut analyzer = analyzer("main.cpp");
        let unit = analyzer.analyze(
            "void f(int a) {}\nvoid f(double a) {}\nint main() { f(1L); return 0; }\n",
            &[],
        );
        assert_eq!(unit.resolved_call_count(), 0);
        assert!(unit.diagnostics().iter().any(|d| d.message == "call to 'f' is ambiguous"));
    }

    #[test]
    fn test_virtual_dispatch_rules() {
        let mut analyzer = analyzer("main.cpp");
        let unit = analyzer.analyze(
            r#"
struct Base { virtual void run() {} };
struct Derived : Base { void run() override { Base::run(); } };
void through_pointer(Base *b) { b->run(); }
void through_value() { Derived d; d.run(); }
int main() { through_pointer(0); through_value(); return 0; }
"#,
            &[],
        );
        let names = callee_names(&unit);
        assert!(names.contains(&"Base::run".to_string()));
        assert!(names.contains(&"Derived::run".to_string()));
        assert_eq!(names.iter().filter(|n| n.ends_with("run")).count(), 2);
    }

    #[test]
    fn test_namespaces_and_using_directives() {
        let mut analyzer = analyzer("main.cpp");
        let unit = analyzer.analyze(
            r#"
namespace util { int parse(const char *s) { return 0; } }
namespace app {
    using namespace util;
    int run() { return parse("1"); }
}
struct Counter { static int next() { return 1; } };
int main() { return app::run() + Counter::next(); }
"#,
            &[],
        );
        assert_eq!(callee_names(&unit), vec!["Counter::next", "app::run", "util::parse"]);
    }

    #[test]
    fn test_dependent_calls_in_templates_are_dropped() {
        let mut analyzer = analyzer("main.cpp");
        let unit = analyzer.analyze(
            r#"
int g(int x) { return x; }
template <typename T> T apply(T value) { return process(value) + g(1); }
int main() { return 0; }
"#,
            &[],
        );
        assert_eq!(callee_names(&unit), vec!["g"]);
        assert!(unit.diagnostics().is_empty());
    }

    #[test]
    fn test_subscript_through_pointer_is_not_exact() {
        let mut analyzer = analyzer("main.cpp");
        let unit = analyzer.analyze(
            r#"
struct Base { virtual void run() {} };
struct Derived : Base { void run() override {} };
void by_pointer(Base *p) { p[0].run(); }
void by_parameter_array(Base items[]) { items[1].run(); }
void by_array() { Derived items[2]; items[0].run(); }
int main() { by_pointer(new Derived); by_array(); return 0; }
"#,
            &[],
        );
        let names = callee_names(&unit);
        assert!(!names.contains(&"Base::run".to_string()));
        assert_eq!(names.iter().filter(|n| *n == "Derived::run").count(), 1);
    }

    #[test]
    fn test_defines_from_included_header_select_branches() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("config.h"), "#define USE_FAST 1\n").unwrap();

        let mut analyzer = analyzer("main.cpp");
        let unit = analyzer.analyze(
            r#"
#include "config.h"
void fast() {}
void slow() {}
int main() {
#if USE_FAST
    fast();
#else
    slow();
#endif
    return 0;
}
"#,
            &[dir.path().to_path_buf()],
        );
        assert_eq!(callee_names(&unit), vec!["fast"]);
    }

    #[test]
    fn test_undef_reenables_the_else_branch() {
        let mut analyzer = analyzer("main.cpp");
        let unit = analyzer.analyze(
            "#define DEBUG\n#undef DEBUG\nvoid a() {}\nvoid b() {}\nint main() {\n#ifdef DEBUG\n  a();\n#else\n  b();\n#endif\n  return 0;\n}\n",
            &[],
        );
        assert_eq!(callee_names(&unit), vec!["b"]);
    }

    #[test]
    fn test_undecided_definitions_are_not_redefinitions() {
        let mut analyzer = analyzer("main.cpp");
        let unit = analyzer.analyze(
            r#"
#define VERSION(x) x
void helper() {}
#if VERSION(2) > 1
void run() { helper(); }
#else
void run() {}
#endif
int main() { run(); return 0; }
"#,
            &[],
        );
        assert!(unit.diagnostics().is_empty());
        assert_eq!(callee_names(&unit), vec!["run"]);
    }

    #[test]
    fn test_function_pointer_call_is_dropped() {
        let mut analyzer = analyzer("main.c");
        let unit = analyzer.analyze(
            "void target(void) {}\nint main(void) { void (*p)(void) = target; p(); target(); return 0; }\n",
            &[],
        );
        assert_eq!(callee_names(&unit), vec!["target"]);
    }
}
