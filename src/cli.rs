use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

use callscope::config::{Config, NodeInclusion};
use callscope::core::call_graph::{export, render};
use callscope::core::{
    Engine, FunctionDeclaration, FunctionFilter, GraphFormat, NodeIndex, PresentationGraph,
};

#[derive(Parser)]
#[command(name = "callscope")]
#[command(about = "Call graphs of C and C++ sources, explored from the command line")]
#[command(version)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the call graph of a source file
    Graph {
        /// Source file to analyze
        file: PathBuf,

        /// Extra include directory (repeatable)
        #[arg(short = 'I', long = "include")]
        include: Vec<PathBuf>,

        /// Output format (text, dot, json)
        #[arg(short, long)]
        format: Option<String>,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Also list defined functions that take part in no call
        #[arg(long)]
        all_functions: bool,
    },

    /// Print the functions visible in an interactive view
    Explore {
        /// Source file to analyze
        file: PathBuf,

        /// Function to use as the root instead of the entry point
        #[arg(long)]
        root: Option<String>,

        /// Expand every reachable function
        #[arg(long)]
        full: bool,

        /// Expand a function by name (repeatable, applied in order)
        #[arg(long)]
        expand: Vec<String>,
    },

    /// List the functions of the call graph
    Functions {
        /// Source file to analyze
        file: PathBuf,

        /// Filter such as "parse,load" or "-std::"
        #[arg(long, default_value = "")]
        filter: String,
    },

    /// Print analysis diagnostics
    Diagnostics {
        /// Source file to analyze
        file: PathBuf,
    },

    /// Print the declaration and syntax dump of one function
    Dump {
        /// Source file to analyze
        file: PathBuf,

        /// Function name, qualified name or signature
        function: String,
    },
}

impl Cli {
    pub fn execute(self) -> Result<()> {
        let mut config = Config::load_or_default(self.config.as_deref())?;

        match self.command {
            Commands::Graph { file, include, format, output, all_functions } => {
                config.analysis.include_paths.extend(include);
                if all_functions {
                    config.analysis.node_inclusion = NodeInclusion::AllFunctions;
                }
                let format: GraphFormat = format
                    .as_deref()
                    .unwrap_or(config.output.format.as_str())
                    .parse()?;
                let engine = analyze(config, &file)?;
                let Some(snapshot) = engine.snapshot() else {
                    bail!("analysis produced no result");
                };
                match output {
                    Some(path) => export(&snapshot.call_graph, format, &path)?,
                    None => print!("{}", render(&snapshot.call_graph, format)?),
                }
                Ok(())
            }
            Commands::Explore { file, root, full, expand } => {
                let mut engine = analyze(config, &file)?;
                if let Some(name) = root {
                    let id = find_declaration(engine.functions(), &name)
                        .map(|decl| decl.id())
                        .ok_or_else(|| anyhow!("no function named '{}' in the call graph", name))?;
                    engine.select_function(id);
                }
                let Some(view) = engine.presentation_mut() else {
                    bail!("analysis produced no result");
                };
                if full {
                    view.show_full_graph();
                }
                for name in &expand {
                    let index = find_node(view, name)
                        .ok_or_else(|| anyhow!("no function named '{}' in the call graph", name))?;
                    if !view.is_visible(index) {
                        bail!("'{}' is not visible; expand one of its callers first", name);
                    }
                    view.expand(index);
                }
                print_view(view);
                Ok(())
            }
            Commands::Functions { file, filter } => {
                let engine = analyze(config, &file)?;
                let filter = FunctionFilter::new(&filter);
                for decl in engine.filtered_functions(&filter) {
                    println!("{:>5}  {}  {}", decl.id(), decl.signature(), decl.location());
                }
                Ok(())
            }
            Commands::Diagnostics { file } => {
                let engine = analyze(config, &file)?;
                for diagnostic in engine.diagnostics() {
                    println!("{}", diagnostic);
                }
                Ok(())
            }
            Commands::Dump { file, function } => {
                let engine = analyze(config, &file)?;
                let Some(snapshot) = engine.snapshot() else {
                    bail!("analysis produced no result");
                };
                let unit = &snapshot.unit;
                let declarations: Vec<FunctionDeclaration> = unit
                    .functions()
                    .iter()
                    .map(|entity| FunctionDeclaration::from_entity(unit, entity))
                    .collect();
                let decl = find_declaration(&declarations, &function)
                    .ok_or_else(|| anyhow!("no function named '{}'", function))?;
                println!("{}", decl);
                println!("{}", decl.ast_dump());
                Ok(())
            }
        }
    }
}

fn analyze(mut config: Config, file: &Path) -> Result<Engine> {
    config.analysis.file_name = file.display().to_string();
    let mut engine = Engine::with_config(config)?;
    engine
        .open_file(file, Instant::now())
        .with_context(|| format!("Failed to read {}", file.display()))?;
    engine.analyze_now();
    Ok(engine)
}

fn find_declaration<'a>(declarations: &'a [FunctionDeclaration], name: &str) -> Option<&'a FunctionDeclaration> {
    declarations.iter().find(|decl| {
        decl.signature() == name || decl.qualified_name() == name || decl.name() == name
    })
}

fn find_node(view: &PresentationGraph, name: &str) -> Option<NodeIndex> {
    find_declaration(view.call_graph().nodes(), name)
        .and_then(|decl| view.call_graph().node_index(decl.id()))
}

/// Indented tree of the visible part of a view, one line per node.
fn print_view(view: &PresentationGraph) {
    let Some(root) = view.root() else {
        println!("(empty call graph)");
        return;
    };
    let mut printed = HashSet::new();
    print_subtree(view, root, 0, &mut printed);
}

fn print_subtree(view: &PresentationGraph, index: NodeIndex, indent: usize, printed: &mut HashSet<NodeIndex>) {
    let (Some(decl), Some(node)) = (view.call_graph().node(index), view.node(index)) else {
        return;
    };
    let marker = if node.is_expanded() { "-" } else { "+" };
    let seen = !printed.insert(index);
    println!(
        "{}{} {} [refs {}]{}",
        "  ".repeat(indent),
        marker,
        decl.signature(),
        node.active_parents(),
        if seen { " ..." } else { "" }
    );
    if seen || !node.is_expanded() {
        return;
    }

    let mut callees: Vec<NodeIndex> = Vec::new();
    for edge in view.visible_edges().iter().filter(|edge| edge.caller == index) {
        if !callees.contains(&edge.callee) {
            callees.push(edge.callee);
        }
    }
    for callee in callees {
        print_subtree(view, callee, indent + 1, printed);
    }
}
