use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::Result;
use super::analyzer::SourceAnalyzer;
use super::call_graph::{CallGraph, CallGraphExtractor};
use super::declaration::FunctionDeclaration;
use super::differ::SourceDiffer;
use super::presentation::{FunctionFilter, PresentationGraph};
use super::semantic::{DeclId, Diagnostic, ParsedUnit};

/// Everything one analysis produced. Replaced as a whole on every rebuild.
pub struct Snapshot {
    pub unit: ParsedUnit,
    pub call_graph: Arc<CallGraph>,
    pub presentation: PresentationGraph,
    pub diagnostics: Vec<Diagnostic>,
}

/// Owns the current source text and the graphs built from it, and decides
/// when to rebuild them.
pub struct Engine {
    config: Config,
    analyzer: SourceAnalyzer,
    extractor: CallGraphExtractor,
    differ: SourceDiffer,
    source: String,
    last_edit: Option<Instant>,
    last_opened_dir: Option<PathBuf>,
    /// Signature of the root the user picked; survives rebuilds
    pinned_root: Option<String>,
    snapshot: Option<Snapshot>,
}

impl Engine {
    /// Create an engine from a configuration file, or from defaults.
    pub fn new(config_path: Option<&Path>) -> Result<Self> {
        let config = Config::load_or_default(config_path)?;
        Self::with_config(config)
    }

    pub fn with_config(config: Config) -> Result<Self> {
        config.validate()?;
        debug!("Loaded configuration: {:?}", config);

        let analyzer = SourceAnalyzer::new(&config.analysis)?;
        let extractor = CallGraphExtractor::new(config.analysis.node_inclusion);

        Ok(Self {
            config,
            analyzer,
            extractor,
            differ: SourceDiffer::new(),
            source: String::new(),
            last_edit: None,
            last_opened_dir: None,
            pinned_root: None,
            snapshot: None,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// The editor buffer changed at `now`.
    pub fn source_changed(&mut self, text: &str, now: Instant) {
        if text != self.source {
            self.source = text.to_string();
        }
        self.last_edit = Some(now);
    }

    /// Directory of the last opened file; searched for includes after the
    /// configured include paths.
    pub fn set_last_opened_dir(&mut self, dir: impl Into<PathBuf>) {
        self.last_opened_dir = Some(dir.into());
    }

    /// Load a file from disk as the current source.
    pub fn open_file(&mut self, path: &Path, now: Instant) -> Result<()> {
        let text = fs::read_to_string(path)?;
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            self.set_last_opened_dir(dir);
        }
        info!("Opened {}", path.display());
        self.source_changed(&text, now);
        Ok(())
    }

    pub fn include_paths(&self) -> Vec<PathBuf> {
        let mut paths = self.config.analysis.include_paths.clone();
        if let Some(dir) = &self.last_opened_dir {
            if !paths.contains(dir) {
                paths.push(dir.clone());
            }
        }
        paths
    }

    /// Rebuild when the debounce period has passed since the last edit and
    /// the source differs from what was last analyzed. Returns whether a
    /// rebuild happened.
    pub fn tick(&mut self, now: Instant) -> bool {
        let Some(last_edit) = self.last_edit else {
            return false;
        };
        let debounce = Duration::from_secs_f64(self.config.editor.debounce_seconds);
        if now.saturating_duration_since(last_edit) < debounce {
            return false;
        }
        if !self.differ.has_changed(&self.source) {
            return false;
        }
        self.rebuild();
        true
    }

    /// Analyze the current source immediately.
    pub fn analyze_now(&mut self) -> &Snapshot {
        self.rebuild();
        self.snapshot
            .as_ref()
            .unwrap_or_else(|| unreachable!("rebuild always stores a snapshot"))
    }

    fn rebuild(&mut self) {
        let include_paths = self.include_paths();
        let unit = self.analyzer.analyze(&self.source, &include_paths);
        let call_graph = Arc::new(self.extractor.extract(&unit));
        let mut presentation =
            PresentationGraph::build(Arc::clone(&call_graph), self.config.presentation.clone());

        if let Some(signature) = &self.pinned_root {
            if !presentation.pin_root_by_signature(signature) {
                debug!("Pinned root {} no longer exists", signature);
            }
        }

        let diagnostics = unit.diagnostics().to_vec();
        for diagnostic in &diagnostics {
            debug!("{}", diagnostic);
        }
        if unit.has_errors() {
            warn!("Analysis finished with {} diagnostics", diagnostics.len());
        }

        self.differ.mark_analyzed(&self.source);
        self.snapshot = Some(Snapshot {
            unit,
            call_graph,
            presentation,
            diagnostics,
        });
        info!(
            "Rebuilt call graph: {} functions, {} calls",
            self.functions().len(),
            self.snapshot.as_ref().map(|s| s.call_graph.edges().len()).unwrap_or(0)
        );
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    pub fn presentation(&self) -> Option<&PresentationGraph> {
        self.snapshot.as_ref().map(|s| &s.presentation)
    }

    pub fn presentation_mut(&mut self) -> Option<&mut PresentationGraph> {
        self.snapshot.as_mut().map(|s| &mut s.presentation)
    }

    /// Every function of the current call graph, visible or not.
    pub fn functions(&self) -> &[FunctionDeclaration] {
        self.snapshot
            .as_ref()
            .map(|s| s.call_graph.nodes())
            .unwrap_or_default()
    }

    pub fn filtered_functions(&self, filter: &FunctionFilter) -> Vec<&FunctionDeclaration> {
        self.functions()
            .iter()
            .filter(|decl| filter.passes(&decl.signature()))
            .collect()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        self.snapshot
            .as_ref()
            .map(|s| s.diagnostics.as_slice())
            .unwrap_or_default()
    }

    /// Make a function the root of the view. The choice is remembered by
    /// signature and re-applied after later rebuilds.
    pub fn select_function(&mut self, id: DeclId) -> bool {
        let Some(snapshot) = self.snapshot.as_mut() else {
            return false;
        };
        let Some(signature) = snapshot.call_graph.find_node_with_id(id).map(|d| d.signature()) else {
            return false;
        };
        if !snapshot.presentation.pin_root(id) {
            return false;
        }
        info!("Pinned root {}", signature);
        self.pinned_root = Some(signature);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "int helper(int x){return x+1;} int main(){return helper(5)+helper(6);}";

    fn engine() -> Engine {
        Engine::with_config(Config::default()).unwrap()
    }

    #[test]
    fn test_tick_waits_for_debounce() {
        let mut engine = engine();
        let start = Instant::now();
        assert!(!engine.tick(start));

        engine.source_changed(SOURCE, start);
        assert!(!engine.tick(start + Duration::from_millis(500)));
        assert!(engine.snapshot().is_none());

        assert!(engine.tick(start + Duration::from_secs(2)));
        assert_eq!(engine.functions().len(), 2);
    }

    #[test]
    fn test_unchanged_source_is_not_reanalyzed() {
        let mut engine = engine();
        let start = Instant::now();
        engine.source_changed(SOURCE, start);
        assert!(engine.tick(start + Duration::from_secs(3)));

        engine.source_changed(SOURCE, start + Duration::from_secs(4));
        assert!(!engine.tick(start + Duration::from_secs(10)));

        engine.source_changed("int main() { return 0; }", start + Duration::from_secs(11));
        assert!(engine.tick(start + Duration::from_secs(13)));
        assert!(engine.functions().is_empty());
    }

    #[test]
    fn test_selected_root_survives_rebuild() {
        let mut engine = engine();
        engine.source_changed(SOURCE, Instant::now());
        let helper = engine
            .analyze_now()
            .call_graph
            .nodes()
            .iter()
            .find(|d| d.name() == "helper")
            .map(|d| d.id())
            .unwrap();
        assert!(engine.select_function(helper));

        engine.source_changed(&format!("{}\n// edited", SOURCE), Instant::now());
        let snapshot = engine.analyze_now();
        let root = snapshot.presentation.root_declaration().unwrap();
        assert_eq!(root.signature(), "helper(int)");
    }

    #[test]
    fn test_select_unknown_function() {
        let mut engine = engine();
        assert!(!engine.select_function(DeclId(1)));
        engine.source_changed(SOURCE, Instant::now());
        engine.analyze_now();
        assert!(!engine.select_function(DeclId(9999)));
    }

    #[test]
    fn test_diagnostics_surface() {
        let mut engine = engine();
        engine.source_changed("int main() { return nothing(); }", Instant::now());
        engine.analyze_now();
        assert_eq!(engine.diagnostics().len(), 1);
        assert!(engine.functions().is_empty());
    }
}
