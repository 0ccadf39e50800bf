use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{CallscopeError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Source analysis configuration
    pub analysis: AnalysisConfig,

    /// Editor integration settings
    pub editor: EditorConfig,

    /// Call-graph presentation settings
    pub presentation: PresentationConfig,

    /// Output settings
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// File name assumed for in-memory sources (selects the language mode)
    pub file_name: String,

    /// Extra include directories, searched in order
    pub include_paths: Vec<PathBuf>,

    /// Which functions become call-graph nodes
    pub node_inclusion: NodeInclusion,
}

/// Node-inclusion policy for functions that take part in no resolved call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeInclusion {
    /// Only callers and callees of resolved calls become nodes
    CallParticipants,
    /// Every function defined in the unit becomes a node
    AllFunctions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Seconds without edits before the source is re-analyzed
    pub debounce_seconds: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresentationConfig {
    /// Maximum number of characters in a node label
    pub display_name_length: usize,

    /// Distance of the first layer from the top of the viewport
    pub top_distance: f32,

    /// Distance of the root column from the left of the viewport
    pub left_distance: f32,

    /// Smallest node edge length the zoom can reach
    pub node_min_size: f32,

    /// Node spacing as a multiple of the node size
    pub spacing_factor: f32,

    /// Scroll step per key press
    pub scroll_speed: f32,

    /// Percent of node size changed per wheel notch
    pub zoom_speed: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Default output format (text, dot, json)
    pub format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            analysis: AnalysisConfig::default(),
            editor: EditorConfig::default(),
            presentation: PresentationConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: "text".to_string(),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            file_name: "main.cpp".to_string(),
            include_paths: Vec::new(),
            node_inclusion: NodeInclusion::CallParticipants,
        }
    }
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self { debounce_seconds: 2.0 }
    }
}

impl Default for PresentationConfig {
    fn default() -> Self {
        Self {
            display_name_length: 10,
            top_distance: 40.0,
            left_distance: 25.0,
            node_min_size: 60.0,
            spacing_factor: 1.5,
            scroll_speed: 10.0,
            zoom_speed: 5.0,
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| CallscopeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| CallscopeError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load configuration with fallback to default
    pub fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        match path {
            Some(p) => {
                if p.as_ref().exists() {
                    Self::load(p)
                } else {
                    Ok(Self::default())
                }
            }
            None => {
                let candidates = [
                    "Callscope.toml",
                    "callscope.toml",
                    ".callscope.toml",
                ];

                for candidate in &candidates {
                    if Path::new(candidate).exists() {
                        return Self::load(candidate);
                    }
                }

                Ok(Self::default())
            }
        }
    }

    /// Reject values no component can work with.
    pub fn validate(&self) -> Result<()> {
        if !self.editor.debounce_seconds.is_finite() || self.editor.debounce_seconds < 0.0 {
            return Err(CallscopeError::Config(
                "editor.debounce_seconds must be a finite, non-negative number".to_string(),
            ));
        }
        if self.presentation.node_min_size <= 0.0 {
            return Err(CallscopeError::Config(
                "presentation.node_min_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
