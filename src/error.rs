use thiserror::Error;

/// Main error type for callscope operations
#[derive(Error, Debug)]
pub enum CallscopeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Frontend error: {0}")]
    Frontend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Export error: {0}")]
    Export(String),
}

pub type Result<T> = std::result::Result<T, CallscopeError>;
