//! Error types for the delta calculator.
//!
//! Graph failures pass through unchanged so a transform error reaches the
//! caller exactly as the transformer reported it.

use fob_delta_graph::GraphError;
use thiserror::Error;

/// Top-level error type of this crate.
#[derive(Debug, Error)]
pub enum DeltaError {
    /// Traversal failures: transform, resolution or consistency errors.
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Rejected at construction time.
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File watching errors
    #[cfg(feature = "watch")]
    #[error("File watcher error: {0}")]
    Watch(#[from] notify::Error),
}

impl DeltaError {
    /// Whether the failure is a bug in the graph rather than in user code.
    pub fn is_internal(&self) -> bool {
        matches!(self, DeltaError::Graph(err) if err.is_internal())
    }
}

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A source could not be read or did not match the expected shape.
    #[error("{0}")]
    Extract(Box<figment::Error>),

    #[error("Invalid value for '{field}': {value}\n  Hint: {hint}")]
    InvalidValue {
        field: String,
        value: String,
        hint: String,
    },
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Extract(Box::new(err))
    }
}

/// Result type alias for delta operations.
pub type Result<T> = std::result::Result<T, DeltaError>;
