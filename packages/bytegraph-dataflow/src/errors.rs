//! Error types for bytegraph-dataflow
//!
//! Provides unified error handling across the crate.

use thiserror::Error;

/// Main error type for dataflow engine operations
#[derive(Debug, Error)]
pub enum EngineError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error (rejected before any analysis starts)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Resolution error (unknown class/method referenced by a rule)
    #[error("Resolution error: {0}")]
    Resolution(String),

    /// Internal invariant violation (fatal; aborts the run)
    #[error("Invariant violation: {0}")]
    Invariant(String),

    /// Analysis aborted (deadline or runner failure)
    #[error("Analysis aborted: {0}")]
    Aborted(String),
}

impl EngineError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        EngineError::Config(msg.into())
    }

    /// Create a resolution error
    pub fn resolution(msg: impl Into<String>) -> Self {
        EngineError::Resolution(msg.into())
    }

    /// Create an invariant violation
    pub fn invariant(msg: impl Into<String>) -> Self {
        EngineError::Invariant(msg.into())
    }
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
