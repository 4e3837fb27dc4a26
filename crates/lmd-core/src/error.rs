//! Error types for lmd.

use thiserror::Error;

/// lmd error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Incompatible data format: {0}")]
    Format(String),

    #[error("Cannot read document {path}: {source}")]
    Document {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("IPC error: {0}")]
    Ipc(String),
}

/// Result type alias for lmd operations.
pub type Result<T> = std::result::Result<T, Error>;
