//! Error types for the Parley core library.

use thiserror::Error;

/// Top-level error type for all Parley core operations.
#[derive(Error, Debug)]
pub enum ParleyError {
    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A record key cannot be mapped onto storage safely.
    #[error("Invalid record key: {0:?}")]
    InvalidKey(String),

    /// A memory override carried a value of the wrong shape.
    #[error("Invalid memory override for '{field}': {reason}")]
    InvalidOverride {
        /// Which override key was rejected.
        field: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for ParleyError {
    fn from(err: serde_json::Error) -> Self {
        ParleyError::Serialization(err.to_string())
    }
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, ParleyError>;
