//! Error types for the change model.

use thiserror::Error;

/// Errors raised while building changes, assigning orders or patching values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Ordering unavailable: {0}")]
    OrderingUnavailable(String),

    #[error("Invalid key path: {0}")]
    InvalidKeyPath(String),

    #[error("Type mismatch at {path}: expected {expected}")]
    TypeMismatch { path: String, expected: String },

    #[error("Invalid change set: {0}")]
    InvalidChangeSet(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
