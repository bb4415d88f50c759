//! Error types for the store layer.

use tessera_core::CoreError;
use thiserror::Error;

/// Errors surfaced by transactions, handlers and backends.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The persistence layer cannot be reached. Retry with a fresh transaction.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// No total-order position can be established. Retry with a fresh transaction.
    #[error("Ordering unavailable: {0}")]
    OrderingUnavailable(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Document not found: {0}")]
    NotFound(String),

    /// A change set id was reused with different content.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Transaction already finished")]
    TransactionClosed,

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Whether the whole operation may be retried.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::StoreUnavailable(_) | StoreError::OrderingUnavailable(_)
        )
    }
}

impl From<CoreError> for StoreError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::OrderingUnavailable(msg) => StoreError::OrderingUnavailable(msg),
            CoreError::Serialization(msg) => StoreError::Serialization(msg),
            other => StoreError::ValidationFailed(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
