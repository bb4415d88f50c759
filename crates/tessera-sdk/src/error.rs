//! Error types for the tessera SDK.

use tessera_store::StoreError;
use thiserror::Error;

/// Error type for SDK operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SdkError {
    /// A store, transaction or handler error.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The replay worker has stopped.
    #[error("Replay queue closed")]
    ReplayQueueClosed,

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl SdkError {
    /// Whether the operation may be retried.
    pub fn is_transient(&self) -> bool {
        match self {
            SdkError::Store(err) => err.is_transient(),
            _ => false,
        }
    }

    /// The underlying store error, if any.
    pub fn as_store(&self) -> Option<&StoreError> {
        match self {
            SdkError::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<tessera_core::CoreError> for SdkError {
    fn from(err: tessera_core::CoreError) -> Self {
        SdkError::Store(err.into())
    }
}

impl From<serde_json::Error> for SdkError {
    fn from(err: serde_json::Error) -> Self {
        SdkError::Serialization(err.to_string())
    }
}

/// Result type for SDK operations.
pub type Result<T> = std::result::Result<T, SdkError>;
