//! Error types for vector store clients.

use thiserror::Error;

/// Result type alias for vector store operations.
pub type Result<T> = std::result::Result<T, VectorStoreError>;

/// Errors that can occur while talking to a vector store.
#[derive(Error, Debug)]
pub enum VectorStoreError {
    /// The store could not be reached.
    #[error("vector store unreachable: {0}")]
    Connection(String),

    /// The named collection does not exist.
    #[error("collection '{0}' not found")]
    CollectionNotFound(String),

    /// Vector length does not match the collection.
    #[error("dimension mismatch: collection expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The store answered with a non-success status.
    #[error("vector store request failed ({status}): {body}")]
    Api { status: u16, body: String },

    /// The store answered with something we could not interpret.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP error.
    #[error("http error: {0}")]
    Http(reqwest::Error),
}

impl From<reqwest::Error> for VectorStoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            Self::Connection(err.to_string())
        } else {
            Self::Http(err)
        }
    }
}
