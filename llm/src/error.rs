//! Error types for generation providers.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for generation operations.
pub type Result<T> = std::result::Result<T, GenerationError>;

/// Errors that can occur while generating an answer.
#[derive(Error, Debug)]
pub enum GenerationError {
    /// Provider is missing credentials.
    #[error("generation provider not configured: {0}")]
    NotConfigured(String),

    /// The model server could not be reached.
    #[error("model server unreachable: {0}")]
    Connection(String),

    /// The server does not have the requested model.
    #[error("model '{0}' is not available on the server")]
    ModelNotFound(String),

    /// The request exceeded its time budget.
    #[error("generation timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// The server answered with a non-success status.
    #[error("generation request failed ({status}): {body}")]
    Api { status: u16, body: String },

    /// The server answered without any text.
    #[error("model returned an empty response")]
    EmptyResponse,

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP error.
    #[error("http error: {0}")]
    Http(reqwest::Error),
}

impl GenerationError {
    /// Classify a transport failure, reporting timeouts against `budget`.
    pub fn from_transport(err: reqwest::Error, budget: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout(budget)
        } else if err.is_connect() {
            Self::Connection(err.to_string())
        } else {
            Self::Http(err)
        }
    }
}
