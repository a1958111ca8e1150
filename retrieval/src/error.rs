//! Error types for the query pipeline.

use std::fmt;
use std::time::Duration;

use docchat_embeddings::EmbeddingError;
use docchat_llm::GenerationError;
use docchat_vector_store::VectorStoreError;
use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// A model-backed component loaded during `connect()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Embedding,
    Reranker,
    Generation,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Embedding => "embedding",
            Self::Reranker => "reranker",
            Self::Generation => "generation",
        })
    }
}

/// A step of the pipeline that runs under its own time budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Connect,
    Retrieval,
    Rerank,
    Generation,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connect => "connection",
            Self::Retrieval => "retrieval",
            Self::Rerank => "reranking",
            Self::Generation => "generation",
        })
    }
}

/// Errors raised by the reranking stage.
#[derive(Error, Debug)]
pub enum RerankError {
    /// The reranking service could not be reached.
    #[error("reranker unreachable: {0}")]
    Connection(String),

    /// The service answered with a non-success status.
    #[error("rerank request failed ({status}): {body}")]
    Api { status: u16, body: String },

    /// The service answered with scores we could not apply.
    #[error("invalid rerank response: {0}")]
    InvalidResponse(String),

    /// HTTP error.
    #[error("http error: {0}")]
    Http(reqwest::Error),
}

impl From<reqwest::Error> for RerankError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            Self::Connection(err.to_string())
        } else {
            Self::Http(err)
        }
    }
}

/// Errors that can occur in the query pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The vector store could not be reached.
    #[error("cannot reach the vector store: {0}")]
    Connection(String),

    /// The target collection does not exist; ingestion has not run.
    #[error("Collection '{0}' not found in the vector store")]
    CollectionNotFound(String),

    /// A model-backed component failed to initialize.
    #[error("failed to load {component} model: {message}")]
    ModelLoad { component: Component, message: String },

    /// Query embeddings would not be comparable with the stored vectors.
    #[error(
        "embedding model produces {actual}-dimensional vectors but collection '{collection}' stores {expected}"
    )]
    DimensionMismatch {
        collection: String,
        expected: usize,
        actual: usize,
    },

    /// Query embedding failed.
    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    /// Similarity search failed.
    #[error("retrieval failed: {0}")]
    Retrieval(VectorStoreError),

    /// Reranking failed.
    #[error("reranking failed: {0}")]
    Rerank(#[from] RerankError),

    /// Answer generation failed.
    #[error("generation failed: {0}")]
    Generation(GenerationError),

    /// A stage exceeded its time budget.
    #[error("{stage} timed out after {}s", .budget.as_secs_f32())]
    Timeout { stage: Stage, budget: Duration },

    /// A query was issued while the pipeline is disconnected.
    #[error("not connected to the knowledge base")]
    NotReady,

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    pub(crate) fn model_load(component: Component, err: impl fmt::Display) -> Self {
        Self::ModelLoad {
            component,
            message: err.to_string(),
        }
    }
}

impl From<VectorStoreError> for PipelineError {
    fn from(err: VectorStoreError) -> Self {
        match err {
            VectorStoreError::Connection(message) => Self::Connection(message),
            VectorStoreError::CollectionNotFound(name) => Self::CollectionNotFound(name),
            other => Self::Retrieval(other),
        }
    }
}

impl From<GenerationError> for PipelineError {
    fn from(err: GenerationError) -> Self {
        match err {
            GenerationError::Timeout(budget) => Self::Timeout {
                stage: Stage::Generation,
                budget,
            },
            other => Self::Generation(other),
        }
    }
}
