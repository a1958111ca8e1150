//! # Embeddings
//!
//! Turns text into dense vectors for DocChat's similarity search.
//!
//! ## Features
//!
//! - **Embedding Generation**: query and passage text to fixed-dimension vectors
//! - **Multiple Providers**: text-embeddings-inference servers and OpenAI-compatible APIs
//! - **Similarity Math**: cosine similarity and top-k selection for in-process indexes
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Embeddings System                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  EmbeddingRequest ──► EmbeddingProvider ──► EmbeddingResponse   │
//! │                            │                                    │
//! │                            ▼                                    │
//! │                   TeiProvider / OpenAIProvider                  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A collection is only searchable with vectors from the model that built it.
//! Providers report their dimension so callers can check that up front.

pub mod error;
pub mod provider;
pub mod similarity;
pub mod tei;

pub use error::{EmbeddingError, Result};
pub use provider::{
    EmbeddingProvider, EmbeddingPurpose, EmbeddingRequest, EmbeddingResponse, OpenAIProvider,
};
pub use similarity::{SimilarityResult, cosine_similarity, find_top_k};
pub use tei::{BGE_QUERY_INSTRUCTION, TeiProvider, default_query_instruction};

/// A dense vector embedding.
pub type Embedding = Vec<f32>;

/// Model used to build the default document collection.
pub const DEFAULT_EMBEDDING_MODEL: &str = "BAAI/bge-large-en-v1.5";

/// Dimension of [`DEFAULT_EMBEDDING_MODEL`] vectors.
pub const DEFAULT_DIMENSION: usize = 1024;
