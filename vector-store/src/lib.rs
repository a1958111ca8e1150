//! # Vector Store
//!
//! Read-mostly bindings to the similarity-search service that holds the
//! indexed document passages.
//!
//! - [`VectorIndexClient`]: the contract the retriever queries through
//! - [`QdrantClient`]: Qdrant REST API binding
//! - [`InMemoryIndex`]: process-local index for offline runs and tests
//!
//! Query results are always ordered by descending similarity.

pub mod client;
pub mod error;
pub mod memory;
pub mod qdrant;
pub mod types;

pub use client::VectorIndexClient;
pub use error::{Result, VectorStoreError};
pub use memory::InMemoryIndex;
pub use qdrant::{DEFAULT_QDRANT_URL, QdrantClient};
pub use types::{CollectionInfo, Distance, Passage, PassageRecord, ScoredPassage};

/// Collection the ingestion step writes to.
pub const DEFAULT_COLLECTION: &str = "chat_with_docs";
