//! Passage and collection types shared by all clients.

use std::collections::BTreeMap;

use docchat_embeddings::Embedding;
use serde::{Deserialize, Serialize};

/// An indexed unit of document text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    /// Point identifier in the store.
    pub id: String,

    /// Raw passage text.
    pub text: String,

    /// Source details written at ingestion (file name, page label, ...).
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Passage {
    /// Create a passage without metadata.
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A passage together with its stored vector, as written by ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassageRecord {
    pub passage: Passage,
    pub embedding: Embedding,
}

/// A passage paired with a relevance score.
///
/// The score is vector similarity when produced by a store and the
/// cross-encoder score once reranked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPassage {
    pub passage: Passage,
    pub score: f32,
}

impl ScoredPassage {
    pub fn new(passage: Passage, score: f32) -> Self {
        Self { passage, score }
    }

    /// Passage text.
    pub fn text(&self) -> &str {
        &self.passage.text
    }
}

/// Distance metric a collection was built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Distance {
    Cosine,
    Dot,
    Euclid,
    Manhattan,
}

/// Description of a stored collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionInfo {
    /// Collection name.
    pub name: String,

    /// Vector dimensionality every point shares.
    pub dimension: usize,

    /// Similarity metric.
    pub distance: Distance,

    /// Number of stored points, when the store reports it.
    pub points_count: Option<u64>,
}
