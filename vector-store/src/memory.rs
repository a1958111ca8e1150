//! Process-local vector index.
//!
//! Holds collections in memory and answers queries by exhaustive cosine
//! similarity. Useful for offline runs and for exercising the pipeline
//! without a Qdrant server.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use docchat_embeddings::{Embedding, find_top_k};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::client::VectorIndexClient;
use crate::error::{Result, VectorStoreError};
use crate::types::{CollectionInfo, Distance, Passage, PassageRecord, ScoredPassage};

struct MemoryCollection {
    dimension: usize,
    points: BTreeMap<String, (Passage, Embedding)>,
}

/// An in-memory [`VectorIndexClient`].
#[derive(Default)]
pub struct InMemoryIndex {
    collections: RwLock<BTreeMap<String, MemoryCollection>>,
}

impl InMemoryIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or reset) a collection of `dimension`-sized vectors.
    pub async fn create_collection(&self, name: impl Into<String>, dimension: usize) {
        let name = name.into();
        info!(collection = %name, dimension, "creating in-memory collection");
        self.collections.write().await.insert(
            name,
            MemoryCollection {
                dimension,
                points: BTreeMap::new(),
            },
        );
    }

    /// Drop a collection and every passage in it.
    pub async fn delete_collection(&self, name: &str) -> bool {
        self.collections.write().await.remove(name).is_some()
    }
}

#[async_trait]
impl VectorIndexClient for InMemoryIndex {
    fn name(&self) -> &str {
        "memory"
    }

    async fn list_collections(&self) -> Result<BTreeSet<String>> {
        Ok(self.collections.read().await.keys().cloned().collect())
    }

    async fn describe(&self, collection: &str) -> Result<CollectionInfo> {
        let collections = self.collections.read().await;
        let stored = collections
            .get(collection)
            .ok_or_else(|| VectorStoreError::CollectionNotFound(collection.to_string()))?;
        Ok(CollectionInfo {
            name: collection.to_string(),
            dimension: stored.dimension,
            distance: Distance::Cosine,
            points_count: Some(stored.points.len() as u64),
        })
    }

    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredPassage>> {
        let collections = self.collections.read().await;
        let stored = collections
            .get(collection)
            .ok_or_else(|| VectorStoreError::CollectionNotFound(collection.to_string()))?;
        if vector.len() != stored.dimension {
            return Err(VectorStoreError::DimensionMismatch {
                expected: stored.dimension,
                actual: vector.len(),
            });
        }

        let candidates = stored
            .points
            .iter()
            .map(|(id, (_, embedding))| (id.as_str(), embedding.as_slice()));
        let top = find_top_k(vector, candidates, k, f32::MIN)
            .map_err(|e| VectorStoreError::InvalidResponse(e.to_string()))?;
        debug!(collection, hits = top.len(), "in-memory search complete");

        Ok(top
            .into_iter()
            .filter_map(|hit| {
                stored
                    .points
                    .get(&hit.id)
                    .map(|(passage, _)| ScoredPassage::new(passage.clone(), hit.score))
            })
            .collect())
    }

    async fn upsert(&self, collection: &str, records: Vec<PassageRecord>) -> Result<()> {
        let mut collections = self.collections.write().await;
        let stored = collections
            .get_mut(collection)
            .ok_or_else(|| VectorStoreError::CollectionNotFound(collection.to_string()))?;

        if let Some(bad) = records.iter().find(|r| r.embedding.len() != stored.dimension) {
            return Err(VectorStoreError::DimensionMismatch {
                expected: stored.dimension,
                actual: bad.embedding.len(),
            });
        }
        for record in records {
            stored
                .points
                .insert(record.passage.id.clone(), (record.passage, record.embedding));
        }
        Ok(())
    }
}
