//! The vector index contract.

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{CollectionInfo, PassageRecord, ScoredPassage};

/// Binding to a similarity-search service.
///
/// Implementations fail with [`VectorStoreError::Connection`] when the service
/// is unreachable and [`VectorStoreError::CollectionNotFound`] when the named
/// collection is absent.
///
/// [`VectorStoreError::Connection`]: crate::VectorStoreError::Connection
/// [`VectorStoreError::CollectionNotFound`]: crate::VectorStoreError::CollectionNotFound
#[async_trait]
pub trait VectorIndexClient: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Names of all collections in the store.
    async fn list_collections(&self) -> Result<BTreeSet<String>>;

    /// Whether `collection` exists.
    async fn exists(&self, collection: &str) -> Result<bool> {
        Ok(self.list_collections().await?.contains(collection))
    }

    /// Dimension, metric and size of `collection`.
    async fn describe(&self, collection: &str) -> Result<CollectionInfo>;

    /// The `k` passages nearest to `vector`, by descending similarity.
    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredPassage>>;

    /// Insert or replace passages. Not used on the query path.
    async fn upsert(&self, collection: &str, records: Vec<PassageRecord>) -> Result<()>;
}
