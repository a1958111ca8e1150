//! Similarity retrieval: embed the query, search the collection.

use std::sync::Arc;

use docchat_embeddings::{EmbeddingProvider, EmbeddingRequest};
use docchat_vector_store::{ScoredPassage, VectorIndexClient};
use tracing::debug;

use crate::error::Result;

/// Fetches the `k` passages nearest to a query.
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorIndexClient>,
    collection: String,
    top_k: usize,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorIndexClient>,
        collection: impl Into<String>,
        top_k: usize,
    ) -> Self {
        Self {
            embedder,
            store,
            collection: collection.into(),
            top_k,
        }
    }

    /// Return at most `top_k` passages by descending similarity.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<ScoredPassage>> {
        let embedding = self.embedder.embed(EmbeddingRequest::query(query)).await?;
        let mut hits = self
            .store
            .query(&self.collection, &embedding.embedding, self.top_k)
            .await?;

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(self.top_k);
        debug!(collection = %self.collection, hits = hits.len(), "retrieved candidates");
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use docchat_embeddings::{EmbeddingError, EmbeddingResponse};
    use docchat_vector_store::{
        CollectionInfo, InMemoryIndex, Passage, PassageRecord, VectorStoreError,
    };
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;

    use crate::error::PipelineError;

    /// Maps known words to fixed axes.
    struct KeywordEmbedder;

    #[async_trait]
    impl EmbeddingProvider for KeywordEmbedder {
        fn name(&self) -> &str {
            "keyword"
        }

        fn default_model(&self) -> &str {
            "keyword"
        }

        fn default_dimension(&self) -> usize {
            3
        }

        async fn embed(
            &self,
            request: EmbeddingRequest,
        ) -> docchat_embeddings::Result<EmbeddingResponse> {
            request.validate()?;
            let text = request.text.to_lowercase();
            let embedding = ["cat", "dog", "fish"]
                .iter()
                .map(|word| if text.contains(word) { 1.0 } else { 0.0 })
                .collect::<Vec<f32>>();
            Ok(EmbeddingResponse {
                dimension: embedding.len(),
                embedding,
                model: "keyword".to_string(),
                tokens_used: None,
            })
        }
    }

    /// Returns hits in ascending order and more than asked for.
    struct SloppyStore;

    #[async_trait]
    impl VectorIndexClient for SloppyStore {
        fn name(&self) -> &str {
            "sloppy"
        }

        async fn list_collections(&self) -> docchat_vector_store::Result<BTreeSet<String>> {
            Ok(BTreeSet::from(["docs".to_string()]))
        }

        async fn describe(&self, _: &str) -> docchat_vector_store::Result<CollectionInfo> {
            Err(VectorStoreError::InvalidResponse("unused".to_string()))
        }

        async fn query(
            &self,
            _: &str,
            _: &[f32],
            _: usize,
        ) -> docchat_vector_store::Result<Vec<ScoredPassage>> {
            Ok((0..5)
                .map(|i| ScoredPassage::new(Passage::new(i.to_string(), "t"), i as f32 / 10.0))
                .collect())
        }

        async fn upsert(&self, _: &str, _: Vec<PassageRecord>) -> docchat_vector_store::Result<()> {
            Ok(())
        }
    }

    async fn index() -> Arc<InMemoryIndex> {
        let index = InMemoryIndex::new();
        index.create_collection("docs", 3).await;
        let records = [
            ("1", "Cats sleep a lot.", vec![1.0f32, 0.0, 0.0]),
            ("2", "Dogs like walks.", vec![0.0, 1.0, 0.0]),
            ("3", "Cats and dogs.", vec![1.0, 1.0, 0.0]),
        ]
        .into_iter()
        .map(|(id, text, embedding)| PassageRecord {
            passage: Passage::new(id, text),
            embedding,
        })
        .collect();
        index.upsert("docs", records).await.unwrap();
        Arc::new(index)
    }

    #[tokio::test]
    async fn test_retrieve_returns_nearest_first() {
        let retriever = Retriever::new(Arc::new(KeywordEmbedder), index().await, "docs", 2);
        let hits = retriever.retrieve("tell me about cats").await.unwrap();

        let ids: Vec<&str> = hits.iter().map(|h| h.passage.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3"]);
    }

    #[tokio::test]
    async fn test_retrieve_is_repeatable() {
        let retriever = Retriever::new(Arc::new(KeywordEmbedder), index().await, "docs", 15);
        let first = retriever.retrieve("cats and dogs").await.unwrap();
        let second = retriever.retrieve("cats and dogs").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_store_output_is_sorted_and_capped() {
        let retriever = Retriever::new(Arc::new(KeywordEmbedder), Arc::new(SloppyStore), "docs", 3);
        let hits = retriever.retrieve("fish").await.unwrap();

        let ids: Vec<&str> = hits.iter().map(|h| h.passage.id.as_str()).collect();
        assert_eq!(ids, vec!["4", "3", "2"]);
    }

    #[tokio::test]
    async fn test_blank_query_is_embedding_error() {
        let retriever = Retriever::new(Arc::new(KeywordEmbedder), index().await, "docs", 3);
        let err = retriever.retrieve("  ").await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Embedding(EmbeddingError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_collection_is_classified() {
        let retriever = Retriever::new(Arc::new(KeywordEmbedder), index().await, "other", 3);
        let err = retriever.retrieve("cats").await.unwrap_err();
        assert!(matches!(err, PipelineError::CollectionNotFound(name) if name == "other"));
    }
}
