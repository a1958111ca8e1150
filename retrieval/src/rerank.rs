//! Cross-encoder reranking of retrieved passages.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use docchat_vector_store::ScoredPassage;

use crate::config::{DEFAULT_RERANK_MODEL, DEFAULT_TEI_RERANK_URL};
use crate::error::RerankError;

/// Rescores candidates against the query and keeps the best few.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Get the name of this reranker.
    fn name(&self) -> &str;

    /// Model doing the scoring.
    fn model(&self) -> &str;

    /// Check that the scoring model is ready to serve.
    async fn load(&self) -> Result<(), RerankError>;

    /// Return at most `top_n` of `candidates`, ordered by descending
    /// relevance to `query`. Scores in the output are rerank scores.
    async fn rerank(
        &self,
        query: &str,
        candidates: Vec<ScoredPassage>,
        top_n: usize,
    ) -> Result<Vec<ScoredPassage>, RerankError>;
}

/// A score for the candidate at `index` of the request.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct RerankScore {
    pub index: usize,
    pub score: f32,
}

/// Apply `scores` to `candidates` and keep the `top_n` best.
///
/// Candidates without a score are dropped. Equal scores keep the original
/// candidate order.
pub fn order_by_scores(
    candidates: Vec<ScoredPassage>,
    scores: Vec<RerankScore>,
    top_n: usize,
) -> Result<Vec<ScoredPassage>, RerankError> {
    let count = candidates.len();
    let mut slots: Vec<Option<ScoredPassage>> = candidates.into_iter().map(Some).collect();
    let mut ranked = Vec::with_capacity(scores.len());

    for RerankScore { index, score } in scores {
        if index >= count {
            return Err(RerankError::InvalidResponse(format!(
                "score for candidate {index} but only {count} were sent"
            )));
        }
        let Some(mut passage) = slots.get_mut(index).and_then(Option::take) else {
            return Err(RerankError::InvalidResponse(format!(
                "candidate {index} scored twice"
            )));
        };
        passage.score = score;
        ranked.push((index, passage));
    }

    ranked.sort_by(|(ia, a), (ib, b)| b.score.total_cmp(&a.score).then(ia.cmp(ib)));
    ranked.truncate(top_n);
    Ok(ranked.into_iter().map(|(_, passage)| passage).collect())
}

/// Reranker backed by a text-embeddings-inference server running a
/// cross-encoder (`POST /rerank`).
pub struct TeiReranker {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl TeiReranker {
    /// Create a reranker for the server at `base_url` serving `model`.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            client: reqwest::Client::new(),
        }
    }

    async fn error_for(response: reqwest::Response) -> RerankError {
        RerankError::Api {
            status: response.status().as_u16(),
            body: response.text().await.unwrap_or_default(),
        }
    }
}

impl Default for TeiReranker {
    fn default() -> Self {
        Self::new(DEFAULT_TEI_RERANK_URL, DEFAULT_RERANK_MODEL)
    }
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    texts: Vec<&'a str>,
    raw_scores: bool,
    truncate: bool,
}

#[derive(Deserialize)]
struct InfoResponse {
    #[serde(default)]
    model_id: Option<String>,
    #[serde(default)]
    model_type: Option<Value>,
}

#[async_trait]
impl Reranker for TeiReranker {
    fn name(&self) -> &str {
        "tei"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn load(&self) -> Result<(), RerankError> {
        let response = self
            .client
            .get(format!("{}/info", self.base_url))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::error_for(response).await);
        }

        let info: InfoResponse = response.json().await?;
        if let Some(model_type) = &info.model_type
            && model_type.get("reranker").is_none()
        {
            return Err(RerankError::InvalidResponse(format!(
                "{} does not serve a reranking model",
                self.base_url
            )));
        }
        match info.model_id.as_deref() {
            Some(served) if served != self.model => {
                warn!(configured = %self.model, served, "reranker serves a different model");
            }
            _ => info!(model = %self.model, "reranker ready"),
        }
        Ok(())
    }

    async fn rerank(
        &self,
        query: &str,
        candidates: Vec<ScoredPassage>,
        top_n: usize,
    ) -> Result<Vec<ScoredPassage>, RerankError> {
        if candidates.is_empty() || top_n == 0 {
            return Ok(Vec::new());
        }
        debug!(candidates = candidates.len(), top_n, "reranking via TEI");

        let request = RerankRequest {
            query,
            texts: candidates.iter().map(ScoredPassage::text).collect(),
            raw_scores: false,
            truncate: true,
        };
        let response = self
            .client
            .post(format!("{}/rerank", self.base_url))
            .json(&request)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::error_for(response).await);
        }

        let scores: Vec<RerankScore> = response.json().await?;
        order_by_scores(candidates, scores, top_n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docchat_vector_store::Passage;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn candidates() -> Vec<ScoredPassage> {
        vec![
            ScoredPassage::new(Passage::new("p1", "Paris is the capital of France."), 0.80),
            ScoredPassage::new(Passage::new("p2", "France borders Spain."), 0.75),
            ScoredPassage::new(Passage::new("p3", "The Eiffel Tower is in Paris."), 0.70),
        ]
    }

    fn ids(passages: &[ScoredPassage]) -> Vec<&str> {
        passages.iter().map(|p| p.passage.id.as_str()).collect()
    }

    fn score(index: usize, score: f32) -> RerankScore {
        RerankScore { index, score }
    }

    #[test]
    fn test_order_by_scores_sorts_and_truncates() {
        let ranked = order_by_scores(
            candidates(),
            vec![score(1, 0.2), score(0, 0.9), score(2, 0.5)],
            2,
        )
        .unwrap();
        assert_eq!(ids(&ranked), vec!["p1", "p3"]);
        assert_eq!(ranked[0].score, 0.9);
        assert_eq!(ranked[1].score, 0.5);
    }

    #[test]
    fn test_order_by_scores_ties_keep_candidate_order() {
        let ranked = order_by_scores(
            candidates(),
            vec![score(2, 0.5), score(0, 0.5), score(1, 0.5)],
            5,
        )
        .unwrap();
        assert_eq!(ids(&ranked), vec!["p1", "p2", "p3"]);
    }

    #[test]
    fn test_order_by_scores_rejects_bad_indices() {
        let err = order_by_scores(candidates(), vec![score(3, 0.1)], 5).unwrap_err();
        assert!(matches!(err, RerankError::InvalidResponse(_)));

        let err = order_by_scores(candidates(), vec![score(0, 0.1), score(0, 0.2)], 5).unwrap_err();
        assert!(matches!(err, RerankError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_rerank_posts_candidate_texts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rerank"))
            .and(body_json(serde_json::json!({
                "query": "capital of France",
                "texts": [
                    "Paris is the capital of France.",
                    "France borders Spain.",
                    "The Eiffel Tower is in Paris."
                ],
                "raw_scores": false,
                "truncate": true
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"index": 0, "score": 0.98},
                {"index": 2, "score": 0.41},
                {"index": 1, "score": 0.03}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let reranker = TeiReranker::new(server.uri(), DEFAULT_RERANK_MODEL);
        let ranked = reranker
            .rerank("capital of France", candidates(), 2)
            .await
            .unwrap();
        assert_eq!(ids(&ranked), vec!["p1", "p3"]);
    }

    #[tokio::test]
    async fn test_empty_candidates_skip_the_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rerank"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let reranker = TeiReranker::new(server.uri(), DEFAULT_RERANK_MODEL);
        assert!(reranker.rerank("q", Vec::new(), 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_server_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rerank"))
            .respond_with(ResponseTemplate::new(424).set_body_string("model not loaded"))
            .mount(&server)
            .await;

        let reranker = TeiReranker::new(server.uri(), DEFAULT_RERANK_MODEL);
        let err = reranker.rerank("q", candidates(), 5).await.unwrap_err();
        assert!(matches!(err, RerankError::Api { status: 424, .. }));
    }

    #[tokio::test]
    async fn test_load_requires_reranking_model() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/info"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model_id": "BAAI/bge-large-en-v1.5",
                "model_type": {"embedding": {"pooling": "cls"}}
            })))
            .mount(&server)
            .await;

        let reranker = TeiReranker::new(server.uri(), DEFAULT_RERANK_MODEL);
        assert!(matches!(
            reranker.load().await.unwrap_err(),
            RerankError::InvalidResponse(_)
        ));
    }

    #[tokio::test]
    async fn test_load_accepts_reranker() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/info"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model_id": "cross-encoder/ms-marco-MiniLM-L-2-v2",
                "model_type": {"reranker": {"id2label": {"0": "LABEL_0"}}}
            })))
            .mount(&server)
            .await;

        TeiReranker::new(server.uri(), DEFAULT_RERANK_MODEL)
            .load()
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_server_is_connection_error() {
        let reranker = TeiReranker::new("http://127.0.0.1:9", DEFAULT_RERANK_MODEL);
        assert!(matches!(
            reranker.load().await.unwrap_err(),
            RerankError::Connection(_)
        ));
    }
}
