//! Qdrant REST API client.
//!
//! Only the calls the query path needs are bound: listing and describing
//! collections, nearest-neighbour search, and a point upsert for tooling.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::client::VectorIndexClient;
use crate::error::{Result, VectorStoreError};
use crate::types::{CollectionInfo, Distance, Passage, PassageRecord, ScoredPassage};

/// Where a local Qdrant listens by default.
pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6333";

/// Payload key that LlamaIndex serializes the whole node into.
const NODE_CONTENT_KEY: &str = "_node_content";

/// Client for a Qdrant server.
pub struct QdrantClient {
    base_url: String,
    client: reqwest::Client,
    api_key: Option<String>,
    vector_name: Option<String>,
    /// Sole named vector found by `describe` when none was configured.
    resolved_vector: OnceLock<String>,
    text_key: String,
}

impl QdrantClient {
    /// Create a client for the server at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            api_key: None,
            vector_name: None,
            resolved_vector: OnceLock::new(),
            text_key: "text".to_string(),
        }
    }

    /// Send `api-key` with every request.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Search a named vector instead of the default one.
    pub fn with_vector_name(mut self, name: impl Into<String>) -> Self {
        self.vector_name = Some(name.into());
        self
    }

    /// Payload key holding passage text.
    pub fn with_text_key(mut self, key: impl Into<String>) -> Self {
        self.text_key = key.into();
        self
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{path}", self.base_url));
        match &self.api_key {
            Some(key) => builder.header("api-key", key),
            None => builder,
        }
    }

    /// Send a request and unwrap Qdrant's `{"result": ...}` envelope.
    ///
    /// A 404 is reported as a missing `collection` when one is given.
    async fn send<T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
        collection: Option<&str>,
    ) -> Result<T> {
        let response = builder.send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            if let Some(name) = collection {
                return Err(VectorStoreError::CollectionNotFound(name.to_string()));
            }
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VectorStoreError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: QdrantResponse<T> = response
            .json()
            .await
            .map_err(|e| VectorStoreError::InvalidResponse(e.to_string()))?;
        Ok(envelope.result)
    }

    fn passage_from_point(&self, point: ScoredPoint) -> ScoredPassage {
        let payload = point.payload.unwrap_or_default();
        let text = extract_text(&payload, &self.text_key);
        let metadata = payload
            .iter()
            .filter(|(key, _)| key.as_str() != self.text_key && key.as_str() != NODE_CONTENT_KEY)
            .filter_map(|(key, value)| scalar_to_string(value).map(|v| (key.clone(), v)))
            .collect::<BTreeMap<_, _>>();

        ScoredPassage::new(
            Passage {
                id: point.id.to_string(),
                text,
                metadata,
            },
            point.score,
        )
    }

    fn vector_body(&self, vector: &[f32]) -> Value {
        let name = self
            .vector_name
            .as_deref()
            .or_else(|| self.resolved_vector.get().map(String::as_str));
        match name {
            Some(name) => serde_json::json!({ "name": name, "vector": vector }),
            None => serde_json::json!(vector),
        }
    }
}

impl Default for QdrantClient {
    fn default() -> Self {
        Self::new(DEFAULT_QDRANT_URL)
    }
}

#[async_trait]
impl VectorIndexClient for QdrantClient {
    fn name(&self) -> &str {
        "qdrant"
    }

    async fn list_collections(&self) -> Result<BTreeSet<String>> {
        let result: CollectionsResult = self
            .send(self.request(reqwest::Method::GET, "/collections"), None)
            .await?;
        debug!(count = result.collections.len(), "listed Qdrant collections");
        Ok(result.collections.into_iter().map(|c| c.name).collect())
    }

    async fn describe(&self, collection: &str) -> Result<CollectionInfo> {
        let path = format!("/collections/{collection}");
        let info: CollectionInfoResult = self
            .send(self.request(reqwest::Method::GET, &path), Some(collection))
            .await?;

        let params = match info.config.params.vectors {
            VectorsConfig::Single(params) => params,
            VectorsConfig::Named(mut named) => {
                let chosen = match &self.vector_name {
                    Some(name) => named.remove(name),
                    None if named.len() == 1 => named.into_iter().next().map(|(name, params)| {
                        debug!(collection, vector = %name, "using the only named vector");
                        let _ = self.resolved_vector.set(name);
                        params
                    }),
                    None => None,
                };
                chosen.ok_or_else(|| {
                    VectorStoreError::InvalidResponse(format!(
                        "collection '{collection}' has named vectors; configure which one to search"
                    ))
                })?
            }
        };

        Ok(CollectionInfo {
            name: collection.to_string(),
            dimension: params.size,
            distance: params.distance,
            points_count: info.points_count,
        })
    }

    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredPassage>> {
        let path = format!("/collections/{collection}/points/search");
        let body = serde_json::json!({
            "vector": self.vector_body(vector),
            "limit": k,
            "with_payload": true,
        });
        let points: Vec<ScoredPoint> = self
            .send(
                self.request(reqwest::Method::POST, &path).json(&body),
                Some(collection),
            )
            .await?;
        debug!(collection, hits = points.len(), "Qdrant search complete");

        Ok(points
            .into_iter()
            .map(|point| self.passage_from_point(point))
            .collect())
    }

    async fn upsert(&self, collection: &str, records: Vec<PassageRecord>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let count = records.len();
        let points: Vec<Value> = records
            .into_iter()
            .map(|record| {
                let mut payload = Map::new();
                payload.insert(self.text_key.clone(), Value::String(record.passage.text));
                for (key, value) in record.passage.metadata {
                    payload.insert(key, Value::String(value));
                }
                serde_json::json!({
                    "id": PointId::from_str_lossless(&record.passage.id),
                    "vector": self.vector_body(&record.embedding),
                    "payload": payload,
                })
            })
            .collect();

        let path = format!("/collections/{collection}/points?wait=true");
        let _: Value = self
            .send(
                self.request(reqwest::Method::PUT, &path)
                    .json(&serde_json::json!({ "points": points })),
                Some(collection),
            )
            .await?;
        info!(collection, count, "upserted points into Qdrant");
        Ok(())
    }
}

/// Passage text from a point payload.
///
/// The configured key wins; otherwise the text is read out of a serialized
/// LlamaIndex node. Missing text yields an empty string.
fn extract_text(payload: &Map<String, Value>, text_key: &str) -> String {
    if let Some(Value::String(text)) = payload.get(text_key) {
        return text.clone();
    }
    payload
        .get(NODE_CONTENT_KEY)
        .and_then(Value::as_str)
        .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
        .and_then(|node| node.get("text").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_default()
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct QdrantResponse<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct CollectionsResult {
    collections: Vec<CollectionDescription>,
}

#[derive(Debug, Deserialize)]
struct CollectionDescription {
    name: String,
}

#[derive(Debug, Deserialize)]
struct CollectionInfoResult {
    #[serde(default)]
    points_count: Option<u64>,
    config: CollectionConfig,
}

#[derive(Debug, Deserialize)]
struct CollectionConfig {
    params: CollectionParams,
}

#[derive(Debug, Deserialize)]
struct CollectionParams {
    vectors: VectorsConfig,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum VectorsConfig {
    Single(VectorParams),
    Named(BTreeMap<String, VectorParams>),
}

#[derive(Debug, Deserialize)]
struct VectorParams {
    size: usize,
    distance: Distance,
}

#[derive(Debug, Deserialize)]
struct ScoredPoint {
    id: PointId,
    score: f32,
    #[serde(default)]
    payload: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum PointId {
    Num(u64),
    Uuid(String),
}

impl PointId {
    fn from_str_lossless(id: &str) -> Self {
        id.parse::<u64>().map_or_else(|_| Self::Uuid(id.to_string()), Self::Num)
    }
}

impl std::fmt::Display for PointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Num(n) => write!(f, "{n}"),
            Self::Uuid(s) => f.write_str(s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ok(result: Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "result": result,
            "status": "ok",
            "time": 0.001
        }))
    }

    #[tokio::test]
    async fn test_list_and_exists() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/collections"))
            .respond_with(ok(serde_json::json!({
                "collections": [{"name": "chat_with_docs"}, {"name": "other"}]
            })))
            .mount(&server)
            .await;

        let client = QdrantClient::new(server.uri());
        let names = client.list_collections().await.unwrap();

        assert_eq!(
            names.into_iter().collect::<Vec<_>>(),
            vec!["chat_with_docs".to_string(), "other".to_string()]
        );
        assert!(client.exists("chat_with_docs").await.unwrap());
        assert!(!client.exists("missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_api_key_header_is_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/collections"))
            .and(header("api-key", "secret"))
            .respond_with(ok(serde_json::json!({ "collections": [] })))
            .expect(1)
            .mount(&server)
            .await;

        let client = QdrantClient::new(server.uri()).with_api_key("secret");
        assert!(client.list_collections().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_describe_single_vector_collection() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/collections/chat_with_docs"))
            .respond_with(ok(serde_json::json!({
                "status": "green",
                "points_count": 42,
                "config": {"params": {"vectors": {"size": 1024, "distance": "Cosine"}}}
            })))
            .mount(&server)
            .await;

        let info = QdrantClient::new(server.uri())
            .describe("chat_with_docs")
            .await
            .unwrap();

        assert_eq!(
            info,
            CollectionInfo {
                name: "chat_with_docs".to_string(),
                dimension: 1024,
                distance: Distance::Cosine,
                points_count: Some(42),
            }
        );
    }

    #[tokio::test]
    async fn test_describe_named_vectors_requires_choice() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/collections/multi"))
            .respond_with(ok(serde_json::json!({
                "config": {"params": {"vectors": {
                    "dense": {"size": 384, "distance": "Dot"},
                    "title": {"size": 768, "distance": "Cosine"}
                }}}
            })))
            .mount(&server)
            .await;

        let err = QdrantClient::new(server.uri())
            .describe("multi")
            .await
            .unwrap_err();
        assert!(matches!(err, VectorStoreError::InvalidResponse(_)));

        let info = QdrantClient::new(server.uri())
            .with_vector_name("dense")
            .describe("multi")
            .await
            .unwrap();
        assert_eq!(info.dimension, 384);
        assert_eq!(info.distance, Distance::Dot);
    }

    #[tokio::test]
    async fn test_describe_missing_collection() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/collections/chat_with_docs"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "status": {"error": "Not found: Collection `chat_with_docs` doesn't exist!"}
            })))
            .mount(&server)
            .await;

        let err = QdrantClient::new(server.uri())
            .describe("chat_with_docs")
            .await
            .unwrap_err();
        assert!(matches!(err, VectorStoreError::CollectionNotFound(name) if name == "chat_with_docs"));
    }

    #[tokio::test]
    async fn test_search_reads_llamaindex_payloads() {
        let server = MockServer::start().await;
        let node = serde_json::json!({"id_": "n1", "text": "On June 14, 2017 the board met."});
        Mock::given(method("POST"))
            .and(path("/collections/chat_with_docs/points/search"))
            .and(body_partial_json(serde_json::json!({"limit": 15, "with_payload": true})))
            .respond_with(ok(serde_json::json!([
                {
                    "id": "6f1c2b9e-0000-4000-8000-000000000001",
                    "score": 0.91,
                    "payload": {
                        "_node_content": node.to_string(),
                        "file_name": "minutes_page_3.pdf",
                        "page_label": 3
                    }
                },
                {"id": 7, "score": 0.52, "payload": {"text": "plain text payload"}}
            ])))
            .mount(&server)
            .await;

        let hits = QdrantClient::new(server.uri())
            .query("chat_with_docs", &[0.1, 0.2], 15)
            .await
            .unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].passage.id, "6f1c2b9e-0000-4000-8000-000000000001");
        assert_eq!(hits[0].text(), "On June 14, 2017 the board met.");
        assert_eq!(
            hits[0].passage.metadata.get("file_name").map(String::as_str),
            Some("minutes_page_3.pdf")
        );
        assert_eq!(
            hits[0].passage.metadata.get("page_label").map(String::as_str),
            Some("3")
        );
        assert_eq!(hits[1].passage.id, "7");
        assert_eq!(hits[1].text(), "plain text payload");
    }

    #[tokio::test]
    async fn test_search_named_vector_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/collections/docs/points/search"))
            .and(body_partial_json(serde_json::json!({
                "vector": {"name": "dense", "vector": [1.0]}
            })))
            .respond_with(ok(serde_json::json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let hits = QdrantClient::new(server.uri())
            .with_vector_name("dense")
            .query("docs", &[1.0], 3)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_sole_named_vector_is_used_for_search() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/collections/chat_with_docs"))
            .respond_with(ok(serde_json::json!({
                "config": {"params": {"vectors": {
                    "text-dense": {"size": 2, "distance": "Cosine"}
                }}}
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/collections/chat_with_docs/points/search"))
            .and(body_partial_json(serde_json::json!({
                "vector": {"name": "text-dense", "vector": [0.6, 0.8]}
            })))
            .respond_with(ok(serde_json::json!([
                {"id": 1, "score": 0.9, "payload": {"text": "dense hit"}}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let client = QdrantClient::new(server.uri());
        let info = client.describe("chat_with_docs").await.unwrap();
        assert_eq!(info.dimension, 2);

        let hits = client
            .query("chat_with_docs", &[0.6, 0.8], 5)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text(), "dense hit");
    }

    #[tokio::test]
    async fn test_upsert_writes_points() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/collections/docs/points"))
            .and(body_partial_json(serde_json::json!({
                "points": [{"id": 1, "vector": [0.5, 0.5], "payload": {"text": "hello", "file_name": "a.pdf"}}]
            })))
            .respond_with(ok(serde_json::json!({"operation_id": 1, "status": "completed"})))
            .expect(1)
            .mount(&server)
            .await;

        let record = PassageRecord {
            passage: Passage::new("1", "hello").with_metadata("file_name", "a.pdf"),
            embedding: vec![0.5, 0.5],
        };
        QdrantClient::new(server.uri())
            .upsert("docs", vec![record])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_store_is_connection_error() {
        let err = QdrantClient::new("http://127.0.0.1:9")
            .list_collections()
            .await
            .unwrap_err();
        assert!(matches!(err, VectorStoreError::Connection(_)));
    }

    #[test]
    fn test_extract_text_prefers_configured_key() {
        let mut payload = Map::new();
        payload.insert("body".to_string(), Value::String("from body".to_string()));
        payload.insert(
            NODE_CONTENT_KEY.to_string(),
            Value::String(r#"{"text": "from node"}"#.to_string()),
        );

        assert_eq!(extract_text(&payload, "body"), "from body");
        assert_eq!(extract_text(&payload, "text"), "from node");
        assert_eq!(extract_text(&Map::new(), "text"), "");
    }
}
