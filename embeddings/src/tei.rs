//! Provider for Hugging Face text-embeddings-inference (TEI) servers.
//!
//! TEI serves sentence-transformer checkpoints such as `BAAI/bge-large-en-v1.5`
//! behind `POST /embed`, which is how the document collection was built.

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::error::{EmbeddingError, Result};
use crate::provider::{EmbeddingProvider, EmbeddingPurpose, EmbeddingRequest, EmbeddingResponse};
use crate::{DEFAULT_DIMENSION, DEFAULT_EMBEDDING_MODEL};

/// Query instruction the English BGE models were trained with.
pub const BGE_QUERY_INSTRUCTION: &str =
    "Represent this question for searching relevant passages: ";

/// Instruction prepended to queries for models that expect one.
pub fn default_query_instruction(model: &str) -> Option<&'static str> {
    let model = model.to_ascii_lowercase();
    (model.contains("bge-") && model.contains("-en")).then_some(BGE_QUERY_INSTRUCTION)
}

fn known_dimension(model: &str) -> Option<usize> {
    let model = model.to_ascii_lowercase();
    if model.contains("bge-large") {
        Some(1024)
    } else if model.contains("bge-base") {
        Some(768)
    } else if model.contains("bge-small") || model.contains("minilm") {
        Some(384)
    } else {
        None
    }
}

/// Embedding provider backed by a TEI server.
pub struct TeiProvider {
    base_url: String,
    client: reqwest::Client,
    model: String,
    api_key: Option<String>,
    query_instruction: Option<String>,
}

impl TeiProvider {
    /// Create a provider for the server at `base_url` serving `model`.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let model = model.into();
        let query_instruction = default_query_instruction(&model).map(str::to_string);
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            model,
            api_key: None,
            query_instruction,
        }
    }

    /// Send a bearer token with every request.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Override (or clear) the query instruction prefix.
    pub fn with_query_instruction(mut self, instruction: Option<String>) -> Self {
        self.query_instruction = instruction;
        self
    }

    fn input_text(&self, request: &EmbeddingRequest) -> String {
        match (&self.query_instruction, request.purpose) {
            (Some(instruction), EmbeddingPurpose::Query) => {
                format!("{instruction}{}", request.text)
            }
            _ => request.text.clone(),
        }
    }

    async fn post_embed(&self, inputs: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let body = TeiEmbedRequest {
            inputs: &inputs,
            normalize: true,
            truncate: true,
        };
        let mut builder = self
            .client
            .post(format!("{}/embed", self.base_url))
            .json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::ApiRequest {
                status: status.as_u16(),
                body,
            });
        }

        let vectors: Vec<Vec<f32>> = response.json().await?;
        if vectors.len() != inputs.len() {
            return Err(EmbeddingError::InvalidResponse(format!(
                "{} embeddings returned for {} inputs",
                vectors.len(),
                inputs.len()
            )));
        }
        Ok(vectors)
    }

    fn response_for(&self, embedding: Vec<f32>) -> EmbeddingResponse {
        EmbeddingResponse {
            dimension: embedding.len(),
            embedding,
            model: self.model.clone(),
            tokens_used: None,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for TeiProvider {
    fn name(&self) -> &str {
        "tei"
    }

    fn default_model(&self) -> &str {
        &self.model
    }

    fn default_dimension(&self) -> usize {
        known_dimension(&self.model).unwrap_or(DEFAULT_DIMENSION)
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse> {
        request.validate()?;
        debug!(model = %self.model, purpose = ?request.purpose, "embedding text via TEI");

        let input = self.input_text(&request);
        let embedding = self
            .post_embed(vec![input])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::InvalidResponse("No embedding in response".to_string()))?;
        if embedding.is_empty() {
            return Err(EmbeddingError::InvalidResponse(
                "empty embedding vector".to_string(),
            ));
        }
        Ok(self.response_for(embedding))
    }
}

impl Default for TeiProvider {
    fn default() -> Self {
        Self::new("http://localhost:8080", DEFAULT_EMBEDDING_MODEL)
    }
}

#[derive(Serialize)]
struct TeiEmbedRequest<'a> {
    inputs: &'a [String],
    normalize: bool,
    truncate: bool,
}
