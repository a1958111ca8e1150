//! Configuration for the DocChat query pipeline.
//!
//! Every section is optional in the TOML file; missing keys take the defaults
//! below, which point at local services.

use std::path::{Path, PathBuf};
use std::time::Duration;

use docchat_embeddings::{DEFAULT_EMBEDDING_MODEL, default_query_instruction};
use docchat_llm::{DEFAULT_GENERATION_MODEL, DEFAULT_OLLAMA_URL, DEFAULT_REQUEST_TIMEOUT};
use docchat_vector_store::{DEFAULT_COLLECTION, DEFAULT_QDRANT_URL};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::prompt::DEFAULT_TEMPLATE;

/// Cross-encoder used to rerank retrieved passages.
pub const DEFAULT_RERANK_MODEL: &str = "cross-encoder/ms-marco-MiniLM-L-2-v2";

/// Where a local TEI server with the embedding model listens.
pub const DEFAULT_TEI_EMBED_URL: &str = "http://localhost:8080";

/// Where a local TEI server with the reranking model listens.
pub const DEFAULT_TEI_RERANK_URL: &str = "http://localhost:8081";

/// Context size, in tokens, the local model is run with.
pub const DEFAULT_CONTEXT_WINDOW: u32 = 3900;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocChatConfig {
    /// Vector store connection.
    pub store: StoreConfig,

    /// Query embedding provider.
    pub embedding: EmbeddingConfig,

    /// Cross-encoder reranker.
    pub reranker: RerankerConfig,

    /// Answer generation provider.
    pub generation: GenerationConfig,

    /// Retrieval depth, prompt and time budgets.
    pub pipeline: PipelineConfig,
}

impl DocChatConfig {
    /// Default location of the config file, `<config dir>/docchat/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("docchat").join("config.toml"))
    }

    /// Load configuration from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                info!(path = %path.display(), "loading configuration");
                Self::from_toml_str(&contents)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            Err(err) => Err(PipelineError::Config(format!(
                "cannot read {}: {err}",
                path.display()
            ))),
        }
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(contents).map_err(|e| PipelineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Fill unset secrets from `QDRANT_API_KEY` and `OPENAI_API_KEY`.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        if self.store.api_key.is_none() {
            self.store.api_key = lookup("QDRANT_API_KEY");
        }
        let openai_key = lookup("OPENAI_API_KEY");
        if self.embedding.api_key.is_none()
            && self.embedding.provider == EmbeddingProviderType::OpenAI
        {
            self.embedding.api_key = openai_key.clone();
        }
        if self.generation.api_key.is_none()
            && self.generation.provider == GenerationProviderType::OpenAI
        {
            self.generation.api_key = openai_key;
        }
    }

    /// Check values that would make the pipeline unusable.
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.collection.trim().is_empty() {
            return Err(PipelineError::Config("collection name is empty".to_string()));
        }
        if self.pipeline.top_k == 0 {
            return Err(PipelineError::Config("top_k must be at least 1".to_string()));
        }
        if self.pipeline.top_n == 0 {
            return Err(PipelineError::Config("top_n must be at least 1".to_string()));
        }
        let timeouts = &self.pipeline.timeouts;
        for (name, secs) in [
            ("connect_secs", timeouts.connect_secs),
            ("retrieval_secs", timeouts.retrieval_secs),
            ("rerank_secs", timeouts.rerank_secs),
            ("generation_secs", timeouts.generation_secs),
        ] {
            if secs == 0 {
                return Err(PipelineError::Config(format!(
                    "timeouts.{name} must be at least 1"
                )));
            }
        }
        if self.generation.context_window == Some(0) {
            return Err(PipelineError::Config(
                "context_window must be at least 1".to_string(),
            ));
        }
        crate::prompt::PromptAssembler::new(self.pipeline.template.clone())?;
        Ok(())
    }
}

/// Vector store connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Qdrant REST endpoint.
    pub url: String,

    /// Qdrant API key, sent as the `api-key` header.
    pub api_key: Option<String>,

    /// Named vector to search, for collections with several vectors.
    pub vector_name: Option<String>,

    /// Payload field holding the passage text.
    pub text_key: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_QDRANT_URL.to_string(),
            api_key: None,
            vector_name: None,
            text_key: "text".to_string(),
        }
    }
}

/// Type of embedding provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProviderType {
    /// text-embeddings-inference server.
    Tei,
    /// OpenAI-compatible embeddings API.
    #[serde(rename = "openai")]
    OpenAI,
}

/// Configuration for the embedding provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Which provider to use.
    pub provider: EmbeddingProviderType,

    /// Service endpoint.
    pub url: String,

    /// Model name. Must be the model that built the collection.
    pub model: String,

    /// API key for hosted providers.
    pub api_key: Option<String>,

    /// Instruction prepended to queries. Defaults per model family.
    pub query_instruction: Option<String>,
}

impl EmbeddingConfig {
    /// Endpoint to use, defaulting per provider when left at the TEI URL.
    pub fn effective_url(&self) -> &str {
        match self.provider {
            EmbeddingProviderType::OpenAI if self.url == DEFAULT_TEI_EMBED_URL => OPENAI_BASE_URL,
            _ => &self.url,
        }
    }

    /// Query instruction to use: the configured one, else the model default.
    pub fn effective_query_instruction(&self) -> Option<String> {
        self.query_instruction
            .clone()
            .or_else(|| default_query_instruction(&self.model).map(str::to_string))
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderType::Tei,
            url: DEFAULT_TEI_EMBED_URL.to_string(),
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            api_key: None,
            query_instruction: None,
        }
    }
}

/// Configuration for the reranker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankerConfig {
    /// text-embeddings-inference endpoint serving the cross-encoder.
    pub url: String,

    /// Cross-encoder model name.
    pub model: String,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_TEI_RERANK_URL.to_string(),
            model: DEFAULT_RERANK_MODEL.to_string(),
        }
    }
}

/// Type of generation provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationProviderType {
    /// Local Ollama server.
    Ollama,
    /// OpenAI-compatible chat completions API.
    #[serde(rename = "openai")]
    OpenAI,
}

/// Configuration for answer generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Which provider to use.
    pub provider: GenerationProviderType,

    /// Service endpoint.
    pub url: String,

    /// Model name.
    pub model: String,

    /// API key for hosted providers.
    pub api_key: Option<String>,

    /// Sampling temperature.
    pub temperature: Option<f32>,

    /// Context size in tokens (`num_ctx`). Only Ollama honours it.
    pub context_window: Option<u32>,
}

impl GenerationConfig {
    /// Endpoint to use, defaulting per provider when left at the Ollama URL.
    pub fn effective_url(&self) -> &str {
        match self.provider {
            GenerationProviderType::OpenAI if self.url == DEFAULT_OLLAMA_URL => OPENAI_BASE_URL,
            _ => &self.url,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: GenerationProviderType::Ollama,
            url: DEFAULT_OLLAMA_URL.to_string(),
            model: DEFAULT_GENERATION_MODEL.to_string(),
            api_key: None,
            temperature: None,
            context_window: Some(DEFAULT_CONTEXT_WINDOW),
        }
    }
}

/// Retrieval depth, prompt template and time budgets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Collection holding the indexed documents.
    pub collection: String,

    /// Candidates fetched by similarity search.
    pub top_k: usize,

    /// Passages kept after reranking.
    pub top_n: usize,

    /// Prompt template with `{context_str}` and `{query_str}` slots.
    pub template: String,

    /// Fail `connect()` when the embedding size differs from the collection's.
    pub check_dimension: bool,

    /// Per-stage time budgets.
    pub timeouts: TimeoutConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            collection: DEFAULT_COLLECTION.to_string(),
            top_k: 15,
            top_n: 5,
            template: DEFAULT_TEMPLATE.to_string(),
            check_dimension: true,
            timeouts: TimeoutConfig::default(),
        }
    }
}

/// Time budgets, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Each connection step.
    pub connect_secs: u64,

    /// Query embedding plus similarity search.
    pub retrieval_secs: u64,

    /// Cross-encoder scoring.
    pub rerank_secs: u64,

    /// Answer generation.
    pub generation_secs: u64,
}

impl TimeoutConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    pub fn retrieval(&self) -> Duration {
        Duration::from_secs(self.retrieval_secs)
    }

    pub fn rerank(&self) -> Duration {
        Duration::from_secs(self.rerank_secs)
    }

    pub fn generation(&self) -> Duration {
        Duration::from_secs(self.generation_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 30,
            retrieval_secs: 30,
            rerank_secs: 60,
            generation_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
        }
    }
}
