//! The query pipeline and its connection state machine.
//!
//! ```text
//!  Disconnected ──connect()──► Connecting ──all five stages ok──► Ready
//!       ▲                          │                               │
//!       └──────── any failure ─────┘◄──────── disconnect() ────────┘
//! ```
//!
//! A query flows retrieve(k) → rerank(top_n) → assemble → generate, each
//! stage under its own time budget.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use docchat_embeddings::{EmbeddingProvider, EmbeddingRequest, OpenAIProvider, TeiProvider};
use docchat_llm::{GenerationProvider, OllamaProvider, OpenAiChatProvider};
use docchat_vector_store::{QdrantClient, ScoredPassage, VectorIndexClient};
use tracing::{debug, error, info, warn};

use crate::config::{DocChatConfig, EmbeddingProviderType, GenerationProviderType, PipelineConfig};
use crate::error::{Component, PipelineError, Result, Stage};
use crate::prompt::PromptAssembler;
use crate::rerank::{Reranker, TeiReranker};
use crate::retriever::Retriever;

/// Text embedded at connect time to check the embedding model.
const CHECK_TEXT: &str = "connection check";

/// Observable connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Disconnected,
    Connecting,
    Ready,
}

/// The steps of `connect()`, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectStage {
    /// Vector store reachable and collection present.
    VectorStore,
    /// Embedding model answers.
    EmbeddingModel,
    /// Collection bound and its dimension checked.
    VectorIndex,
    /// Retriever, reranker and prompt chain built.
    QueryEngine,
    /// Generation model available.
    GenerationModel,
}

impl ConnectStage {
    pub const ALL: [Self; 5] = [
        Self::VectorStore,
        Self::EmbeddingModel,
        Self::VectorIndex,
        Self::QueryEngine,
        Self::GenerationModel,
    ];

    /// Share of the connection completed once this stage is done.
    pub fn percent(self) -> u8 {
        match self {
            Self::VectorStore => 20,
            Self::EmbeddingModel => 40,
            Self::VectorIndex => 60,
            Self::QueryEngine => 80,
            Self::GenerationModel => 100,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::VectorStore => "Connected to vector store",
            Self::EmbeddingModel => "Loaded embedding model",
            Self::VectorIndex => "Bound document index",
            Self::QueryEngine => "Built retrieval chain",
            Self::GenerationModel => "Loaded generation model",
        }
    }
}

/// A completed connection stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectProgress {
    pub stage: ConnectStage,
    pub percent: u8,
}

impl From<ConnectStage> for ConnectProgress {
    fn from(stage: ConnectStage) -> Self {
        Self {
            stage,
            percent: stage.percent(),
        }
    }
}

/// The services a pipeline is built from.
///
/// Construction does no I/O; `connect()` is what verifies each component.
#[derive(Clone)]
pub struct PipelineComponents {
    pub store: Arc<dyn VectorIndexClient>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub reranker: Arc<dyn Reranker>,
    pub generator: Arc<dyn GenerationProvider>,
}

impl PipelineComponents {
    /// Build the HTTP-backed components described by `config`.
    pub fn from_config(config: &DocChatConfig) -> Result<Self> {
        let mut store = QdrantClient::new(&config.store.url).with_text_key(&config.store.text_key);
        if let Some(key) = &config.store.api_key {
            store = store.with_api_key(key);
        }
        if let Some(name) = &config.store.vector_name {
            store = store.with_vector_name(name);
        }

        let embedding = &config.embedding;
        let embedder: Arc<dyn EmbeddingProvider> = match embedding.provider {
            EmbeddingProviderType::Tei => {
                let mut provider = TeiProvider::new(&embedding.url, &embedding.model)
                    .with_query_instruction(embedding.effective_query_instruction());
                if let Some(key) = &embedding.api_key {
                    provider = provider.with_api_key(key);
                }
                Arc::new(provider)
            }
            EmbeddingProviderType::OpenAI => {
                let mut provider = OpenAIProvider::new()
                    .with_base_url(embedding.effective_url())
                    .with_model(&embedding.model);
                if let Some(key) = &embedding.api_key {
                    provider = provider.with_api_key(key);
                }
                Arc::new(provider)
            }
        };

        let reranker = TeiReranker::new(&config.reranker.url, &config.reranker.model);

        let generation = &config.generation;
        let timeout = config.pipeline.timeouts.generation();
        let generator: Arc<dyn GenerationProvider> = match generation.provider {
            GenerationProviderType::Ollama => {
                let mut provider = OllamaProvider::new(&generation.url, &generation.model, timeout)
                    .map_err(|e| PipelineError::Config(e.to_string()))?;
                if let Some(temperature) = generation.temperature {
                    provider = provider.with_temperature(temperature);
                }
                if let Some(tokens) = generation.context_window {
                    provider = provider.with_context_window(tokens);
                }
                Arc::new(provider)
            }
            GenerationProviderType::OpenAI => {
                let mut provider = OpenAiChatProvider::new(
                    generation.effective_url(),
                    generation.api_key.clone().unwrap_or_default(),
                    &generation.model,
                    timeout,
                )
                .map_err(|e| PipelineError::Config(e.to_string()))?;
                if let Some(temperature) = generation.temperature {
                    provider = provider.with_temperature(temperature);
                }
                Arc::new(provider)
            }
        };

        Ok(Self {
            store: Arc::new(store),
            embedder,
            reranker: Arc::new(reranker),
            generator,
        })
    }
}

/// An answer and the passages it was grounded on.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<ScoredPassage>,
}

/// The verified chain held while Ready.
struct ReadyChain {
    retriever: Retriever,
    reranker: Arc<dyn Reranker>,
    assembler: PromptAssembler,
    generator: Arc<dyn GenerationProvider>,
}

enum Connection {
    Disconnected,
    Connecting,
    Ready(ReadyChain),
}

/// Holds the pipeline in Connecting for the length of a `connect()` call.
///
/// Dropped without [`ConnectAttempt::finish`] (an error, or the caller
/// abandoning the future) it puts the pipeline back to Disconnected.
struct ConnectAttempt<'a> {
    connection: &'a mut Connection,
}

impl<'a> ConnectAttempt<'a> {
    fn begin(connection: &'a mut Connection) -> Self {
        *connection = Connection::Connecting;
        Self { connection }
    }

    fn finish(self, chain: ReadyChain) {
        *self.connection = Connection::Ready(chain);
    }
}

impl Drop for ConnectAttempt<'_> {
    fn drop(&mut self) {
        if matches!(self.connection, Connection::Connecting) {
            *self.connection = Connection::Disconnected;
        }
    }
}

/// Answers questions over one document collection.
pub struct QueryPipeline {
    components: PipelineComponents,
    config: PipelineConfig,
    connection: Connection,
}

impl QueryPipeline {
    /// Create a disconnected pipeline over `components`.
    pub fn new(components: PipelineComponents, config: PipelineConfig) -> Self {
        Self {
            components,
            config,
            connection: Connection::Disconnected,
        }
    }

    /// Create a disconnected pipeline from configuration.
    pub fn from_config(config: &DocChatConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(
            PipelineComponents::from_config(config)?,
            config.pipeline.clone(),
        ))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn state(&self) -> PipelineState {
        match self.connection {
            Connection::Disconnected => PipelineState::Disconnected,
            Connection::Connecting => PipelineState::Connecting,
            Connection::Ready(_) => PipelineState::Ready,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state() == PipelineState::Ready
    }

    /// Verify every component and move to Ready.
    ///
    /// `progress` is called once per completed [`ConnectStage`]. On any
    /// failure the pipeline is left Disconnected and the error returned; the
    /// same happens if the returned future is dropped before it completes.
    /// Connecting while Ready tears the old chain down first.
    pub async fn connect(&mut self, mut progress: impl FnMut(ConnectProgress)) -> Result<()> {
        info!(collection = %self.config.collection, "connecting to knowledge base");
        let attempt = ConnectAttempt::begin(&mut self.connection);

        match Self::build_chain(&self.components, &self.config, &mut progress).await {
            Ok(chain) => {
                attempt.finish(chain);
                info!(collection = %self.config.collection, "query pipeline ready");
                Ok(())
            }
            Err(err) => {
                drop(attempt);
                error!(error = %err, "failed to connect query pipeline");
                Err(err)
            }
        }
    }

    async fn build_chain(
        components: &PipelineComponents,
        config: &PipelineConfig,
        progress: &mut impl FnMut(ConnectProgress),
    ) -> Result<ReadyChain> {
        let budget = config.timeouts.connect();
        let collection = config.collection.as_str();
        let PipelineComponents {
            store,
            embedder,
            reranker,
            generator,
        } = components;

        if !timed(Stage::Connect, budget, store.exists(collection)).await? {
            return Err(PipelineError::CollectionNotFound(collection.to_string()));
        }
        debug!(store = store.name(), collection, "collection found");
        progress(ConnectStage::VectorStore.into());

        let sample = timed(Stage::Connect, budget, async {
            embedder
                .embed(EmbeddingRequest::query(CHECK_TEXT))
                .await
                .map_err(|e| PipelineError::model_load(Component::Embedding, e))
        })
        .await?;
        debug!(
            provider = embedder.name(),
            model = embedder.default_model(),
            dimension = sample.embedding.len(),
            "embedding model loaded"
        );
        progress(ConnectStage::EmbeddingModel.into());

        let info = timed(Stage::Connect, budget, store.describe(collection)).await?;
        if info.dimension != sample.embedding.len() {
            if config.check_dimension {
                return Err(PipelineError::DimensionMismatch {
                    collection: collection.to_string(),
                    expected: info.dimension,
                    actual: sample.embedding.len(),
                });
            }
            warn!(
                collection,
                expected = info.dimension,
                actual = sample.embedding.len(),
                "embedding dimension differs from collection"
            );
        }
        progress(ConnectStage::VectorIndex.into());

        timed(Stage::Connect, budget, async {
            reranker
                .load()
                .await
                .map_err(|e| PipelineError::model_load(Component::Reranker, e))
        })
        .await?;
        let assembler = PromptAssembler::new(config.template.clone())?;
        let retriever = Retriever::new(
            Arc::clone(embedder),
            Arc::clone(store),
            collection,
            config.top_k,
        );
        progress(ConnectStage::QueryEngine.into());

        timed(Stage::Connect, budget, async {
            generator
                .load()
                .await
                .map_err(|e| PipelineError::model_load(Component::Generation, e))
        })
        .await?;
        debug!(provider = generator.name(), model = generator.model(), "generation model loaded");
        progress(ConnectStage::GenerationModel.into());

        Ok(ReadyChain {
            retriever,
            reranker: Arc::clone(reranker),
            assembler,
            generator: Arc::clone(generator),
        })
    }

    /// Drop the connected chain. Later queries fail with
    /// [`PipelineError::NotReady`] until `connect()` succeeds again.
    pub fn disconnect(&mut self) {
        if matches!(self.connection, Connection::Ready(_)) {
            info!(collection = %self.config.collection, "disconnecting query pipeline");
        }
        self.connection = Connection::Disconnected;
    }

    fn chain(&self) -> Result<&ReadyChain> {
        match &self.connection {
            Connection::Ready(chain) => Ok(chain),
            _ => Err(PipelineError::NotReady),
        }
    }

    /// Similarity candidates for `query`, before reranking.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<ScoredPassage>> {
        let chain = self.chain()?;
        timed(
            Stage::Retrieval,
            self.config.timeouts.retrieval(),
            chain.retriever.retrieve(query),
        )
        .await
    }

    /// Answer `query` from the collection.
    pub async fn answer(&self, query: &str) -> Result<String> {
        Ok(self.answer_with_sources(query).await?.text)
    }

    /// Answer `query` and return the reranked passages used as context.
    pub async fn answer_with_sources(&self, query: &str) -> Result<Answer> {
        let chain = self.chain()?;
        let timeouts = &self.config.timeouts;
        info!(query_chars = query.len(), "answering query");

        let candidates = timed(
            Stage::Retrieval,
            timeouts.retrieval(),
            chain.retriever.retrieve(query),
        )
        .await?;

        let sources = timed(
            Stage::Rerank,
            timeouts.rerank(),
            chain.reranker.rerank(query, candidates, self.config.top_n),
        )
        .await?;
        debug!(passages = sources.len(), "reranked context");

        let prompt = chain.assembler.assemble(query, &sources);
        let text = timed(
            Stage::Generation,
            timeouts.generation(),
            chain.generator.complete(&prompt),
        )
        .await?;

        Ok(Answer { text, sources })
    }
}

/// Await `future`, failing with [`PipelineError::Timeout`] after `budget`.
async fn timed<T, E>(
    stage: Stage,
    budget: Duration,
    future: impl Future<Output = std::result::Result<T, E>>,
) -> Result<T>
where
    PipelineError: From<E>,
{
    match tokio::time::timeout(budget, future).await {
        Ok(result) => result.map_err(PipelineError::from),
        Err(_) => {
            warn!(%stage, budget_secs = budget.as_secs_f32(), "stage timed out");
            Err(PipelineError::Timeout { stage, budget })
        }
    }
}
