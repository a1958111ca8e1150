//! # DocChat Retrieval
//!
//! Answers questions over an indexed document collection:
//!
//! - **Retriever**: embeds the question and fetches the k nearest passages
//! - **Reranker**: rescores candidates with a cross-encoder, keeps the top n
//! - **Prompt Assembler**: fills the answer template with context and question
//! - **Query Pipeline**: connection state machine driving the chain
//! - **Chat Session**: conversation log over one pipeline
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Query Pipeline                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │   query ──► Retriever ──► Reranker ──► Prompt ──► Generation    │
//! │             (k = 15)     (top n = 5)   Assembler   Provider     │
//! │                │                                                │
//! │        ┌───────┴────────┐                                       │
//! │        ▼                ▼                                       │
//! │   Embedding       Vector Index                                  │
//! │   Provider          Client                                      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use docchat_retrieval::{ChatSession, DocChatConfig, QueryPipeline};
//!
//! let config = DocChatConfig::load(&path)?;
//! let mut session = ChatSession::new(QueryPipeline::from_config(&config)?);
//! session.connect(|p| println!("{}%", p.percent)).await?;
//!
//! if let Some(reply) = session.ask("What does the warranty cover?").await? {
//!     println!("{}", reply.content);
//! }
//! ```

pub mod config;
pub mod error;
pub mod pipeline;
pub mod prompt;
pub mod rerank;
pub mod retriever;
pub mod session;

pub use config::DocChatConfig;
pub use error::{Component, PipelineError, RerankError, Result, Stage};
pub use pipeline::{
    Answer, ConnectProgress, ConnectStage, PipelineComponents, PipelineState, QueryPipeline,
};
pub use prompt::{DEFAULT_TEMPLATE, FALLBACK_ANSWER, PromptAssembler};
pub use rerank::{RerankScore, Reranker, TeiReranker, order_by_scores};
pub use retriever::Retriever;
pub use session::{ChatMessage, ChatSession, Role, connection_hint, error_reply};

// Re-export from dependencies for convenience
pub use docchat_embeddings::EmbeddingProvider;
pub use docchat_llm::GenerationProvider;
pub use docchat_vector_store::{Passage, ScoredPassage, VectorIndexClient};
