//! # LLM
//!
//! Single-shot completion providers that turn an assembled prompt into an
//! answer. Requests are not streamed and not retried; every provider enforces
//! a request timeout.

pub mod error;
pub mod ollama;
pub mod openai;
pub mod provider;

pub use error::{GenerationError, Result};
pub use ollama::{DEFAULT_OLLAMA_URL, OllamaProvider};
pub use openai::OpenAiChatProvider;
pub use provider::GenerationProvider;

use std::time::Duration;

/// Model served by the local Ollama instance by default.
pub const DEFAULT_GENERATION_MODEL: &str = "llama3.2:1b";

/// How long a completion may take before it is abandoned.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
