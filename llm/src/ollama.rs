//! Ollama completion provider.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{GenerationError, Result};
use crate::provider::GenerationProvider;

/// Where a local Ollama listens by default.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Completion provider backed by Ollama's `/api/generate`.
pub struct OllamaProvider {
    base_url: String,
    model: String,
    client: reqwest::Client,
    timeout: Duration,
    temperature: Option<f32>,
    context_window: Option<u32>,
}

impl OllamaProvider {
    /// Create a provider for `model` on the server at `base_url`.
    ///
    /// Completions that take longer than `timeout` fail with
    /// [`GenerationError::Timeout`].
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(GenerationError::Http)?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            client,
            timeout,
            temperature: None,
            context_window: None,
        })
    }

    /// Sampling temperature sent with every request.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Context size (`num_ctx`) the model is run with.
    ///
    /// Ollama otherwise uses the model's default, which can truncate long
    /// prompts without any error.
    pub fn with_context_window(mut self, tokens: u32) -> Self {
        self.context_window = Some(tokens);
        self
    }

    fn options(&self) -> Option<GenerateOptions> {
        if self.temperature.is_none() && self.context_window.is_none() {
            return None;
        }
        Some(GenerateOptions {
            temperature: self.temperature,
            num_ctx: self.context_window,
        })
    }

    fn transport(&self, err: reqwest::Error) -> GenerationError {
        GenerationError::from_transport(err, self.timeout)
    }
}

#[async_trait]
impl GenerationProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn load(&self) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/api/show", self.base_url))
            .json(&ShowRequest { model: &self.model })
            .send()
            .await
            .map_err(|e| self.transport(e))?;

        match response.status() {
            status if status.is_success() => {
                info!(model = %self.model, "Ollama model available");
                Ok(())
            }
            StatusCode::NOT_FOUND => Err(GenerationError::ModelNotFound(self.model.clone())),
            status => Err(GenerationError::Api {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        debug!(model = %self.model, prompt_chars = prompt.len(), "requesting Ollama completion");
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: self.options(),
        };
        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport(e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(GenerationError::ModelNotFound(self.model.clone()));
        }
        if !status.is_success() {
            return Err(GenerationError::Api {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let parsed: GenerateResponse = response.json().await.map_err(|e| self.transport(e))?;
        let answer = parsed.response.trim().to_string();
        if answer.is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(answer)
    }
}

#[derive(Serialize)]
struct ShowRequest<'a> {
    model: &'a str,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerateOptions>,
}

#[derive(Serialize)]
struct GenerateOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_ctx: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}
