//! OpenAI-compatible chat completion provider.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{GenerationError, Result};
use crate::provider::GenerationProvider;

/// Completion provider backed by a `/chat/completions` endpoint.
///
/// The assembled prompt is sent as a single user message.
pub struct OpenAiChatProvider {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
    timeout: Duration,
    temperature: f32,
}

impl OpenAiChatProvider {
    /// Create a provider for `model` at `base_url` (e.g. `https://api.openai.com/v1`).
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(GenerationError::NotConfigured(
                "missing OpenAI API key".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(GenerationError::Http)?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.trim().to_string(),
            model: model.into(),
            client,
            timeout,
            temperature: 0.2,
        })
    }

    /// Sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn transport(&self, err: reqwest::Error) -> GenerationError {
        GenerationError::from_transport(err, self.timeout)
    }
}

#[async_trait]
impl GenerationProvider for OpenAiChatProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn load(&self) -> Result<()> {
        let response = self
            .client
            .get(format!("{}/models/{}", self.base_url, self.model))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| self.transport(e))?;
        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(GenerationError::ModelNotFound(self.model.clone())),
            status => Err(GenerationError::Api {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        debug!(model = %self.model, "requesting chat completion");
        let body = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GenerationError::Api {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| self.transport(e))?;
        parsed
            .choices
            .into_iter()
            .filter_map(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .find(|content| !content.is_empty())
            .ok_or(GenerationError::EmptyResponse)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(uri: &str) -> OpenAiChatProvider {
        OpenAiChatProvider::new(uri, "sk-test", "gpt-4o-mini", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_missing_key_is_rejected() {
        let err = OpenAiChatProvider::new("http://x", " ", "m", Duration::from_secs(1))
            .err()
            .unwrap();
        assert!(matches!(err, GenerationError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn test_complete_returns_first_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-4o-mini",
                "messages": [{"role": "user", "content": "the prompt"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"index": 0, "message": {"role": "assistant", "content": "An answer."}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let answer = provider(&server.uri()).complete("the prompt").await.unwrap();
        assert_eq!(answer, "An answer.");
    }

    #[tokio::test]
    async fn test_server_error_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = provider(&server.uri()).complete("p").await.unwrap_err();
        assert!(matches!(err, GenerationError::Api { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_load_checks_model() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models/gpt-4o-mini"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = provider(&server.uri()).load().await.unwrap_err();
        assert!(matches!(err, GenerationError::ModelNotFound(_)));
    }
}
