//! The generation provider contract.

use async_trait::async_trait;

use crate::error::Result;

/// A language-model completion service.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Short provider name for logs.
    fn name(&self) -> &str;

    /// Model the provider completes with.
    fn model(&self) -> &str;

    /// Confirm the server is reachable and serves [`model`](Self::model).
    async fn load(&self) -> Result<()>;

    /// Complete `prompt` in one shot.
    async fn complete(&self, prompt: &str) -> Result<String>;
}
