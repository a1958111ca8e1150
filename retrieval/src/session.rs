//! A chat session: one pipeline plus the conversation log.

use docchat_vector_store::ScoredPassage;
use tracing::{error, info};

use crate::error::{PipelineError, Result};
use crate::pipeline::{ConnectProgress, PipelineState, QueryPipeline};

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

/// One entry in the conversation log.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    /// Passages an assistant answer was based on.
    pub sources: Vec<ScoredPassage>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            sources: Vec::new(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            sources: Vec::new(),
        }
    }

    pub fn with_sources(mut self, sources: Vec<ScoredPassage>) -> Self {
        self.sources = sources;
        self
    }
}

/// Text shown in place of an answer when a query fails.
pub fn error_reply(err: &PipelineError) -> String {
    format!("Sorry, I encountered an error: {err}")
}

/// A suggestion for the user after `connect()` fails, if one applies.
pub fn connection_hint(err: &PipelineError, store_url: &str) -> Option<String> {
    match err {
        PipelineError::CollectionNotFound(_) => Some(
            "Make sure you've run the ingestion step to index your documents first.".to_string(),
        ),
        PipelineError::Connection(_) => Some(format!(
            "Make sure Qdrant is running on {store_url}. You can start it with Docker: docker run -p 6333:6333 qdrant/qdrant"
        )),
        _ => None,
    }
}

/// Conversation state for one user.
pub struct ChatSession {
    pipeline: QueryPipeline,
    messages: Vec<ChatMessage>,
}

impl ChatSession {
    pub fn new(pipeline: QueryPipeline) -> Self {
        Self {
            pipeline,
            messages: Vec::new(),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.pipeline.state()
    }

    pub fn is_connected(&self) -> bool {
        self.pipeline.is_ready()
    }

    pub fn pipeline(&self) -> &QueryPipeline {
        &self.pipeline
    }

    /// The conversation so far, oldest first.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn clear_history(&mut self) {
        self.messages.clear();
    }

    pub async fn connect(&mut self, progress: impl FnMut(ConnectProgress)) -> Result<()> {
        self.pipeline.connect(progress).await
    }

    pub fn disconnect(&mut self) {
        self.pipeline.disconnect();
    }

    /// Ask a question and record the exchange.
    ///
    /// Blank input is ignored and returns `Ok(None)`. While disconnected
    /// nothing is recorded and [`PipelineError::NotReady`] is returned.
    /// Otherwise query failures are rendered into the assistant reply and
    /// the session stays connected.
    pub async fn ask(&mut self, query: &str) -> Result<Option<&ChatMessage>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(None);
        }
        if !self.pipeline.is_ready() {
            return Err(PipelineError::NotReady);
        }

        self.messages.push(ChatMessage::user(query));
        let reply = match self.pipeline.answer_with_sources(query).await {
            Ok(answer) => {
                info!(
                    answer_chars = answer.text.len(),
                    sources = answer.sources.len(),
                    "query answered"
                );
                ChatMessage::assistant(answer.text).with_sources(answer.sources)
            }
            Err(err) => {
                error!(error = %err, "query failed");
                ChatMessage::assistant(error_reply(&err))
            }
        };
        self.messages.push(reply);
        Ok(self.messages.last())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docchat_vector_store::VectorStoreError;
    use pretty_assertions::assert_eq;

    use crate::config::DocChatConfig;

    #[test]
    fn test_hints() {
        let url = "http://localhost:6333";
        assert_eq!(
            connection_hint(&PipelineError::CollectionNotFound("docs".to_string()), url),
            Some(
                "Make sure you've run the ingestion step to index your documents first."
                    .to_string()
            )
        );
        let err = PipelineError::from(VectorStoreError::Connection("refused".into()));
        let hint = connection_hint(&err, url).unwrap();
        assert!(hint.starts_with("Make sure Qdrant is running on http://localhost:6333."));
        assert_eq!(connection_hint(&PipelineError::NotReady, url), None);
    }

    #[test]
    fn test_error_reply() {
        assert_eq!(
            error_reply(&PipelineError::CollectionNotFound("chat_with_docs".to_string())),
            "Sorry, I encountered an error: Collection 'chat_with_docs' not found in the vector store"
        );
    }

    #[tokio::test]
    async fn test_disconnected_session_records_nothing() {
        let pipeline = QueryPipeline::from_config(&DocChatConfig::default()).unwrap();
        let mut session = ChatSession::new(pipeline);

        assert_eq!(session.ask("   ").await.unwrap(), None);
        assert!(matches!(
            session.ask("What is in the documents?").await,
            Err(PipelineError::NotReady)
        ));
        assert!(session.messages().is_empty());
        assert_eq!(session.state(), PipelineState::Disconnected);
    }
}
