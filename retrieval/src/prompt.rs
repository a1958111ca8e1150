//! Prompt assembly.

use docchat_vector_store::ScoredPassage;

use crate::error::{PipelineError, Result};

/// Slot replaced by the reranked passage texts.
pub const CONTEXT_SLOT: &str = "{context_str}";

/// Slot replaced by the user's question.
pub const QUERY_SLOT: &str = "{query_str}";

/// Phrase the model is told to answer with when the context is insufficient.
pub const FALLBACK_ANSWER: &str =
    "I don't know! I was not able to find the answer in the documents provided";

/// Template used unless the configuration overrides it.
pub const DEFAULT_TEMPLATE: &str = "Context information is below:
---------------------
{context_str}
---------------------
Given the context information above I want you to think
step by step to answer the query in a crisp manner,
incase you don't know the answer say 'I don't know! I was not able to find the answer in the documents provided'

Query: {query_str}

Answer:
";

/// Fills a template with retrieved context and the question.
#[derive(Debug, Clone)]
pub struct PromptAssembler {
    template: String,
}

impl PromptAssembler {
    /// Create an assembler. The template must contain both slots.
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        for slot in [CONTEXT_SLOT, QUERY_SLOT] {
            if !template.contains(slot) {
                return Err(PipelineError::Config(format!(
                    "prompt template is missing the {slot} slot"
                )));
            }
        }
        Ok(Self { template })
    }

    /// Render the prompt for `query` over `passages`, in the given order.
    ///
    /// Substitution is a single pass over the template, so slot markers that
    /// appear inside passages or the query are left as literal text.
    pub fn assemble(&self, query: &str, passages: &[ScoredPassage]) -> String {
        let context = passages
            .iter()
            .map(ScoredPassage::text)
            .collect::<Vec<_>>()
            .join("\n\n");

        let mut prompt = String::with_capacity(self.template.len() + context.len() + query.len());
        let mut rest = self.template.as_str();
        while let Some(start) = rest.find('{') {
            let (head, tail) = rest.split_at(start);
            prompt.push_str(head);
            if let Some(after) = tail.strip_prefix(CONTEXT_SLOT) {
                prompt.push_str(&context);
                rest = after;
            } else if let Some(after) = tail.strip_prefix(QUERY_SLOT) {
                prompt.push_str(query);
                rest = after;
            } else {
                prompt.push('{');
                rest = &tail[1..];
            }
        }
        prompt.push_str(rest);
        prompt
    }
}

impl Default for PromptAssembler {
    fn default() -> Self {
        Self {
            template: DEFAULT_TEMPLATE.to_string(),
        }
    }
}
