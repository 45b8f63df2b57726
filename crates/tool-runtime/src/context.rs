//! Knowledge-base context for the system prompt.
//!
//! A [`ContextRetriever`] looks up passages relevant to the user's message;
//! the turn controller appends them to the system prompt before the first
//! model call. Retrieval is best effort: a failing retriever never fails
//! the turn.

use async_trait::async_trait;
use oikos_core::{OikosError, UserId};

/// Messages that are only a greeting skip retrieval entirely.
const GREETINGS: &[&str] = &["hi", "hello", "xin chào", "chào", "hey", "alo"];

/// One retrieved knowledge-base passage.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextPassage {
    pub content: String,
    pub source: String,
    /// Similarity score, higher is more relevant
    pub score: f32,
}

#[async_trait]
pub trait ContextRetriever: Send + Sync {
    /// Passages relevant to `query`, most relevant first.
    async fn retrieve(&self, user_id: UserId, query: &str) -> Result<Vec<ContextPassage>, OikosError>;
}

/// Retriever used when no knowledge base is configured.
pub struct NoContext;

#[async_trait]
impl ContextRetriever for NoContext {
    async fn retrieve(&self, _user_id: UserId, _query: &str) -> Result<Vec<ContextPassage>, OikosError> {
        Ok(Vec::new())
    }
}

/// True when `message` is a bare greeting, or a greeting followed by a space.
pub fn is_simple_greeting(message: &str) -> bool {
    let normalized = message.trim().to_lowercase();
    GREETINGS.iter().any(|greeting| {
        normalized == *greeting
            || normalized
                .strip_prefix(greeting)
                .is_some_and(|rest| rest.starts_with(' '))
    })
}

/// Render passages as a block for the system prompt; `None` when empty.
pub fn format_context(passages: &[ContextPassage]) -> Option<String> {
    if passages.is_empty() {
        return None;
    }
    let mut context = String::from("Relevant information from knowledge base:\n\n");
    for passage in passages {
        context.push_str("---\n");
        context.push_str(&format!(
            "[Source: {}, Relevance: {:.2}]\n",
            passage.source, passage.score
        ));
        context.push_str(&passage.content);
        context.push('\n');
    }
    Some(context)
}
