//! Knowledge-base retrieval used to ground replies

use async_trait::async_trait;

/// A passage returned by a knowledge-base search
#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgePassage {
    pub content: String,
    pub score: f32,
    pub source: String,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum KnowledgeError {
    #[error("Knowledge base not found: {0}")]
    NotFound(String),
    #[error("Search failed: {0}")]
    SearchFailed(String),
}

#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    /// Return up to `top_k` passages relevant to `query` from the base identified by `key`
    async fn search(
        &self,
        key: &str,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<KnowledgePassage>, KnowledgeError>;
}

/// Prefix the user's question with retrieved passages.
///
/// Returns the question unchanged when there is nothing to add.
pub fn augment_query(question: &str, passages: &[KnowledgePassage]) -> String {
    if passages.is_empty() {
        return question.to_string();
    }

    let context = passages
        .iter()
        .map(|p| p.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "User question: {question}\n\n{context}\n\n\
         Answer the user's question based on the information above. \
         Keep the answer natural and fluent, and do not mention where the information came from."
    )
}
