//! Capability contracts consumed by the conversation engine.
//!
//! Implementations are injected at construction time; the engine never
//! builds or looks up a model, tokenizer or index on its own.

use anyhow::Result;

/// Answer produced by a generation capability
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedAnswer {
    pub answer: String,
}

impl GeneratedAnswer {
    pub fn new(answer: impl Into<String>) -> Self {
        Self { answer: answer.into() }
    }
}

/// Trait for the language model
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Generator: Send + Sync {
    /// `system_prompt` is fully rendered; `context` is the raw retrieved
    /// text it embeds (empty on the general path).
    async fn generate(
        &self,
        system_prompt: &str,
        user_input: &str,
        context: &str,
    ) -> Result<GeneratedAnswer>;
}

/// Trait for a searchable document index bound to a session
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Retriever: Send + Sync {
    async fn top_k(&self, query: &str, k: usize) -> Result<Vec<String>>;
}

/// Trait for embedding service
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }
}

/// Approximate tokenizer the bounded memory evicts against
#[cfg_attr(test, mockall::automock)]
pub trait TokenCounter: Send + Sync {
    fn count_tokens(&self, text: &str) -> Result<usize>;
}
