//! Conversation engine
//!
//! Provides per-session conversational state with:
//! - Thread-safe session registry (DashMap + per-session async lock)
//! - Token-bounded rolling memory for prompt history
//! - RAG or general prompt composition, chosen by retriever binding
//! - Unbounded per-session transcript

mod cache;
pub mod composer;
pub mod memory;
pub mod orchestrator;
pub mod providers;
mod token_counter;
pub mod types;

pub use cache::{RegistryStats, SessionRegistry};
pub use composer::{AnswerComposer, ComposedPrompt, PromptTemplate, RETRIEVAL_TOP_K};
pub use memory::{
    ConversationMemory, MemoryProvider, TokenBufferMemory, TokenBufferMemoryProvider,
    DEFAULT_MAX_TOKEN_LIMIT,
};
pub use orchestrator::ConversationOrchestrator;
pub use providers::{EmbeddingProvider, GeneratedAnswer, Generator, Retriever, TokenCounter};
pub use token_counter::ApproxTokenCounter;
pub use types::{
    AnswerStrategy, BookkeepingWarning, ConversationMetadata, ProcessReport, RetrievalBinding,
};

pub use crate::models::chat::{ChatMessage, SessionId};
