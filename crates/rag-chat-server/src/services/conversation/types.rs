use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::models::chat::{ChatMessage, QueryOutcome, SessionId};

use super::memory::ConversationMemory;
use super::providers::Retriever;

/// A session's attached reference to a searchable document index.
#[derive(Clone)]
pub struct RetrievalBinding {
    retriever: Arc<dyn Retriever>,
    attached_at: DateTime<Utc>,
}

impl RetrievalBinding {
    pub fn new(retriever: Arc<dyn Retriever>) -> Self {
        Self {
            retriever,
            attached_at: Utc::now(),
        }
    }

    pub fn retriever(&self) -> &Arc<dyn Retriever> {
        &self.retriever
    }

    pub fn attached_at(&self) -> DateTime<Utc> {
        self.attached_at
    }
}

impl fmt::Debug for RetrievalBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetrievalBinding")
            .field("attached_at", &self.attached_at)
            .finish_non_exhaustive()
    }
}

/// How a query gets answered, decided by binding presence
#[derive(Debug, Clone)]
pub enum AnswerStrategy {
    NoRetrieval,
    WithRetrieval(RetrievalBinding),
}

impl AnswerStrategy {
    pub fn from_binding(binding: Option<&RetrievalBinding>) -> Self {
        match binding {
            Some(binding) => Self::WithRetrieval(binding.clone()),
            None => Self::NoRetrieval,
        }
    }

    pub fn has_context(&self) -> bool {
        matches!(self, Self::WithRetrieval(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::NoRetrieval => "general",
            Self::WithRetrieval(_) => "rag",
        }
    }
}

/// Complete per-session conversation state held by the registry
pub struct SessionState {
    pub session_id: SessionId,

    /// Token-bounded history used for prompting
    pub memory: Box<dyn ConversationMemory>,

    /// Unbounded audit transcript, never trimmed automatically
    pub transcript: Vec<ChatMessage>,

    pub binding: Option<RetrievalBinding>,

    pub created_at: Instant,
    pub last_activity: Instant,

    pub metadata: ConversationMetadata,
}

impl SessionState {
    pub fn new(session_id: SessionId, memory: Box<dyn ConversationMemory>) -> Self {
        let now = Instant::now();
        Self {
            session_id,
            memory,
            transcript: Vec::new(),
            binding: None,
            created_at: now,
            last_activity: now,
            metadata: ConversationMetadata::default(),
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn strategy(&self) -> AnswerStrategy {
        AnswerStrategy::from_binding(self.binding.as_ref())
    }
}

/// Per-session counters for monitoring
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationMetadata {
    pub total_queries: usize,
    pub rag_queries: usize,
    pub general_queries: usize,
    pub failed_queries: usize,
}

/// Secondary bookkeeping fault that was logged and swallowed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookkeepingWarning {
    MemoryWrite(String),
    MemoryClear(String),
}

impl fmt::Display for BookkeepingWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MemoryWrite(msg) => write!(f, "memory write failed: {}", msg),
            Self::MemoryClear(msg) => write!(f, "memory clear failed: {}", msg),
        }
    }
}

/// Primary query outcome plus whatever bookkeeping went wrong on the side
#[derive(Debug, Clone)]
pub struct ProcessReport {
    pub outcome: QueryOutcome,
    pub warnings: Vec<BookkeepingWarning>,
}

impl ProcessReport {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            outcome: QueryOutcome::failed(error),
            warnings: Vec::new(),
        }
    }
}
