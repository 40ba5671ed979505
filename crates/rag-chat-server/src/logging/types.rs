use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Activity type categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    SessionCreated,
    QueryReceived,
    QueryAnswered,
    GenerationFailed,
    MemoryWriteFailed,
    MemoryClearFailed,
    HistoryCleared,
    SessionDeleted,
    RetrieverAttached,
    RetrieverDetached,
}

impl ActivityType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::SessionCreated => "session_created",
            Self::QueryReceived => "query_received",
            Self::QueryAnswered => "query_answered",
            Self::GenerationFailed => "generation_failed",
            Self::MemoryWriteFailed => "memory_write_failed",
            Self::MemoryClearFailed => "memory_clear_failed",
            Self::HistoryCleared => "history_cleared",
            Self::SessionDeleted => "session_deleted",
            Self::RetrieverAttached => "retriever_attached",
            Self::RetrieverDetached => "retriever_detached",
        }
    }
}

/// Activity status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityStatus {
    Success,
    Error,
    Warning,
    Info,
}

impl ActivityStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }
}

/// Complete activity log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityLog {
    pub session_id: String,

    pub activity_type: ActivityType,
    pub activity_status: ActivityStatus,

    // Context
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_content: Option<String>,

    // Metrics
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passages_retrieved: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time_ms: Option<u64>,

    // Error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl ActivityLog {
    /// Create builder for fluent API
    pub fn builder(session_id: &str, activity_type: ActivityType) -> ActivityLogBuilder {
        ActivityLogBuilder::new(session_id, activity_type)
    }
}

/// Builder pattern for ActivityLog
pub struct ActivityLogBuilder {
    log: ActivityLog,
}

impl ActivityLogBuilder {
    pub fn new(session_id: &str, activity_type: ActivityType) -> Self {
        Self {
            log: ActivityLog {
                session_id: session_id.to_string(),
                activity_type,
                activity_status: ActivityStatus::Success,
                strategy: None,
                message_content: None,
                response_content: None,
                passages_retrieved: None,
                memory_tokens: None,
                processing_time_ms: None,
                error_message: None,
                created_at: Utc::now(),
            },
        }
    }

    pub fn status(mut self, status: ActivityStatus) -> Self {
        self.log.activity_status = status;
        self
    }

    pub fn strategy(mut self, strategy: impl Into<String>) -> Self {
        self.log.strategy = Some(strategy.into());
        self
    }

    pub fn message(mut self, content: impl Into<String>) -> Self {
        self.log.message_content = Some(content.into());
        self
    }

    pub fn response(mut self, content: impl Into<String>) -> Self {
        self.log.response_content = Some(content.into());
        self
    }

    pub fn passages(mut self, count: usize) -> Self {
        self.log.passages_retrieved = Some(count);
        self
    }

    pub fn memory_tokens(mut self, tokens: usize) -> Self {
        self.log.memory_tokens = Some(tokens);
        self
    }

    pub fn processing_time(mut self, ms: u64) -> Self {
        self.log.processing_time_ms = Some(ms);
        self
    }

    pub fn error(mut self, message: impl Into<String>) -> Self {
        self.log.error_message = Some(message.into());
        self.log.activity_status = ActivityStatus::Error;
        self
    }

    /// Like [`error`](Self::error) but for swallowed faults.
    pub fn warning(mut self, message: impl Into<String>) -> Self {
        self.log.error_message = Some(message.into());
        self.log.activity_status = ActivityStatus::Warning;
        self
    }

    pub fn build(self) -> ActivityLog {
        self.log
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_sets_error_status() {
        let log = ActivityLog::builder("s1", ActivityType::GenerationFailed)
            .strategy("rag")
            .error("quota exceeded")
            .build();

        assert_eq!(log.activity_status, ActivityStatus::Error);
        assert_eq!(log.error_message.as_deref(), Some("quota exceeded"));
        assert_eq!(log.strategy.as_deref(), Some("rag"));
    }

    #[test]
    fn test_serialized_names_match_as_str() {
        let log = ActivityLog::builder("s1", ActivityType::MemoryWriteFailed)
            .warning("tokenizer down")
            .build();
        let value = serde_json::to_value(&log).unwrap();

        assert_eq!(value["activity_type"], ActivityType::MemoryWriteFailed.as_str());
        assert_eq!(value["activity_status"], ActivityStatus::Warning.as_str());
        assert!(value.get("response_content").is_none());
    }
}
