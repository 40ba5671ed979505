use serde::{Deserialize, Serialize};

/// Opaque session identifier, generated upstream by the session service
/// or supplied by the caller.
pub type SessionId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message of a conversation, also the wire shape of transcript entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

// ===== REQUEST MODELS =====

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub query: String,
}

// ===== RESPONSE MODELS =====

/// Uniform result of a query: callers branch on the presence of `error`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryOutcome {
    Answered {
        answer: String,
        /// Always empty; retrieved passages only ground the answer.
        context: Vec<String>,
    },
    Failed {
        error: String,
    },
}

impl QueryOutcome {
    pub fn answered(answer: impl Into<String>) -> Self {
        Self::Answered { answer: answer.into(), context: Vec::new() }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self::Failed { error: error.into() }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failed { error } => Some(error),
            Self::Answered { .. } => None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_outcome_wire_shape() {
        let ok = serde_json::to_value(QueryOutcome::answered("4")).unwrap();
        assert_eq!(ok, json!({ "answer": "4", "context": [] }));

        let err = serde_json::to_value(QueryOutcome::failed("quota exceeded")).unwrap();
        assert_eq!(err, json!({ "error": "quota exceeded" }));
    }

    #[test]
    fn test_message_roles_serialize_lowercase() {
        let value = serde_json::to_value(ChatMessage::assistant("hi")).unwrap();
        assert_eq!(value, json!({ "role": "assistant", "content": "hi" }));
    }
}
