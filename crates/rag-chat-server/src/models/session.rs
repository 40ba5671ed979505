use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::chat::SessionId;

/// Persisted session metadata, one JSON file per session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: SessionId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub document_count: usize,
    #[serde(default)]
    pub documents: Vec<DocumentRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub doc_id: String,
    pub filename: String,
    pub uploaded_at: DateTime<Utc>,
}

// ===== REQUEST MODELS =====

#[derive(Debug, Default, Deserialize)]
pub struct SessionCreate {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SessionUpdate {
    pub name: String,
}

// ===== RESPONSE MODELS =====

#[derive(Debug, Serialize)]
pub struct SessionList {
    pub sessions: Vec<SessionRecord>,
}

#[derive(Debug, Serialize)]
pub struct DocumentList {
    pub documents: Vec<DocumentRecord>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub doc_id: String,
    pub filename: String,
    pub chunks_created: usize,
}
