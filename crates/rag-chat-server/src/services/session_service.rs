use anyhow::{Context, Result};
use chrono::{Local, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::session::{DocumentRecord, SessionRecord};

/// Session metadata store backed by one JSON file per session
pub struct SessionService {
    storage_path: PathBuf,
    sessions: RwLock<HashMap<String, SessionRecord>>,
    /// Serializes file writes so an older snapshot never lands last
    disk: Mutex<()>,
}

impl SessionService {
    /// Open (creating if needed) the storage directory and load every
    /// readable session file in it.
    pub fn new(storage_path: impl Into<PathBuf>) -> Result<Self> {
        let storage_path = storage_path.into();
        fs::create_dir_all(&storage_path).with_context(|| {
            format!("Failed to create session storage at {}", storage_path.display())
        })?;

        let sessions = Self::load_sessions(&storage_path)?;
        info!("Loaded {} sessions from {}", sessions.len(), storage_path.display());

        Ok(Self {
            storage_path,
            sessions: RwLock::new(sessions),
            disk: Mutex::new(()),
        })
    }

    fn load_sessions(storage_path: &Path) -> Result<HashMap<String, SessionRecord>> {
        let mut sessions = HashMap::new();

        for entry in fs::read_dir(storage_path)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let loaded = fs::read_to_string(&path)
                .map_err(anyhow::Error::from)
                .and_then(|raw| serde_json::from_str::<SessionRecord>(&raw).map_err(Into::into));

            match loaded {
                // Ids become file names, so only UUIDs are accepted
                Ok(record) if Uuid::parse_str(&record.session_id).is_err() => warn!(
                    "Skipping session file {} with invalid id {:?}",
                    path.display(),
                    record.session_id
                ),
                Ok(record) => {
                    sessions.insert(record.session_id.clone(), record);
                }
                Err(e) => warn!("Skipping unreadable session file {}: {}", path.display(), e),
            }
        }

        Ok(sessions)
    }

    fn session_file(&self, session_id: &str) -> PathBuf {
        self.storage_path.join(format!("{}.json", session_id))
    }

    /// Writes the current in-memory record. Disk failures are logged; the
    /// in-memory record stays authoritative.
    async fn persist(&self, session_id: &str) {
        let _disk = self.disk.lock().await;
        let Some(record) = self.get_session(session_id) else {
            return;
        };

        let path = self.session_file(session_id);
        let result = match serde_json::to_string_pretty(&record) {
            Ok(json) => tokio::fs::write(&path, json).await.map_err(anyhow::Error::from),
            Err(e) => Err(e.into()),
        };

        if let Err(e) = result {
            warn!("Failed to save session {}: {}", session_id, e);
        }
    }

    pub async fn create_session(&self, name: Option<String>) -> SessionRecord {
        let now = Utc::now();
        let name = name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("Chat {}", Local::now().format("%Y-%m-%d %H:%M")));

        let record = SessionRecord {
            session_id: Uuid::new_v4().to_string(),
            name,
            created_at: now,
            updated_at: now,
            document_count: 0,
            documents: Vec::new(),
        };

        self.sessions.write().insert(record.session_id.clone(), record.clone());
        self.persist(&record.session_id).await;

        info!("Created session {} ({})", record.session_id, record.name);
        record
    }

    pub fn get_session(&self, session_id: &str) -> Option<SessionRecord> {
        self.sessions.read().get(session_id).cloned()
    }

    pub fn exists(&self, session_id: &str) -> bool {
        self.sessions.read().contains_key(session_id)
    }

    /// Most recently updated first
    pub fn list_sessions(&self) -> Vec<SessionRecord> {
        let mut sessions: Vec<SessionRecord> = self.sessions.read().values().cloned().collect();
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        sessions
    }

    pub async fn update_session(&self, session_id: &str, name: &str) -> Option<SessionRecord> {
        self.modify(session_id, |record| record.name = name.to_string()).await
    }

    pub async fn delete_session(&self, session_id: &str) -> bool {
        let _disk = self.disk.lock().await;
        let removed = self.sessions.write().remove(session_id).is_some();
        if !removed {
            return false;
        }

        let path = self.session_file(session_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to delete session file {}: {}", path.display(), e),
        }

        info!("Deleted session {}", session_id);
        true
    }

    pub async fn add_document(&self, session_id: &str, doc_id: &str, filename: &str) -> bool {
        self.modify(session_id, |record| {
            record.documents.push(DocumentRecord {
                doc_id: doc_id.to_string(),
                filename: filename.to_string(),
                uploaded_at: Utc::now(),
            });
        })
        .await
        .is_some()
    }

    /// Returns the updated record, `None` for an unknown session
    pub async fn remove_document(&self, session_id: &str, doc_id: &str) -> Option<SessionRecord> {
        self.modify(session_id, |record| record.documents.retain(|d| d.doc_id != doc_id))
            .await
    }

    async fn modify<F>(&self, session_id: &str, apply: F) -> Option<SessionRecord>
    where
        F: FnOnce(&mut SessionRecord),
    {
        let updated = {
            let mut sessions = self.sessions.write();
            let record = sessions.get_mut(session_id)?;
            apply(record);
            record.document_count = record.documents.len();
            record.updated_at = Utc::now();
            record.clone()
        };

        debug!("Updated session {}", session_id);
        self.persist(session_id).await;
        Some(updated)
    }
}
