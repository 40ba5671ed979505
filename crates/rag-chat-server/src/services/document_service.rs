use anyhow::Result;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::RagConfig;
use crate::document::{DocumentParser, FileType, TextChunker};
use crate::models::chat::SessionId;
use crate::services::conversation::{ConversationOrchestrator, EmbeddingProvider, Retriever};
use crate::services::vector_index::VectorIndex;
use crate::utils::error::ApiError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestedDocument {
    pub doc_id: String,
    pub chunks_created: usize,
}

/// A session's index plus the uploads still writing into it
struct IndexSlot {
    index: Arc<VectorIndex>,
    uploads_in_flight: AtomicUsize,
}

impl IndexSlot {
    fn new(index: VectorIndex) -> Self {
        Self {
            index: Arc::new(index),
            uploads_in_flight: AtomicUsize::new(0),
        }
    }

    fn is_idle(&self) -> bool {
        self.index.is_empty() && self.uploads_in_flight.load(Ordering::Acquire) == 0
    }
}

/// Keeps a slot from being dropped as empty while it is held
struct Reservation {
    slot: Arc<IndexSlot>,
}

impl Reservation {
    fn new(slot: Arc<IndexSlot>) -> Self {
        slot.uploads_in_flight.fetch_add(1, Ordering::AcqRel);
        Self { slot }
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.slot.uploads_in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

fn session_gone(session_id: &str) -> ApiError {
    ApiError::NotFound(format!("Session {} was deleted during upload", session_id))
}

/// Turns uploads into per-session vector indexes and keeps the
/// orchestrator's retrieval binding in step with them.
///
/// A registered slot only disappears through `purge_session` or, once it is
/// empty with no upload in flight, through `remove_document`. An upload that
/// finds its slot unregistered therefore knows the session was deleted.
pub struct DocumentService {
    orchestrator: Arc<ConversationOrchestrator>,
    embedder: Arc<dyn EmbeddingProvider>,
    indexes: DashMap<SessionId, Arc<IndexSlot>>,
    chunker: TextChunker,
}

impl DocumentService {
    pub fn new(
        orchestrator: Arc<ConversationOrchestrator>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: &RagConfig,
    ) -> Self {
        Self {
            orchestrator,
            embedder,
            indexes: DashMap::new(),
            chunker: TextChunker::new(config.chunk_size, config.chunk_overlap),
        }
    }

    pub fn detect_file_type(filename: &str) -> Result<FileType, ApiError> {
        FileType::from_filename(filename).ok_or_else(|| {
            ApiError::BadRequest(format!(
                "Unsupported file type: {}. Supported: txt, md, markdown, html, htm, csv, json",
                filename
            ))
        })
    }

    /// Parse, chunk and index an upload, then bind the session's index.
    pub async fn process_upload(
        &self,
        session_id: &str,
        filename: &str,
        bytes: &[u8],
    ) -> Result<IngestedDocument, ApiError> {
        let file_type = Self::detect_file_type(filename)?;

        let parsed = DocumentParser::parse_bytes(bytes, file_type)
            .map_err(|e| ApiError::BadRequest(format!("Failed to parse {}: {}", filename, e)))?;

        let chunks: Vec<String> = self
            .chunker
            .chunk(&parsed.content)
            .into_iter()
            .map(|c| c.content)
            .collect();
        if chunks.is_empty() {
            return Err(ApiError::BadRequest(format!("No text chunks produced from {}", filename)));
        }

        debug!(
            "Parsed {} ({} chars, {}) into {} chunks",
            filename,
            parsed.metadata.char_count,
            parsed.metadata.encoding,
            chunks.len()
        );

        let doc_id = Uuid::new_v4().to_string();
        let reservation = self.reserve_slot(session_id);

        let embeddings = self
            .embedder
            .embed_batch(&chunks)
            .await
            .map_err(|e| ApiError::InternalError(format!("Failed to embed {}: {}", filename, e)))?;

        // Inserted under the shard lock so a purge cannot slip in between
        let chunks_created = {
            let registered = self
                .indexes
                .get(session_id)
                .filter(|entry| Arc::ptr_eq(entry.value(), &reservation.slot))
                .ok_or_else(|| session_gone(session_id))?;
            registered
                .index
                .insert_embedded(&doc_id, &chunks, embeddings)
                .map_err(|e| ApiError::InternalError(format!("Failed to index {}: {}", filename, e)))?
        };

        self.bind(session_id, &reservation.slot).await?;

        info!(
            "Ingested {} as {} into session {} ({} chunks)",
            filename, doc_id, session_id, chunks_created
        );

        Ok(IngestedDocument { doc_id, chunks_created })
    }

    /// Drop a document's chunks; the session falls back to general
    /// answering once its index is empty.
    pub async fn remove_document(&self, session_id: &str, doc_id: &str) -> usize {
        let Some(slot) = self.indexes.get(session_id).map(|entry| entry.value().clone()) else {
            return 0;
        };

        let removed = slot.index.remove_document(doc_id);
        debug!("Removed {} chunks of document {} from session {}", removed, doc_id, session_id);

        if self.indexes.remove_if(session_id, |_, current| current.is_idle()).is_some() {
            self.orchestrator.detach_vectorstore(session_id).await;

            // An upload may have registered a fresh index during the detach
            if let Some(reservation) = self.reserve_existing(session_id) {
                if !reservation.slot.index.is_empty() {
                    let _ = self.bind(session_id, &reservation.slot).await;
                }
            }
        }

        removed
    }

    /// Drop the session's index, then its conversation state. With the
    /// index gone first, an upload still in flight either fails its
    /// registration check or has its fresh binding removed here.
    pub fn purge_session(&self, session_id: &str) {
        if self.indexes.remove(session_id).is_some() {
            debug!("Dropped document index for session {}", session_id);
        }
        self.orchestrator.delete_session(session_id);
    }

    pub fn indexed_chunks(&self, session_id: &str) -> usize {
        self.indexes.get(session_id).map(|slot| slot.index.len()).unwrap_or(0)
    }

    fn reserve_slot(&self, session_id: &str) -> Reservation {
        let entry = self
            .indexes
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(IndexSlot::new(VectorIndex::new(self.embedder.clone()))));
        Reservation::new(entry.value().clone())
    }

    fn reserve_existing(&self, session_id: &str) -> Option<Reservation> {
        let entry = self.indexes.get(session_id)?;
        Some(Reservation::new(entry.value().clone()))
    }

    fn is_registered(&self, session_id: &str, slot: &Arc<IndexSlot>) -> bool {
        self.indexes
            .get(session_id)
            .is_some_and(|entry| Arc::ptr_eq(entry.value(), slot))
    }

    /// Attach the slot's index. A purge that ran meanwhile already
    /// dropped the conversation state, so the recreated state is removed.
    async fn bind(&self, session_id: &str, slot: &Arc<IndexSlot>) -> Result<(), ApiError> {
        let retriever: Arc<dyn Retriever> = slot.index.clone();
        self.orchestrator.set_vectorstore(session_id, retriever).await;

        if !self.is_registered(session_id, slot) {
            self.orchestrator.delete_session(session_id);
            return Err(session_gone(session_id));
        }
        Ok(())
    }
}
