use crate::models::chat::MessageResponse;
use crate::models::session::{DocumentList, UploadResponse};
use crate::services::{DocumentService, SessionService};
use crate::utils::error::ApiError;
use axum::{
    extract::{Multipart, Path, State},
    Json,
};
use std::sync::Arc;
use tracing::{debug, info};

pub async fn upload_handler(
    State(sessions): State<Arc<SessionService>>,
    State(documents): State<Arc<DocumentService>>,
    Path(session_id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    if !sessions.exists(&session_id) {
        return Err(ApiError::NotFound("Session not found".to_string()));
    }

    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Multipart error: {}", e)))?
    {
        if field.name() != Some("file") {
            debug!("Ignoring multipart field {:?}", field.name());
            continue;
        }

        let filename = field
            .file_name()
            .map(|name| name.to_string())
            .ok_or_else(|| ApiError::BadRequest("Uploaded file has no filename".to_string()))?;
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read file: {}", e)))?;

        upload = Some((filename, data.to_vec()));
        break;
    }

    let (filename, data) =
        upload.ok_or_else(|| ApiError::BadRequest("No file provided".to_string()))?;

    info!("Upload: session={}, file={}, size={}", session_id, filename, data.len());

    let ingested = documents.process_upload(&session_id, &filename, &data).await?;
    if !sessions.add_document(&session_id, &ingested.doc_id, &filename).await {
        // Deleted while the upload ran; nothing of it may outlive the record
        documents.purge_session(&session_id);
        return Err(ApiError::NotFound("Session not found".to_string()));
    }

    Ok(Json(UploadResponse {
        doc_id: ingested.doc_id,
        filename,
        chunks_created: ingested.chunks_created,
    }))
}

pub async fn list_documents_handler(
    State(sessions): State<Arc<SessionService>>,
    Path(session_id): Path<String>,
) -> Result<Json<DocumentList>, ApiError> {
    let session = sessions
        .get_session(&session_id)
        .ok_or_else(|| ApiError::NotFound("Session not found".to_string()))?;

    Ok(Json(DocumentList {
        documents: session.documents,
    }))
}

pub async fn delete_document_handler(
    State(sessions): State<Arc<SessionService>>,
    State(documents): State<Arc<DocumentService>>,
    Path((session_id, doc_id)): Path<(String, String)>,
) -> Result<Json<MessageResponse>, ApiError> {
    let session = sessions
        .get_session(&session_id)
        .ok_or_else(|| ApiError::NotFound("Session not found".to_string()))?;
    if !session.documents.iter().any(|d| d.doc_id == doc_id) {
        return Err(ApiError::NotFound("Document not found".to_string()));
    }

    documents.remove_document(&session_id, &doc_id).await;
    sessions.remove_document(&session_id, &doc_id).await;

    Ok(Json(MessageResponse::new("Document deleted successfully")))
}
