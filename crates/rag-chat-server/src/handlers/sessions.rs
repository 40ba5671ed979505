use crate::models::chat::MessageResponse;
use crate::models::session::{SessionCreate, SessionList, SessionRecord, SessionUpdate};
use crate::services::{DocumentService, SessionService};
use crate::utils::error::ApiError;
use axum::{
    body::Bytes,
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

/// The body is optional; an empty body creates a session with a default name.
pub async fn create_session_handler(
    State(sessions): State<Arc<SessionService>>,
    body: Bytes,
) -> Result<Json<SessionRecord>, ApiError> {
    let request: SessionCreate = if body.iter().all(u8::is_ascii_whitespace) {
        SessionCreate::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("Invalid session payload: {}", e)))?
    };

    Ok(Json(sessions.create_session(request.name).await))
}

pub async fn list_sessions_handler(State(sessions): State<Arc<SessionService>>) -> Json<SessionList> {
    Json(SessionList {
        sessions: sessions.list_sessions(),
    })
}

pub async fn get_session_handler(
    State(sessions): State<Arc<SessionService>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionRecord>, ApiError> {
    sessions
        .get_session(&session_id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Session not found".to_string()))
}

pub async fn update_session_handler(
    State(sessions): State<Arc<SessionService>>,
    Path(session_id): Path<String>,
    Json(request): Json<SessionUpdate>,
) -> Result<Json<SessionRecord>, ApiError> {
    sessions
        .update_session(&session_id, &request.name)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Session not found".to_string()))
}

/// Removes the metadata record together with all conversation and
/// document state of the session.
pub async fn delete_session_handler(
    State(sessions): State<Arc<SessionService>>,
    State(documents): State<Arc<DocumentService>>,
    Path(session_id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    if !sessions.delete_session(&session_id).await {
        return Err(ApiError::NotFound("Session not found".to_string()));
    }

    documents.purge_session(&session_id);

    Ok(Json(MessageResponse::new("Session deleted successfully")))
}
