use crate::models::chat::{ChatRequest, HistoryResponse, MessageResponse, QueryOutcome};
use crate::services::conversation::ConversationOrchestrator;
use crate::utils::error::ApiError;
use axum::{
    extract::{Path, State},
    Form, Json,
};
use std::sync::Arc;
use tracing::{info, warn};

pub async fn send_message_handler(
    State(orchestrator): State<Arc<ConversationOrchestrator>>,
    Path(session_id): Path<String>,
    Form(request): Form<ChatRequest>,
) -> Result<Json<QueryOutcome>, ApiError> {
    info!(
        "Chat request: session={}, message_len={}",
        session_id,
        request.query.len()
    );

    let report = orchestrator.process_query_detailed(&session_id, &request.query).await;
    for warning in &report.warnings {
        warn!("Session {}: {}", session_id, warning);
    }

    match report.outcome {
        QueryOutcome::Failed { error } => Err(ApiError::BadRequest(error)),
        answered => Ok(Json(answered)),
    }
}

pub async fn history_handler(
    State(orchestrator): State<Arc<ConversationOrchestrator>>,
    Path(session_id): Path<String>,
) -> Json<HistoryResponse> {
    Json(HistoryResponse {
        messages: orchestrator.get_history(&session_id).await,
    })
}

pub async fn clear_handler(
    State(orchestrator): State<Arc<ConversationOrchestrator>>,
    Path(session_id): Path<String>,
) -> Json<MessageResponse> {
    for warning in orchestrator.clear_history_detailed(&session_id).await {
        warn!("Session {}: {}", session_id, warning);
    }

    Json(MessageResponse::new("Chat history cleared"))
}
