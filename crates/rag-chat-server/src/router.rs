use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};

use crate::handlers;
use crate::state::AppState;

/// Uploads larger than this are rejected before reaching the handler
pub const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::health::root))
        .route("/health", get(handlers::health::health_check))
        // Sessions
        .route("/sessions/create", post(handlers::sessions::create_session_handler))
        .route("/sessions", get(handlers::sessions::list_sessions_handler))
        .route("/sessions/", get(handlers::sessions::list_sessions_handler))
        .route(
            "/sessions/{session_id}",
            get(handlers::sessions::get_session_handler)
                .put(handlers::sessions::update_session_handler)
                .delete(handlers::sessions::delete_session_handler),
        )
        // Chat
        .route("/chat/{session_id}/message", post(handlers::chat::send_message_handler))
        .route("/chat/{session_id}/history", get(handlers::chat::history_handler))
        .route("/chat/{session_id}/clear", post(handlers::chat::clear_handler))
        // Documents
        .route("/documents/{session_id}/upload", post(handlers::documents::upload_handler))
        .route("/documents/{session_id}/list", get(handlers::documents::list_documents_handler))
        .route(
            "/documents/{session_id}/documents/{doc_id}",
            delete(handlers::documents::delete_document_handler),
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}
