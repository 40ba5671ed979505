use anyhow::Result;
use axum::extract::FromRef;
use std::sync::Arc;

use crate::config::Settings;
use crate::logging::ActivityLogger;
use crate::services::conversation::{
    AnswerComposer, ApproxTokenCounter, ConversationOrchestrator, TokenBufferMemoryProvider,
};
use crate::services::{DocumentService, EmbeddingService, LlmService, SessionService};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ConversationOrchestrator>,
    pub session_service: Arc<SessionService>,
    pub document_service: Arc<DocumentService>,
    pub settings: Arc<Settings>,
}

impl FromRef<AppState> for Arc<ConversationOrchestrator> {
    fn from_ref(state: &AppState) -> Self {
        state.orchestrator.clone()
    }
}

impl FromRef<AppState> for Arc<SessionService> {
    fn from_ref(state: &AppState) -> Self {
        state.session_service.clone()
    }
}

impl FromRef<AppState> for Arc<DocumentService> {
    fn from_ref(state: &AppState) -> Self {
        state.document_service.clone()
    }
}

impl AppState {
    /// Wire the production services from configuration.
    pub fn from_settings(settings: Settings, logger: ActivityLogger) -> Result<Self> {
        let llm_service = Arc::new(LlmService::new(settings.llm.clone()));
        let embedding_service = Arc::new(EmbeddingService::new(settings.embedding.clone()));

        let memory_provider = Arc::new(TokenBufferMemoryProvider::new(
            settings.memory.max_token_limit,
            Arc::new(ApproxTokenCounter::default()),
        ));
        let composer = AnswerComposer::with_prompts(llm_service, &settings.prompts);
        let orchestrator = Arc::new(ConversationOrchestrator::new(composer, memory_provider, logger));

        let document_service = Arc::new(DocumentService::new(
            orchestrator.clone(),
            embedding_service,
            &settings.rag,
        ));
        let session_service = Arc::new(SessionService::new(settings.sessions.storage_path.clone())?);

        Ok(Self {
            orchestrator,
            session_service,
            document_service,
            settings: Arc::new(settings),
        })
    }
}
