use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::logging::{ActivityLog, ActivityLogger, ActivityStatus, ActivityType};
use crate::models::chat::{ChatMessage, QueryOutcome};

use super::cache::{RegistryStats, SessionHandle, SessionRegistry};
use super::composer::AnswerComposer;
use super::memory::MemoryProvider;
use super::providers::Retriever;
use super::types::{
    BookkeepingWarning, ConversationMetadata, ProcessReport, RetrievalBinding, SessionState,
};

/// Per-session controller: strategy choice, bounded memory, transcript.
///
/// Collaborator faults never escape: generation and retrieval failures
/// become [`QueryOutcome::Failed`], memory faults become warnings.
pub struct ConversationOrchestrator {
    registry: SessionRegistry,
    composer: AnswerComposer,
    memory_provider: Arc<dyn MemoryProvider>,
    logger: ActivityLogger,
}

impl ConversationOrchestrator {
    pub fn new(
        composer: AnswerComposer,
        memory_provider: Arc<dyn MemoryProvider>,
        logger: ActivityLogger,
    ) -> Self {
        Self {
            registry: SessionRegistry::new(),
            composer,
            memory_provider,
            logger,
        }
    }

    pub async fn process_query(&self, session_id: &str, query: &str) -> QueryOutcome {
        self.process_query_detailed(session_id, query).await.outcome
    }

    /// Like [`process_query`](Self::process_query), also reporting
    /// swallowed bookkeeping faults.
    pub async fn process_query_detailed(&self, session_id: &str, query: &str) -> ProcessReport {
        let start_time = Instant::now();
        let handle = self.session_handle(session_id);

        // Held across generation so turns of one session land in request order
        let mut state = handle.lock().await;
        state.touch();

        let strategy = state.strategy();
        let recent_history = state.memory.load();

        self.logger.log(
            ActivityLog::builder(session_id, ActivityType::QueryReceived)
                .strategy(strategy.label())
                .message(query)
                .status(ActivityStatus::Info)
                .build(),
        );

        debug!(
            "Session {} query via {} path ({} chars of history)",
            session_id,
            strategy.label(),
            recent_history.len()
        );

        state.metadata.total_queries += 1;
        if strategy.has_context() {
            state.metadata.rag_queries += 1;
        } else {
            state.metadata.general_queries += 1;
        }

        let composed = match self.composer.compose(query, &recent_history, &strategy).await {
            Ok(composed) => composed,
            Err(e) => {
                let message = e.to_string();
                warn!("Query failed for session {}: {:#}", session_id, e);
                state.metadata.failed_queries += 1;
                self.logger.log(
                    ActivityLog::builder(session_id, ActivityType::GenerationFailed)
                        .strategy(strategy.label())
                        .error(&message)
                        .processing_time(start_time.elapsed().as_millis() as u64)
                        .build(),
                );
                return ProcessReport::failed(message);
            }
        };

        let mut warnings = Vec::new();
        if let Err(e) = state.memory.save(query, &composed.answer) {
            warn!("Failed to save turn to memory for session {}: {:#}", session_id, e);
            self.logger.log(
                ActivityLog::builder(session_id, ActivityType::MemoryWriteFailed)
                    .warning(e.to_string())
                    .build(),
            );
            warnings.push(BookkeepingWarning::MemoryWrite(e.to_string()));
        }

        state.transcript.push(ChatMessage::user(query));
        state.transcript.push(ChatMessage::assistant(composed.answer.clone()));

        self.logger.log(
            ActivityLog::builder(session_id, ActivityType::QueryAnswered)
                .strategy(strategy.label())
                .response(&composed.answer)
                .passages(composed.passages_used)
                .memory_tokens(state.memory.token_count())
                .processing_time(start_time.elapsed().as_millis() as u64)
                .build(),
        );

        ProcessReport {
            outcome: QueryOutcome::answered(composed.answer),
            warnings,
        }
    }

    /// Full unbounded transcript; empty for unknown sessions.
    pub async fn get_history(&self, session_id: &str) -> Vec<ChatMessage> {
        match self.registry.get(session_id) {
            Some(handle) => handle.lock().await.transcript.clone(),
            None => Vec::new(),
        }
    }

    /// Current bounded-memory text; empty for unknown sessions.
    pub async fn memory_snapshot(&self, session_id: &str) -> String {
        match self.registry.get(session_id) {
            Some(handle) => handle.lock().await.memory.load(),
            None => String::new(),
        }
    }

    pub async fn clear_history(&self, session_id: &str) {
        self.clear_history_detailed(session_id).await;
    }

    /// Clear bounded memory (best-effort) and the transcript (always).
    pub async fn clear_history_detailed(&self, session_id: &str) -> Vec<BookkeepingWarning> {
        let handle = self.session_handle(session_id);
        let mut state = handle.lock().await;

        let mut warnings = Vec::new();
        if let Err(e) = state.memory.clear() {
            warn!("Failed to clear memory for session {}: {:#}", session_id, e);
            self.logger.log(
                ActivityLog::builder(session_id, ActivityType::MemoryClearFailed)
                    .warning(e.to_string())
                    .build(),
            );
            warnings.push(BookkeepingWarning::MemoryClear(e.to_string()));
            // A memory that refuses to clear is replaced so no turns survive
            state.memory = self.memory_provider.create();
        }

        state.transcript.clear();

        self.logger.log(ActivityLog::builder(session_id, ActivityType::HistoryCleared).build());
        warnings
    }

    /// Drop binding, memory and transcript together. Unknown ids are a no-op.
    pub fn delete_session(&self, session_id: &str) {
        if self.registry.remove(session_id).is_some() {
            info!("Deleted conversation state for session {}", session_id);
            self.logger.log(ActivityLog::builder(session_id, ActivityType::SessionDeleted).build());
        } else {
            debug!("delete_session: no state for session {}", session_id);
        }
    }

    /// Attach a document index; later queries of the session use the RAG path.
    pub async fn set_vectorstore(&self, session_id: &str, retriever: Arc<dyn Retriever>) {
        let handle = self.session_handle(session_id);
        handle.lock().await.binding = Some(RetrievalBinding::new(retriever));

        info!("Retriever attached to session {}", session_id);
        self.logger.log(ActivityLog::builder(session_id, ActivityType::RetrieverAttached).build());
    }

    /// Remove the binding so the session falls back to the general path.
    pub async fn detach_vectorstore(&self, session_id: &str) {
        let Some(handle) = self.registry.get(session_id) else {
            return;
        };
        if handle.lock().await.binding.take().is_some() {
            info!("Retriever detached from session {}", session_id);
            self.logger
                .log(ActivityLog::builder(session_id, ActivityType::RetrieverDetached).build());
        }
    }

    pub async fn has_vectorstore(&self, session_id: &str) -> bool {
        match self.registry.get(session_id) {
            Some(handle) => handle.lock().await.binding.is_some(),
            None => false,
        }
    }

    pub async fn session_metadata(&self, session_id: &str) -> Option<ConversationMetadata> {
        let handle = self.registry.get(session_id)?;
        let metadata = handle.lock().await.metadata.clone();
        Some(metadata)
    }

    pub fn stats(&self) -> RegistryStats {
        self.registry.stats()
    }

    pub fn logger(&self) -> &ActivityLogger {
        &self.logger
    }

    fn session_handle(&self, session_id: &str) -> SessionHandle {
        let (handle, created) = self.registry.get_or_create(session_id, || {
            SessionState::new(session_id.to_string(), self.memory_provider.create())
        });

        if created {
            self.logger.log(
                ActivityLog::builder(session_id, ActivityType::SessionCreated)
                    .status(ActivityStatus::Info)
                    .build(),
            );
        }
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::conversation::memory::{ConversationMemory, TokenBufferMemoryProvider};
    use crate::services::conversation::providers::{GeneratedAnswer, MockGenerator, MockRetriever};
    use mockall::predicate::{always, eq};

    fn orchestrator(generator: MockGenerator) -> ConversationOrchestrator {
        ConversationOrchestrator::new(
            AnswerComposer::new(Arc::new(generator)),
            Arc::new(TokenBufferMemoryProvider::default()),
            ActivityLogger::disabled(),
        )
    }

    /// Memory whose save and clear always fail
    struct BrokenMemory;

    impl ConversationMemory for BrokenMemory {
        fn save(&mut self, _input: &str, _output: &str) -> anyhow::Result<()> {
            anyhow::bail!("disk quota")
        }
        fn load(&self) -> String {
            "Human: stale\nAI: stale".to_string()
        }
        fn clear(&mut self) -> anyhow::Result<()> {
            anyhow::bail!("clear refused")
        }
        fn token_count(&self) -> usize {
            0
        }
    }

    /// First memory is broken, replacements are healthy
    struct FlakyProvider {
        created: parking_lot::Mutex<usize>,
    }

    impl MemoryProvider for FlakyProvider {
        fn create(&self) -> Box<dyn ConversationMemory> {
            let mut created = self.created.lock();
            *created += 1;
            if *created == 1 {
                Box::new(BrokenMemory)
            } else {
                TokenBufferMemoryProvider::default().create()
            }
        }
    }

    #[tokio::test]
    async fn test_general_path_without_binding() {
        let mut generator = MockGenerator::new();
        generator
            .expect_generate()
            .with(always(), eq("What is 2+2?"), eq(""))
            .times(1)
            .returning(|_, _, _| Ok(GeneratedAnswer::new("2+2 is 4.")));

        let orch = orchestrator(generator);
        let outcome = orch.process_query("s1", "What is 2+2?").await;

        assert_eq!(outcome, QueryOutcome::answered("2+2 is 4."));
        assert!(!orch.has_vectorstore("s1").await);
    }

    #[tokio::test]
    async fn test_rag_path_grounds_but_does_not_echo_passages() {
        let mut generator = MockGenerator::new();
        generator
            .expect_generate()
            .with(always(), eq("What is this document about?"), eq("Apples are fruits."))
            .times(1)
            .returning(|_, _, _| Ok(GeneratedAnswer::new("It is about fruit.")));

        let mut retriever = MockRetriever::new();
        retriever
            .expect_top_k()
            .with(always(), eq(3))
            .times(1)
            .returning(|_, _| Ok(vec!["Apples are fruits.".to_string()]));

        let orch = orchestrator(generator);
        orch.set_vectorstore("s1", Arc::new(retriever)).await;
        let outcome = orch.process_query("s1", "What is this document about?").await;

        match outcome {
            QueryOutcome::Answered { answer, context } => {
                assert_eq!(answer, "It is about fruit.");
                assert!(context.is_empty());
            }
            QueryOutcome::Failed { error } => panic!("unexpected failure: {}", error),
        }
    }

    #[tokio::test]
    async fn test_memory_write_fault_is_swallowed() {
        let mut generator = MockGenerator::new();
        generator
            .expect_generate()
            .returning(|_, _, _| Ok(GeneratedAnswer::new("answer")));

        let orch = ConversationOrchestrator::new(
            AnswerComposer::new(Arc::new(generator)),
            Arc::new(FlakyProvider { created: parking_lot::Mutex::new(0) }),
            ActivityLogger::disabled(),
        );

        let report = orch.process_query_detailed("s1", "question").await;
        assert_eq!(report.outcome, QueryOutcome::answered("answer"));
        assert_eq!(
            report.warnings,
            vec![BookkeepingWarning::MemoryWrite("disk quota".to_string())]
        );
        assert_eq!(orch.get_history("s1").await.len(), 2);
    }

    #[tokio::test]
    async fn test_clear_fault_still_empties_everything() {
        let mut generator = MockGenerator::new();
        generator
            .expect_generate()
            .returning(|_, _, _| Ok(GeneratedAnswer::new("answer")));

        let orch = ConversationOrchestrator::new(
            AnswerComposer::new(Arc::new(generator)),
            Arc::new(FlakyProvider { created: parking_lot::Mutex::new(0) }),
            ActivityLogger::disabled(),
        );
        orch.process_query("s1", "question").await;
        assert!(!orch.memory_snapshot("s1").await.is_empty());

        let warnings = orch.clear_history_detailed("s1").await;
        assert_eq!(
            warnings,
            vec![BookkeepingWarning::MemoryClear("clear refused".to_string())]
        );
        assert!(orch.get_history("s1").await.is_empty());
        assert_eq!(orch.memory_snapshot("s1").await, "");
    }

    #[tokio::test]
    async fn test_failed_generation_counts_in_metadata() {
        let mut generator = MockGenerator::new();
        generator
            .expect_generate()
            .returning(|_, _, _| Err(anyhow::anyhow!("rate limited")));

        let orch = orchestrator(generator);
        let outcome = orch.process_query("s1", "hi").await;

        assert_eq!(outcome.error(), Some("rate limited"));
        let metadata = orch.session_metadata("s1").await.unwrap();
        assert_eq!(metadata.total_queries, 1);
        assert_eq!(metadata.failed_queries, 1);
        assert_eq!(metadata.general_queries, 1);
    }

    #[tokio::test]
    async fn test_detach_returns_to_general_path() {
        let mut generator = MockGenerator::new();
        generator
            .expect_generate()
            .with(always(), always(), eq(""))
            .times(1)
            .returning(|_, _, _| Ok(GeneratedAnswer::new("general")));

        let mut retriever = MockRetriever::new();
        retriever.expect_top_k().never();

        let orch = orchestrator(generator);
        orch.set_vectorstore("s1", Arc::new(retriever)).await;
        orch.detach_vectorstore("s1").await;

        assert!(!orch.has_vectorstore("s1").await);
        assert_eq!(orch.process_query("s1", "q").await, QueryOutcome::answered("general"));
    }
}
