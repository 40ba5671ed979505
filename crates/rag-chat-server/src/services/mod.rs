pub mod conversation;
pub mod document_service;
pub mod embedding_service;
pub mod llm_service;
pub mod session_service;
pub mod vector_index;

pub use document_service::{DocumentService, IngestedDocument};
pub use embedding_service::EmbeddingService;
pub use llm_service::LlmService;
pub use session_service::SessionService;
pub use vector_index::VectorIndex;
