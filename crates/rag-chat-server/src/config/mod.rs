pub mod settings;

pub use settings::{
    EmbeddingConfig, LlmConfig, LoggingConfig, MemoryConfig, PromptsConfig, RagConfig,
    ServerConfig, SessionsConfig, Settings,
};
