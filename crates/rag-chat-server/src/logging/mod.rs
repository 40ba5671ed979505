//! Process tracing setup plus the async activity log queue

mod logger;
pub mod types;

pub use logger::{
    ActivityLogger, ActivitySink, JsonLinesSink, LoggerConfig, MemorySink, TracingSink,
};
pub use types::{ActivityLog, ActivityStatus, ActivityType};

use anyhow::Result;
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;

/// Install the global JSON subscriber. Keep the returned guard alive for
/// the life of the process when a log directory is configured.
pub fn init_tracing(cfg: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,rag_chat_server=debug"));

    let stdout_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_thread_ids(true);

    match &cfg.directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "rag-chat-server.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file_layer = fmt::layer()
                .json()
                .with_target(true)
                .with_ansi(false)
                .with_writer(writer);

            tracing_subscriber::registry()
                .with(filter)
                .with(stdout_layer)
                .with(file_layer)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stdout_layer)
                .init();
            None
        }
    }
}

/// Activity logger writing to the configured sink.
pub fn build_activity_logger(cfg: &LoggingConfig) -> Result<ActivityLogger> {
    let sink: Arc<dyn ActivitySink> = match &cfg.activity_file {
        Some(path) => Arc::new(JsonLinesSink::open(path)?),
        None => Arc::new(TracingSink),
    };
    Ok(ActivityLogger::new(sink, LoggerConfig::from(cfg)))
}
