use anyhow::{Context, Result};
use flume::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::types::ActivityLog;
use crate::config::LoggingConfig;

/// Logger configuration
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// Queue capacity (max logs in memory before records are dropped)
    pub queue_capacity: usize,

    /// Records written per sink call
    pub batch_size: usize,

    /// Max wait time before flushing a partial batch (milliseconds)
    pub batch_timeout_ms: u64,

    pub worker_count: usize,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 10_000,
            batch_size: 100,
            batch_timeout_ms: 1000,
            worker_count: 1,
        }
    }
}

impl From<&LoggingConfig> for LoggerConfig {
    fn from(cfg: &LoggingConfig) -> Self {
        Self {
            queue_capacity: cfg.queue_capacity.max(1),
            batch_size: cfg.batch_size.max(1),
            batch_timeout_ms: cfg.batch_timeout_ms.max(1),
            worker_count: cfg.worker_count.max(1),
        }
    }
}

/// Destination for flushed activity batches
#[async_trait::async_trait]
pub trait ActivitySink: Send + Sync {
    async fn write_batch(&self, batch: &[ActivityLog]) -> Result<usize>;
}

/// Emits each record as a structured tracing event under the `activity` target.
pub struct TracingSink;

#[async_trait::async_trait]
impl ActivitySink for TracingSink {
    async fn write_batch(&self, batch: &[ActivityLog]) -> Result<usize> {
        for log in batch {
            info!(
                target: "activity",
                session_id = %log.session_id,
                activity_type = log.activity_type.as_str(),
                status = log.activity_status.as_str(),
                strategy = log.strategy.as_deref().unwrap_or(""),
                passages = log.passages_retrieved.unwrap_or(0) as u64,
                processing_time_ms = log.processing_time_ms.unwrap_or(0),
                error = log.error_message.as_deref().unwrap_or(""),
                "activity"
            );
        }
        Ok(batch.len())
    }
}

/// Appends records as JSON lines to a file.
pub struct JsonLinesSink {
    file: tokio::sync::Mutex<File>,
}

impl JsonLinesSink {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open activity log {}", path.display()))?;
        Ok(Self {
            file: tokio::sync::Mutex::new(File::from_std(file)),
        })
    }
}

#[async_trait::async_trait]
impl ActivitySink for JsonLinesSink {
    async fn write_batch(&self, batch: &[ActivityLog]) -> Result<usize> {
        let mut buf = Vec::new();
        for log in batch {
            serde_json::to_writer(&mut buf, log)?;
            buf.push(b'\n');
        }
        let mut file = self.file.lock().await;
        file.write_all(&buf).await?;
        file.flush().await?;
        Ok(batch.len())
    }
}

/// Keeps records in memory, handy for inspection in tests.
#[derive(Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<ActivityLog>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<ActivityLog> {
        self.records.lock().clone()
    }
}

#[async_trait::async_trait]
impl ActivitySink for MemorySink {
    async fn write_batch(&self, batch: &[ActivityLog]) -> Result<usize> {
        self.records.lock().extend_from_slice(batch);
        Ok(batch.len())
    }
}

/// Async activity logger with queue mechanism
#[derive(Clone)]
pub struct ActivityLogger {
    sender: Option<Sender<ActivityLog>>,
}

impl ActivityLogger {
    /// Initialize logger with background workers. Must run inside a tokio runtime.
    pub fn new(sink: Arc<dyn ActivitySink>, config: LoggerConfig) -> Self {
        let (sender, receiver) = bounded(config.queue_capacity);

        info!(
            "Initializing ActivityLogger: queue={}, batch={}, timeout={}ms, workers={}",
            config.queue_capacity, config.batch_size, config.batch_timeout_ms, config.worker_count
        );

        for worker_id in 0..config.worker_count {
            let sink = sink.clone();
            let receiver = receiver.clone();
            let config = config.clone();

            tokio::spawn(async move {
                Self::worker_loop(worker_id, sink, receiver, config).await;
            });
        }

        Self { sender: Some(sender) }
    }

    /// Logger that discards everything
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    /// Log activity (non-blocking, fire-and-forget)
    pub fn log(&self, activity: ActivityLog) {
        let Some(sender) = &self.sender else {
            return;
        };
        if let Err(e) = sender.try_send(activity) {
            warn!("Failed to enqueue activity log (queue full?): {}", e);
        }
    }

    async fn worker_loop(
        worker_id: usize,
        sink: Arc<dyn ActivitySink>,
        receiver: Receiver<ActivityLog>,
        config: LoggerConfig,
    ) {
        debug!("Activity worker {} started", worker_id);

        let mut batch: Vec<ActivityLog> = Vec::with_capacity(config.batch_size);
        let batch_timeout = Duration::from_millis(config.batch_timeout_ms);

        loop {
            let deadline = tokio::time::Instant::now() + batch_timeout;

            while batch.len() < config.batch_size {
                match tokio::time::timeout_at(deadline, receiver.recv_async()).await {
                    Ok(Ok(log)) => batch.push(log),
                    Ok(Err(_)) => {
                        // Channel closed, flush and exit
                        if !batch.is_empty() {
                            Self::flush_batch(sink.as_ref(), &batch, worker_id).await;
                        }
                        debug!("Activity worker {} shutting down (channel closed)", worker_id);
                        return;
                    }
                    Err(_) => break,
                }
            }

            if !batch.is_empty() {
                Self::flush_batch(sink.as_ref(), &batch, worker_id).await;
                batch.clear();
            } else {
                sleep(Duration::from_millis(10)).await;
            }
        }
    }

    async fn flush_batch(sink: &dyn ActivitySink, batch: &[ActivityLog], worker_id: usize) {
        match sink.write_batch(batch).await {
            Ok(written) => debug!("Activity worker {} flushed {} records", worker_id, written),
            Err(e) => error!("Activity worker {} failed to write batch: {}", worker_id, e),
        }
    }

    pub fn queue_len(&self) -> usize {
        self.sender.as_ref().map_or(0, |s| s.len())
    }
}
