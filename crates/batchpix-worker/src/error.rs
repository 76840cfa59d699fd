//! Worker error types.

use batchpix_models::TaskId;
use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Empty batch: no row had a usable source URL")]
    EmptyBatch,

    #[error("Worker pool is shut down")]
    PoolShutDown,

    #[error("Task {0} is already queued or in flight")]
    DuplicateTask(TaskId),

    #[error("Batch processing aborted: {0}")]
    BatchAborted(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Notification failed: {0}")]
    Notify(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Media error: {0}")]
    Media(#[from] batchpix_media::MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    pub fn notify(msg: impl Into<String>) -> Self {
        Self::Notify(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}
