//! Image batch worker.
//!
//! This crate provides:
//! - A fixed-size worker pool with FIFO dispatch and crash replacement
//! - Worker units that fetch, transcode and store one image per task
//! - A batch orchestrator that fans rows out to the pool and aggregates state
//! - Persistence and notification collaborators
//! - Structured logging and metrics

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod notify;
pub mod orchestrator;
pub mod pool;
pub mod store;
mod unit;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use logging::TaskLogger;
pub use notify::{BatchNotification, LogNotifier, Notifier, WebhookNotifier};
pub use orchestrator::{BatchHandle, BatchOrchestrator};
pub use pool::{PoolStats, TaskHandle, WorkerPool};
pub use store::{BatchStore, InMemoryBatchStore};
