//! Prometheus metrics for the worker pool and orchestrator.

use std::net::SocketAddr;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::{WorkerError, WorkerResult};

/// Install the Prometheus recorder with an HTTP scrape endpoint on `addr`.
pub fn init_prometheus(addr: SocketAddr) -> WorkerResult<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| WorkerError::config_error(format!("Failed to install metrics exporter: {}", e)))
}

/// Metric names as constants for consistency.
pub mod names {
    // Pool metrics
    pub const TASKS_SUBMITTED_TOTAL: &str = "batchpix_tasks_submitted_total";
    pub const TASKS_COMPLETED_TOTAL: &str = "batchpix_tasks_completed_total";
    pub const TASK_DURATION_SECONDS: &str = "batchpix_task_duration_seconds";
    pub const WORKER_REPLACEMENTS_TOTAL: &str = "batchpix_worker_replacements_total";
    pub const POOL_QUEUE_DEPTH: &str = "batchpix_pool_queue_depth";
    pub const POOL_BUSY_WORKERS: &str = "batchpix_pool_busy_workers";

    // Batch metrics
    pub const BATCHES_FINALIZED_TOTAL: &str = "batchpix_batches_finalized_total";
    pub const BATCH_ITEMS_TOTAL: &str = "batchpix_batch_items_total";
}

pub fn record_task_submitted() {
    counter!(names::TASKS_SUBMITTED_TOTAL).increment(1);
}

/// Record a finished task; `outcome` is "success" or a failure kind.
pub fn record_task_completed(outcome: &str, duration_secs: f64) {
    let labels = [("outcome", outcome.to_string())];
    counter!(names::TASKS_COMPLETED_TOTAL, &labels).increment(1);
    histogram!(names::TASK_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_worker_replaced(slot_id: usize) {
    let labels = [("slot", slot_id.to_string())];
    counter!(names::WORKER_REPLACEMENTS_TOTAL, &labels).increment(1);
}

pub fn set_queue_depth(depth: usize) {
    gauge!(names::POOL_QUEUE_DEPTH).set(depth as f64);
}

pub fn set_busy_workers(busy: usize) {
    gauge!(names::POOL_BUSY_WORKERS).set(busy as f64);
}

pub fn record_batch_finalized(state: &str, items: u32) {
    let labels = [("state", state.to_string())];
    counter!(names::BATCHES_FINALIZED_TOTAL, &labels).increment(1);
    counter!(names::BATCH_ITEMS_TOTAL).increment(u64::from(items));
}
