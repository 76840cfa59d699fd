//! Structured task logging utilities.
//!
//! Provides consistent, structured logging for task execution with
//! tracing spans and contextual information.

use tracing::{error, info, warn, Span};
use batchpix_models::TaskId;

/// Task logger for structured logging with consistent formatting.
///
/// Every line carries the task ID and the slot of the worker unit running it,
/// so a slot can be followed across worker replacements.
#[derive(Debug, Clone)]
pub struct TaskLogger {
    task_id: String,
    slot_id: usize,
}

impl TaskLogger {
    /// Create a new logger for a task running on `slot_id`.
    pub fn new(task_id: &TaskId, slot_id: usize) -> Self {
        Self {
            task_id: task_id.to_string(),
            slot_id,
        }
    }

    /// Log the start of a task.
    pub fn log_start(&self, source_ref: &str) {
        info!(
            task_id = %self.task_id,
            slot_id = self.slot_id,
            source = source_ref,
            "Task started"
        );
    }

    /// Log a handled failure. The worker unit stays available.
    pub fn log_failure(&self, message: &str) {
        warn!(
            task_id = %self.task_id,
            slot_id = self.slot_id,
            "Task failed: {}", message
        );
    }

    /// Log a fault that terminates the worker unit.
    pub fn log_crash(&self, message: &str) {
        error!(
            task_id = %self.task_id,
            slot_id = self.slot_id,
            "Worker crashed during task: {}", message
        );
    }

    /// Log the completion of a task.
    pub fn log_completion(&self, output_ref: &str, input_bytes: u64, output_bytes: u64) {
        info!(
            task_id = %self.task_id,
            slot_id = self.slot_id,
            output = output_ref,
            input_bytes,
            output_bytes,
            "Task completed"
        );
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn slot_id(&self) -> usize {
        self.slot_id
    }

    /// Create a tracing span for this task.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "task",
            task_id = %self.task_id,
            slot_id = self.slot_id
        )
    }
}
