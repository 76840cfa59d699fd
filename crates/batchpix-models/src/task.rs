//! Task definitions for the worker pool.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a task.
///
/// Carried from submission through the worker unit and back, so a result can
/// be matched to its caller regardless of completion order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    /// Generate a new random task ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A unit of work: fetch one image and transcode it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task ID
    pub task_id: TaskId,
    /// Where the source bytes come from (a URL)
    pub source_ref: String,
    /// File stem for the output; must be unique per task
    pub destination_hint: String,
}

impl Task {
    /// Create a task with a fresh ID.
    pub fn new(source_ref: impl Into<String>, destination_hint: impl Into<String>) -> Self {
        Self {
            task_id: TaskId::new(),
            source_ref: source_ref.into(),
            destination_hint: destination_hint.into(),
        }
    }

    /// Create a task with a caller-chosen ID.
    pub fn with_id(
        task_id: TaskId,
        source_ref: impl Into<String>,
        destination_hint: impl Into<String>,
    ) -> Self {
        Self {
            task_id,
            source_ref: source_ref.into(),
            destination_hint: destination_hint.into(),
        }
    }
}

/// Why a task failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Fetch did not finish within the configured timeout
    FetchTimeout,
    /// Network or HTTP failure while fetching
    FetchError,
    /// Source bytes were not a decodable/encodable image
    TranscodeError,
    /// Output could not be written
    OutputWrite,
    /// The worker unit terminated while running the task
    WorkerCrash,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::FetchTimeout => "fetch_timeout",
            FailureKind::FetchError => "fetch_error",
            FailureKind::TranscodeError => "transcode_error",
            FailureKind::OutputWrite => "output_write",
            FailureKind::WorkerCrash => "worker_crash",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Output of a successful task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutput {
    /// Location of the written output
    pub output_ref: String,
    /// Size of the fetched source in bytes
    pub input_bytes: u64,
    /// Size of the transcoded output in bytes
    pub output_bytes: u64,
    /// `1 - output_bytes / input_bytes`
    pub ratio: f64,
}

impl TaskOutput {
    /// Build an output record, computing the compression ratio.
    pub fn new(output_ref: impl Into<String>, input_bytes: u64, output_bytes: u64) -> Self {
        let ratio = if input_bytes == 0 {
            0.0
        } else {
            1.0 - output_bytes as f64 / input_bytes as f64
        };

        Self {
            output_ref: output_ref.into(),
            input_bytes,
            output_bytes,
            ratio,
        }
    }
}

/// Failure details of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub kind: FailureKind,
    /// Human-readable reason
    pub reason: String,
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.reason)
    }
}

/// Outcome of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskOutcome {
    Success(TaskOutput),
    Failure(TaskFailure),
}

/// Result of a task, produced exactly once per submitted task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: TaskId,
    pub outcome: TaskOutcome,
}

impl TaskResult {
    pub fn success(task_id: TaskId, output: TaskOutput) -> Self {
        Self {
            task_id,
            outcome: TaskOutcome::Success(output),
        }
    }

    pub fn failure(task_id: TaskId, kind: FailureKind, reason: impl Into<String>) -> Self {
        Self {
            task_id,
            outcome: TaskOutcome::Failure(TaskFailure {
                kind,
                reason: reason.into(),
            }),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, TaskOutcome::Success(_))
    }

    /// Failure kind, if the task failed.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match &self.outcome {
            TaskOutcome::Failure(f) => Some(f.kind),
            TaskOutcome::Success(_) => None,
        }
    }
}
