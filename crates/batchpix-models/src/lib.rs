//! Shared data models for BatchPix.
//!
//! This crate provides Serde-serializable types for:
//! - Tasks submitted to the worker pool and their results
//! - Batch rows, items and the aggregate batch request

pub mod batch;
pub mod task;

// Re-export common types
pub use batch::{
    split_source_urls, BatchItem, BatchRequest, BatchRow, ItemId, ItemSizes, ItemState, RequestId,
    RequestState,
};
pub use task::{FailureKind, Task, TaskFailure, TaskId, TaskOutcome, TaskOutput, TaskResult};
