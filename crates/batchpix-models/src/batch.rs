//! Batch request and item records.
//!
//! A batch request is the aggregate over every item created from its rows.
//! Items are written only by the orchestrator; the request reaches a terminal
//! state only after every item has.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::task::{TaskId, TaskOutput};

/// Unique identifier for a batch request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a batch item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub String);

impl ItemId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One parsed row of a batch description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRow {
    pub serial_number: String,
    pub product_label: String,
    /// Delimited list of source URLs; may be empty or absent
    #[serde(default)]
    pub source_urls: Option<String>,
}

impl BatchRow {
    pub fn new(
        serial_number: impl Into<String>,
        product_label: impl Into<String>,
        source_urls: Option<&str>,
    ) -> Self {
        Self {
            serial_number: serial_number.into(),
            product_label: product_label.into(),
            source_urls: source_urls.map(str::to_string),
        }
    }

    /// URLs of this row, split on `delimiter`.
    pub fn urls(&self, delimiter: &str) -> Vec<String> {
        self.source_urls
            .as_deref()
            .map(|field| split_source_urls(field, delimiter))
            .unwrap_or_default()
    }
}

/// Split a URL field on `delimiter`, trimming whitespace and dropping empty segments.
///
/// Duplicates are kept; each occurrence becomes its own item.
pub fn split_source_urls(field: &str, delimiter: &str) -> Vec<String> {
    if delimiter.is_empty() {
        let trimmed = field.trim();
        return if trimmed.is_empty() {
            Vec::new()
        } else {
            vec![trimmed.to_string()]
        };
    }

    field
        .split(delimiter)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Batch item processing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    /// Created, not yet handed to the pool
    #[default]
    Pending,
    /// Submitted to the pool
    Dispatched,
    Completed,
    Failed,
}

impl ItemState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemState::Pending => "pending",
            ItemState::Dispatched => "dispatched",
            ItemState::Completed => "completed",
            ItemState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemState::Completed | ItemState::Failed)
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Byte sizes recorded for a completed item.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ItemSizes {
    pub input_bytes: u64,
    pub output_bytes: u64,
    pub ratio: f64,
}

/// Processing record for one source URL within a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItem {
    pub item_id: ItemId,
    pub request_id: RequestId,
    pub serial_number: String,
    pub product_label: String,
    pub source_url: String,
    /// Task that processes this item
    pub task_id: TaskId,
    pub state: ItemState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sizes: Option<ItemSizes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BatchItem {
    /// Create a pending item for one URL of a row.
    pub fn new(request_id: RequestId, row: &BatchRow, source_url: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            item_id: ItemId::new(),
            request_id,
            serial_number: row.serial_number.clone(),
            product_label: row.product_label.clone(),
            source_url: source_url.into(),
            task_id: TaskId::new(),
            state: ItemState::Pending,
            output_ref: None,
            sizes: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Mark the item as handed to the pool.
    pub fn mark_dispatched(&mut self) {
        self.state = ItemState::Dispatched;
        self.updated_at = Utc::now();
    }

    /// Mark the item as completed with its output.
    pub fn complete(&mut self, output: &TaskOutput) {
        self.state = ItemState::Completed;
        self.output_ref = Some(output.output_ref.clone());
        self.sizes = Some(ItemSizes {
            input_bytes: output.input_bytes,
            output_bytes: output.output_bytes,
            ratio: output.ratio,
        });
        self.error_message = None;
        self.updated_at = Utc::now();
    }

    /// Mark the item as failed.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.state = ItemState::Failed;
        self.error_message = Some(error.into());
        self.updated_at = Utc::now();
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// Batch request state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    /// Accepted, fan-out not started
    #[default]
    Pending,
    /// Items are being processed
    Processing,
    /// Every item completed
    Completed,
    /// At least one item failed, or the batch had no items
    Failed,
}

impl RequestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestState::Pending => "pending",
            RequestState::Processing => "processing",
            RequestState::Completed => "completed",
            RequestState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestState::Completed | RequestState::Failed)
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Aggregate record for an entire batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    pub request_id: RequestId,
    pub state: RequestState,
    /// Number of items created from the rows
    pub total_items: u32,
    /// Items that reached Completed
    pub completed_items: u32,
    /// Items that reached Failed
    pub failed_items: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BatchRequest {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            request_id: RequestId::new(),
            state: RequestState::Pending,
            total_items: 0,
            completed_items: 0,
            failed_items: 0,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Enter processing with the final item count.
    pub fn start_processing(&mut self, total_items: u32) {
        self.state = RequestState::Processing;
        self.total_items = total_items;
        self.updated_at = Utc::now();
    }

    /// Count one resolved item.
    pub fn record_item(&mut self, succeeded: bool) {
        if succeeded {
            self.completed_items += 1;
        } else {
            self.failed_items += 1;
        }
        self.updated_at = Utc::now();
    }

    /// Items that reached a terminal state.
    pub fn resolved_items(&self) -> u32 {
        self.completed_items + self.failed_items
    }

    /// True once every item has resolved.
    pub fn all_resolved(&self) -> bool {
        self.resolved_items() >= self.total_items
    }

    pub fn complete(&mut self) {
        self.state = RequestState::Completed;
        self.error_message = None;
        self.updated_at = Utc::now();
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.state = RequestState::Failed;
        self.error_message = Some(error.into());
        self.updated_at = Utc::now();
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

impl Default for BatchRequest {
    fn default() -> Self {
        Self::new()
    }
}
