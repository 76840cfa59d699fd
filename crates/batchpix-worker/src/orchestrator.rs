//! Batch orchestration.
//!
//! Turns parsed rows into items, fans the items out to the worker pool and
//! folds the results back into the batch request. Each batch is driven by one
//! background task that owns the request and its items, so counters are only
//! ever touched from a single place.

use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::task::JoinHandle;
use tracing::{info, warn, Instrument};

use batchpix_models::{
    BatchItem, BatchRequest, BatchRow, ItemState, RequestId, Task, TaskOutcome,
};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::metrics;
use crate::notify::{BatchNotification, Notifier};
use crate::pool::WorkerPool;
use crate::store::BatchStore;

/// Failure reasons quoted in a failed request's message.
const MAX_QUOTED_REASONS: usize = 3;

/// Fans batches out to a worker pool.
#[derive(Clone)]
pub struct BatchOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    pool: WorkerPool,
    store: Arc<dyn BatchStore>,
    notifier: Arc<dyn Notifier>,
    url_delimiter: String,
}

/// Handle to a submitted batch.
pub struct BatchHandle {
    request: BatchRequest,
    join: JoinHandle<BatchRequest>,
}

impl BatchHandle {
    /// The request as it was accepted.
    pub fn request(&self) -> &BatchRequest {
        &self.request
    }

    pub fn request_id(&self) -> &RequestId {
        &self.request.request_id
    }

    /// Wait for the batch to reach a terminal state.
    pub async fn wait(self) -> WorkerResult<BatchRequest> {
        self.join
            .await
            .map_err(|e| WorkerError::BatchAborted(e.to_string()))
    }
}

impl BatchOrchestrator {
    pub fn new(
        pool: WorkerPool,
        store: Arc<dyn BatchStore>,
        notifier: Arc<dyn Notifier>,
        config: &WorkerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                pool,
                store,
                notifier,
                url_delimiter: config.url_delimiter.clone(),
            }),
        }
    }

    /// Accept a batch and start processing it in the background.
    ///
    /// Returns once the request is persisted as Pending. Item creation and
    /// dispatch happen after this returns.
    pub async fn submit_batch(&self, rows: Vec<BatchRow>) -> BatchHandle {
        let request = BatchRequest::new();
        if let Err(e) = self.inner.store.create_request(&request).await {
            warn!(request_id = %request.request_id, error = %e, "Failed to persist new request");
        }

        info!(
            request_id = %request.request_id,
            rows = rows.len(),
            "Batch accepted"
        );

        let span = tracing::info_span!("batch", request_id = %request.request_id);
        let join = tokio::spawn(
            Arc::clone(&self.inner)
                .run_batch(request.clone(), rows)
                .instrument(span),
        );

        BatchHandle { request, join }
    }

    /// Current state of a request.
    pub async fn request(&self, request_id: &RequestId) -> WorkerResult<Option<BatchRequest>> {
        self.inner.store.get_request(request_id).await
    }

    /// Items of a request in creation order.
    pub async fn items(&self, request_id: &RequestId) -> WorkerResult<Vec<BatchItem>> {
        self.inner.store.list_items(request_id).await
    }
}

impl Inner {
    async fn run_batch(self: Arc<Self>, mut request: BatchRequest, rows: Vec<BatchRow>) -> BatchRequest {
        let mut items = build_items(&request.request_id, &rows, &self.url_delimiter);
        request.start_processing(items.len() as u32);
        self.save_request(&request).await;

        if items.is_empty() {
            warn!("Batch has no items");
            request.fail(WorkerError::EmptyBatch.to_string());
            return self.finalize(request).await;
        }

        let mut in_flight = FuturesUnordered::new();
        for (index, item) in items.iter_mut().enumerate() {
            if let Err(e) = self.store.create_item(item).await {
                warn!(item_id = %item.item_id, error = %e, "Failed to persist new item");
            }

            let task = Task::with_id(
                item.task_id.clone(),
                item.source_url.clone(),
                item.serial_number.clone(),
            );
            let handle = self.pool.submit(task);
            item.mark_dispatched();
            self.save_item(item).await;

            in_flight.push(async move { (index, handle.await) });
        }

        info!(items = items.len(), "Batch dispatched");

        let mut reasons = Vec::new();
        while !request.all_resolved() {
            let Some((index, received)) = in_flight.next().await else {
                break;
            };
            let item = &mut items[index];
            match received {
                Ok(result) => match result.outcome {
                    TaskOutcome::Success(output) => item.complete(&output),
                    TaskOutcome::Failure(failure) => item.fail(failure.to_string()),
                },
                Err(e @ WorkerError::DuplicateTask(_)) => item.fail(format!("submit rejected: {}", e)),
                Err(e) => item.fail(format!("task dropped: {}", e)),
            }

            let succeeded = item.state == ItemState::Completed;
            if let Some(reason) = item.error_message.as_ref().filter(|_| !succeeded) {
                warn!(item_id = %item.item_id, url = %item.source_url, reason = %reason, "Item failed");
                reasons.push(reason.clone());
            }

            request.record_item(succeeded);
            self.save_item(item).await;
            self.save_request(&request).await;
        }

        if reasons.is_empty() {
            request.complete();
        } else {
            request.fail(aggregate_failure_message(&reasons, request.total_items));
        }

        self.finalize(request).await
    }

    async fn finalize(&self, request: BatchRequest) -> BatchRequest {
        self.save_request(&request).await;
        metrics::record_batch_finalized(request.state.as_str(), request.total_items);

        info!(
            state = %request.state,
            total_items = request.total_items,
            completed_items = request.completed_items,
            failed_items = request.failed_items,
            "Batch finalized"
        );

        if let Err(e) = self.notifier.notify(&BatchNotification::from(&request)).await {
            warn!(error = %e, "Batch notification failed");
        }

        request
    }

    async fn save_request(&self, request: &BatchRequest) {
        if let Err(e) = self.store.update_request(request).await {
            warn!(request_id = %request.request_id, error = %e, "Failed to persist request");
        }
    }

    async fn save_item(&self, item: &BatchItem) {
        if let Err(e) = self.store.update_item(item).await {
            warn!(item_id = %item.item_id, error = %e, "Failed to persist item");
        }
    }
}

/// One pending item per URL, in row order.
fn build_items(request_id: &RequestId, rows: &[BatchRow], delimiter: &str) -> Vec<BatchItem> {
    let mut items = Vec::new();
    for row in rows {
        let urls = row.urls(delimiter);
        if urls.is_empty() {
            warn!(
                serial_number = %row.serial_number,
                product_label = %row.product_label,
                "Row has no source URLs"
            );
            continue;
        }
        items.extend(
            urls.into_iter()
                .map(|url| BatchItem::new(request_id.clone(), row, url)),
        );
    }
    items
}

fn aggregate_failure_message(reasons: &[String], total: u32) -> String {
    let quoted = reasons
        .iter()
        .take(MAX_QUOTED_REASONS)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("; ");

    format!("{} of {} items failed: {}", reasons.len(), total, quoted)
}
