//! Persistence of batch requests and items.
//!
//! The orchestrator reports every state transition here. Writes are treated
//! as fire-and-forget by the caller: failures are logged and never hold up
//! dispatch.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use batchpix_models::{BatchItem, BatchRequest, RequestId};

use crate::error::{WorkerError, WorkerResult};

/// Storage for request and item records.
#[async_trait]
pub trait BatchStore: Send + Sync {
    async fn create_request(&self, request: &BatchRequest) -> WorkerResult<()>;

    async fn update_request(&self, request: &BatchRequest) -> WorkerResult<()>;

    async fn create_item(&self, item: &BatchItem) -> WorkerResult<()>;

    async fn update_item(&self, item: &BatchItem) -> WorkerResult<()>;

    async fn get_request(&self, request_id: &RequestId) -> WorkerResult<Option<BatchRequest>>;

    /// Items of a request, in creation order.
    async fn list_items(&self, request_id: &RequestId) -> WorkerResult<Vec<BatchItem>>;
}

/// Process-local store. Records live as long as the store does.
#[derive(Default)]
pub struct InMemoryBatchStore {
    requests: RwLock<HashMap<RequestId, BatchRequest>>,
    items: RwLock<HashMap<RequestId, Vec<BatchItem>>>,
}

impl InMemoryBatchStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BatchStore for InMemoryBatchStore {
    async fn create_request(&self, request: &BatchRequest) -> WorkerResult<()> {
        let mut requests = self.requests.write().await;
        if requests.contains_key(&request.request_id) {
            return Err(WorkerError::store(format!(
                "request {} already exists",
                request.request_id
            )));
        }
        requests.insert(request.request_id.clone(), request.clone());
        Ok(())
    }

    async fn update_request(&self, request: &BatchRequest) -> WorkerResult<()> {
        let mut requests = self.requests.write().await;
        match requests.get_mut(&request.request_id) {
            Some(existing) => {
                *existing = request.clone();
                Ok(())
            }
            None => Err(WorkerError::store(format!(
                "request {} not found",
                request.request_id
            ))),
        }
    }

    async fn create_item(&self, item: &BatchItem) -> WorkerResult<()> {
        let mut items = self.items.write().await;
        let owned = items.entry(item.request_id.clone()).or_default();
        if owned.iter().any(|i| i.item_id == item.item_id) {
            return Err(WorkerError::store(format!("item {} already exists", item.item_id)));
        }
        owned.push(item.clone());
        Ok(())
    }

    async fn update_item(&self, item: &BatchItem) -> WorkerResult<()> {
        let mut items = self.items.write().await;
        let existing = items
            .get_mut(&item.request_id)
            .and_then(|owned| owned.iter_mut().find(|i| i.item_id == item.item_id));

        match existing {
            Some(existing) => {
                *existing = item.clone();
                Ok(())
            }
            None => Err(WorkerError::store(format!("item {} not found", item.item_id))),
        }
    }

    async fn get_request(&self, request_id: &RequestId) -> WorkerResult<Option<BatchRequest>> {
        Ok(self.requests.read().await.get(request_id).cloned())
    }

    async fn list_items(&self, request_id: &RequestId) -> WorkerResult<Vec<BatchItem>> {
        Ok(self
            .items
            .read()
            .await
            .get(request_id)
            .cloned()
            .unwrap_or_default())
    }
}
