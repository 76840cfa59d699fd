//! Batch completion notifications.
//!
//! Called once per batch after it reaches a terminal state. Delivery is
//! best effort: a failed notification is logged and never retried.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::info;

use batchpix_models::{BatchRequest, RequestId, RequestState};

use crate::error::{WorkerError, WorkerResult};

/// Payload sent when a batch finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchNotification {
    pub request_id: RequestId,
    pub final_state: RequestState,
    pub total_items: u32,
    pub failed_items: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl From<&BatchRequest> for BatchNotification {
    fn from(request: &BatchRequest) -> Self {
        Self {
            request_id: request.request_id.clone(),
            final_state: request.state,
            total_items: request.total_items,
            failed_items: request.failed_items,
            error_message: request.error_message.clone(),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &BatchNotification) -> WorkerResult<()>;
}

/// Notifier that only writes a log line.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &BatchNotification) -> WorkerResult<()> {
        info!(
            request_id = %notification.request_id,
            state = %notification.final_state,
            total_items = notification.total_items,
            failed_items = notification.failed_items,
            "Batch finished"
        );
        Ok(())
    }
}

/// Posts the notification as JSON to a fixed URL. One attempt per batch.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> WorkerResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| WorkerError::config_error(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: &BatchNotification) -> WorkerResult<()> {
        let response = self
            .client
            .post(&self.url)
            .json(notification)
            .send()
            .await
            .map_err(|e| WorkerError::notify(e.to_string()))?;

        if !response.status().is_success() {
            return Err(WorkerError::notify(format!(
                "webhook returned HTTP {}",
                response.status()
            )));
        }

        info!(
            request_id = %notification.request_id,
            url = %self.url,
            "Batch notification delivered"
        );
        Ok(())
    }
}
