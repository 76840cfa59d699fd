//! Test doubles shared by the integration tests.
//!
//! `FakeFetcher` behavior is driven by markers in the URL:
//! - `fail`: returns a download error
//! - `hang`: never finishes within any test timeout
//! - `panic`: panics inside the fetch
//! - `ms=N`: sleeps N milliseconds before returning
//!
//! The fetched bytes contain the URL, so `HalvingTranscoder` can react to
//! markers too: `crash` panics the transcode, `garbage` is a decode error.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use batchpix_media::{Fetcher, MediaError, MediaResult, Transcoder};
use batchpix_worker::{
    BatchNotification, BatchOrchestrator, InMemoryBatchStore, Notifier, WorkerConfig,
    WorkerPool, WorkerResult,
};

const DEFAULT_FETCH_DELAY: Duration = Duration::from_millis(10);

#[derive(Default)]
pub struct FakeFetcher {
    started: Mutex<Vec<String>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl FakeFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// URLs in the order their fetches started.
    pub fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }

    /// Highest number of fetches observed running at once.
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn delay_for(url: &str) -> Duration {
    url.split("ms=")
        .nth(1)
        .and_then(|rest| {
            let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
            digits.parse().ok()
        })
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_FETCH_DELAY)
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> MediaResult<Vec<u8>> {
        self.started.lock().unwrap().push(url.to_string());
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        let _guard = ActiveGuard(&self.active);

        if url.contains("hang") {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        tokio::time::sleep(delay_for(url)).await;

        if url.contains("panic") {
            panic!("fetcher panicked on {}", url);
        }
        if url.contains("fail") {
            return Err(MediaError::download_failed(format!("HTTP 404 for {}", url)));
        }

        Ok(url.repeat(2).into_bytes())
    }
}

/// Keeps the first half of the input. Fetched inputs always have even length.
pub struct HalvingTranscoder;

impl Transcoder for HalvingTranscoder {
    fn transcode(&self, input: &[u8]) -> MediaResult<Vec<u8>> {
        let text = String::from_utf8_lossy(input);
        if text.contains("crash") {
            panic!("transcoder crashed");
        }
        if text.contains("garbage") {
            return Err(MediaError::decode_failed("not an image"));
        }
        Ok(input[..input.len() / 2].to_vec())
    }

    fn extension(&self) -> &str {
        "img"
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    received: Mutex<Vec<BatchNotification>>,
}

impl RecordingNotifier {
    pub fn received(&self) -> Vec<BatchNotification> {
        self.received.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &BatchNotification) -> WorkerResult<()> {
        self.received.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

pub fn config(dir: &Path, workers: usize) -> WorkerConfig {
    WorkerConfig {
        desired_concurrency: Some(workers),
        fetch_timeout: Duration::from_secs(5),
        output_dir: dir.display().to_string(),
        ..Default::default()
    }
}

pub async fn start_pool(config: &WorkerConfig, fetcher: Arc<FakeFetcher>) -> WorkerPool {
    WorkerPool::start(config, fetcher, Arc::new(HalvingTranscoder))
        .await
        .unwrap()
}

pub struct Harness {
    pub pool: WorkerPool,
    pub fetcher: Arc<FakeFetcher>,
    pub notifier: Arc<RecordingNotifier>,
    pub orchestrator: BatchOrchestrator,
}

pub async fn harness(dir: &Path, workers: usize) -> Harness {
    let config = config(dir, workers);
    let fetcher = FakeFetcher::new();
    let pool = start_pool(&config, Arc::clone(&fetcher)).await;
    let notifier = Arc::new(RecordingNotifier::default());
    let orchestrator = BatchOrchestrator::new(
        pool.clone(),
        Arc::new(InMemoryBatchStore::new()),
        notifier.clone(),
        &config,
    );

    Harness {
        pool,
        fetcher,
        notifier,
        orchestrator,
    }
}
