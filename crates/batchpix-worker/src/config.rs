//! Worker configuration.

use std::net::SocketAddr;
use std::time::Duration;

use batchpix_media::{OutputFormat, TranscodeConfig};
use batchpix_media::transcode::{DEFAULT_MAX_DIMENSION, DEFAULT_QUALITY};

/// Hard ceiling on pool size when none is configured.
pub const DEFAULT_MAX_WORKERS: usize = 15;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Requested number of worker units; defaults to available parallelism - 1
    pub desired_concurrency: Option<usize>,
    /// Upper bound on worker units regardless of host size
    pub max_workers: usize,
    /// Per-task fetch timeout
    pub fetch_timeout: Duration,
    /// Directory worker units write their outputs into
    pub output_dir: String,
    /// Bounding box edge for transcoded images
    pub max_dimension: u32,
    /// Encoder quality (JPEG only)
    pub quality: u8,
    /// Encoded output format
    pub output_format: OutputFormat,
    /// Separator between URLs in a row's source field
    pub url_delimiter: String,
    /// Endpoint notified when a batch finishes
    pub webhook_url: Option<String>,
    /// Address for the Prometheus exporter
    pub metrics_addr: Option<SocketAddr>,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            desired_concurrency: None,
            max_workers: DEFAULT_MAX_WORKERS,
            fetch_timeout: Duration::from_secs(10),
            output_dir: "/tmp/batchpix".to_string(),
            max_dimension: DEFAULT_MAX_DIMENSION,
            quality: DEFAULT_QUALITY,
            output_format: OutputFormat::Jpeg,
            url_delimiter: ",".to_string(),
            webhook_url: None,
            metrics_addr: None,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            desired_concurrency: std::env::var("BATCHPIX_CONCURRENCY")
                .ok()
                .and_then(|s| s.parse().ok()),
            max_workers: std::env::var("BATCHPIX_MAX_WORKERS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_WORKERS),
            fetch_timeout: Duration::from_secs(
                std::env::var("BATCHPIX_FETCH_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
            ),
            output_dir: std::env::var("BATCHPIX_OUTPUT_DIR")
                .unwrap_or_else(|_| "/tmp/batchpix".to_string()),
            max_dimension: std::env::var("BATCHPIX_MAX_DIMENSION")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_DIMENSION),
            quality: std::env::var("BATCHPIX_QUALITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_QUALITY),
            output_format: std::env::var("BATCHPIX_FORMAT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
            url_delimiter: std::env::var("BATCHPIX_URL_DELIMITER")
                .unwrap_or_else(|_| ",".to_string()),
            webhook_url: std::env::var("BATCHPIX_WEBHOOK_URL")
                .ok()
                .filter(|s| !s.is_empty()),
            metrics_addr: std::env::var("METRICS_ADDR")
                .ok()
                .and_then(|s| s.parse().ok()),
            shutdown_timeout: Duration::from_secs(
                std::env::var("BATCHPIX_SHUTDOWN_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }

    /// Number of worker units the pool runs: `clamp(desired, 1, max_workers)`.
    pub fn pool_size(&self) -> usize {
        let desired = self
            .desired_concurrency
            .unwrap_or_else(default_concurrency);
        desired.clamp(1, self.max_workers.max(1))
    }

    /// Transcode settings for the default image transcoder.
    pub fn transcode_config(&self) -> TranscodeConfig {
        TranscodeConfig {
            max_dimension: self.max_dimension,
            quality: self.quality,
            format: self.output_format,
        }
    }
}

/// Available parallelism minus one, leaving a core for the coordinator.
fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1))
        .unwrap_or(1)
}
