//! Image batch worker binary.
//!
//! Usage: `batchpix-worker <rows.json>`

use std::sync::Arc;

use anyhow::{bail, Context};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use batchpix_media::{HttpFetcher, ImageTranscoder};
use batchpix_models::BatchRow;
use batchpix_worker::{
    metrics, BatchOrchestrator, InMemoryBatchStore, LogNotifier, Notifier, WebhookNotifier,
    WorkerConfig, WorkerPool,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("batchpix=info".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(true).with_target(true))
            .with(env_filter)
            .init();
    }

    let Some(rows_path) = std::env::args().nth(1) else {
        bail!("usage: batchpix-worker <rows.json>");
    };

    info!("Starting batchpix-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    if let Some(addr) = config.metrics_addr {
        metrics::init_prometheus(addr)?;
        info!(%addr, "Metrics exporter listening");
    }

    let raw = tokio::fs::read_to_string(&rows_path)
        .await
        .with_context(|| format!("failed to read {}", rows_path))?;
    let rows: Vec<BatchRow> =
        serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", rows_path))?;

    let fetcher = Arc::new(HttpFetcher::new(config.fetch_timeout)?);
    let transcoder = Arc::new(ImageTranscoder::new(config.transcode_config()));
    let pool = WorkerPool::start(&config, fetcher, transcoder).await?;

    let notifier: Arc<dyn Notifier> = match &config.webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(url.clone())?),
        None => Arc::new(LogNotifier),
    };
    let store = Arc::new(InMemoryBatchStore::new());
    let orchestrator = BatchOrchestrator::new(pool.clone(), store, notifier, &config);

    let handle = orchestrator.submit_batch(rows).await;
    let request_id = handle.request_id().clone();

    let finished = tokio::select! {
        result = handle.wait() => match result {
            Ok(request) => Some(request),
            Err(e) => {
                error!("Batch error: {}", e);
                None
            }
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            None
        }
    };

    let request = match finished {
        Some(request) => Some(request),
        None => orchestrator.request(&request_id).await?,
    };
    let items = orchestrator.items(&request_id).await?;
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "request": request,
            "items": items,
        }))?
    );

    if tokio::time::timeout(config.shutdown_timeout, pool.shutdown())
        .await
        .is_err()
    {
        warn!("Worker pool did not stop within {:?}", config.shutdown_timeout);
    }

    info!("Worker shutdown complete");
    Ok(())
}
