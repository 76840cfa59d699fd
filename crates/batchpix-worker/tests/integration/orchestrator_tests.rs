//! Batch orchestrator tests.

use std::collections::HashSet;

use batchpix_models::{BatchRow, FailureKind, ItemState, RequestState};
use batchpix_worker::WorkerError;

use super::support::harness;

fn three_rows() -> Vec<BatchRow> {
    vec![
        BatchRow::new("SN-1", "Chair", Some("mem://chair-front, mem://chair-back")),
        BatchRow::new("SN-2", "Desk", Some("mem://desk")),
        BatchRow::new("SN-3", "Lamp", Some("")),
    ]
}

#[tokio::test]
async fn test_three_row_batch_completes() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path(), 2).await;

    let handle = h.orchestrator.submit_batch(three_rows()).await;
    let request = handle.wait().await.unwrap();

    assert_eq!(request.state, RequestState::Completed);
    assert_eq!(request.total_items, 3);
    assert_eq!(request.completed_items, 3);
    assert_eq!(request.failed_items, 0);
    assert!(request.error_message.is_none());

    let items = h.orchestrator.items(&request.request_id).await.unwrap();
    assert_eq!(items.len(), 3);
    assert!(items.iter().all(|i| i.state == ItemState::Completed));
    for item in &items {
        let sizes = item.sizes.unwrap();
        assert!(sizes.output_bytes < sizes.input_bytes);
        assert!(item.output_ref.is_some());
    }

    let serials: Vec<_> = items.iter().map(|i| i.serial_number.as_str()).collect();
    assert_eq!(serials, vec!["SN-1", "SN-1", "SN-2"]);
    assert_eq!(h.fetcher.started().len(), 3);

    h.pool.shutdown().await;
}

#[tokio::test]
async fn test_submit_returns_before_processing() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path(), 1).await;

    let handle = h
        .orchestrator
        .submit_batch(vec![BatchRow::new("SN-1", "Chair", Some("mem://slow?ms=200"))])
        .await;

    assert_eq!(handle.request().state, RequestState::Pending);
    let stored = h
        .orchestrator
        .request(handle.request_id())
        .await
        .unwrap()
        .unwrap();
    assert!(!stored.is_terminal());

    let request = handle.wait().await.unwrap();
    assert_eq!(request.state, RequestState::Completed);
    h.pool.shutdown().await;
}

#[tokio::test]
async fn test_one_failure_fails_batch() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path(), 2).await;

    let rows = vec![
        BatchRow::new("SN-1", "Chair", Some("mem://chair,mem://fail-404")),
        BatchRow::new("SN-2", "Desk", Some("mem://desk")),
    ];
    let request = h.orchestrator.submit_batch(rows).await.wait().await.unwrap();

    assert_eq!(request.state, RequestState::Failed);
    assert_eq!(request.completed_items, 2);
    assert_eq!(request.failed_items, 1);
    let message = request.error_message.clone().unwrap();
    assert!(message.starts_with("1 of 3 items failed: fetch_error"));

    // Successful siblings stay retrievable.
    let items = h.orchestrator.items(&request.request_id).await.unwrap();
    let completed: Vec<_> = items
        .iter()
        .filter(|i| i.state == ItemState::Completed)
        .map(|i| i.source_url.as_str())
        .collect();
    assert_eq!(completed, vec!["mem://chair", "mem://desk"]);

    let failed = items.iter().find(|i| i.state == ItemState::Failed).unwrap();
    assert!(failed.error_message.as_deref().unwrap().contains("HTTP 404"));
    h.pool.shutdown().await;
}

#[tokio::test]
async fn test_rows_without_urls_make_empty_batch() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path(), 1).await;

    let rows = vec![
        BatchRow::new("SN-1", "Chair", Some("")),
        BatchRow::new("SN-2", "Desk", None),
        BatchRow::new("SN-3", "Lamp", Some(" , ")),
    ];
    let request = h.orchestrator.submit_batch(rows).await.wait().await.unwrap();

    assert_eq!(request.state, RequestState::Failed);
    assert_eq!(request.total_items, 0);
    assert_eq!(
        request.error_message.as_deref(),
        Some(WorkerError::EmptyBatch.to_string().as_str())
    );
    assert!(h.orchestrator.items(&request.request_id).await.unwrap().is_empty());
    assert!(h.fetcher.started().is_empty());

    let received = h.notifier.received();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].final_state, RequestState::Failed);
    h.pool.shutdown().await;
}

#[tokio::test]
async fn test_duplicate_urls_are_independent_items() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path(), 2).await;

    let rows = vec![BatchRow::new("SN-1", "Chair", Some("mem://same,mem://same"))];
    let request = h.orchestrator.submit_batch(rows).await.wait().await.unwrap();
    assert_eq!(request.state, RequestState::Completed);

    let items = h.orchestrator.items(&request.request_id).await.unwrap();
    assert_eq!(items.len(), 2);
    assert_ne!(items[0].item_id, items[1].item_id);
    assert_ne!(items[0].task_id, items[1].task_id);
    assert_ne!(items[0].output_ref, items[1].output_ref);

    // Identical bytes, identical output size.
    assert_eq!(
        items[0].sizes.map(|s| s.output_bytes),
        items[1].sizes.map(|s| s.output_bytes)
    );
    h.pool.shutdown().await;
}

#[tokio::test]
async fn test_notifier_called_once_per_batch() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path(), 2).await;

    let first = h.orchestrator.submit_batch(three_rows()).await;
    let second = h
        .orchestrator
        .submit_batch(vec![BatchRow::new("SN-9", "Rug", Some("mem://fail"))])
        .await;

    let first = first.wait().await.unwrap();
    let second = second.wait().await.unwrap();

    let received = h.notifier.received();
    assert_eq!(received.len(), 2);
    let ids: HashSet<_> = received.iter().map(|n| n.request_id.clone()).collect();
    assert!(ids.contains(&first.request_id));
    assert!(ids.contains(&second.request_id));
    h.pool.shutdown().await;
}

#[tokio::test]
async fn test_crash_fails_only_its_item() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path(), 2).await;

    let rows = vec![
        BatchRow::new("SN-1", "Chair", Some("mem://crash")),
        BatchRow::new("SN-2", "Desk", Some("mem://desk-1,mem://desk-2,mem://desk-3")),
    ];
    let request = h.orchestrator.submit_batch(rows).await.wait().await.unwrap();

    assert_eq!(request.state, RequestState::Failed);
    assert_eq!(request.failed_items, 1);
    assert_eq!(request.completed_items, 3);

    let items = h.orchestrator.items(&request.request_id).await.unwrap();
    let crashed = &items[0];
    assert_eq!(crashed.state, ItemState::Failed);
    assert!(crashed
        .error_message
        .as_deref()
        .unwrap()
        .starts_with(FailureKind::WorkerCrash.as_str()));

    let stats = h.pool.stats().await.unwrap();
    assert_eq!(stats.size, 2);
    assert_eq!(stats.replacements, 1);
    h.pool.shutdown().await;
}

#[tokio::test]
async fn test_batch_after_pool_shutdown_fails_items() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path(), 1).await;
    h.pool.shutdown().await;

    let request = h
        .orchestrator
        .submit_batch(vec![BatchRow::new("SN-1", "Chair", Some("mem://a,mem://b"))])
        .await
        .wait()
        .await
        .unwrap();

    assert_eq!(request.state, RequestState::Failed);
    assert_eq!(request.failed_items, 2);
    let items = h.orchestrator.items(&request.request_id).await.unwrap();
    assert!(items.iter().all(|i| i
        .error_message
        .as_deref()
        .is_some_and(|m| m.starts_with("task dropped") && m.contains("shut down"))));
}
