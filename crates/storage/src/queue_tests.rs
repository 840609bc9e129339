// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;
use sw_core::Event;

fn test_config() -> QueueConfig {
    QueueConfig {
        max_size: 100,
        max_age_hours: 72,
        compression_threshold: 1_024,
        batch_size: 50,
        retry_delays: vec![30, 300, 1_800, 7_200],
        cleanup_interval: 3_600,
    }
}

fn event(fields: serde_json::Value) -> Event {
    match fields {
        serde_json::Value::Object(map) => Event::new(map),
        other => panic!("expected object, got {other}"),
    }
}

async fn open_queue(dir: &tempfile::TempDir) -> PersistentQueue {
    PersistentQueue::open(&dir.path().join("persistent_queue.db"), &test_config()).await.unwrap()
}

#[tokio::test]
async fn enqueue_dequeue_complete_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let queue = open_queue(&dir).await;

    let id = queue.enqueue(&event(json!({"user": "alice"})), 0, None).await.unwrap();
    assert_eq!(queue.pending_count().await.unwrap(), 1);

    let batch = queue.dequeue_batch(None).await.unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].id, id);
    assert_eq!(batch[0].status, QueueStatus::Processing);
    assert_eq!(batch[0].payload.fields["user"], "alice");
    // Processing rows are not pending
    assert_eq!(queue.pending_count().await.unwrap(), 0);

    queue.mark_completed(&[id.clone()]).await.unwrap();
    let row = queue.get_event(&id).await.unwrap().unwrap();
    assert_eq!(row.status, QueueStatus::Completed);
}

#[tokio::test]
async fn dequeue_orders_by_priority_then_age() {
    let dir = tempfile::tempdir().unwrap();
    let queue = open_queue(&dir).await;

    let low = queue.enqueue(&event(json!({"n": "low"})), 0, None).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let high = queue.enqueue(&event(json!({"n": "high"})), 5, None).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let low2 = queue.enqueue(&event(json!({"n": "low2"})), 0, None).await.unwrap();

    let batch = queue.dequeue_batch(None).await.unwrap();
    let ids: Vec<&str> = batch.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec![high.as_str(), low.as_str(), low2.as_str()]);
}

#[tokio::test]
async fn retry_schedule_follows_configured_delays() {
    let dir = tempfile::tempdir().unwrap();
    let queue = open_queue(&dir).await;

    let id = queue.enqueue(&event(json!({"n": 1})), 0, None).await.unwrap();
    queue.dequeue_batch(None).await.unwrap();
    queue.mark_failed(&id, "503 service unavailable").await.unwrap();

    let row = queue.get_event(&id).await.unwrap().unwrap();
    assert_eq!(row.status, QueueStatus::Failed);
    assert_eq!(row.attempts, 1);
    // next_retry - updated_at = retry_delays[attempts - 1]
    let delta = row.next_retry.unwrap() - row.updated_at;
    assert!((delta - 30.0).abs() < 0.001, "unexpected retry delta {delta}");
    assert_eq!(row.error_message.as_deref(), Some("503 service unavailable"));
}

#[tokio::test]
async fn failed_event_not_deliverable_until_retry_time() {
    let dir = tempfile::tempdir().unwrap();
    let queue = open_queue(&dir).await;

    let id = queue.enqueue(&event(json!({"n": 1})), 0, None).await.unwrap();
    queue.dequeue_batch(None).await.unwrap();
    queue.mark_failed(&id, "boom").await.unwrap();

    // Retry scheduled 30s out: not pending, not dequeued
    assert_eq!(queue.pending_count().await.unwrap(), 0);
    assert!(queue.dequeue_batch(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn retry_becomes_deliverable_once_delay_elapses() {
    let dir = tempfile::tempdir().unwrap();
    let clock = sw_core::FakeClock::new();
    clock.set_epoch_ms(1_700_000_000_000);
    let queue = PersistentQueue::open_with_clock(
        &dir.path().join("persistent_queue.db"),
        &test_config(),
        clock.clone(),
    )
    .await
    .unwrap();

    let id = queue.enqueue(&event(json!({"n": 1})), 0, None).await.unwrap();
    queue.dequeue_batch(None).await.unwrap();
    queue.mark_failed(&id, "503 service unavailable").await.unwrap();

    // One second short of the first 30s delay: still not deliverable
    clock.advance(std::time::Duration::from_secs(29));
    assert_eq!(queue.pending_count().await.unwrap(), 0);

    clock.advance(std::time::Duration::from_secs(2));
    assert_eq!(queue.pending_count().await.unwrap(), 1);
    let batch = queue.dequeue_batch(None).await.unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].id, id);
    assert_eq!(batch[0].attempts, 1);
}

#[tokio::test]
async fn age_sweep_expires_and_deletes_old_rows() {
    let dir = tempfile::tempdir().unwrap();
    let clock = sw_core::FakeClock::new();
    clock.set_epoch_ms(1_700_000_000_000);
    let queue = PersistentQueue::open_with_clock(
        &dir.path().join("persistent_queue.db"),
        &test_config(),
        clock.clone(),
    )
    .await
    .unwrap();

    queue.enqueue(&event(json!({"n": 1})), 0, None).await.unwrap();

    // Inside the 72h horizon: the sweep leaves it alone
    clock.advance(std::time::Duration::from_secs(71 * 3_600));
    assert_eq!(queue.cleanup_expired().await.unwrap(), 0);
    assert_eq!(queue.pending_count().await.unwrap(), 1);

    // Past the horizon: expired, then deleted
    clock.advance(std::time::Duration::from_secs(2 * 3_600));
    assert_eq!(queue.cleanup_expired().await.unwrap(), 1);
    let stats = queue.get_stats().await.unwrap();
    assert_eq!(stats.current_size, 0);
}

#[tokio::test]
async fn exhausted_retries_become_terminal() {
    let dir = tempfile::tempdir().unwrap();
    let queue = open_queue(&dir).await;

    let id = queue.enqueue(&event(json!({"n": 1})), 0, Some(2)).await.unwrap();
    queue.mark_failed(&id, "first").await.unwrap();
    queue.mark_failed(&id, "second").await.unwrap();

    let row = queue.get_event(&id).await.unwrap().unwrap();
    assert_eq!(row.status, QueueStatus::Failed);
    assert_eq!(row.attempts, 2);
    // Terminal: no future retry
    assert!(row.next_retry.is_none());
    assert_eq!(queue.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn large_payloads_are_stored_compressed() {
    let dir = tempfile::tempdir().unwrap();
    let queue = open_queue(&dir).await;

    let id = queue
        .enqueue(&event(json!({"blob": "x".repeat(4_096)})), 0, None)
        .await
        .unwrap();

    let row = queue.get_event(&id).await.unwrap().unwrap();
    assert!(row.compressed);
    assert_eq!(row.payload.fields["blob"].as_str().unwrap().len(), 4_096);

    let stats = queue.get_stats().await.unwrap();
    assert_eq!(stats.compressed_events, 1);
}

#[tokio::test]
async fn full_queue_rejects_after_sweep() {
    let dir = tempfile::tempdir().unwrap();
    let config = QueueConfig { max_size: 3, ..test_config() };
    let queue = PersistentQueue::open(&dir.path().join("q.db"), &config).await.unwrap();

    for i in 0..3 {
        queue.enqueue(&event(json!({"n": i})), 0, None).await.unwrap();
    }
    let err = queue.enqueue(&event(json!({"n": 3})), 0, None).await.unwrap_err();
    assert!(matches!(err, sw_core::QueueError::Full { .. }));
}

#[tokio::test]
async fn open_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("persistent_queue.db");

    let queue = PersistentQueue::open(&db_path, &test_config()).await.unwrap();
    queue.enqueue(&event(json!({"n": 1})), 0, None).await.unwrap();
    drop(queue);

    // Second open observes the same state
    let queue = PersistentQueue::open(&db_path, &test_config()).await.unwrap();
    assert_eq!(queue.pending_count().await.unwrap(), 1);
    let stats = queue.get_stats().await.unwrap();
    assert_eq!(stats.current_size, 1);
}

#[tokio::test]
async fn reopen_recovers_processing_rows() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("persistent_queue.db");

    let queue = PersistentQueue::open(&db_path, &test_config()).await.unwrap();
    let id = queue.enqueue(&event(json!({"n": 1})), 0, None).await.unwrap();
    queue.dequeue_batch(None).await.unwrap();
    // Simulated crash: row stays 'processing'
    drop(queue);

    let queue = PersistentQueue::open(&db_path, &test_config()).await.unwrap();
    let row = queue.get_event(&id).await.unwrap().unwrap();
    assert_eq!(row.status, QueueStatus::Pending);
    assert_eq!(queue.pending_count().await.unwrap(), 1);
}

#[tokio::test]
async fn stats_count_by_status() {
    let dir = tempfile::tempdir().unwrap();
    let queue = open_queue(&dir).await;

    let a = queue.enqueue(&event(json!({"n": 1})), 0, None).await.unwrap();
    queue.enqueue(&event(json!({"n": 2})), 0, None).await.unwrap();
    queue.dequeue_batch(Some(1)).await.unwrap();
    queue.mark_completed(&[a]).await.unwrap();

    let stats = queue.get_stats().await.unwrap();
    assert_eq!(stats.current_size, 2);
    assert_eq!(stats.status_counts.get("completed"), Some(&1));
    assert_eq!(stats.status_counts.get("pending"), Some(&1));
    assert_eq!(stats.events_queued, 2);
    assert_eq!(stats.events_processed, 1);
}
