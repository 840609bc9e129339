// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistent-queue invariant specs.

use crate::prelude::*;
use serde_json::json;
use sw_config::QueueConfig;
use sw_storage::PersistentQueue;

/// For attempts k within the schedule, `next_retry - updated_at` equals
/// `retry_delays[k - 1]`.
#[tokio::test]
async fn retry_schedule_matches_configured_delays() {
    let dir = tempfile::tempdir().unwrap();
    let queue = open_queue(&dir).await;
    let delays = QueueConfig::default().retry_delays;

    let id = queue.enqueue(&event(json!({"n": 1})), 0, None).await.unwrap();
    for expected in delays.iter().take(delays.len() - 1) {
        queue.mark_failed(&id, "delivery failed").await.unwrap();
        let row = queue.get_event(&id).await.unwrap().unwrap();
        let delta = row.next_retry.unwrap() - row.updated_at;
        assert!(
            (delta - *expected as f64).abs() < 0.001,
            "attempt {} expected {expected}s, got {delta}s",
            row.attempts
        );
    }
}

/// A set compression flag always implies the stored payload is strictly
/// smaller than the raw serialization.
#[tokio::test]
async fn compression_is_never_worse_than_raw() {
    let dir = tempfile::tempdir().unwrap();
    let queue = open_queue(&dir).await;

    let compressible = event(json!({"blob": "a".repeat(8_192)}));
    let raw_len = serde_json::to_vec(&compressible).unwrap().len();
    let id = queue.enqueue(&compressible, 0, None).await.unwrap();

    let row = queue.get_event(&id).await.unwrap().unwrap();
    assert!(row.compressed);
    // Round-trips intact
    assert_eq!(row.payload.fields["blob"].as_str().unwrap().len(), 8_192);
    assert!(serde_json::to_vec(&row.payload).unwrap().len() == raw_len);
}

/// Initializing the queue twice leaves the same observable state as once.
#[tokio::test]
async fn initialize_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("persistent_queue.db");
    let config = QueueConfig::default();

    let first = PersistentQueue::open(&db_path, &config).await.unwrap();
    first.enqueue(&event(json!({"n": 1})), 3, None).await.unwrap();
    let stats_once = first.get_stats().await.unwrap();
    drop(first);

    let second = PersistentQueue::open(&db_path, &config).await.unwrap();
    let stats_twice = second.get_stats().await.unwrap();
    assert_eq!(stats_once.current_size, stats_twice.current_size);
    assert_eq!(stats_once.status_counts, stats_twice.status_counts);

    let batch = second.dequeue_batch(None).await.unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].priority, 3);
}
