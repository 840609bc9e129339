// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire delivery scenario specs against a scripted endpoint.

use crate::prelude::*;
use serde_json::json;
use sw_core::TransportError;
use sw_storage::QueueStatus;
use sw_transport::Transport;

/// S4: the endpoint answers 503 twice then 200; exactly three POSTs are
/// observed and the queue rows transition pending → processing → completed.
#[tokio::test]
async fn transport_retries_then_succeeds() {
    let (endpoint, mut requests) = scripted_endpoint(vec![503, 503, 200]).await;
    let transport = Transport::new(&transport_config(&endpoint, 3), "spec-agent").unwrap();

    let dir = tempfile::tempdir().unwrap();
    let queue = open_queue(&dir).await;
    let id = queue.enqueue(&event(json!({"user": "alice"})), 0, None).await.unwrap();

    let batch = queue.dequeue_batch(None).await.unwrap();
    assert_eq!(batch[0].status, QueueStatus::Processing);

    let payloads: Vec<_> = batch.iter().map(|qe| qe.payload.clone()).collect();
    let (success, bytes_sent) = transport.send_events(&payloads).await.unwrap();
    assert!(success);
    assert!(bytes_sent > 0);

    queue.mark_completed(&[id.clone()]).await.unwrap();
    let row = queue.get_event(&id).await.unwrap().unwrap();
    assert_eq!(row.status, QueueStatus::Completed);

    // Exactly three POSTs hit the wire
    let mut observed = 0;
    while requests.try_recv().is_ok() {
        observed += 1;
    }
    assert_eq!(observed, 3);
}

/// S5: a 401 is terminal; exactly one POST is observed, the transport
/// surfaces an auth error, and the queue row records it.
#[tokio::test]
async fn transport_authentication_failure_is_terminal() {
    let (endpoint, mut requests) = scripted_endpoint(vec![401]).await;
    let transport = Transport::new(&transport_config(&endpoint, 3), "spec-agent").unwrap();

    let dir = tempfile::tempdir().unwrap();
    let queue = open_queue(&dir).await;
    let id = queue.enqueue(&event(json!({"n": 1})), 0, None).await.unwrap();
    let batch = queue.dequeue_batch(None).await.unwrap();

    let payloads: Vec<_> = batch.iter().map(|qe| qe.payload.clone()).collect();
    let err = transport.send_events(&payloads).await.unwrap_err();
    assert!(matches!(err, TransportError::Auth(_)));

    queue.mark_failed(&id, &err.to_string()).await.unwrap();
    let row = queue.get_event(&id).await.unwrap().unwrap();
    assert_eq!(row.status, QueueStatus::Failed);
    assert!(row.error_message.unwrap().contains("401"));

    let mut observed = 0;
    while requests.try_recv().is_ok() {
        observed += 1;
    }
    assert_eq!(observed, 1);
}

/// The wire body carries `{agent_id, timestamp, events: [...]}`.
#[tokio::test]
async fn events_body_shape() {
    let (endpoint, mut requests) = scripted_endpoint(vec![200]).await;
    let transport = Transport::new(&transport_config(&endpoint, 1), "spec-agent").unwrap();

    transport
        .send_events(&[event(json!({"message": "hello"}))])
        .await
        .unwrap();

    let body = requests.recv().await.unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(parsed["agent_id"], "spec-agent");
    assert!(parsed["timestamp"].is_i64());
    assert_eq!(parsed["events"][0]["message"], "hello");
}

/// At-least-once: an accepted event that cannot be delivered remains
/// queryable in the queue as failed; nothing silently disappears.
#[tokio::test]
async fn undeliverable_events_remain_queryable() {
    let (endpoint, _requests) = scripted_endpoint(vec![503]).await;
    let transport = Transport::new(&transport_config(&endpoint, 2), "spec-agent").unwrap();

    let dir = tempfile::tempdir().unwrap();
    let queue = open_queue(&dir).await;
    let id = queue.enqueue(&event(json!({"n": 1})), 0, Some(1)).await.unwrap();
    let batch = queue.dequeue_batch(None).await.unwrap();

    let payloads: Vec<_> = batch.iter().map(|qe| qe.payload.clone()).collect();
    let err = transport.send_events(&payloads).await.unwrap_err();
    queue.mark_failed(&id, &err.to_string()).await.unwrap();

    let row = queue.get_event(&id).await.unwrap().unwrap();
    assert_eq!(row.status, QueueStatus::Failed);
    // Terminal (attempts exhausted): only the age sweep may remove it
    assert!(row.next_retry.is_none());
    assert_eq!(row.payload.fields["n"], 1);
}
