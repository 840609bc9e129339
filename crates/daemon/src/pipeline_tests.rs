// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use httpmock::prelude::*;
use serde_json::json;
use sw_config::{
    BufferConfig, CompressionConfig, HealthConfig, QueueConfig, ResourceLimits, RetryConfig,
    TransportConfig,
};
use sw_core::Event;
use sw_storage::QueueStatus;

fn event(fields: serde_json::Value) -> Event {
    match fields {
        serde_json::Value::Object(map) => Event::new(map),
        other => panic!("expected object, got {other}"),
    }
}

async fn stores(dir: &tempfile::TempDir) -> (Arc<HotBuffer>, Arc<PersistentQueue>) {
    let buffer = Arc::new(
        HotBuffer::open(
            &BufferConfig { db_path: dir.path().join("events.db"), ..BufferConfig::default() },
            "test-agent",
        )
        .await
        .unwrap(),
    );
    let queue = Arc::new(
        PersistentQueue::open(&dir.path().join("persistent_queue.db"), &QueueConfig::default())
            .await
            .unwrap(),
    );
    (buffer, queue)
}

fn transport_for(server: &MockServer, max_attempts: u32) -> Arc<Transport> {
    let config = TransportConfig {
        endpoint: server.base_url(),
        retry: RetryConfig {
            max_attempts,
            base_delay: 0.01,
            max_delay: 0.05,
            exponential_base: 2.0,
            jitter: false,
        },
        compression: CompressionConfig { enabled: false, ..CompressionConfig::default() },
        ..TransportConfig::default()
    };
    Arc::new(Transport::new(&config, "test-agent").unwrap())
}

fn health() -> HealthMonitor {
    HealthMonitor::new(&HealthConfig {
        check_interval: 30,
        heartbeat_interval: 300,
        metrics_retention: 86_400,
    })
}

#[tokio::test]
async fn events_flow_from_buffer_to_queue() {
    let dir = tempfile::tempdir().unwrap();
    let (buffer, queue) = stores(&dir).await;
    let governor = ResourceGovernor::new(ResourceLimits::default(), Duration::from_secs(5));
    let counters = Arc::new(AgentCounters::default());
    let shutdown = ShutdownSignal::new();

    buffer.add_event(&event(json!({"user": "alice"}))).await.unwrap();
    buffer.add_event(&event(json!({"user": "bob", "priority": 5}))).await.unwrap();

    let task = tokio::spawn(buffer_to_queue_loop(
        Arc::clone(&buffer),
        Arc::clone(&queue),
        governor,
        100,
        Arc::clone(&counters),
        shutdown.clone(),
    ));

    // Wait for the transfer
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        if queue.pending_count().await.unwrap() == 2 {
            break;
        }
    }
    shutdown.trigger();
    task.await.unwrap();

    assert_eq!(queue.pending_count().await.unwrap(), 2);
    // Priority survives into the queue ordering: bob ships first
    let batch = queue.dequeue_batch(None).await.unwrap();
    assert_eq!(batch[0].payload.fields["user"], "bob");
    assert_eq!(batch[0].priority, 5);

    // Buffer rows are marked sent
    assert!(buffer.get_batch(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn delivery_marks_rows_completed() {
    let dir = tempfile::tempdir().unwrap();
    let (_, queue) = stores(&dir).await;
    let server = MockServer::start();
    let events_mock = server.mock(|when, then| {
        when.method(POST).path("/events");
        then.status(200);
    });

    let id = queue.enqueue(&event(json!({"n": 1})), 0, None).await.unwrap();
    let counters = Arc::new(AgentCounters::default());
    let shutdown = ShutdownSignal::new();

    let task = tokio::spawn(queue_to_transport_loop(
        Arc::clone(&queue),
        transport_for(&server, 1),
        health(),
        Duration::from_millis(10),
        Arc::clone(&counters),
        shutdown.clone(),
    ));

    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        if counters.events_sent.load(Ordering::Relaxed) == 1 {
            break;
        }
    }
    shutdown.trigger();
    task.await.unwrap();

    events_mock.assert();
    let row = queue.get_event(&id).await.unwrap().unwrap();
    assert_eq!(row.status, QueueStatus::Completed);
    assert!(counters.bytes_sent.load(Ordering::Relaxed) > 0);
}

#[tokio::test]
async fn transport_failure_schedules_retry() {
    let dir = tempfile::tempdir().unwrap();
    let (_, queue) = stores(&dir).await;
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/events");
        then.status(503);
    });

    let id = queue.enqueue(&event(json!({"n": 1})), 0, None).await.unwrap();
    let counters = Arc::new(AgentCounters::default());
    let shutdown = ShutdownSignal::new();

    let task = tokio::spawn(queue_to_transport_loop(
        Arc::clone(&queue),
        transport_for(&server, 1),
        health(),
        Duration::from_millis(10),
        Arc::clone(&counters),
        shutdown.clone(),
    ));

    let mut row = None;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        let current = queue.get_event(&id).await.unwrap().unwrap();
        if current.status == QueueStatus::Failed {
            row = Some(current);
            break;
        }
    }
    shutdown.trigger();
    task.await.unwrap();

    let row = row.expect("row never transitioned to failed");
    assert_eq!(row.attempts, 1);
    assert!(row.next_retry.is_some());
    assert!(row.error_message.unwrap().contains("503"));
}

#[tokio::test]
async fn auth_failure_records_terminal_error() {
    let dir = tempfile::tempdir().unwrap();
    let (_, queue) = stores(&dir).await;
    let server = MockServer::start();
    let unauthorized = server.mock(|when, then| {
        when.method(POST).path("/events");
        then.status(401).body("bad certificate");
    });

    let id = queue.enqueue(&event(json!({"n": 1})), 0, None).await.unwrap();
    let counters = Arc::new(AgentCounters::default());
    let shutdown = ShutdownSignal::new();

    let task = tokio::spawn(queue_to_transport_loop(
        Arc::clone(&queue),
        transport_for(&server, 3),
        health(),
        Duration::from_millis(10),
        Arc::clone(&counters),
        shutdown.clone(),
    ));

    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        let row = queue.get_event(&id).await.unwrap().unwrap();
        if row.status == QueueStatus::Failed {
            break;
        }
    }
    shutdown.trigger();
    task.await.unwrap();

    // Exactly one POST: the 401 is never retried within the attempt
    assert_eq!(unauthorized.hits(), 1);
    let row = queue.get_event(&id).await.unwrap().unwrap();
    assert!(row.error_message.unwrap().contains("401"));
}

#[tokio::test]
async fn resource_pressure_pauses_buffer_drain() {
    let dir = tempfile::tempdir().unwrap();
    let (buffer, queue) = stores(&dir).await;
    let governor = ResourceGovernor::new(
        ResourceLimits { max_memory_mb: 100, ..ResourceLimits::default() },
        Duration::from_secs(5),
    );
    // Pressure sample: insufficient resources
    governor.apply_sample(sw_monitor::ResourceUsage {
        memory_mb: 200.0,
        ..sw_monitor::ResourceUsage::default()
    });

    buffer.add_event(&event(json!({"n": 1}))).await.unwrap();
    let counters = Arc::new(AgentCounters::default());
    let shutdown = ShutdownSignal::new();

    let task = tokio::spawn(buffer_to_queue_loop(
        Arc::clone(&buffer),
        Arc::clone(&queue),
        governor,
        100,
        counters,
        shutdown.clone(),
    ));

    tokio::time::sleep(Duration::from_millis(200)).await;
    // Nothing moved while resources are insufficient
    assert_eq!(queue.pending_count().await.unwrap(), 0);

    shutdown.trigger();
    task.await.unwrap();
}
