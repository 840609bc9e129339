// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers for the scenario specs.

use serde_json::Value;
use std::sync::Arc;
use sw_config::{BufferConfig, CompressionConfig, HealthConfig, QueueConfig, ResourceLimits, RetryConfig, TransportConfig};
use sw_core::Event;
use sw_monitor::{HealthMonitor, ResourceGovernor};
use sw_storage::{HotBuffer, PersistentQueue};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

pub fn event(fields: Value) -> Event {
    match fields {
        Value::Object(map) => Event::new(map),
        other => panic!("expected object, got {other}"),
    }
}

pub async fn open_buffer(dir: &tempfile::TempDir) -> Arc<HotBuffer> {
    Arc::new(
        HotBuffer::open(
            &BufferConfig { db_path: dir.path().join("events.db"), ..BufferConfig::default() },
            "spec-agent",
        )
        .await
        .unwrap(),
    )
}

pub async fn open_queue(dir: &tempfile::TempDir) -> Arc<PersistentQueue> {
    Arc::new(
        PersistentQueue::open(&dir.path().join("persistent_queue.db"), &QueueConfig::default())
            .await
            .unwrap(),
    )
}

pub fn governor() -> ResourceGovernor {
    ResourceGovernor::new(ResourceLimits::default(), std::time::Duration::from_secs(5))
}

pub fn health() -> HealthMonitor {
    HealthMonitor::new(&HealthConfig {
        check_interval: 30,
        heartbeat_interval: 300,
        metrics_retention: 86_400,
    })
}

pub fn transport_config(endpoint: &str, max_attempts: u32) -> TransportConfig {
    TransportConfig {
        endpoint: endpoint.to_string(),
        retry: RetryConfig {
            max_attempts,
            base_delay: 0.01,
            max_delay: 0.05,
            exponential_base: 2.0,
            jitter: false,
        },
        compression: CompressionConfig { enabled: false, ..CompressionConfig::default() },
        ..TransportConfig::default()
    }
}

/// A one-connection-per-response HTTP endpoint that answers the scripted
/// status codes in order, then keeps answering the last one. Request bodies
/// are forwarded on the returned channel.
pub async fn scripted_endpoint(statuses: Vec<u16>) -> (String, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut script = statuses.into_iter();
        let mut current = script.next().unwrap_or(200);
        loop {
            let Ok((mut stream, _)) = listener.accept().await else { break };

            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            // Read until the full head plus content-length body arrived
            let body = loop {
                let Ok(n) = stream.read(&mut buf).await else { break None };
                if n == 0 {
                    break None;
                }
                raw.extend_from_slice(&buf[..n]);
                if let Some(head_end) = find_head_end(&raw) {
                    let head = String::from_utf8_lossy(&raw[..head_end]).to_string();
                    let content_length = head
                        .lines()
                        .find_map(|l| l.to_lowercase().strip_prefix("content-length:").map(str::trim).map(String::from))
                        .and_then(|v| v.parse::<usize>().ok())
                        .unwrap_or(0);
                    if raw.len() >= head_end + 4 + content_length {
                        let body = raw[head_end + 4..head_end + 4 + content_length].to_vec();
                        break Some(String::from_utf8_lossy(&body).to_string());
                    }
                }
            };

            if let Some(body) = body {
                let _ = tx.send(body);
                let response = format!(
                    "HTTP/1.1 {current} {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                    reason(current)
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
                if let Some(next) = script.next() {
                    current = next;
                }
            }
        }
    });

    (base_url, rx)
}

fn find_head_end(raw: &[u8]) -> Option<usize> {
    raw.windows(4).position(|w| w == b"\r\n\r\n")
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        401 => "Unauthorized",
        403 => "Forbidden",
        503 => "Service Unavailable",
        _ => "Status",
    }
}
