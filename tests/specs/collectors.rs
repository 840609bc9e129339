// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Collector-to-buffer scenario specs.

use crate::prelude::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use sw_collect::file::FileWatcher;
use sw_collect::{spawn_collector, CollectorContext};

fn file_descriptor(dir: &tempfile::TempDir) -> sw_config::CollectorConfig {
    serde_json::from_value(json!({
        "name": "app_logs",
        "type": "file",
        "poll_interval": 0.1,
        "config": {
            "file_patterns": [format!("{}/*.log", dir.path().display())],
            "log_format": "json",
            "start_position": "start",
        },
    }))
    .unwrap()
}

/// S1: a file containing one JSON line lands in the hot buffer as one
/// pending row with the parsed fields and file provenance.
#[tokio::test]
async fn file_collector_emits_json_line() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("auth.log"), "{\"user\":\"alice\",\"action\":\"login\"}\n")
        .unwrap();

    let descriptor = file_descriptor(&dir);
    let buffer = open_buffer(&dir).await;
    let collector = sw_collect::build_collector(&descriptor).unwrap();
    let handle = spawn_collector(
        collector,
        CollectorContext {
            descriptor,
            agent_id: "spec-agent".to_string(),
            buffer: Arc::clone(&buffer),
            governor: governor(),
            health: health(),
        },
    )
    .await
    .unwrap();

    let mut batch = Vec::new();
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        batch = buffer.get_batch(None).await.unwrap();
        if !batch.is_empty() {
            break;
        }
    }
    handle.stop().await;

    assert_eq!(batch.len(), 1);
    let event = &batch[0].event;
    assert_eq!(event.fields["user"], "alice");
    assert_eq!(event.fields["action"], "login");
    assert!(!event.id.is_empty());
    let source = event.source.as_ref().unwrap();
    assert_eq!(source.kind.to_string(), "file");

    // Row sits pending until the transfer loop claims it
    let stats = buffer.get_stats().await.unwrap();
    assert_eq!(stats.status_counts.get("pending"), Some(&1));
}

/// S2: replacing the watched file with a new inode of size 10 resets the
/// offset to zero and reads all 10 bytes.
#[tokio::test]
async fn file_rotation_is_detected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rotating.log");
    let mut content = "x".repeat(99);
    content.push('\n');
    std::fs::write(&path, content).unwrap();

    let mut watcher = FileWatcher::new(&path, 0, encoding_rs::UTF_8);
    watcher.read_new_lines(1000).await.unwrap();
    assert_eq!(watcher.offset, 100);

    // New inode, size 10
    let staged = dir.path().join("rotating.log.tmp");
    std::fs::write(&staged, "0123456789").unwrap();
    std::fs::rename(&staged, &path).unwrap();

    let lines = watcher.read_new_lines(1000).await.unwrap();
    assert_eq!(lines, vec!["0123456789"]);
    assert_eq!(watcher.offset, 10);
}

/// S3: the RFC 5424 example datagram parses to its documented fields.
#[test]
fn syslog_rfc5424_parse() {
    let raw = "<165>1 2003-10-11T22:14:15.003Z mymachine.example.com evntslog - ID47 \
               [exampleSDID@32473 iut=\"3\" eventSource=\"Application\"] An application event log entry";
    let msg = sw_collect::syslog::parse_message(raw);

    assert_eq!(msg.facility, Some(20));
    assert_eq!(msg.severity, Some(5));
    assert_eq!(msg.priority, Some(165));
    assert_eq!(msg.version, Some(1));
    assert_eq!(msg.hostname.as_deref(), Some("mymachine.example.com"));
    assert_eq!(msg.app_name.as_deref(), Some("evntslog"));
    assert_eq!(msg.message_id.as_deref(), Some("ID47"));
    assert_eq!(msg.message, "An application event log entry");
    assert_eq!(msg.structured_data["exampleSDID@32473"]["iut"], "3");
    assert_eq!(msg.structured_data["exampleSDID@32473"]["eventSource"], "Application");
}
