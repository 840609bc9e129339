// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

fn fields(v: serde_json::Value) -> Map<String, Value> {
    match v {
        Value::Object(m) => m,
        other => panic!("expected object, got {other}"),
    }
}

#[test]
fn wire_shape_flattens_fields_and_nests_collector() {
    let event = Event {
        id: "evt-1".into(),
        timestamp: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        source: Some(SourceMeta {
            name: "app_logs".into(),
            kind: CollectorKind::File,
            agent_id: "host-abc".into(),
            collected_at: DateTime::from_timestamp(1_700_000_001, 0).unwrap(),
        }),
        fields: fields(json!({"user": "alice", "action": "login"})),
    };

    let wire = serde_json::to_value(&event).unwrap();
    assert_eq!(wire["id"], "evt-1");
    assert_eq!(wire["timestamp"], 1_700_000_000);
    assert_eq!(wire["user"], "alice");
    assert_eq!(wire["_collector"]["type"], "file");
    assert_eq!(wire["_collector"]["name"], "app_logs");
}

#[test]
fn round_trips_through_json() {
    let event = Event::new(fields(json!({"message": "hello"})));
    let bytes = serde_json::to_vec(&event).unwrap();
    let back: Event = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(back, event);
}

#[test]
fn from_fields_takes_producer_id_and_timestamp() {
    let event = Event::from_fields(fields(json!({
        "id": "file-abc",
        "timestamp": 1_700_000_000,
        "message": "line",
    })));
    assert_eq!(event.id, "file-abc");
    assert_eq!(event.timestamp.timestamp(), 1_700_000_000);
    assert_eq!(event.fields["message"], "line");
    assert!(!event.fields.contains_key("id"));
}

#[test]
fn from_fields_synthesizes_missing_id() {
    let event = Event::from_fields(fields(json!({"message": "line"})));
    assert!(!event.id.is_empty());
    // UUID format: 36 chars with hyphens
    assert_eq!(event.id.len(), 36);
}

#[test]
fn dotted_path_lookup_descends_objects() {
    let event = Event::new(fields(json!({
        "a": {"b": {"c": 7}},
        "top": true,
    })));
    assert_eq!(event.field("a.b.c"), Some(&json!(7)));
    assert_eq!(event.field("top"), Some(&json!(true)));
    assert_eq!(event.field("a.missing"), None);
    assert_eq!(event.field("missing"), None);
}

#[test]
fn collector_kind_display_matches_serde() {
    assert_eq!(CollectorKind::WindowsEvent.to_string(), "windows_event");
    let v = serde_json::to_value(CollectorKind::WindowsEvent).unwrap();
    assert_eq!(v, "windows_event");
}
