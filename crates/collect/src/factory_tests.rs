// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;
use yare::parameterized;

fn descriptor(kind: &str, config: serde_json::Value) -> CollectorConfig {
    serde_json::from_value(json!({
        "name": "test",
        "type": kind,
        "config": config,
    }))
    .unwrap()
}

#[parameterized(
    file = { "file" },
    syslog = { "syslog" },
    windows = { "windows_event" },
)]
fn builds_production_collectors(kind: &str) {
    let collector = build_collector(&descriptor(kind, json!({}))).unwrap();
    assert_eq!(collector.name(), "test");
}

#[parameterized(
    registry = { "registry" },
    process = { "process" },
)]
fn reserved_types_are_rejected(kind: &str) {
    let err = match build_collector(&descriptor(kind, json!({}))) {
        Err(e) => e,
        Ok(_) => panic!("expected an error"),
    };
    assert!(matches!(err, CollectorError::UnknownType(_)));
}

#[test]
fn invalid_settings_surface_as_errors() {
    let err = match build_collector(&descriptor("file", json!({"multiline_pattern": "(["}))) {
        Err(e) => e,
        Ok(_) => panic!("expected an error"),
    };
    assert!(err.to_string().contains("multiline_pattern"));
}
