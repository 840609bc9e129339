// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;
use yare::parameterized;

fn fields(v: serde_json::Value) -> serde_json::Map<String, Value> {
    match v {
        Value::Object(m) => m,
        other => panic!("expected object, got {other}"),
    }
}

fn chain(specs: serde_json::Value) -> FilterChain {
    FilterChain::new(serde_json::from_value(specs).unwrap())
}

#[test]
fn empty_chain_passes_everything() {
    let chain = FilterChain::default();
    assert!(chain.passes(&fields(json!({"anything": 1}))));
}

#[parameterized(
    matching = { json!({"user": "alice"}), true },
    non_matching = { json!({"user": "bob"}), false },
    missing_field = { json!({"other": 1}), false },
)]
fn include_equals(event: serde_json::Value, expected: bool) {
    let chain = chain(json!([
        {"type": "include", "field": "user", "operation": "equals", "value": "alice"}
    ]));
    assert_eq!(chain.passes(&fields(event)), expected);
}

#[test]
fn exclude_negates_the_match() {
    let chain = chain(json!([
        {"type": "exclude", "field": "level", "operation": "equals", "value": "debug"}
    ]));
    assert!(!chain.passes(&fields(json!({"level": "debug"}))));
    assert!(chain.passes(&fields(json!({"level": "error"}))));
}

#[test]
fn contains_stringifies_both_sides() {
    let chain = chain(json!([
        {"field": "message", "operation": "contains", "value": "denied"}
    ]));
    assert!(chain.passes(&fields(json!({"message": "access denied for user"}))));
    assert!(!chain.passes(&fields(json!({"message": "access granted"}))));
}

#[test]
fn regex_matches_and_invalid_pattern_is_false() {
    let chain = chain(json!([
        {"field": "path", "operation": "regex", "value": r"^/var/log/.*\.log$"}
    ]));
    assert!(chain.passes(&fields(json!({"path": "/var/log/auth.log"}))));
    assert!(!chain.passes(&fields(json!({"path": "/tmp/auth.log"}))));

    let bad = chain_invalid();
    assert!(!bad.passes(&fields(json!({"path": "/var/log/auth.log"}))));
}

fn chain_invalid() -> FilterChain {
    chain(json!([{"field": "path", "operation": "regex", "value": "(["}]))
}

#[parameterized(
    above = { json!({"severity": 5}), true },
    equal = { json!({"severity": 3}), false },
    below = { json!({"severity": 1}), false },
    non_numeric = { json!({"severity": "high"}), false },
)]
fn greater_than_coerces_numbers(event: serde_json::Value, expected: bool) {
    let chain = chain(json!([
        {"field": "severity", "operation": "greater_than", "value": 3}
    ]));
    assert_eq!(chain.passes(&fields(event)), expected);
}

#[test]
fn numeric_strings_compare_as_numbers() {
    let chain = chain(json!([
        {"field": "status", "operation": "greater_than", "value": 499}
    ]));
    assert!(chain.passes(&fields(json!({"status": "503"}))));
}

#[test]
fn in_operation_over_lists() {
    let chain = chain(json!([
        {"field": "event_id", "operation": "in", "value": [4624, 4625]}
    ]));
    assert!(chain.passes(&fields(json!({"event_id": 4624}))));
    assert!(!chain.passes(&fields(json!({"event_id": 4688}))));
}

#[test]
fn not_in_passes_on_missing_field() {
    let chain = chain(json!([
        {"field": "event_id", "operation": "not_in", "value": [4624]}
    ]));
    assert!(chain.passes(&fields(json!({"other": 1}))));
}

#[test]
fn dotted_paths_descend_nested_objects() {
    let chain = chain(json!([
        {"field": "data.TargetUserName", "operation": "equals", "value": "admin"}
    ]));
    assert!(chain.passes(&fields(json!({"data": {"TargetUserName": "admin"}}))));
    assert!(!chain.passes(&fields(json!({"data": {"TargetUserName": "guest"}}))));
}

#[test]
fn null_filter_value_passes() {
    let chain = chain(json!([
        {"field": "user", "operation": "equals", "value": null}
    ]));
    assert!(chain.passes(&fields(json!({"user": "anyone"}))));
}

#[test]
fn all_filters_must_pass() {
    let chain = chain(json!([
        {"field": "level", "operation": "equals", "value": "error"},
        {"field": "source", "operation": "contains", "value": "auth"},
    ]));
    assert!(chain.passes(&fields(json!({"level": "error", "source": "auth-service"}))));
    assert!(!chain.passes(&fields(json!({"level": "error", "source": "billing"}))));
}
