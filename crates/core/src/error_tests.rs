// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    server_error = { 500, true },
    bad_gateway = { 502, true },
    bad_request = { 400, false },
    not_found = { 404, false },
)]
fn status_retryability(status: u16, expected: bool) {
    let err = TransportError::Status { status, body: String::new() };
    assert_eq!(err.is_retryable(), expected);
}

#[test]
fn auth_is_never_retryable() {
    assert!(!TransportError::Auth("401 unauthorized".into()).is_retryable());
}

#[test]
fn network_errors_are_retryable() {
    assert!(TransportError::Request("connection refused".into()).is_retryable());
}

#[test]
fn agent_error_wraps_component_errors() {
    let err: AgentError = QueueError::Full { size: 10, max_size: 10 }.into();
    assert!(matches!(err, AgentError::Queue(_)));
    assert!(err.to_string().contains("queue is full"));
}

#[test]
fn schema_error_names_json_pointer() {
    let err = ConfigError::Schema {
        path: "/transport/endpoint".into(),
        message: "must be an http:// or https:// URL".into(),
    };
    assert!(err.to_string().contains("/transport/endpoint"));
}
