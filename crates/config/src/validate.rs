// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Schema validation over the raw JSON document.
//!
//! Runs before typed deserialization so that failures name the JSON pointer
//! of the offending node. Missing mTLS material is a warning (lazy
//! provisioning), a missing buffer directory is an error only when it cannot
//! be created.

use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;
use sw_core::ConfigError;
use tracing::warn;

const LOG_LEVELS: &[&str] = &["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"];
const COLLECTOR_TYPES: &[&str] = &["windows_event", "syslog", "file", "registry", "process"];
const COMPRESSION_ALGORITHMS: &[&str] = &["zstd", "gzip", "lz4"];

fn schema_err(path: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::Schema { path: path.to_string(), message: message.into() }
}

/// Validate a raw configuration document.
pub fn validate(doc: &Value) -> Result<(), ConfigError> {
    let root = doc.as_object().ok_or_else(|| schema_err("", "document must be a JSON object"))?;

    if let Some(logging) = root.get("logging") {
        check_enum(logging, "/logging/level", "level", LOG_LEVELS)?;
        check_min_int(logging, "/logging/max_size_mb", "max_size_mb", 1)?;
    }

    if let Some(collectors) = root.get("collectors") {
        validate_collectors(collectors)?;
    }

    if let Some(buffer) = root.get("buffer") {
        check_min_int(buffer, "/buffer/max_size", "max_size", 1_000)?;
        check_min_int(buffer, "/buffer/batch_size", "batch_size", 1)?;
        check_min_int(buffer, "/buffer/retention_hours", "retention_hours", 1)?;
        check_min_int(buffer, "/buffer/cleanup_interval", "cleanup_interval", 60)?;
    }

    if let Some(queue) = root.get("queue") {
        check_min_int(queue, "/queue/max_size", "max_size", 100)?;
        check_min_int(queue, "/queue/max_age_hours", "max_age_hours", 1)?;
        check_min_int(queue, "/queue/batch_size", "batch_size", 1)?;
    }

    let transport = root
        .get("transport")
        .ok_or_else(|| schema_err("/transport", "required section is missing"))?;
    validate_transport(transport)?;

    if let Some(health) = root.get("health") {
        check_min_int(health, "/health/check_interval", "check_interval", 5)?;
        check_min_int(health, "/health/heartbeat_interval", "heartbeat_interval", 30)?;
        check_min_int(health, "/health/metrics_retention", "metrics_retention", 3_600)?;
    }

    if let Some(limits) = root.get("resource_limits") {
        check_min_int(limits, "/resource_limits/max_memory_mb", "max_memory_mb", 64)?;
        check_range_f64(limits, "/resource_limits/max_cpu_percent", "max_cpu_percent", 1.0, 100.0)?;
        check_min_int(limits, "/resource_limits/max_disk_mb", "max_disk_mb", 100)?;
    }

    Ok(())
}

/// Side-effectful checks that depend on the host filesystem: warn about
/// missing certificate files and ensure the buffer directory is creatable.
pub fn validate_paths(doc: &Value) -> Result<(), ConfigError> {
    let auth = doc.pointer("/transport/auth");
    for (label, key) in [
        ("client certificate", "client_cert_path"),
        ("client key", "client_key_path"),
        ("CA certificate", "ca_cert_path"),
    ] {
        if let Some(path) = auth.and_then(|a| a.get(key)).and_then(Value::as_str) {
            if !Path::new(path).exists() {
                warn!(path, "{label} not found");
            }
        }
    }

    if let Some(db_path) = doc.pointer("/buffer/db_path").and_then(Value::as_str) {
        if let Some(dir) = Path::new(db_path).parent() {
            if !dir.exists() && std::fs::create_dir_all(dir).is_err() {
                return Err(ConfigError::BufferDir(dir.to_path_buf()));
            }
        }
    }

    Ok(())
}

fn validate_collectors(collectors: &Value) -> Result<(), ConfigError> {
    let list = collectors
        .as_array()
        .ok_or_else(|| schema_err("/collectors", "must be an array"))?;

    let mut names: HashSet<&str> = HashSet::new();
    for (i, collector) in list.iter().enumerate() {
        let path = format!("/collectors/{i}");
        let obj = collector
            .as_object()
            .ok_or_else(|| schema_err(&path, "must be an object"))?;

        let name = obj
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| schema_err(&format!("{path}/name"), "collector missing name"))?;
        if !names.insert(name) {
            return Err(schema_err(&format!("{path}/name"), format!("duplicate collector name: {name}")));
        }

        let kind = obj
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| schema_err(&format!("{path}/type"), "collector missing type"))?;
        if !COLLECTOR_TYPES.contains(&kind) {
            return Err(schema_err(&format!("{path}/type"), format!("invalid collector type: {kind}")));
        }

        check_min_int(collector, &format!("{path}/batch_size"), "batch_size", 1)?;
        if let Some(interval) = obj.get("poll_interval") {
            let v = interval
                .as_f64()
                .ok_or_else(|| schema_err(&format!("{path}/poll_interval"), "must be a number"))?;
            if v < 0.1 {
                return Err(schema_err(&format!("{path}/poll_interval"), "must be >= 0.1"));
            }
        }
    }

    Ok(())
}

fn validate_transport(transport: &Value) -> Result<(), ConfigError> {
    let endpoint = transport
        .get("endpoint")
        .and_then(Value::as_str)
        .ok_or_else(|| schema_err("/transport/endpoint", "required field is missing"))?;
    if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
        return Err(schema_err("/transport/endpoint", "must be an http:// or https:// URL"));
    }

    let auth = transport
        .get("auth")
        .ok_or_else(|| schema_err("/transport/auth", "required section is missing"))?;
    for key in ["client_cert_path", "client_key_path", "ca_cert_path"] {
        if auth.get(key).and_then(Value::as_str).is_none() {
            return Err(schema_err(&format!("/transport/auth/{key}"), "required field is missing"));
        }
    }
    check_min_int(auth, "/transport/auth/cert_rotation_days", "cert_rotation_days", 1)?;

    if let Some(compression) = transport.get("compression") {
        check_enum(compression, "/transport/compression/algorithm", "algorithm", COMPRESSION_ALGORITHMS)?;
        check_range_f64(compression, "/transport/compression/level", "level", 1.0, 22.0)?;
    }

    if let Some(timeout) = transport.get("timeout") {
        let v = timeout
            .as_f64()
            .ok_or_else(|| schema_err("/transport/timeout", "must be a number"))?;
        if v < 1.0 {
            return Err(schema_err("/transport/timeout", "must be >= 1.0"));
        }
    }

    if let Some(retry) = transport.get("retry") {
        check_min_int(retry, "/transport/retry/max_attempts", "max_attempts", 1)?;
    }

    Ok(())
}

fn check_enum(section: &Value, path: &str, key: &str, allowed: &[&str]) -> Result<(), ConfigError> {
    if let Some(value) = section.get(key) {
        let s = value
            .as_str()
            .ok_or_else(|| schema_err(path, "must be a string"))?;
        if !allowed.contains(&s) {
            return Err(schema_err(path, format!("must be one of {allowed:?}, got {s:?}")));
        }
    }
    Ok(())
}

fn check_min_int(section: &Value, path: &str, key: &str, min: i64) -> Result<(), ConfigError> {
    if let Some(value) = section.get(key) {
        let v = value
            .as_i64()
            .ok_or_else(|| schema_err(path, "must be an integer"))?;
        if v < min {
            return Err(schema_err(path, format!("must be >= {min}")));
        }
    }
    Ok(())
}

fn check_range_f64(
    section: &Value,
    path: &str,
    key: &str,
    min: f64,
    max: f64,
) -> Result<(), ConfigError> {
    if let Some(value) = section.get(key) {
        let v = value
            .as_f64()
            .ok_or_else(|| schema_err(path, "must be a number"))?;
        if v < min || v > max {
            return Err(schema_err(path, format!("must be between {min} and {max}")));
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "validate_tests.rs"]
mod tests;
