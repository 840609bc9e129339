// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent error taxonomy.
//!
//! One closed set of error kinds shared by every component. Library errors
//! (sqlx, reqwest, ...) are converted at the component boundary so that
//! downstream crates never grow a dependency just to name a failure.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration loading, validation, or persistence failure.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Schema violation; `path` is the JSON pointer of the offending node.
    #[error("invalid configuration at {path}: {message}")]
    Schema { path: String, message: String },

    #[error("failed to read configuration {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write configuration {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("cannot create buffer directory {0}")]
    BufferDir(PathBuf),
}

/// Hot-buffer storage failure.
#[derive(Debug, Error)]
pub enum BufferError {
    #[error("buffer database error: {0}")]
    Database(String),

    #[error("event serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("buffer is closed")]
    Closed,
}

/// Persistent-queue failure.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue database error: {0}")]
    Database(String),

    #[error("queue is full ({size} of {max_size} entries)")]
    Full { size: u64, max_size: u64 },

    #[error("payload encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("payload decompression failed: {0}")]
    Decompress(String),

    #[error("queue is closed")]
    Closed,
}

/// Transport-layer failure.
#[derive(Debug, Error)]
pub enum TransportError {
    /// 401/403 from the endpoint. Never retried.
    #[error("authentication rejected by endpoint: {0}")]
    Auth(String),

    #[error("endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request failed: {0}")]
    Request(String),

    #[error("TLS material unavailable: {0}")]
    Tls(String),

    #[error("retry budget exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    #[error("endpoint health probe failed: {0}")]
    Unhealthy(String),
}

/// Collector initialization or polling failure.
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("collector {name} failed to start: {message}")]
    Start { name: String, message: String },

    #[error("collection failed: {0}")]
    Collect(String),

    #[error("unknown collector type: {0}")]
    UnknownType(String),

    #[error("collection timed out after {0} seconds")]
    Timeout(u64),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Health-monitor failure.
#[derive(Debug, Error)]
pub enum HealthError {
    #[error("health probe {probe} failed: {message}")]
    Probe { probe: String, message: String },
}

/// Resource governor failure or limit breach.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("resource limit exceeded: {0}")]
    LimitExceeded(String),

    #[error("resource sampling failed: {0}")]
    Sampling(String),
}

/// Root error for cross-cutting agent failures.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Buffer(#[from] BufferError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Collector(#[from] CollectorError),

    #[error(transparent)]
    Health(#[from] HealthError),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error("{0}")]
    Fatal(String),
}

impl TransportError {
    /// Whether this failure may be retried under the transport retry policy.
    ///
    /// 5xx and network-level failures are retryable; 4xx (including auth
    /// rejections) are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Auth(_) => false,
            TransportError::Status { status, .. } => *status >= 500,
            TransportError::Request(_) => true,
            TransportError::Tls(_) => false,
            TransportError::RetriesExhausted { .. } => false,
            TransportError::Unhealthy(_) => true,
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
