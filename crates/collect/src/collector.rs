// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Collector capability trait and per-collector metrics.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use sw_core::{CollectorError, CollectorKind};

/// Raw fields produced by a collector before enrichment.
///
/// Producers that mint their own ids put them under `"id"`; the runner
/// synthesizes missing ids and timestamps.
pub type RawEvent = Map<String, Value>;

/// Result of a connectivity self-test.
#[derive(Debug, Clone, Serialize)]
pub struct TestReport {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub details: Value,
}

impl TestReport {
    pub fn ok(message: impl Into<String>) -> Self {
        Self { success: true, message: message.into(), details: Value::Null }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self { success: false, message: message.into(), details: Value::Null }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

/// Capability set every collector satisfies.
///
/// The framework owns the polling loop; implementations only produce
/// batches of raw events and manage their own source handles.
#[async_trait]
pub trait Collector: Send {
    fn name(&self) -> &str;

    fn kind(&self) -> CollectorKind;

    /// Prepare source handles (open sockets, discover files, probe WMI).
    async fn initialize(&mut self) -> Result<(), CollectorError>;

    /// Produce one batch of raw events. Called once per poll tick.
    async fn collect_events(&mut self) -> Result<Vec<RawEvent>, CollectorError>;

    /// Called after the batch from the last `collect_events` reached the hot
    /// buffer. Collectors with source-side cursors (bookmarks) commit them
    /// here.
    async fn acknowledge(&mut self) {}

    /// Release source handles. Errors are logged, not propagated.
    async fn cleanup(&mut self) {}

    /// Probe the log source without collecting.
    async fn test_connection(&self) -> TestReport;

    /// Collector-specific description for status output.
    fn collector_info(&self) -> Value;
}

/// Descriptor `config` objects may be absent; treat null as empty.
pub(crate) fn settings_source(config: &Value) -> Value {
    if config.is_null() {
        Value::Object(Map::new())
    } else {
        config.clone()
    }
}

/// Counters maintained by the collection loop.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CollectorMetrics {
    pub events_collected: u64,
    pub events_processed: u64,
    pub events_failed: u64,
    pub bytes_processed: u64,
    pub collection_errors: u64,
    /// EMA of per-poll processing time, alpha = 0.1.
    pub avg_processing_time_ms: f64,
    pub last_collection_time: Option<f64>,
}

impl CollectorMetrics {
    /// Fold a new processing-time sample into the moving average.
    pub fn record_processing_time(&mut self, elapsed_ms: f64) {
        if self.avg_processing_time_ms == 0.0 {
            self.avg_processing_time_ms = elapsed_ms;
        } else {
            let alpha = 0.1;
            self.avg_processing_time_ms =
                alpha * elapsed_ms + (1.0 - alpha) * self.avg_processing_time_ms;
        }
    }
}

#[cfg(test)]
#[path = "collector_tests.rs"]
mod tests;
