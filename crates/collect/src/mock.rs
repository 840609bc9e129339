// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Mock collector used by tests and pipeline smoke checks.

use crate::collector::{Collector, RawEvent, TestReport};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};
use sw_core::{CollectorError, CollectorKind};

/// Emits a fixed number of synthetic events per poll.
pub struct MockCollector {
    name: String,
    batch_size: usize,
    event_count: u64,
}

impl MockCollector {
    pub fn new(name: impl Into<String>, batch_size: usize) -> Self {
        Self { name: name.into(), batch_size, event_count: 0 }
    }
}

#[async_trait]
impl Collector for MockCollector {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> CollectorKind {
        CollectorKind::File
    }

    async fn initialize(&mut self) -> Result<(), CollectorError> {
        Ok(())
    }

    async fn collect_events(&mut self) -> Result<Vec<RawEvent>, CollectorError> {
        let mut events = Vec::new();
        for _ in 0..self.batch_size.min(5) {
            self.event_count += 1;
            let mut fields = Map::new();
            fields.insert("id".to_string(), Value::String(format!("mock-{}", self.event_count)));
            fields.insert("timestamp".to_string(), Value::from(Utc::now().timestamp()));
            fields.insert(
                "message".to_string(),
                Value::String(format!("Mock event {} from {}", self.event_count, self.name)),
            );
            fields.insert("level".to_string(), Value::String("info".to_string()));
            fields.insert("source".to_string(), Value::String("mock".to_string()));
            fields.insert("event_id".to_string(), Value::from(1_000 + (self.event_count % 10)));
            events.push(fields);
        }
        Ok(events)
    }

    async fn test_connection(&self) -> TestReport {
        TestReport::ok("mock connection test successful")
    }

    fn collector_info(&self) -> Value {
        json!({
            "type": "mock",
            "description": "Mock collector for testing",
            "mock_event_count": self.event_count,
        })
    }
}
