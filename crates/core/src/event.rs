// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event model shared by collectors, stores, and transport.
//!
//! An event is an id, a UTC timestamp, collector provenance, and a free-form
//! field map. On the wire the provenance travels under the `_collector` key
//! and the fields are flattened into the top-level object:
//!
//! ```json
//! {"id": "...", "timestamp": 1700000000, "_collector": {...}, "user": "alice"}
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Collector type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectorKind {
    File,
    Syslog,
    WindowsEvent,
    Registry,
    Process,
}

crate::simple_display! {
    CollectorKind {
        File => "file",
        Syslog => "syslog",
        WindowsEvent => "windows_event",
        Registry => "registry",
        Process => "process",
    }
}

/// Provenance stamped onto every event by the collection loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMeta {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: CollectorKind,
    pub agent_id: String,
    pub collected_at: DateTime<Utc>,
}

/// A single collected event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "_collector", default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceMeta>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Now, truncated to whole seconds (the wire resolution for timestamps).
fn now_secs() -> DateTime<Utc> {
    DateTime::from_timestamp(Utc::now().timestamp(), 0).unwrap_or_default()
}

impl Event {
    /// Create an event with a fresh UUID id and the current timestamp.
    pub fn new(fields: Map<String, Value>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: now_secs(),
            source: None,
            fields,
        }
    }

    /// Create an event from raw fields, taking `id` and `timestamp` from the
    /// map when the producer supplied them.
    ///
    /// Collectors that mint deterministic ids (file, syslog) put them in the
    /// field map; everything else gets a UUID here.
    pub fn from_fields(mut fields: Map<String, Value>) -> Self {
        let id = match fields.remove("id") {
            Some(Value::String(s)) if !s.is_empty() => s,
            _ => uuid::Uuid::new_v4().to_string(),
        };
        let timestamp = match fields.remove("timestamp") {
            Some(Value::Number(n)) => n
                .as_i64()
                .and_then(|secs| DateTime::from_timestamp(secs, 0))
                .unwrap_or_else(now_secs),
            Some(Value::String(s)) => s
                .parse::<DateTime<Utc>>()
                .map(|t| DateTime::from_timestamp(t.timestamp(), 0).unwrap_or_default())
                .unwrap_or_else(|_| now_secs()),
            _ => now_secs(),
        };
        Self { id, timestamp, source: None, fields }
    }

    /// Attach collector provenance.
    pub fn with_source(mut self, source: SourceMeta) -> Self {
        self.source = Some(source);
        self
    }

    /// Look up a field by dotted path (`a.b.c` descends nested objects).
    pub fn field(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let first = parts.next()?;
        let mut current = self.fields.get(first)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    /// Serialized size in bytes of the wire representation.
    pub fn size_bytes(&self) -> usize {
        serde_json::to_vec(self).map(|v| v.len()).unwrap_or(0)
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
