// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Windows Event Log collector with per-(server, channel) bookmarks.
//!
//! On non-Windows hosts (or when the WMI probe fails) the collector runs in
//! mock mode, emitting a small cycle of representative events with freshly
//! stamped record ids so the pipeline stays exercisable end to end.

use crate::collector::{Collector, RawEvent, TestReport};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use sw_core::{CollectorError, CollectorKind};
use tracing::{debug, info, warn};

/// Collector-specific settings from the descriptor's `config` object.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WindowsSettings {
    pub servers: Vec<String>,
    pub channels: Vec<String>,
    pub event_ids: Vec<u32>,
    pub keywords: Vec<String>,
    pub level_filter: Vec<String>,
    pub time_range_hours: u64,
    pub collection_method: CollectionMethod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionMethod {
    #[default]
    Wmi,
    Evtx,
    Api,
}

impl Default for WindowsSettings {
    fn default() -> Self {
        Self {
            servers: vec!["localhost".to_string()],
            channels: vec!["Security".to_string(), "System".to_string(), "Application".to_string()],
            event_ids: Vec::new(),
            keywords: Vec::new(),
            level_filter: Vec::new(),
            time_range_hours: 24,
            collection_method: CollectionMethod::Wmi,
        }
    }
}

/// Windows Event Log collector.
pub struct WindowsEventCollector {
    name: String,
    settings: WindowsSettings,
    batch_size: usize,
    /// (server, channel) → last collected record id.
    bookmarks: BTreeMap<(String, String), Option<u64>>,
    /// Bookmark advances staged until the batch reaches the hot buffer.
    pending_bookmarks: BTreeMap<(String, String), u64>,
    mock_mode: bool,
}

impl WindowsEventCollector {
    pub fn new(name: impl Into<String>, config: &Value, batch_size: usize) -> Result<Self, CollectorError> {
        let settings: WindowsSettings = serde_json::from_value(crate::collector::settings_source(config))
            .map_err(|e| CollectorError::Collect(format!("invalid windows_event collector config: {e}")))?;
        Ok(Self {
            name: name.into(),
            settings,
            batch_size,
            bookmarks: BTreeMap::new(),
            pending_bookmarks: BTreeMap::new(),
            mock_mode: !cfg!(windows),
        })
    }

    fn probe_wmi(&self) -> Result<(), CollectorError> {
        if !cfg!(windows) {
            return Err(CollectorError::Collect("not a Windows host".into()));
        }
        // WMI polling requires the platform event-log API surface, which is
        // only wired up in Windows builds.
        Err(CollectorError::Collect("WMI interface unavailable".into()))
    }

    fn collect_channel(&mut self, server: &str, channel: &str) -> Vec<RawEvent> {
        let bookmark = self
            .bookmarks
            .get(&(server.to_string(), channel.to_string()))
            .copied()
            .flatten();

        let events = self.mock_events(server, channel, bookmark);
        if let Some(max_record) = events
            .iter()
            .filter_map(|e| e.get("record_id").and_then(Value::as_u64))
            .max()
        {
            self.pending_bookmarks
                .insert((server.to_string(), channel.to_string()), max_record);
        }
        events
    }

    /// Canned event cycle: Security 4624/4625, Kernel-General 1074, Service
    /// Control Manager 7040, stamped with fresh record ids and timestamps.
    fn mock_events(&self, hostname: &str, channel: &str, bookmark: Option<u64>) -> Vec<RawEvent> {
        let templates = mock_templates(hostname);

        let now = Utc::now();
        let record_base = (now.timestamp_millis() % 1_000_000) as u64;

        let mut events = Vec::new();
        for (i, template) in templates.into_iter().enumerate() {
            if events.len() >= self.batch_size {
                break;
            }
            if !self.settings.event_ids.is_empty()
                && !self.settings.event_ids.contains(&template.event_id)
            {
                continue;
            }
            if !self.settings.level_filter.is_empty()
                && !self.settings.level_filter.iter().any(|l| l == template.level)
            {
                continue;
            }

            let record_id = record_base + i as u64;
            if bookmark.is_some_and(|last| record_id <= last) {
                continue;
            }

            let timestamp = now - chrono::Duration::minutes(i as i64);
            let mut fields = Map::new();
            fields.insert(
                "id".to_string(),
                Value::String(format!("win-{hostname}-{channel}-{record_id}")),
            );
            fields.insert("record_id".to_string(), Value::from(record_id));
            fields.insert("timestamp".to_string(), Value::from(timestamp.timestamp()));
            fields.insert("computer".to_string(), Value::String(hostname.to_string()));
            fields.insert("channel".to_string(), Value::String(channel.to_string()));
            fields.insert("event_id".to_string(), Value::from(template.event_id));
            fields.insert("level".to_string(), Value::String(template.level.to_string()));
            fields.insert(
                "keywords".to_string(),
                Value::Array(vec![Value::String(template.keyword.to_string())]),
            );
            fields.insert("provider".to_string(), Value::String(template.provider.to_string()));
            fields.insert("message".to_string(), Value::String(template.description.to_string()));
            fields.insert("data".to_string(), template.data);
            events.push(fields);
        }
        events
    }

    /// Reset bookmarks for full re-collection (admin operation).
    pub fn reset_bookmarks(&mut self, server: Option<&str>, channel: Option<&str>) {
        for ((s, c), bookmark) in self.bookmarks.iter_mut() {
            let server_hit = server.is_none_or(|wanted| s == wanted);
            let channel_hit = channel.is_none_or(|wanted| c == wanted);
            if server_hit && channel_hit {
                *bookmark = None;
            }
        }
        info!(collector = %self.name, ?server, ?channel, "bookmarks reset");
    }

    /// Current bookmark positions (admin operation).
    pub fn bookmark_status(&self) -> Value {
        let bookmarks: Map<String, Value> = self
            .bookmarks
            .iter()
            .map(|((s, c), bookmark)| {
                (format!("{s}/{c}"), bookmark.map(Value::from).unwrap_or(Value::Null))
            })
            .collect();
        json!({
            "bookmarks": bookmarks,
            "servers_count": self.settings.servers.len(),
            "channels_count": self.settings.channels.len(),
        })
    }

    /// Channels known to the source (admin operation).
    pub fn available_channels(&self, _server: Option<&str>) -> Vec<String> {
        if self.mock_mode {
            return [
                "Security",
                "System",
                "Application",
                "Setup",
                "Microsoft-Windows-PowerShell/Operational",
                "Microsoft-Windows-Sysmon/Operational",
                "Windows PowerShell",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect();
        }
        self.settings.channels.clone()
    }
}

struct MockTemplate {
    event_id: u32,
    level: &'static str,
    keyword: &'static str,
    provider: &'static str,
    description: &'static str,
    data: Value,
}

fn mock_templates(hostname: &str) -> Vec<MockTemplate> {
    vec![
        MockTemplate {
            event_id: 4624,
            level: "Information",
            keyword: "Audit Success",
            provider: "Microsoft-Windows-Security-Auditing",
            description: "An account was successfully logged on",
            data: json!({
                "SubjectUserSid": "S-1-5-18",
                "SubjectUserName": "SYSTEM",
                "TargetUserName": "testuser",
                "TargetDomainName": "WORKGROUP",
                "LogonType": "2",
                "WorkstationName": hostname,
                "IpAddress": "127.0.0.1",
            }),
        },
        MockTemplate {
            event_id: 4625,
            level: "Information",
            keyword: "Audit Failure",
            provider: "Microsoft-Windows-Security-Auditing",
            description: "An account failed to log on",
            data: json!({
                "TargetUserName": "baduser",
                "TargetDomainName": "WORKGROUP",
                "Status": "0xc000006d",
                "FailureReason": "Unknown user name or bad password",
                "LogonType": "2",
                "WorkstationName": hostname,
            }),
        },
        MockTemplate {
            event_id: 1074,
            level: "Information",
            keyword: "Classic",
            provider: "Microsoft-Windows-Kernel-General",
            description: "The system has been shut down cleanly",
            data: json!({
                "ShutdownType": "1",
                "MajorReason": "1",
            }),
        },
        MockTemplate {
            event_id: 7040,
            level: "Information",
            keyword: "Classic",
            provider: "Service Control Manager",
            description: "The start type of the service was changed",
            data: json!({
                "ServiceName": "Windows Update",
                "StartType": "auto start",
                "PreviousStartType": "demand start",
            }),
        },
    ]
}

#[async_trait]
impl Collector for WindowsEventCollector {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> CollectorKind {
        CollectorKind::WindowsEvent
    }

    async fn initialize(&mut self) -> Result<(), CollectorError> {
        if !self.mock_mode {
            if let Err(e) = self.probe_wmi() {
                warn!(collector = %self.name, error = %e, "WMI probe failed, running in mock mode");
                self.mock_mode = true;
            }
        } else {
            debug!(collector = %self.name, "non-Windows host, running in mock mode");
        }

        for server in self.settings.servers.clone() {
            for channel in self.settings.channels.clone() {
                self.bookmarks.entry((server.clone(), channel)).or_insert(None);
            }
        }

        info!(
            collector = %self.name,
            servers = self.settings.servers.len(),
            channels = self.settings.channels.len(),
            mock_mode = self.mock_mode,
            "windows event collector initialized"
        );
        Ok(())
    }

    async fn collect_events(&mut self) -> Result<Vec<RawEvent>, CollectorError> {
        let mut all_events = Vec::new();
        let pairs: Vec<(String, String)> = self
            .settings
            .servers
            .iter()
            .flat_map(|s| self.settings.channels.iter().map(move |c| (s.clone(), c.clone())))
            .collect();

        for (server, channel) in pairs {
            let events = self.collect_channel(&server, &channel);
            all_events.extend(events);
        }
        Ok(all_events)
    }

    /// Commit staged bookmark advances now that the batch is durable.
    async fn acknowledge(&mut self) {
        for (key, record_id) in std::mem::take(&mut self.pending_bookmarks) {
            let entry = self.bookmarks.entry(key).or_insert(None);
            // Monotonically non-decreasing per (server, channel)
            if entry.is_none_or(|current| record_id > current) {
                *entry = Some(record_id);
            }
        }
    }

    async fn test_connection(&self) -> TestReport {
        let details = json!({
            "servers_tested": self.settings.servers.len(),
            "channels": self.settings.channels,
            "mock_mode": self.mock_mode,
        });
        if self.mock_mode {
            TestReport::ok("mock connection successful").with_details(details)
        } else {
            match self.probe_wmi() {
                Ok(()) => TestReport::ok("WMI connection successful").with_details(details),
                Err(e) => TestReport::failed(e.to_string()).with_details(details),
            }
        }
    }

    fn collector_info(&self) -> Value {
        json!({
            "type": "windows_event",
            "description": "Windows Event Log collector",
            "capabilities": [
                "local_collection",
                "remote_collection",
                "incremental_collection",
                "event_filtering",
                "multiple_channels",
                "bookmark_support",
            ],
            "configuration": {
                "servers": self.settings.servers,
                "channels": self.settings.channels,
                "event_ids_filter": self.settings.event_ids,
                "collection_method": format!("{:?}", self.settings.collection_method).to_lowercase(),
                "mock_mode": self.mock_mode,
            },
            "bookmarks": self.bookmark_status()["bookmarks"],
        })
    }
}

#[cfg(test)]
#[path = "windows_tests.rs"]
mod tests;
