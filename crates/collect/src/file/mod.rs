// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File collector: tails discovered files with rotation detection and
//! multiline reassembly.

mod parser;
mod watcher;

pub use watcher::FileWatcher;

use crate::collector::{Collector, RawEvent, TestReport};
use async_trait::async_trait;
use chrono::Utc;
use md5::{Digest, Md5};
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use sw_core::{CollectorError, CollectorKind};
use tracing::{debug, error, info, warn};

/// Lines consumed from one watcher per poll; keeps a single busy file from
/// starving the others.
const MAX_LINES_PER_POLL: usize = 1_000;

/// Where a freshly created watcher starts reading: `"start"`, `"end"`, or
/// a byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartPosition {
    Start,
    #[default]
    End,
    Offset(u64),
}

impl<'de> serde::Deserialize<'de> for StartPosition {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::String(s) if s == "start" => Ok(StartPosition::Start),
            Value::String(s) if s == "end" => Ok(StartPosition::End),
            Value::Number(n) => n
                .as_u64()
                .map(StartPosition::Offset)
                .ok_or_else(|| serde::de::Error::custom("start_position offset must be a non-negative integer")),
            other => Err(serde::de::Error::custom(format!("invalid start_position: {other}"))),
        }
    }
}

/// Collector-specific settings from the descriptor's `config` object.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FileSettings {
    pub file_patterns: Vec<String>,
    pub directory_paths: Vec<PathBuf>,
    pub recursive: bool,
    pub exclude_patterns: Vec<String>,
    pub log_format: String,
    pub csv_headers: Vec<String>,
    pub multiline_pattern: Option<String>,
    pub multiline_negate: bool,
    pub encoding: String,
    pub start_position: StartPosition,
    /// Skip files whose mtime is older than this many seconds (0 disables).
    pub ignore_older_than: u64,
    /// Seconds between discovery reruns.
    pub discovery_interval: u64,
}

impl Default for FileSettings {
    fn default() -> Self {
        Self {
            file_patterns: Vec::new(),
            directory_paths: Vec::new(),
            recursive: false,
            exclude_patterns: Vec::new(),
            log_format: "auto".to_string(),
            csv_headers: Vec::new(),
            multiline_pattern: None,
            multiline_negate: false,
            encoding: "utf-8".to_string(),
            start_position: StartPosition::default(),
            ignore_older_than: 86_400,
            discovery_interval: 300,
        }
    }
}

/// File-based log collector.
pub struct FileCollector {
    name: String,
    settings: FileSettings,
    encoding: &'static encoding_rs::Encoding,
    multiline: Option<Regex>,
    exclude: Vec<ExcludeRule>,
    watchers: BTreeMap<PathBuf, FileWatcher>,
    discovered: BTreeSet<PathBuf>,
    multiline_buffers: BTreeMap<PathBuf, Vec<String>>,
    last_discovery: Option<Instant>,
    lines_processed: u64,
    multiline_events: u64,
    discovery_runs: u64,
}

enum ExcludeRule {
    Pattern(Regex),
    /// Invalid regex in config falls back to substring matching.
    Substring(String),
}

impl FileCollector {
    pub fn new(name: impl Into<String>, config: &Value) -> Result<Self, CollectorError> {
        let settings: FileSettings = serde_json::from_value(crate::collector::settings_source(config))
            .map_err(|e| CollectorError::Collect(format!("invalid file collector config: {e}")))?;

        let encoding = encoding_rs::Encoding::for_label(settings.encoding.as_bytes())
            .unwrap_or(encoding_rs::UTF_8);

        let multiline = match &settings.multiline_pattern {
            Some(pattern) => Some(
                Regex::new(pattern)
                    .map_err(|e| CollectorError::Collect(format!("invalid multiline_pattern: {e}")))?,
            ),
            None => None,
        };

        let exclude = settings
            .exclude_patterns
            .iter()
            .map(|p| match Regex::new(p) {
                Ok(regex) => ExcludeRule::Pattern(regex),
                Err(_) => ExcludeRule::Substring(p.clone()),
            })
            .collect();

        Ok(Self {
            name: name.into(),
            settings,
            encoding,
            multiline,
            exclude,
            watchers: BTreeMap::new(),
            discovered: BTreeSet::new(),
            multiline_buffers: BTreeMap::new(),
            last_discovery: None,
            lines_processed: 0,
            multiline_events: 0,
            discovery_runs: 0,
        })
    }

    /// Expand glob patterns and walk configured directories.
    fn discover_files(&mut self) {
        let mut found = BTreeSet::new();

        for pattern in &self.settings.file_patterns {
            match glob::glob(pattern) {
                Ok(paths) => {
                    for path in paths.flatten() {
                        if self.should_watch(&path) {
                            found.insert(path);
                        }
                    }
                }
                Err(e) => error!(pattern, error = %e, "invalid file pattern"),
            }
        }

        for dir in self.settings.directory_paths.clone() {
            self.walk_directory(&dir, self.settings.recursive, &mut found);
        }

        let new_files: Vec<_> = found.difference(&self.discovered).cloned().collect();
        let removed: Vec<_> = self.discovered.difference(&found).cloned().collect();

        if !new_files.is_empty() {
            info!(count = new_files.len(), "discovered new files");
        }
        for path in &removed {
            self.watchers.remove(path);
            self.multiline_buffers.remove(path);
        }
        if !removed.is_empty() {
            info!(count = removed.len(), "dropped watchers for vanished files");
        }

        self.discovered = found;
        self.discovery_runs += 1;
    }

    fn walk_directory(&self, dir: &Path, recursive: bool, found: &mut BTreeSet<PathBuf>) {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(dir = %dir.display(), error = %e, "cannot read directory");
                return;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                if recursive {
                    self.walk_directory(&path, true, found);
                }
            } else if self.should_watch(&path) {
                found.insert(path);
            }
        }
    }

    fn should_watch(&self, path: &Path) -> bool {
        let Ok(metadata) = path.metadata() else { return false };
        if !metadata.is_file() {
            return false;
        }

        if self.settings.ignore_older_than > 0 {
            let age = metadata
                .modified()
                .ok()
                .and_then(|mtime| mtime.elapsed().ok())
                .unwrap_or_default();
            if age > Duration::from_secs(self.settings.ignore_older_than) {
                return false;
            }
        }

        let path_str = path.to_string_lossy();
        for rule in &self.exclude {
            let hit = match rule {
                ExcludeRule::Pattern(regex) => regex.is_match(&path_str),
                ExcludeRule::Substring(s) => path_str.contains(s.as_str()),
            };
            if hit {
                return false;
            }
        }
        true
    }

    fn initialize_watchers(&mut self) {
        for path in self.discovered.clone() {
            if self.watchers.contains_key(&path) {
                continue;
            }
            let offset = match self.settings.start_position {
                StartPosition::End => path.metadata().map(|m| m.len()).unwrap_or(0),
                StartPosition::Start => 0,
                StartPosition::Offset(offset) => offset,
            };
            debug!(path = %path.display(), offset, "watching file");
            self.watchers.insert(path.clone(), FileWatcher::new(path, offset, self.encoding));
        }
    }

    fn process_line(&mut self, line: String, path: &Path) -> Option<RawEvent> {
        if self.multiline.is_some() {
            return self.handle_multiline(line, path);
        }
        Some(self.single_line_event(&line, path))
    }

    fn single_line_event(&mut self, line: &str, path: &Path) -> RawEvent {
        let parsed = parser::parse_line(line, &self.settings.log_format, &self.settings.csv_headers);

        let mut fields = serde_json::Map::new();
        fields.insert("id".to_string(), Value::String(event_id(line, path)));
        fields.insert("message".to_string(), Value::String(line.to_string()));
        fields.insert("source_file".to_string(), Value::String(path.display().to_string()));
        fields.insert("source_type".to_string(), Value::String("file".to_string()));
        for (key, value) in parsed {
            fields.insert(key, value);
        }
        fields.insert("file_metadata".to_string(), file_metadata(path));
        self.lines_processed += 1;
        fields
    }

    /// A multiline start flushes the previous buffer as one combined event.
    fn handle_multiline(&mut self, line: String, path: &Path) -> Option<RawEvent> {
        let is_start = match &self.multiline {
            Some(pattern) => pattern.is_match(&line) != self.settings.multiline_negate,
            None => return None,
        };

        let buffered = self.multiline_buffers.get(path).is_some_and(|b| !b.is_empty());
        if is_start {
            if !buffered {
                self.multiline_buffers.entry(path.to_path_buf()).or_default().push(line);
                return None;
            }
            let lines = std::mem::replace(
                self.multiline_buffers.entry(path.to_path_buf()).or_default(),
                vec![line],
            );
            return Some(self.multiline_event(lines, path));
        }

        if !buffered {
            // Orphaned continuation at start of watch
            return Some(self.single_line_event(&line, path));
        }
        self.multiline_buffers.entry(path.to_path_buf()).or_default().push(line);
        None
    }

    fn multiline_event(&mut self, lines: Vec<String>, path: &Path) -> RawEvent {
        let combined = lines.join("\n");
        let mut fields = self.single_line_event(&combined, path);
        fields.insert("line_count".to_string(), Value::from(lines.len()));
        fields.insert("multiline".to_string(), Value::Bool(true));
        self.multiline_events += 1;
        fields
    }
}

#[async_trait]
impl Collector for FileCollector {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> CollectorKind {
        CollectorKind::File
    }

    async fn initialize(&mut self) -> Result<(), CollectorError> {
        self.discover_files();
        self.initialize_watchers();
        self.last_discovery = Some(Instant::now());
        info!(collector = %self.name, files = self.watchers.len(), "file collector initialized");
        Ok(())
    }

    async fn collect_events(&mut self) -> Result<Vec<RawEvent>, CollectorError> {
        let discovery_due = self
            .last_discovery
            .map(|t| t.elapsed() >= Duration::from_secs(self.settings.discovery_interval))
            .unwrap_or(true);
        if discovery_due {
            self.discover_files();
            self.initialize_watchers();
            self.last_discovery = Some(Instant::now());
        }

        let mut events = Vec::new();
        let paths: Vec<PathBuf> = self.watchers.keys().cloned().collect();
        for path in paths {
            let lines = {
                let Some(watcher) = self.watchers.get_mut(&path) else { continue };
                match watcher.read_new_lines(MAX_LINES_PER_POLL).await {
                    Ok(lines) => lines,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "error reading file");
                        continue;
                    }
                }
            };
            for line in lines {
                if line.trim().is_empty() {
                    continue;
                }
                if let Some(event) = self.process_line(line, &path) {
                    events.push(event);
                }
            }
        }
        Ok(events)
    }

    async fn cleanup(&mut self) {
        self.watchers.clear();
        self.multiline_buffers.clear();
    }

    async fn test_connection(&self) -> TestReport {
        let mut accessible = 0usize;
        let mut inaccessible = Vec::new();
        for path in &self.discovered {
            match std::fs::File::open(path) {
                Ok(_) => accessible += 1,
                Err(e) => inaccessible.push(format!("{} ({e})", path.display())),
            }
        }

        let report = if accessible > 0 || self.discovered.is_empty() {
            TestReport::ok(format!("{accessible} of {} files readable", self.discovered.len()))
        } else {
            TestReport::failed("no discovered files are readable")
        };
        report.with_details(json!({
            "total_files": self.discovered.len(),
            "accessible_files": accessible,
            "inaccessible": inaccessible.into_iter().take(5).collect::<Vec<_>>(),
        }))
    }

    fn collector_info(&self) -> Value {
        json!({
            "type": "file",
            "description": "File-based log collector with tail and rotation support",
            "capabilities": [
                "file_tailing",
                "rotation_detection",
                "multiline_support",
                "pattern_matching",
                "auto_discovery",
            ],
            "configuration": {
                "file_patterns": self.settings.file_patterns,
                "directory_paths": self.settings.directory_paths,
                "log_format": self.settings.log_format,
                "recursive": self.settings.recursive,
                "multiline_enabled": self.multiline.is_some(),
            },
            "statistics": {
                "files_watched": self.discovered.len(),
                "lines_processed": self.lines_processed,
                "multiline_events": self.multiline_events,
                "discovery_runs": self.discovery_runs,
                "watchers_active": self.watchers.len(),
            },
        })
    }
}

/// Deterministic per-line id: `file-{md5(path)[..8]}-{epoch_ms}-{md5(content)[..8]}`.
fn event_id(content: &str, path: &Path) -> String {
    let content_hash = short_md5(content.as_bytes());
    let file_hash = short_md5(path.to_string_lossy().as_bytes());
    let epoch_ms = Utc::now().timestamp_millis();
    format!("file-{file_hash}-{epoch_ms}-{content_hash}")
}

fn short_md5(data: &[u8]) -> String {
    let digest = Md5::digest(data);
    let hex = format!("{digest:x}");
    hex[..8].to_string()
}

fn file_metadata(path: &Path) -> Value {
    match path.metadata() {
        Ok(metadata) => {
            let mtime = metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_secs_f64());
            json!({
                "file_name": path.file_name().map(|n| n.to_string_lossy().to_string()),
                "file_size": metadata.len(),
                "modified_time": mtime,
                "directory": path.parent().map(|p| p.display().to_string()),
                "extension": path.extension().map(|e| e.to_string_lossy().to_string()),
            })
        }
        Err(_) => json!({
            "file_name": path.file_name().map(|n| n.to_string_lossy().to_string()),
        }),
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
