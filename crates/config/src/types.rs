// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configuration tree for the agent.
//!
//! Every section has serde defaults so a partial document loads; the closed
//! enums and numeric floors are enforced by [`crate::validate`] before
//! deserialization so failures carry the JSON pointer of the offending node.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use sw_core::CollectorKind;

/// Complete agent configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub agent_id: Option<String>,
    pub version: String,
    pub logging: LoggingConfig,
    pub collectors: Vec<CollectorConfig>,
    pub buffer: BufferConfig,
    pub queue: QueueConfig,
    pub transport: TransportConfig,
    pub health: HealthConfig,
    pub resource_limits: ResourceLimits,
    pub security: SecurityConfig,
    /// Seconds between config-file update checks.
    pub config_update_interval: u64,
    pub auto_update_enabled: bool,
    pub debug_mode: bool,
    pub telemetry_enabled: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            agent_id: None,
            version: "1.0.0".to_string(),
            logging: LoggingConfig::default(),
            collectors: Vec::new(),
            buffer: BufferConfig::default(),
            queue: QueueConfig::default(),
            transport: TransportConfig::default(),
            health: HealthConfig::default(),
            resource_limits: ResourceLimits::default(),
            security: SecurityConfig::default(),
            config_update_interval: 300,
            auto_update_enabled: true,
            debug_mode: false,
            telemetry_enabled: true,
        }
    }
}

/// Logging policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file_path: Option<PathBuf>,
    pub max_size_mb: u64,
    pub backup_count: u32,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "INFO".to_string(), file_path: None, max_size_mb: 100, backup_count: 5 }
    }
}

/// One collector descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: CollectorKind,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub required: bool,
    /// Collector-specific settings, interpreted by the concrete collector.
    #[serde(default = "default_collector_settings")]
    pub config: Value,
    #[serde(default)]
    pub filters: Vec<FilterSpec>,
    #[serde(default = "default_collector_batch")]
    pub batch_size: usize,
    /// Seconds between polls.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: f64,
    /// Soft timeout for one `collect_events` call, seconds.
    #[serde(default = "default_collector_timeout")]
    pub timeout: u64,
}

fn default_true() -> bool {
    true
}

fn default_collector_settings() -> Value {
    Value::Object(serde_json::Map::new())
}

fn default_collector_batch() -> usize {
    100
}

fn default_poll_interval() -> f64 {
    30.0
}

fn default_collector_timeout() -> u64 {
    30
}

/// Filter chain entry (§ collector framework).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterSpec {
    #[serde(rename = "type", default)]
    pub filter_type: FilterType,
    pub field: String,
    pub operation: FilterOp,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterType {
    #[default]
    Include,
    Exclude,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    Regex,
    GreaterThan,
    LessThan,
    In,
    NotIn,
}

/// Hot-buffer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    pub db_path: PathBuf,
    pub max_size: u64,
    pub batch_size: u64,
    pub retention_hours: u64,
    /// Seconds between maintenance passes.
    pub cleanup_interval: u64,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("/var/lib/securewatch/events.db"),
            max_size: 100_000,
            batch_size: 1_000,
            retention_hours: 168,
            cleanup_interval: 3_600,
        }
    }
}

/// Persistent retry-queue settings.
///
/// The queue database lives next to the hot buffer
/// (`<buffer-parent>/persistent_queue.db`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub max_size: u64,
    pub max_age_hours: u64,
    /// Compress payloads larger than this many bytes.
    pub compression_threshold: usize,
    pub batch_size: u64,
    /// Exponential retry schedule, seconds per attempt.
    pub retry_delays: Vec<u64>,
    pub cleanup_interval: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_size: 100_000,
            max_age_hours: 72,
            compression_threshold: 1_024,
            batch_size: 50,
            retry_delays: vec![30, 300, 1_800, 7_200],
            cleanup_interval: 3_600,
        }
    }
}

/// mTLS material and certificate policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub client_cert_path: PathBuf,
    pub client_key_path: PathBuf,
    pub ca_cert_path: PathBuf,
    pub cert_rotation_days: u32,
    pub verify_hostname: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            client_cert_path: PathBuf::from("/etc/securewatch/client.crt"),
            client_key_path: PathBuf::from("/etc/securewatch/client.key"),
            ca_cert_path: PathBuf::from("/etc/securewatch/ca.crt"),
            cert_rotation_days: 30,
            verify_hostname: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionAlgorithm {
    #[default]
    Zstd,
    Gzip,
    Lz4,
}

sw_core::simple_display! {
    CompressionAlgorithm {
        Zstd => "zstd",
        Gzip => "gzip",
        Lz4 => "lz4",
    }
}

/// Transport body compression.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    pub enabled: bool,
    pub algorithm: CompressionAlgorithm,
    pub level: i32,
    /// Bodies smaller than this are sent uncompressed.
    pub min_size: usize,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self { enabled: true, algorithm: CompressionAlgorithm::Zstd, level: 3, min_size: 1_024 }
    }
}

/// Transport retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: f64,
    pub max_delay: f64,
    pub exponential_base: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay: 1.0, max_delay: 60.0, exponential_base: 2.0, jitter: true }
    }
}

/// Transport endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub endpoint: String,
    pub auth: AuthConfig,
    pub compression: CompressionConfig,
    pub retry: RetryConfig,
    pub batch_size: u64,
    /// Total request timeout, seconds.
    pub timeout: f64,
    pub websocket_enabled: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://siem.company.com".to_string(),
            auth: AuthConfig::default(),
            compression: CompressionConfig::default(),
            retry: RetryConfig::default(),
            batch_size: 1_000,
            timeout: 30.0,
            websocket_enabled: false,
        }
    }
}

/// Health monitoring policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub check_interval: u64,
    pub heartbeat_interval: u64,
    /// Seconds of metric history retained per probe.
    pub metrics_retention: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self { check_interval: 30, heartbeat_interval: 300, metrics_retention: 86_400 }
    }
}

/// Hard resource limits enforced by the governor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    pub max_memory_mb: u64,
    pub max_cpu_percent: f64,
    pub max_disk_mb: u64,
    pub max_file_handles: u64,
    pub max_network_connections: u64,
    pub max_threads: u64,
    pub max_events_per_minute: u64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_memory_mb: 512,
            max_cpu_percent: 50.0,
            max_disk_mb: 1_024,
            max_file_handles: 1_024,
            max_network_connections: 100,
            max_threads: 64,
            max_events_per_minute: 60_000,
        }
    }
}

/// Host security policy (enforced by deployment, carried in config).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub allowed_commands: Vec<String>,
    pub blocked_processes: Vec<String>,
    pub sandbox_enabled: bool,
    pub privilege_escalation: bool,
}

impl AgentConfig {
    /// Path of the persistent queue database, derived from the buffer path.
    pub fn queue_db_path(&self) -> PathBuf {
        self.buffer
            .db_path
            .parent()
            .map(|p| p.join("persistent_queue.db"))
            .unwrap_or_else(|| PathBuf::from("persistent_queue.db"))
    }

    /// Look up a collector descriptor by name.
    pub fn collector(&self, name: &str) -> Option<&CollectorConfig> {
        self.collectors.iter().find(|c| c.name == name)
    }

    /// Default document synthesized when no config file exists: a Security
    /// channel Windows event collector and a UDP syslog receiver on 514.
    pub fn synthesized_default() -> Self {
        let mut config = Self::default();
        config.collectors = vec![
            CollectorConfig {
                name: "windows_security".to_string(),
                kind: CollectorKind::WindowsEvent,
                enabled: true,
                required: true,
                config: serde_json::json!({
                    "channels": ["Security"],
                    "event_ids": [4624, 4625, 4648, 4672],
                    "servers": ["localhost"],
                }),
                filters: Vec::new(),
                batch_size: default_collector_batch(),
                poll_interval: default_poll_interval(),
                timeout: default_collector_timeout(),
            },
            CollectorConfig {
                name: "syslog_receiver".to_string(),
                kind: CollectorKind::Syslog,
                enabled: true,
                required: false,
                config: serde_json::json!({
                    "protocol": "udp",
                    "port": 514,
                    "bind_address": "0.0.0.0",
                }),
                filters: Vec::new(),
                batch_size: default_collector_batch(),
                poll_interval: default_poll_interval(),
                timeout: default_collector_timeout(),
            },
        ];
        config
    }
}

#[cfg(test)]
#[path = "types_tests.rs"]
mod tests;
