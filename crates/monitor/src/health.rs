// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Passive health monitor.
//!
//! Components push stats and errors in; periodic probes classify each
//! component (and the host) into healthy/degraded/unhealthy and maintain
//! alert and metric history rings. The monitor never holds component
//! references.

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use sw_config::HealthConfig;
use sw_core::ShutdownSignal;
use sysinfo::System;
use tracing::{debug, warn};

/// Error-rate window for component probes.
const ERROR_WINDOW: Duration = Duration::from_secs(300);
/// Suppress duplicate alerts for a component within this window.
const ALERT_DEDUP: Duration = Duration::from_secs(300);
/// Alerts older than this are pruned each cycle.
const ALERT_RETENTION: Duration = Duration::from_secs(3_600);

/// Probe thresholds: (warning, critical).
const CPU_THRESHOLDS: (f64, f64) = (70.0, 90.0);
const MEMORY_THRESHOLDS: (f64, f64) = (80.0, 95.0);
const DISK_THRESHOLDS: (f64, f64) = (85.0, 95.0);
const LOAD_THRESHOLDS: (f64, f64) = (80.0, 95.0);
const CONNECTION_THRESHOLDS: (f64, f64) = (1_000.0, 2_000.0);
const OPEN_FILE_THRESHOLDS: (f64, f64) = (800.0, 950.0);
const STALENESS_THRESHOLDS: (f64, f64) = (60.0, 300.0);
const ERROR_RATE_THRESHOLDS: (f64, f64) = (5.0, 15.0);
const SUCCESS_RATE_THRESHOLDS: (f64, f64) = (95.0, 80.0);
const UTILIZATION_THRESHOLDS: (f64, f64) = (80.0, 95.0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricStatus {
    Healthy,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentHealth {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}

sw_core::simple_display! {
    ComponentHealth {
        Healthy => "healthy",
        Degraded => "degraded",
        Unhealthy => "unhealthy",
        Unknown => "unknown",
    }
}

/// One classified measurement.
#[derive(Debug, Clone, Serialize)]
pub struct HealthMetric {
    pub name: String,
    pub value: f64,
    pub unit: String,
    pub timestamp: f64,
    pub status: MetricStatus,
    pub warning_threshold: Option<f64>,
    pub critical_threshold: Option<f64>,
}

impl HealthMetric {
    /// Classify against (warning, critical) where higher is worse.
    fn classify(name: &str, value: f64, unit: &str, thresholds: (f64, f64)) -> Self {
        let status = if value >= thresholds.1 {
            MetricStatus::Critical
        } else if value >= thresholds.0 {
            MetricStatus::Warning
        } else {
            MetricStatus::Healthy
        };
        Self::build(name, value, unit, status, thresholds)
    }

    /// Classify against (warning, critical) where lower is worse
    /// (success rates).
    fn classify_inverted(name: &str, value: f64, unit: &str, thresholds: (f64, f64)) -> Self {
        let status = if value <= thresholds.1 {
            MetricStatus::Critical
        } else if value <= thresholds.0 {
            MetricStatus::Warning
        } else {
            MetricStatus::Healthy
        };
        Self::build(name, value, unit, status, thresholds)
    }

    fn build(name: &str, value: f64, unit: &str, status: MetricStatus, thresholds: (f64, f64)) -> Self {
        Self {
            name: name.to_string(),
            value,
            unit: unit.to_string(),
            timestamp: epoch_now(),
            status,
            warning_threshold: Some(thresholds.0),
            critical_threshold: Some(thresholds.1),
        }
    }
}

/// Recorded alert for a component that left `healthy`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthAlert {
    pub component: String,
    pub status: ComponentHealth,
    pub message: String,
    pub timestamp: f64,
    pub errors: Vec<String>,
}

/// Aggregate view for the supervisor status snapshot and heartbeats.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSummary {
    pub overall: ComponentHealth,
    pub components: HashMap<String, ComponentHealth>,
    pub active_alerts: usize,
    pub timestamp: f64,
}

struct ComponentTracker {
    stats: serde_json::Map<String, Value>,
    last_update: Option<Instant>,
    errors: VecDeque<(Instant, String)>,
}

struct HealthInner {
    check_interval: u64,
    history_size: usize,
    components: Mutex<HashMap<String, ComponentTracker>>,
    statuses: Mutex<HashMap<String, ComponentHealth>>,
    history: Mutex<HashMap<String, VecDeque<Vec<HealthMetric>>>>,
    alerts: Mutex<Vec<HealthAlert>>,
    system: Mutex<System>,
}

/// Cloneable health-monitor handle.
#[derive(Clone)]
pub struct HealthMonitor {
    inner: Arc<HealthInner>,
}

impl HealthMonitor {
    pub fn new(config: &HealthConfig) -> Self {
        let history_size = (config.metrics_retention / config.check_interval.max(1)).max(1) as usize;
        Self {
            inner: Arc::new(HealthInner {
                check_interval: config.check_interval,
                history_size,
                components: Mutex::new(HashMap::new()),
                statuses: Mutex::new(HashMap::new()),
                history: Mutex::new(HashMap::new()),
                alerts: Mutex::new(Vec::new()),
                system: Mutex::new(System::new()),
            }),
        }
    }

    /// Register a component probe (transport, buffer, collectors, ...).
    pub fn register_component(&self, name: &str) {
        self.inner.components.lock().entry(name.to_string()).or_insert(ComponentTracker {
            stats: serde_json::Map::new(),
            last_update: None,
            errors: VecDeque::new(),
        });
    }

    /// Push an error observation for a component.
    pub fn record_error(&self, component: &str, message: &str) {
        let mut components = self.inner.components.lock();
        let tracker = components.entry(component.to_string()).or_insert(ComponentTracker {
            stats: serde_json::Map::new(),
            last_update: None,
            errors: VecDeque::new(),
        });
        tracker.errors.push_back((Instant::now(), message.to_string()));
    }

    /// Push a stats snapshot for a component.
    pub fn record_stats(&self, component: &str, stats: Value) {
        let mut components = self.inner.components.lock();
        let tracker = components.entry(component.to_string()).or_insert(ComponentTracker {
            stats: serde_json::Map::new(),
            last_update: None,
            errors: VecDeque::new(),
        });
        if let Value::Object(map) = stats {
            for (key, value) in map {
                tracker.stats.insert(key, value);
            }
        }
        tracker.last_update = Some(Instant::now());
    }

    /// Run every probe once and update statuses, alerts, and history.
    pub fn check_once(&self) {
        let system_metrics = self.system_probe();
        self.store_probe("system", system_metrics);

        let names: Vec<String> = self.inner.components.lock().keys().cloned().collect();
        for name in names {
            let metrics = self.component_probe(&name);
            self.store_probe(&name, metrics);
        }

        self.prune_alerts();
    }

    /// Current component status, `unknown` before the first probe.
    pub fn component_status(&self, component: &str) -> ComponentHealth {
        self.inner
            .statuses
            .lock()
            .get(component)
            .copied()
            .unwrap_or(ComponentHealth::Unknown)
    }

    /// Aggregate summary: any unhealthy → unhealthy, else any degraded →
    /// degraded, else healthy.
    pub fn summary(&self) -> HealthSummary {
        let components = self.inner.statuses.lock().clone();
        let overall = if components.values().any(|s| *s == ComponentHealth::Unhealthy) {
            ComponentHealth::Unhealthy
        } else if components.values().any(|s| *s == ComponentHealth::Degraded) {
            ComponentHealth::Degraded
        } else {
            ComponentHealth::Healthy
        };
        HealthSummary {
            overall,
            components,
            active_alerts: self.inner.alerts.lock().len(),
            timestamp: epoch_now(),
        }
    }

    pub fn alerts(&self) -> Vec<HealthAlert> {
        self.inner.alerts.lock().clone()
    }

    /// Latest metric samples for one probe.
    pub fn probe_history(&self, probe: &str) -> Vec<Vec<HealthMetric>> {
        self.inner
            .history
            .lock()
            .get(probe)
            .map(|ring| ring.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Spawn the periodic probe task.
    pub fn spawn(&self, shutdown: ShutdownSignal) -> tokio::task::JoinHandle<()> {
        let monitor = self.clone();
        let interval = Duration::from_secs(monitor.inner.check_interval.max(1));
        tokio::spawn(async move {
            loop {
                if shutdown.sleep(interval).await {
                    break;
                }
                monitor.check_once();
            }
            debug!("health monitor stopped");
        })
    }

    fn system_probe(&self) -> Vec<HealthMetric> {
        let mut system = self.inner.system.lock();
        system.refresh_cpu_usage();
        system.refresh_memory();

        let cpu = system.global_cpu_usage() as f64;
        let memory = if system.total_memory() > 0 {
            system.used_memory() as f64 / system.total_memory() as f64 * 100.0
        } else {
            0.0
        };
        let cpus = system.cpus().len().max(1) as f64;
        drop(system);

        let mut metrics = vec![
            HealthMetric::classify("cpu_percent", cpu, "%", CPU_THRESHOLDS),
            HealthMetric::classify("memory_percent", memory, "%", MEMORY_THRESHOLDS),
            HealthMetric::classify("disk_percent", root_disk_percent(), "%", DISK_THRESHOLDS),
        ];

        #[cfg(unix)]
        {
            let load = System::load_average().one / cpus * 100.0;
            metrics.push(HealthMetric::classify("load_average", load, "%", LOAD_THRESHOLDS));
        }
        #[cfg(not(unix))]
        let _ = cpus;

        let (open_files, connections) = process_fds();
        metrics.push(HealthMetric::classify(
            "network_connections",
            connections as f64,
            "count",
            CONNECTION_THRESHOLDS,
        ));
        metrics.push(HealthMetric::classify(
            "open_files",
            open_files as f64,
            "count",
            OPEN_FILE_THRESHOLDS,
        ));
        metrics
    }

    fn component_probe(&self, name: &str) -> Vec<HealthMetric> {
        let mut components = self.inner.components.lock();
        let Some(tracker) = components.get_mut(name) else { return Vec::new() };

        // Prune the error window lazily
        let cutoff = Instant::now() - ERROR_WINDOW;
        while tracker.errors.front().is_some_and(|(t, _)| *t < cutoff) {
            tracker.errors.pop_front();
        }

        let mut metrics = Vec::new();

        let staleness = tracker
            .last_update
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(f64::MAX);
        metrics.push(HealthMetric::classify(
            "stats_age_seconds",
            staleness.min(86_400.0),
            "s",
            STALENESS_THRESHOLDS,
        ));

        metrics.push(HealthMetric::classify(
            "error_rate",
            tracker.errors.len() as f64,
            "errors/5min",
            ERROR_RATE_THRESHOLDS,
        ));

        if name == "transport" {
            if let Some(rate) = tracker.stats.get("success_rate").and_then(Value::as_f64) {
                metrics.push(HealthMetric::classify_inverted(
                    "success_rate",
                    rate,
                    "%",
                    SUCCESS_RATE_THRESHOLDS,
                ));
            }
        }
        if name == "buffer" {
            if let Some(utilization) = tracker.stats.get("buffer_utilization").and_then(Value::as_f64)
            {
                metrics.push(HealthMetric::classify(
                    "buffer_utilization",
                    utilization * 100.0,
                    "%",
                    UTILIZATION_THRESHOLDS,
                ));
            }
        }

        metrics
    }

    fn store_probe(&self, name: &str, metrics: Vec<HealthMetric>) {
        let status = derive_status(&metrics);
        let previous = self.inner.statuses.lock().insert(name.to_string(), status);

        if status != ComponentHealth::Healthy && status != ComponentHealth::Unknown {
            self.maybe_alert(name, status, &metrics);
        }
        if previous.is_some_and(|p| p != status) {
            warn!(probe = name, from = %previous.map(|p| p.to_string()).unwrap_or_default(), to = %status, "health status changed");
        }

        let mut history = self.inner.history.lock();
        let ring = history.entry(name.to_string()).or_default();
        if ring.len() >= self.inner.history_size {
            ring.pop_front();
        }
        ring.push_back(metrics);
    }

    fn maybe_alert(&self, component: &str, status: ComponentHealth, metrics: &[HealthMetric]) {
        let now = epoch_now();
        let mut alerts = self.inner.alerts.lock();
        let recent = alerts.iter().any(|a| {
            a.component == component && now - a.timestamp < ALERT_DEDUP.as_secs_f64()
        });
        if recent {
            return;
        }

        let failing: Vec<String> = metrics
            .iter()
            .filter(|m| m.status != MetricStatus::Healthy)
            .map(|m| format!("{} = {:.1}{}", m.name, m.value, m.unit))
            .collect();
        let errors = self
            .inner
            .components
            .lock()
            .get(component)
            .map(|t| t.errors.iter().map(|(_, e)| e.clone()).collect())
            .unwrap_or_default();

        warn!(component, status = %status, ?failing, "health alert");
        alerts.push(HealthAlert {
            component: component.to_string(),
            status,
            message: failing.join(", "),
            timestamp: now,
            errors,
        });
    }

    fn prune_alerts(&self) {
        let cutoff = epoch_now() - ALERT_RETENTION.as_secs_f64();
        self.inner.alerts.lock().retain(|a| a.timestamp >= cutoff);
    }
}

/// `critical` present → unhealthy, else `warning` → degraded, else healthy;
/// an empty probe is unknown.
fn derive_status(metrics: &[HealthMetric]) -> ComponentHealth {
    if metrics.is_empty() {
        return ComponentHealth::Unknown;
    }
    if metrics.iter().any(|m| m.status == MetricStatus::Critical) {
        ComponentHealth::Unhealthy
    } else if metrics.iter().any(|m| m.status == MetricStatus::Warning) {
        ComponentHealth::Degraded
    } else {
        ComponentHealth::Healthy
    }
}

fn root_disk_percent() -> f64 {
    let disks = sysinfo::Disks::new_with_refreshed_list();
    disks
        .iter()
        .find(|d| d.mount_point() == std::path::Path::new("/"))
        .or_else(|| disks.iter().next())
        .map(|d| {
            let total = d.total_space() as f64;
            if total > 0.0 {
                (total - d.available_space() as f64) / total * 100.0
            } else {
                0.0
            }
        })
        .unwrap_or(0.0)
}

#[cfg(target_os = "linux")]
fn process_fds() -> (u64, u64) {
    let Ok(entries) = std::fs::read_dir("/proc/self/fd") else { return (0, 0) };
    let mut fds = 0u64;
    let mut sockets = 0u64;
    for entry in entries.flatten() {
        fds += 1;
        if let Ok(target) = std::fs::read_link(entry.path()) {
            if target.to_string_lossy().starts_with("socket:") {
                sockets += 1;
            }
        }
    }
    (fds, sockets)
}

#[cfg(not(target_os = "linux"))]
fn process_fds() -> (u64, u64) {
    (0, 0)
}

fn epoch_now() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1_000.0
}

#[cfg(test)]
#[path = "health_tests.rs"]
mod tests;
