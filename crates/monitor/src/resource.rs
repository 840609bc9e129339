// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resource governor: sampling, limit enforcement, graded throttling.
//!
//! Throttle routing: memory/CPU pressure throttles `collectors` to 0.5,
//! event-rate pressure throttles `event_processing` to 0.3, connection
//! pressure throttles `transport` to 0.7, file-handle pressure throttles
//! `buffer` to 0.6. Applying a throttle only ever lowers a level; recovery
//! raises levels by 0.2 per tick once usage sits below 70% of every limit.

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use sw_config::ResourceLimits;
use sw_core::ShutdownSignal;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::{debug, error, info, warn};

/// Samples retained in the ring (5 minutes at the 5 s default cadence).
const SAMPLE_RING: usize = 60;

/// Recovery cadence and watermark.
const RECOVERY_INTERVAL: Duration = Duration::from_secs(30);
const RECOVERY_WATERMARK: f64 = 0.7;
const RECOVERY_STEP: f64 = 0.2;

/// One point-in-time process resource sample.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResourceUsage {
    pub timestamp: f64,
    pub memory_mb: f64,
    pub memory_percent: f64,
    pub cpu_percent: f64,
    pub disk_mb: f64,
    pub file_handles: u64,
    pub network_connections: u64,
    pub threads: u64,
    /// Rolling 60-second event count.
    pub event_rate: u64,
}

/// Published throttle for one component.
#[derive(Debug, Clone, Serialize)]
pub struct ThrottleState {
    pub component: String,
    pub active: bool,
    /// 1.0 = unthrottled; lower values lengthen the component's duty cycle.
    pub level: f64,
    pub reason: String,
    pub started_at: f64,
    pub auto_recover: bool,
}

struct GovernorState {
    throttles: HashMap<String, ThrottleState>,
    samples: VecDeque<ResourceUsage>,
    event_window: VecDeque<Instant>,
}

struct Inner {
    limits: ResourceLimits,
    check_interval: Duration,
    state: Mutex<GovernorState>,
    system: Mutex<System>,
    emergency: Mutex<Option<ShutdownSignal>>,
}

/// Cloneable governor handle. Single writer (the monitoring task), many
/// readers (every component querying its throttle level).
#[derive(Clone)]
pub struct ResourceGovernor {
    inner: Arc<Inner>,
}

impl ResourceGovernor {
    pub fn new(limits: ResourceLimits, check_interval: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                limits,
                check_interval,
                state: Mutex::new(GovernorState {
                    throttles: HashMap::new(),
                    samples: VecDeque::with_capacity(SAMPLE_RING),
                    event_window: VecDeque::new(),
                }),
                system: Mutex::new(System::new()),
                emergency: Mutex::new(None),
            }),
        }
    }

    /// Wire the emergency shutdown signal (the supervisor's stop path).
    pub fn set_emergency_signal(&self, signal: ShutdownSignal) {
        *self.inner.emergency.lock() = Some(signal);
    }

    /// Current throttle level for a component; 1.0 when unthrottled.
    pub fn throttle_level(&self, component: &str) -> f64 {
        let state = self.inner.state.lock();
        state
            .throttles
            .get(component)
            .filter(|t| t.active)
            .map(|t| t.level)
            .unwrap_or(1.0)
    }

    pub fn is_throttled(&self, component: &str) -> bool {
        self.throttle_level(component) < 1.0
    }

    /// Append to the rolling event-rate window.
    pub fn record_event(&self) {
        self.inner.state.lock().event_window.push_back(Instant::now());
    }

    /// Most recent sample, if any.
    pub fn current_usage(&self) -> Option<ResourceUsage> {
        self.inner.state.lock().samples.back().cloned()
    }

    /// Active throttles for status output.
    pub fn throttle_status(&self) -> Vec<ThrottleState> {
        let state = self.inner.state.lock();
        state.throttles.values().filter(|t| t.active).cloned().collect()
    }

    /// True while the latest sample stays inside every hard limit.
    ///
    /// The supervisor's buffer→queue loop backs off while this is false.
    pub fn has_sufficient_resources(&self) -> bool {
        match self.current_usage() {
            Some(usage) => violations(&self.inner.limits, &usage).is_empty(),
            None => true,
        }
    }

    /// Collect one sample from the OS and run it through limit checks.
    pub fn check_once(&self) {
        let usage = self.collect_usage();
        self.apply_sample(usage);
    }

    /// Run limit checks against a caller-provided sample.
    ///
    /// Separated from [`check_once`] so tests can feed synthetic pressure.
    pub fn apply_sample(&self, usage: ResourceUsage) {
        let hits = violations(&self.inner.limits, &usage);
        for violation in &hits {
            warn!(violation = violation.as_str(), "resource limit violation");
            self.route_violation(violation, &usage);
        }

        self.check_emergency(&usage);

        let mut state = self.inner.state.lock();
        if state.samples.len() >= SAMPLE_RING {
            state.samples.pop_front();
        }
        state.samples.push_back(usage);
    }

    /// One recovery tick: below 70% of every limit, raise each
    /// auto-recoverable throttle by 0.2; levels reaching 1.0 are removed.
    pub fn recover_once(&self) {
        let Some(usage) = self.current_usage() else { return };
        if !below_watermark(&self.inner.limits, &usage) {
            return;
        }

        let mut state = self.inner.state.lock();
        let mut recovered = Vec::new();
        for (component, throttle) in state.throttles.iter_mut() {
            if !throttle.active || !throttle.auto_recover {
                continue;
            }
            let new_level = (throttle.level + RECOVERY_STEP).min(1.0);
            if new_level >= 1.0 {
                recovered.push(component.clone());
            } else {
                throttle.level = new_level;
                info!(component, level = new_level, "partial throttle recovery");
            }
        }
        for component in recovered {
            state.throttles.remove(&component);
            info!(component, "throttle fully recovered");
        }
    }

    /// Apply a throttle; only lowers an existing level, never raises it.
    pub fn apply_throttle(&self, component: &str, level: f64, reason: &str) {
        let mut state = self.inner.state.lock();
        let current = state.throttles.get(component);
        if current.is_none_or(|t| level < t.level) {
            state.throttles.insert(
                component.to_string(),
                ThrottleState {
                    component: component.to_string(),
                    active: true,
                    level: level.clamp(0.0, 1.0),
                    reason: reason.to_string(),
                    started_at: Utc::now().timestamp_millis() as f64 / 1_000.0,
                    auto_recover: true,
                },
            );
            warn!(component, level, reason, "throttle applied");
        }
    }

    /// Remove a throttle outright (manual operation).
    pub fn clear_throttle(&self, component: &str) {
        if self.inner.state.lock().throttles.remove(component).is_some() {
            info!(component, "throttle cleared");
        }
    }

    /// Spawn the monitoring task: sample every `check_interval`, attempt
    /// recovery every 30 s.
    pub fn spawn(&self, shutdown: ShutdownSignal) -> tokio::task::JoinHandle<()> {
        let governor = self.clone();
        tokio::spawn(async move {
            let mut last_recovery = Instant::now();
            loop {
                if shutdown.sleep(governor.inner.check_interval).await {
                    break;
                }
                governor.check_once();
                if last_recovery.elapsed() >= RECOVERY_INTERVAL {
                    governor.recover_once();
                    last_recovery = Instant::now();
                }
            }
            debug!("resource governor stopped");
        })
    }

    fn route_violation(&self, violation: &Violation, usage: &ResourceUsage) {
        let reason = format!("{violation}");
        match violation.kind {
            ViolationKind::Memory | ViolationKind::Cpu => {
                self.apply_throttle("collectors", 0.5, &reason);
            }
            ViolationKind::EventRate => {
                self.apply_throttle("event_processing", 0.3, &reason);
            }
            ViolationKind::NetworkConnections => {
                self.apply_throttle("transport", 0.7, &reason);
            }
            ViolationKind::FileHandles => {
                self.apply_throttle("buffer", 0.6, &reason);
            }
            // Disk and thread pressure are recorded but not routed
            ViolationKind::Disk | ViolationKind::Threads => {
                debug!(usage = ?usage, "unrouted resource violation");
            }
        }
    }

    /// RSS above 150% of the memory limit, or CPU above 95% across the
    /// last five samples, triggers the emergency signal.
    fn check_emergency(&self, usage: &ResourceUsage) {
        let mut emergency = None;
        if usage.memory_mb > self.inner.limits.max_memory_mb as f64 * 1.5 {
            emergency = Some("extreme memory usage");
        } else if usage.cpu_percent > 95.0 {
            let state = self.inner.state.lock();
            let sustained = state.samples.len() >= 4
                && state.samples.iter().rev().take(4).all(|s| s.cpu_percent > 95.0);
            if sustained {
                emergency = Some("sustained high cpu");
            }
        }

        if let Some(condition) = emergency {
            error!(condition, "emergency resource condition, requesting shutdown");
            if let Some(signal) = self.inner.emergency.lock().as_ref() {
                signal.trigger();
            }
        }
    }

    fn collect_usage(&self) -> ResourceUsage {
        let now = Instant::now();
        let pid = Pid::from_u32(std::process::id());

        let mut system = self.inner.system.lock();
        system.refresh_memory();
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);

        let (memory_mb, cpu_percent, disk_mb, threads) = match system.process(pid) {
            Some(process) => (
                process.memory() as f64 / 1024.0 / 1024.0,
                process.cpu_usage() as f64,
                process.disk_usage().total_written_bytes as f64 / 1024.0 / 1024.0,
                process.tasks().map(|t| t.len() as u64).unwrap_or(0),
            ),
            None => (0.0, 0.0, 0.0, 0),
        };
        let total_memory = system.total_memory() as f64;
        drop(system);

        let memory_percent = if total_memory > 0.0 {
            memory_mb * 1024.0 * 1024.0 / total_memory * 100.0
        } else {
            0.0
        };

        let (file_handles, network_connections) = probe_fds();

        let event_rate = {
            let mut state = self.inner.state.lock();
            let cutoff = now - Duration::from_secs(60);
            while state.event_window.front().is_some_and(|t| *t < cutoff) {
                state.event_window.pop_front();
            }
            state.event_window.len() as u64
        };

        ResourceUsage {
            timestamp: Utc::now().timestamp_millis() as f64 / 1_000.0,
            memory_mb,
            memory_percent,
            cpu_percent,
            disk_mb,
            file_handles,
            network_connections,
            threads,
            event_rate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ViolationKind {
    Memory,
    Cpu,
    Disk,
    FileHandles,
    NetworkConnections,
    Threads,
    EventRate,
}

struct Violation {
    kind: ViolationKind,
    description: String,
}

impl Violation {
    fn as_str(&self) -> &str {
        &self.description
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.description)
    }
}

fn violations(limits: &ResourceLimits, usage: &ResourceUsage) -> Vec<Violation> {
    let mut hits = Vec::new();
    let mut push = |kind, description: String| hits.push(Violation { kind, description });

    if usage.memory_mb > limits.max_memory_mb as f64 {
        push(
            ViolationKind::Memory,
            format!("memory usage ({:.1}MB) exceeds limit ({}MB)", usage.memory_mb, limits.max_memory_mb),
        );
    }
    if usage.cpu_percent > limits.max_cpu_percent {
        push(
            ViolationKind::Cpu,
            format!("cpu usage ({:.1}%) exceeds limit ({}%)", usage.cpu_percent, limits.max_cpu_percent),
        );
    }
    if usage.disk_mb > limits.max_disk_mb as f64 {
        push(
            ViolationKind::Disk,
            format!("disk usage ({:.1}MB) exceeds limit ({}MB)", usage.disk_mb, limits.max_disk_mb),
        );
    }
    if usage.file_handles > limits.max_file_handles {
        push(
            ViolationKind::FileHandles,
            format!("file handles ({}) exceed limit ({})", usage.file_handles, limits.max_file_handles),
        );
    }
    if usage.network_connections > limits.max_network_connections {
        push(
            ViolationKind::NetworkConnections,
            format!(
                "network connections ({}) exceed limit ({})",
                usage.network_connections, limits.max_network_connections
            ),
        );
    }
    if usage.threads > limits.max_threads {
        push(
            ViolationKind::Threads,
            format!("thread count ({}) exceeds limit ({})", usage.threads, limits.max_threads),
        );
    }
    if usage.event_rate > limits.max_events_per_minute {
        push(
            ViolationKind::EventRate,
            format!(
                "event rate ({}/min) exceeds limit ({}/min)",
                usage.event_rate, limits.max_events_per_minute
            ),
        );
    }
    hits
}

fn below_watermark(limits: &ResourceLimits, usage: &ResourceUsage) -> bool {
    usage.memory_mb < limits.max_memory_mb as f64 * RECOVERY_WATERMARK
        && usage.cpu_percent < limits.max_cpu_percent * RECOVERY_WATERMARK
        && usage.event_rate < (limits.max_events_per_minute as f64 * RECOVERY_WATERMARK) as u64
        && usage.network_connections
            < (limits.max_network_connections as f64 * RECOVERY_WATERMARK) as u64
        && usage.file_handles < (limits.max_file_handles as f64 * RECOVERY_WATERMARK) as u64
}

/// (open fds, of which sockets) for the current process.
#[cfg(target_os = "linux")]
fn probe_fds() -> (u64, u64) {
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
fn probe_fds() -> (u64, u64) {
    (0, 0)
}

#[cfg(test)]
#[path = "resource_tests.rs"]
mod tests;
