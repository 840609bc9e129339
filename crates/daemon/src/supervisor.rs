// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent supervisor: owns component lifecycle and task orchestration.
//!
//! `initialize` builds every component in dependency order, `start` spawns
//! the cooperative tasks and parks until the shutdown signal fires (or a
//! core task exits), then cleanup unwinds leaves back to root with each
//! step independently guarded.

use crate::identity::synthesize_agent_id;
use crate::pipeline::{self, AgentCounters};
use crate::status::{AgentStatus, DeliveryStats, ResourceStatus};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use sw_collect::{build_collector, spawn_collector, CollectorContext, CollectorHandle};
use sw_config::{collector_hash, AgentConfig, ConfigStore};
use sw_core::{AgentError, CollectorError, ShutdownSignal};
use sw_monitor::{HealthMonitor, ResourceGovernor};
use sw_storage::{HotBuffer, PersistentQueue};
use sw_transport::{spawn_ws_channel, Transport, WsEvent};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

struct Shared {
    agent_id: String,
    config_store: Arc<ConfigStore>,
    config: RwLock<Arc<AgentConfig>>,
    buffer: Arc<HotBuffer>,
    queue: Arc<PersistentQueue>,
    transport: Arc<Transport>,
    governor: ResourceGovernor,
    health: HealthMonitor,
    collectors: tokio::sync::Mutex<Vec<CollectorHandle>>,
    counters: Arc<AgentCounters>,
    last_heartbeat: Mutex<Option<f64>>,
    started_at: Instant,
    shutdown: ShutdownSignal,
}

/// The agent runtime.
pub struct Agent {
    config_path: PathBuf,
    agent_id_override: Option<String>,
    shutdown: ShutdownSignal,
    shared: Option<Arc<Shared>>,
    tasks: JoinSet<()>,
}

impl Agent {
    pub fn new(config_path: impl Into<PathBuf>, agent_id: Option<String>) -> Self {
        Self {
            config_path: config_path.into(),
            agent_id_override: agent_id,
            shutdown: ShutdownSignal::new(),
            shared: None,
            tasks: JoinSet::new(),
        }
    }

    /// Shared shutdown signal (wired to the process signal handler).
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Build every component in dependency order.
    pub async fn initialize(&mut self) -> Result<(), AgentError> {
        let config_store = Arc::new(ConfigStore::new(self.config_path.clone()));
        let mut config = config_store.load()?;

        // Agent identity: CLI override > config > synthesized (persisted)
        let agent_id = match self.agent_id_override.clone().or_else(|| config.agent_id.clone()) {
            Some(id) => id,
            None => {
                let id = synthesize_agent_id();
                let mut updated = (*config).clone();
                updated.agent_id = Some(id.clone());
                config_store.save(&updated)?;
                config = config_store.current();
                info!(agent_id = %id, "synthesized agent identity");
                id
            }
        };
        info!(agent_id = %agent_id, "initializing agent");

        let governor = ResourceGovernor::new(
            config.resource_limits.clone(),
            Duration::from_secs(5),
        );
        governor.set_emergency_signal(self.shutdown.clone());

        let buffer = Arc::new(HotBuffer::open(&config.buffer, &agent_id).await?);
        let queue = Arc::new(PersistentQueue::open(&config.queue_db_path(), &config.queue).await?);

        let transport = Arc::new(Transport::new(&config.transport, &agent_id)?);
        transport.initialize().await?;

        let health = HealthMonitor::new(&config.health);
        for component in ["transport", "buffer", "collectors"] {
            health.register_component(component);
        }

        let shared = Arc::new(Shared {
            agent_id,
            config_store,
            config: RwLock::new(Arc::clone(&config)),
            buffer,
            queue,
            transport,
            governor,
            health,
            collectors: tokio::sync::Mutex::new(Vec::new()),
            counters: Arc::new(AgentCounters::default()),
            last_heartbeat: Mutex::new(None),
            started_at: Instant::now(),
            shutdown: self.shutdown.clone(),
        });

        // Collectors last: they write into the buffer from the first poll
        let mut handles = Vec::new();
        for descriptor in &config.collectors {
            if !descriptor.enabled {
                debug!(collector = %descriptor.name, "collector disabled, skipping");
                continue;
            }
            match start_collector(&shared, descriptor).await {
                Ok(handle) => handles.push(handle),
                Err(e) if descriptor.required => {
                    error!(collector = %descriptor.name, error = %e, "required collector failed to start");
                    return Err(AgentError::Collector(e));
                }
                Err(e) => {
                    warn!(collector = %descriptor.name, error = %e, "collector failed to start");
                    shared.health.record_error(&format!("collector.{}", descriptor.name), &e.to_string());
                }
            }
        }
        *shared.collectors.lock().await = handles;

        self.shared = Some(shared);
        info!("agent initialization complete");
        Ok(())
    }

    /// Spawn the cooperative tasks and park until shutdown (or until a core
    /// task exits, which also triggers cleanup).
    pub async fn start(&mut self) -> Result<(), AgentError> {
        if self.shared.is_none() {
            self.initialize().await?;
        }
        let Some(shared) = self.shared.as_ref().map(Arc::clone) else {
            return Err(AgentError::Fatal("agent not initialized".into()));
        };
        let config = shared.config.read().clone();

        // Monitoring
        self.tasks.spawn(wrap(shared.governor.spawn(self.shutdown.clone())));
        self.tasks.spawn(wrap(shared.health.spawn(self.shutdown.clone())));

        // Storage maintenance
        self.tasks.spawn(wrap(shared.buffer.spawn_maintenance(
            Duration::from_secs(config.buffer.cleanup_interval),
            self.shutdown.clone(),
        )));
        self.tasks.spawn(wrap(shared.queue.spawn_maintenance(
            Duration::from_secs(config.queue.cleanup_interval),
            self.shutdown.clone(),
        )));

        // Transfer loops
        self.tasks.spawn(pipeline::buffer_to_queue_loop(
            Arc::clone(&shared.buffer),
            Arc::clone(&shared.queue),
            shared.governor.clone(),
            config.transport.batch_size,
            Arc::clone(&shared.counters),
            self.shutdown.clone(),
        ));
        self.tasks.spawn(pipeline::queue_to_transport_loop(
            Arc::clone(&shared.queue),
            Arc::clone(&shared.transport),
            shared.health.clone(),
            Duration::from_secs_f64(config.transport.retry.base_delay.max(0.1)),
            Arc::clone(&shared.counters),
            self.shutdown.clone(),
        ));

        // Heartbeat, stats push, config reload
        self.tasks.spawn(heartbeat_loop(Arc::clone(&shared)));
        self.tasks.spawn(stats_loop(Arc::clone(&shared)));
        self.tasks.spawn(config_reload_loop(Arc::clone(&shared)));

        // Optional WebSocket control channel
        if config.transport.websocket_enabled {
            let (ws_tx, ws_rx) = tokio::sync::mpsc::channel(16);
            self.tasks.spawn(wrap(spawn_ws_channel(
                &config.transport.endpoint,
                &shared.agent_id,
                ws_tx,
                self.shutdown.clone(),
            )));
            self.tasks.spawn(ws_event_loop(Arc::clone(&shared), ws_rx));
        }

        let collectors_len = shared.collectors.lock().await.len();
        info!(collectors = collectors_len, "agent started");

        // Park until shutdown fires or a task exits (normally or by panic)
        tokio::select! {
            _ = self.shutdown.wait() => {
                info!("shutdown signal received");
            }
            result = self.tasks.join_next() => {
                match result {
                    Some(Err(e)) => error!(error = %e, "agent task aborted"),
                    _ => warn!("agent task exited, shutting down"),
                }
                self.shutdown.trigger();
            }
        }

        self.cleanup().await;
        Ok(())
    }

    /// Trigger graceful shutdown.
    pub fn stop(&self) {
        self.shutdown.trigger();
    }

    /// Current status snapshot.
    pub async fn status(&self) -> Option<AgentStatus> {
        let shared = self.shared.as_ref()?;
        Some(snapshot(shared, !self.shutdown.is_shutdown()).await)
    }

    /// Stop collectors, flush and close stores, stop monitors. Each step is
    /// guarded so one failure cannot block the rest.
    async fn cleanup(&mut self) {
        info!("cleaning up agent components");
        let Some(shared) = self.shared.as_ref().map(Arc::clone) else { return };

        let mut collectors = shared.collectors.lock().await;
        for handle in collectors.drain(..) {
            handle.stop().await;
        }
        drop(collectors);

        shared.transport.close().await;
        shared.buffer.close().await;
        // Final expiry sweep happens inside queue close
        shared.queue.close().await;

        // Monitor tasks unwind via the shutdown signal
        self.tasks.shutdown().await;
        info!("agent cleanup complete");
    }
}

/// Run the agent with a guaranteed stop on every exit path.
pub async fn run(config_path: PathBuf, agent_id: Option<String>) -> Result<(), AgentError> {
    let mut agent = Agent::new(config_path, agent_id);
    let result = agent.start().await;
    agent.stop();
    result
}

async fn start_collector(
    shared: &Arc<Shared>,
    descriptor: &sw_config::CollectorConfig,
) -> Result<CollectorHandle, CollectorError> {
    let collector = build_collector(descriptor)?;
    spawn_collector(
        collector,
        CollectorContext {
            descriptor: descriptor.clone(),
            agent_id: shared.agent_id.clone(),
            buffer: Arc::clone(&shared.buffer),
            governor: shared.governor.clone(),
            health: shared.health.clone(),
        },
    )
    .await
}

async fn snapshot(shared: &Shared, running: bool) -> AgentStatus {
    let collectors: Vec<_> = shared
        .collectors
        .lock()
        .await
        .iter()
        .map(|handle| handle.snapshot())
        .collect();
    let events_collected: u64 = collectors.iter().map(|c| c.metrics.events_collected).sum();

    use std::sync::atomic::Ordering;
    let last_heartbeat = *shared.last_heartbeat.lock();
    AgentStatus {
        agent_id: shared.agent_id.clone(),
        status: if running { "running".to_string() } else { "stopped".to_string() },
        uptime_seconds: shared.started_at.elapsed().as_secs_f64(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        collectors,
        stats: DeliveryStats {
            events_collected,
            events_sent: shared.counters.events_sent.load(Ordering::Relaxed),
            events_failed: shared.counters.events_failed.load(Ordering::Relaxed),
            bytes_sent: shared.counters.bytes_sent.load(Ordering::Relaxed),
            last_heartbeat,
        },
        health: shared.health.summary(),
        resources: ResourceStatus {
            current_usage: shared.governor.current_usage(),
            throttles: shared.governor.throttle_status(),
        },
        buffer: shared.buffer.get_stats().await.ok(),
        queue: shared.queue.get_stats().await.ok(),
    }
}

/// Ship the status snapshot every `health.heartbeat_interval` seconds.
async fn heartbeat_loop(shared: Arc<Shared>) {
    loop {
        let interval = Duration::from_secs(shared.config.read().health.heartbeat_interval);
        if shared.shutdown.sleep(interval).await {
            break;
        }

        // Certificate lifecycle awareness rides the heartbeat cadence
        shared.transport.check_certificate();

        let status = snapshot(&shared, true).await;
        let body = match serde_json::to_value(&status) {
            Ok(body) => body,
            Err(e) => {
                error!(error = %e, "status serialization failed");
                continue;
            }
        };
        match shared.transport.send_heartbeat(&body).await {
            Ok(()) => {
                *shared.last_heartbeat.lock() = Some(Utc::now().timestamp_millis() as f64 / 1_000.0);
                debug!("heartbeat sent");
            }
            Err(e) => {
                warn!(error = %e, "heartbeat failed");
                shared.health.record_error("heartbeat", &e.to_string());
            }
        }
    }
    debug!("heartbeat loop stopped");
}

/// Push component stats into the passive health monitor each check cycle.
async fn stats_loop(shared: Arc<Shared>) {
    loop {
        let interval = Duration::from_secs(shared.config.read().health.check_interval.max(1));
        if shared.shutdown.sleep(interval).await {
            break;
        }

        let transport_stats = shared.transport.stats();
        if let Ok(value) = serde_json::to_value(&transport_stats) {
            shared.health.record_stats("transport", value);
        }

        if let Ok(buffer_stats) = shared.buffer.get_stats().await {
            if let Ok(value) = serde_json::to_value(&buffer_stats) {
                shared.health.record_stats("buffer", value);
            }
        }

        let collectors = shared.collectors.lock().await;
        let errors: u64 = collectors.iter().map(|c| c.snapshot().metrics.collection_errors).sum();
        let collected: u64 = collectors.iter().map(|c| c.events_collected()).sum();
        drop(collectors);
        shared.health.record_stats(
            "collectors",
            json!({"events_collected": collected, "collection_errors": errors}),
        );
    }
    debug!("stats loop stopped");
}

/// Poll the config store; on change, rebind the live config and restart
/// only the collectors whose descriptor hash changed.
async fn config_reload_loop(shared: Arc<Shared>) {
    loop {
        let interval = Duration::from_secs(shared.config.read().config_update_interval.max(1));
        if shared.shutdown.sleep(interval).await {
            break;
        }

        match shared.config_store.reload() {
            Ok(Some(new_config)) => {
                info!("configuration update detected");
                apply_config(&shared, new_config).await;
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "configuration reload failed"),
        }

        if shared.config.read().auto_update_enabled {
            pull_remote_config(&shared).await;
        }
    }
    debug!("config reload loop stopped");
}

/// Ask the endpoint for a pushed configuration document.
async fn pull_remote_config(shared: &Arc<Shared>) {
    match shared.transport.fetch_config().await {
        Ok(Some(doc)) => match serde_json::from_value::<AgentConfig>(doc) {
            Ok(config) => {
                info!("remote configuration received");
                match shared.config_store.save(&config) {
                    Ok(()) => apply_config(shared, shared.config_store.current()).await,
                    Err(e) => warn!(error = %e, "failed to persist remote configuration"),
                }
            }
            Err(e) => warn!(error = %e, "remote configuration is invalid"),
        },
        Ok(None) => {}
        Err(e) => debug!(error = %e, "remote configuration pull failed"),
    }
}

async fn apply_config(shared: &Arc<Shared>, new_config: Arc<AgentConfig>) {
    *shared.config.write() = Arc::clone(&new_config);

    let mut collectors = shared.collectors.lock().await;

    // Stop collectors that were removed or whose descriptor changed
    let mut kept = Vec::new();
    for handle in collectors.drain(..) {
        let current = new_config
            .collector(handle.name())
            .filter(|d| d.enabled)
            .map(collector_hash);
        if current.as_deref() == Some(collector_hash(handle.descriptor()).as_str()) {
            kept.push(handle);
        } else {
            info!(collector = %handle.name(), "stopping collector for reload");
            handle.stop().await;
        }
    }

    // Start new or changed descriptors
    for descriptor in &new_config.collectors {
        if !descriptor.enabled || kept.iter().any(|h| h.name() == descriptor.name) {
            continue;
        }
        match start_collector(shared, descriptor).await {
            Ok(handle) => {
                info!(collector = %descriptor.name, "collector started after reload");
                kept.push(handle);
            }
            Err(e) => {
                error!(collector = %descriptor.name, error = %e, "collector restart failed");
                shared
                    .health
                    .record_error(&format!("collector.{}", descriptor.name), &e.to_string());
            }
        }
    }

    *collectors = kept;
}

/// Apply control messages from the WebSocket channel.
async fn ws_event_loop(shared: Arc<Shared>, mut rx: tokio::sync::mpsc::Receiver<WsEvent>) {
    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(WsEvent::ConfigUpdate(data)) => {
                    let Some(doc) = data.get("config").cloned() else {
                        warn!("config_update push without config body");
                        continue;
                    };
                    match serde_json::from_value::<AgentConfig>(doc) {
                        Ok(config) => match shared.config_store.save(&config) {
                            Ok(()) => apply_config(&shared, shared.config_store.current()).await,
                            Err(e) => warn!(error = %e, "failed to persist pushed configuration"),
                        },
                        Err(e) => warn!(error = %e, "invalid pushed configuration"),
                    }
                }
                Some(WsEvent::Command(data)) => {
                    info!(command = ?data.get("command"), "remote command received");
                }
                None => break,
            },
            _ = shared.shutdown.wait() => break,
        }
    }
    debug!("websocket event loop stopped");
}

/// Adapt a `JoinHandle` into a unit future for the task set.
async fn wrap(handle: tokio::task::JoinHandle<()>) {
    let _ = handle.await;
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
