// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The collection loop shared by every collector.
//!
//! Per tick: honor the governor's throttle level, record a rate-limiter
//! event, invoke `collect_events` under a soft timeout, run the filter
//! chain, enrich survivors with provenance, and push them into the hot
//! buffer in one batch. Poll failures are recorded with the health monitor
//! and the loop continues.

use crate::collector::{Collector, CollectorMetrics};
use crate::filter::FilterChain;
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use sw_config::CollectorConfig;
use sw_core::{CollectorError, CollectorKind, Event, ShutdownSignal, SourceMeta};
use sw_monitor::{HealthMonitor, ResourceGovernor};
use sw_storage::HotBuffer;
use tracing::{debug, error, info};

/// Everything a collection loop needs besides the collector itself.
pub struct CollectorContext {
    pub descriptor: CollectorConfig,
    pub agent_id: String,
    pub buffer: Arc<HotBuffer>,
    pub governor: ResourceGovernor,
    pub health: HealthMonitor,
}

/// Collector lifecycle state as reported in status snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Running,
    Stopped,
    Failed,
}

/// Point-in-time view of one running collector.
#[derive(Debug, Clone, Serialize)]
pub struct CollectorSnapshot {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: CollectorKind,
    pub enabled: bool,
    pub required: bool,
    pub state: RunState,
    pub last_error: Option<String>,
    pub metrics: CollectorMetrics,
}

struct Shared {
    metrics: Mutex<CollectorMetrics>,
    state: Mutex<RunState>,
    last_error: Mutex<Option<String>>,
}

/// Handle held by the supervisor for one spawned collector.
pub struct CollectorHandle {
    descriptor: CollectorConfig,
    shared: Arc<Shared>,
    shutdown: ShutdownSignal,
    task: tokio::task::JoinHandle<()>,
}

impl CollectorHandle {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &CollectorConfig {
        &self.descriptor
    }

    pub fn snapshot(&self) -> CollectorSnapshot {
        CollectorSnapshot {
            name: self.descriptor.name.clone(),
            kind: self.descriptor.kind,
            enabled: self.descriptor.enabled,
            required: self.descriptor.required,
            state: self.shared.state.lock().clone(),
            last_error: self.shared.last_error.lock().clone(),
            metrics: self.shared.metrics.lock().clone(),
        }
    }

    pub fn events_collected(&self) -> u64 {
        self.shared.metrics.lock().events_collected
    }

    /// Stop the collection loop and wait for it to unwind.
    pub async fn stop(self) {
        self.shutdown.trigger();
        if let Err(e) = self.task.await {
            error!(collector = %self.descriptor.name, error = %e, "collector task join failed");
        }
    }
}

/// Initialize `collector` and spawn its collection loop.
///
/// Initialization failure is returned to the caller; the supervisor treats
/// it as fatal for `required` collectors.
pub async fn spawn_collector(
    mut collector: Box<dyn Collector>,
    ctx: CollectorContext,
) -> Result<CollectorHandle, CollectorError> {
    collector.initialize().await.map_err(|e| CollectorError::Start {
        name: ctx.descriptor.name.clone(),
        message: e.to_string(),
    })?;

    info!(
        collector = %ctx.descriptor.name,
        kind = %ctx.descriptor.kind,
        "collector started"
    );

    let shared = Arc::new(Shared {
        metrics: Mutex::new(CollectorMetrics::default()),
        state: Mutex::new(RunState::Running),
        last_error: Mutex::new(None),
    });
    let shutdown = ShutdownSignal::new();
    let descriptor = ctx.descriptor.clone();

    let task = tokio::spawn(collection_loop(collector, ctx, Arc::clone(&shared), shutdown.clone()));

    Ok(CollectorHandle { descriptor, shared, shutdown, task })
}

async fn collection_loop(
    mut collector: Box<dyn Collector>,
    ctx: CollectorContext,
    shared: Arc<Shared>,
    shutdown: ShutdownSignal,
) {
    let name = ctx.descriptor.name.clone();
    let filters = FilterChain::new(ctx.descriptor.filters.clone());
    let poll_interval = Duration::from_secs_f64(ctx.descriptor.poll_interval.max(0.1));
    let collect_timeout = Duration::from_secs(ctx.descriptor.timeout);

    while !shutdown.is_shutdown() {
        // Graded throttling: a level below 1 inflates the duty cycle.
        let level = ctx.governor.throttle_level("collectors");
        if level < 1.0 {
            let inflated = poll_interval.div_f64(level.max(0.01));
            debug!(collector = %name, level, "throttled, inflating poll interval");
            if shutdown.sleep(inflated).await {
                break;
            }
            continue;
        }

        ctx.governor.record_event();

        let started = Instant::now();
        match tokio::time::timeout(collect_timeout, collector.collect_events()).await {
            Ok(Ok(raw_events)) => {
                let collected = raw_events.len() as u64;
                if collected > 0 {
                    match deliver(&ctx, &filters, raw_events).await {
                        Ok((processed, bytes)) => {
                            collector.acknowledge().await;
                            let mut metrics = shared.metrics.lock();
                            metrics.events_collected += collected;
                            metrics.events_processed += processed;
                            metrics.bytes_processed += bytes;
                        }
                        Err(e) => {
                            record_failure(&ctx, &shared, &name, &e.to_string());
                            let mut metrics = shared.metrics.lock();
                            metrics.events_failed += collected;
                        }
                    }
                }
                let mut metrics = shared.metrics.lock();
                metrics.record_processing_time(started.elapsed().as_secs_f64() * 1_000.0);
                metrics.last_collection_time = Some(Utc::now().timestamp_millis() as f64 / 1_000.0);
            }
            Ok(Err(e)) => record_failure(&ctx, &shared, &name, &e.to_string()),
            Err(_) => {
                let e = CollectorError::Timeout(ctx.descriptor.timeout);
                record_failure(&ctx, &shared, &name, &e.to_string());
            }
        }

        if shutdown.sleep(poll_interval).await {
            break;
        }
    }

    collector.cleanup().await;
    *shared.state.lock() = RunState::Stopped;
    info!(collector = %name, "collector stopped");
}

/// Filter, enrich, and buffer one batch. Returns (events kept, bytes).
async fn deliver(
    ctx: &CollectorContext,
    filters: &FilterChain,
    raw_events: Vec<crate::collector::RawEvent>,
) -> Result<(u64, u64), CollectorError> {
    let mut events = Vec::with_capacity(raw_events.len());
    for fields in raw_events {
        if !filters.passes(&fields) {
            continue;
        }
        let event = Event::from_fields(fields).with_source(SourceMeta {
            name: ctx.descriptor.name.clone(),
            kind: ctx.descriptor.kind,
            agent_id: ctx.agent_id.clone(),
            collected_at: Utc::now(),
        });
        events.push(event);
    }

    if events.is_empty() {
        return Ok((0, 0));
    }

    let bytes: u64 = events.iter().map(|e| e.size_bytes() as u64).sum();
    ctx.buffer
        .add_events_batch(&events)
        .await
        .map_err(|e| CollectorError::Collect(format!("buffer rejected batch: {e}")))?;
    Ok((events.len() as u64, bytes))
}

fn record_failure(ctx: &CollectorContext, shared: &Shared, name: &str, message: &str) {
    error!(collector = %name, error = message, "collection error");
    {
        let mut metrics = shared.metrics.lock();
        metrics.collection_errors += 1;
    }
    *shared.last_error.lock() = Some(message.to_string());
    ctx.health.record_error(&format!("collector.{name}"), message);
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
