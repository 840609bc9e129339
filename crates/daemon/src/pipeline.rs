// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The two transfer loops: hot buffer → persistent queue → wire.
//!
//! Both are cooperative tasks checking the shared shutdown signal on every
//! iteration. Failure cadence: resource backoff 5 s, empty-buffer 1 s,
//! empty-queue 2 s, transport exceptions additionally sleep the retry base
//! delay so error loops never run tight.

use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use sw_core::{ShutdownSignal, TransportError};
use sw_monitor::{HealthMonitor, ResourceGovernor};
use sw_storage::{HotBuffer, PersistentQueue};
use sw_transport::Transport;
use tracing::{debug, error, warn};

const RESOURCE_BACKOFF: Duration = Duration::from_secs(5);
const EMPTY_BUFFER_SLEEP: Duration = Duration::from_secs(1);
const EMPTY_QUEUE_SLEEP: Duration = Duration::from_secs(2);
const STORAGE_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Aggregate delivery counters, shared with the status snapshot.
#[derive(Debug, Default)]
pub struct AgentCounters {
    pub events_sent: AtomicU64,
    pub events_failed: AtomicU64,
    pub bytes_sent: AtomicU64,
}

/// Move pending events from the hot buffer into the persistent queue,
/// preserving each event's `priority` field (default 0).
pub async fn buffer_to_queue_loop(
    buffer: Arc<HotBuffer>,
    queue: Arc<PersistentQueue>,
    governor: ResourceGovernor,
    batch_size: u64,
    counters: Arc<AgentCounters>,
    shutdown: ShutdownSignal,
) {
    while !shutdown.is_shutdown() {
        if !governor.has_sufficient_resources() {
            if shutdown.sleep(RESOURCE_BACKOFF).await {
                break;
            }
            continue;
        }

        let batch = match buffer.get_batch(Some(batch_size)).await {
            Ok(batch) => batch,
            Err(e) => {
                error!(error = %e, "buffer read failed");
                if shutdown.sleep(STORAGE_ERROR_BACKOFF).await {
                    break;
                }
                continue;
            }
        };

        if batch.is_empty() {
            if shutdown.sleep(EMPTY_BUFFER_SLEEP).await {
                break;
            }
            continue;
        }

        let mut queued = Vec::with_capacity(batch.len());
        for buffered in batch {
            let priority = buffered
                .event
                .fields
                .get("priority")
                .and_then(Value::as_i64)
                .unwrap_or(0);
            match queue.enqueue(&buffered.event, priority, None).await {
                Ok(_) => queued.push(buffered.buffer_id),
                Err(e) => {
                    // Row stays pending for the next iteration
                    warn!(buffer_id = %buffered.buffer_id, error = %e, "failed to queue event");
                    counters.events_failed.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        if !queued.is_empty() {
            if let Err(e) = buffer.mark_sent(&queued).await {
                error!(error = %e, "failed to mark buffered events sent");
                if shutdown.sleep(STORAGE_ERROR_BACKOFF).await {
                    break;
                }
            } else {
                debug!(count = queued.len(), "moved events to persistent queue");
            }
        }
    }
    debug!("buffer-to-queue loop stopped");
}

/// Ship deliverable queue rows over the transport.
pub async fn queue_to_transport_loop(
    queue: Arc<PersistentQueue>,
    transport: Arc<Transport>,
    health: HealthMonitor,
    retry_base_delay: Duration,
    counters: Arc<AgentCounters>,
    shutdown: ShutdownSignal,
) {
    while !shutdown.is_shutdown() {
        let pending = match queue.pending_count().await {
            Ok(pending) => pending,
            Err(e) => {
                error!(error = %e, "queue count failed");
                if shutdown.sleep(STORAGE_ERROR_BACKOFF).await {
                    break;
                }
                continue;
            }
        };
        if pending == 0 {
            if shutdown.sleep(EMPTY_QUEUE_SLEEP).await {
                break;
            }
            continue;
        }

        let batch = match queue.dequeue_batch(None).await {
            Ok(batch) => batch,
            Err(e) => {
                error!(error = %e, "queue dequeue failed");
                if shutdown.sleep(STORAGE_ERROR_BACKOFF).await {
                    break;
                }
                continue;
            }
        };
        if batch.is_empty() {
            if shutdown.sleep(EMPTY_BUFFER_SLEEP).await {
                break;
            }
            continue;
        }

        let payloads: Vec<_> = batch.iter().map(|qe| qe.payload.clone()).collect();
        match transport.send_events(&payloads).await {
            Ok((_, bytes_sent)) => {
                let ids: Vec<String> = batch.iter().map(|qe| qe.id.clone()).collect();
                if let Err(e) = queue.mark_completed(&ids).await {
                    error!(error = %e, "failed to mark queue rows completed");
                }
                counters.events_sent.fetch_add(payloads.len() as u64, Ordering::Relaxed);
                counters.bytes_sent.fetch_add(bytes_sent, Ordering::Relaxed);
                debug!(count = payloads.len(), bytes_sent, "events delivered");
            }
            Err(e) => {
                let message = e.to_string();
                for queued in &batch {
                    if let Err(mark_err) = queue.mark_failed(&queued.id, &message).await {
                        error!(error = %mark_err, "failed to mark queue row failed");
                    }
                }
                health.record_error("transport", &message);
                if matches!(e, TransportError::Auth(_)) {
                    error!(error = %message, "authentication rejected by endpoint");
                } else {
                    warn!(error = %message, count = batch.len(), "delivery failed, events queued for retry");
                }
                if shutdown.sleep(retry_base_delay).await {
                    break;
                }
            }
        }
    }
    debug!("queue-to-transport loop stopped");
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
