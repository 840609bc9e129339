// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent status snapshot, shipped in heartbeats and exposed for probes.

use serde::Serialize;
use sw_collect::CollectorSnapshot;
use sw_monitor::{HealthSummary, ResourceUsage, ThrottleState};
use sw_storage::{BufferStats, QueueStats};

#[derive(Debug, Clone, Serialize)]
pub struct DeliveryStats {
    pub events_collected: u64,
    pub events_sent: u64,
    pub events_failed: u64,
    pub bytes_sent: u64,
    pub last_heartbeat: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResourceStatus {
    pub current_usage: Option<ResourceUsage>,
    pub throttles: Vec<ThrottleState>,
}

/// Full status snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct AgentStatus {
    pub agent_id: String,
    pub status: String,
    pub uptime_seconds: f64,
    pub version: String,
    pub collectors: Vec<CollectorSnapshot>,
    pub stats: DeliveryStats,
    pub health: HealthSummary,
    pub resources: ResourceStatus,
    pub buffer: Option<BufferStats>,
    pub queue: Option<QueueStats>,
}
