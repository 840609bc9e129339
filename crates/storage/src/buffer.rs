// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hot buffer: durable staging store for freshly collected events.
//!
//! One row per event, oldest-first FIFO with a status column
//! (`pending` → `sent` / `failed`), a retry audit log, and a singleton
//! stats row. The size bound is enforced before insert by deleting the
//! oldest rows; liveness outranks completeness.

use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use sw_config::BufferConfig;
use sw_core::{BufferError, Clock, Event, ShutdownSignal, SystemClock};
use tracing::{debug, error, info, warn};

/// An event read back from the buffer, tagged with its row id.
#[derive(Debug, Clone)]
pub struct BufferedEvent {
    pub buffer_id: String,
    pub event: Event,
}

/// Snapshot of buffer state for status reporting and health probes.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BufferStats {
    pub total_events: u64,
    pub total_size_bytes: u64,
    /// Row count per status.
    pub status_counts: HashMap<String, u64>,
    pub events_added: u64,
    pub events_sent: u64,
    pub events_failed: u64,
    pub events_expired: u64,
    /// `total_events / max_size`, in [0, 1].
    pub buffer_utilization: f64,
}

/// One retry-audit entry for a failed event.
#[derive(Debug, Clone, Serialize)]
pub struct RetryAttempt {
    pub event_id: String,
    pub retry_count: i64,
    pub attempt_number: i64,
    pub attempted_at: f64,
    pub error_message: Option<String>,
}

#[derive(Default)]
struct Counters {
    added: AtomicU64,
    sent: AtomicU64,
    failed: AtomicU64,
    expired: AtomicU64,
}

/// SQLite-backed hot buffer.
///
/// Generic over [`Clock`] so tests can drive the retention sweep with a
/// fake clock; production code uses the [`SystemClock`] default.
pub struct HotBuffer<C: Clock = SystemClock> {
    pool: SqlitePool,
    agent_id: String,
    max_size: u64,
    batch_size: u64,
    retention_hours: u64,
    counters: Counters,
    clock: C,
}

impl HotBuffer {
    /// Open (creating if necessary) the buffer database at `config.db_path`.
    pub async fn open(config: &BufferConfig, agent_id: &str) -> Result<Self, BufferError> {
        Self::open_with_clock(config, agent_id, SystemClock).await
    }
}

impl<C: Clock + 'static> HotBuffer<C> {
    /// [`HotBuffer::open`] with an injected clock.
    pub async fn open_with_clock(
        config: &BufferConfig,
        agent_id: &str,
        clock: C,
    ) -> Result<Self, BufferError> {
        if let Some(parent) = config.db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| BufferError::Database(format!("create {}: {e}", parent.display())))?;
        }

        let pool = connect(&config.db_path).await?;
        let buffer = Self {
            pool,
            agent_id: agent_id.to_string(),
            max_size: config.max_size,
            batch_size: config.batch_size,
            retention_hours: config.retention_hours,
            counters: Counters::default(),
            clock,
        };

        buffer.create_tables().await?;
        buffer.cleanup_expired().await?;

        let stats = buffer.get_stats().await?;
        info!(
            path = %config.db_path.display(),
            existing_events = stats.total_events,
            "hot buffer initialized"
        );
        Ok(buffer)
    }

    fn epoch_now(&self) -> f64 {
        self.clock.epoch_ms() as f64 / 1_000.0
    }

    async fn create_tables(&self) -> Result<(), BufferError> {
        let statements = [
            "CREATE TABLE IF NOT EXISTS events (
                id TEXT PRIMARY KEY,
                agent_id TEXT NOT NULL,
                timestamp REAL NOT NULL,
                event_data TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                retry_count INTEGER NOT NULL DEFAULT 0,
                created_at REAL NOT NULL,
                sent_at REAL NULL,
                size_bytes INTEGER NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_events_status ON events(status, timestamp)",
            "CREATE INDEX IF NOT EXISTS idx_events_agent_created ON events(agent_id, created_at)",
            "CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp)",
            "CREATE TABLE IF NOT EXISTS retry_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_id TEXT NOT NULL,
                attempt_number INTEGER NOT NULL,
                attempted_at REAL NOT NULL,
                error_message TEXT
            )",
            "CREATE TABLE IF NOT EXISTS buffer_stats (
                id INTEGER PRIMARY KEY,
                agent_id TEXT NOT NULL,
                events_added INTEGER DEFAULT 0,
                events_sent INTEGER DEFAULT 0,
                events_failed INTEGER DEFAULT 0,
                events_expired INTEGER DEFAULT 0,
                last_updated REAL NOT NULL
            )",
        ];
        for sql in statements {
            sqlx::query(sql).execute(&self.pool).await.map_err(db_err)?;
        }

        sqlx::query("INSERT OR IGNORE INTO buffer_stats (id, agent_id, last_updated) VALUES (1, ?, ?)")
            .bind(&self.agent_id)
            .bind(self.epoch_now())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Insert a single event. Returns the buffer row id.
    pub async fn add_event(&self, event: &Event) -> Result<String, BufferError> {
        let ids = self.add_events_batch(std::slice::from_ref(event)).await?;
        ids.into_iter()
            .next()
            .ok_or_else(|| BufferError::Database("batch insert returned no id".into()))
    }

    /// Insert a batch of events in one transaction. Returns buffer row ids.
    pub async fn add_events_batch(&self, events: &[Event]) -> Result<Vec<String>, BufferError> {
        if events.is_empty() {
            return Ok(Vec::new());
        }

        self.enforce_size_limit().await?;

        let now = self.epoch_now();
        let mut ids = Vec::with_capacity(events.len());
        let mut total_size = 0u64;

        let mut tx = self.pool.begin().await.map_err(db_err)?;
        for event in events {
            let buffer_id = uuid::Uuid::new_v4().to_string();
            let serialized = serde_json::to_string(event)?;
            let size_bytes = serialized.len() as i64;
            total_size += size_bytes as u64;

            sqlx::query(
                "INSERT INTO events (id, agent_id, timestamp, event_data, created_at, size_bytes)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&buffer_id)
            .bind(&self.agent_id)
            .bind(event.timestamp.timestamp() as f64)
            .bind(&serialized)
            .bind(now)
            .bind(size_bytes)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

            ids.push(buffer_id);
        }
        tx.commit().await.map_err(db_err)?;

        let added = self.counters.added.fetch_add(events.len() as u64, Ordering::Relaxed)
            + events.len() as u64;
        self.update_stat("events_added", added).await;

        debug!(count = events.len(), bytes = total_size, "buffered events");
        Ok(ids)
    }

    /// Fetch up to `batch_size` oldest pending events.
    ///
    /// Rows whose JSON fails to parse are marked failed and skipped.
    pub async fn get_batch(&self, batch_size: Option<u64>) -> Result<Vec<BufferedEvent>, BufferError> {
        let limit = batch_size.unwrap_or(self.batch_size) as i64;
        let rows = sqlx::query(
            "SELECT id, event_data FROM events
             WHERE status = 'pending'
             ORDER BY timestamp ASC
             LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            let buffer_id: String = row.get("id");
            let data: String = row.get("event_data");
            match serde_json::from_str::<Event>(&data) {
                Ok(event) => events.push(BufferedEvent { buffer_id, event }),
                Err(e) => {
                    error!(buffer_id = %buffer_id, error = %e, "corrupt event row");
                    self.mark_failed(&[buffer_id], &format!("JSON decode error: {e}")).await?;
                }
            }
        }
        Ok(events)
    }

    /// Transition rows to `sent`, stamping `sent_at`.
    pub async fn mark_sent(&self, buffer_ids: &[String]) -> Result<(), BufferError> {
        if buffer_ids.is_empty() {
            return Ok(());
        }

        let now = self.epoch_now();
        let placeholders = vec!["?"; buffer_ids.len()].join(",");
        let sql = format!("UPDATE events SET status = 'sent', sent_at = ? WHERE id IN ({placeholders})");
        let mut query = sqlx::query(&sql).bind(now);
        for id in buffer_ids {
            query = query.bind(id);
        }
        let updated = query.execute(&self.pool).await.map_err(db_err)?.rows_affected();

        let sent = self.counters.sent.fetch_add(updated, Ordering::Relaxed) + updated;
        self.update_stat("events_sent", sent).await;
        debug!(count = updated, "marked events sent");
        Ok(())
    }

    /// Increment retry counts, transition to `failed`, and append audit rows.
    pub async fn mark_failed(&self, buffer_ids: &[String], error_message: &str) -> Result<(), BufferError> {
        if buffer_ids.is_empty() {
            return Ok(());
        }

        let now = self.epoch_now();
        let mut failed = 0u64;
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        for id in buffer_ids {
            let row = sqlx::query("SELECT retry_count FROM events WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_err)?;
            let Some(row) = row else { continue };
            let retry_count: i64 = row.get::<i64, _>("retry_count") + 1;

            sqlx::query("UPDATE events SET retry_count = ?, status = 'failed' WHERE id = ?")
                .bind(retry_count)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;

            sqlx::query(
                "INSERT INTO retry_log (event_id, attempt_number, attempted_at, error_message)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(id)
            .bind(retry_count)
            .bind(now)
            .bind(error_message)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

            failed += 1;
        }
        tx.commit().await.map_err(db_err)?;

        let total = self.counters.failed.fetch_add(failed, Ordering::Relaxed) + failed;
        self.update_stat("events_failed", total).await;
        Ok(())
    }

    /// Bulk transition `failed` → `pending` for rows under the retry cap.
    pub async fn reset_failed_events(&self, max_retries: i64) -> Result<u64, BufferError> {
        let reset = sqlx::query(
            "UPDATE events SET status = 'pending' WHERE status = 'failed' AND retry_count < ?",
        )
        .bind(max_retries)
        .execute(&self.pool)
        .await
        .map_err(db_err)?
        .rows_affected();

        if reset > 0 {
            info!(count = reset, "reset failed events to pending");
        }
        Ok(reset)
    }

    /// Buffer statistics for status reporting.
    pub async fn get_stats(&self) -> Result<BufferStats, BufferError> {
        let rows = sqlx::query(
            "SELECT status, COUNT(*) AS count, COALESCE(SUM(size_bytes), 0) AS size
             FROM events GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut stats = BufferStats::default();
        for row in rows {
            let status: String = row.get("status");
            let count: i64 = row.get("count");
            let size: i64 = row.get("size");
            stats.total_events += count as u64;
            stats.total_size_bytes += size as u64;
            stats.status_counts.insert(status, count as u64);
        }

        stats.events_added = self.counters.added.load(Ordering::Relaxed);
        stats.events_sent = self.counters.sent.load(Ordering::Relaxed);
        stats.events_failed = self.counters.failed.load(Ordering::Relaxed);
        stats.events_expired = self.counters.expired.load(Ordering::Relaxed);
        stats.buffer_utilization = if self.max_size > 0 {
            stats.total_events as f64 / self.max_size as f64
        } else {
            0.0
        };
        Ok(stats)
    }

    /// Failed events joined with their retry-audit entries, newest first.
    pub async fn get_retry_info(&self) -> Result<Vec<RetryAttempt>, BufferError> {
        let rows = sqlx::query(
            "SELECT e.id, e.retry_count, r.attempt_number, r.attempted_at, r.error_message
             FROM events e
             LEFT JOIN retry_log r ON e.id = r.event_id
             WHERE e.status = 'failed'
             ORDER BY e.created_at DESC, r.attempt_number DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows
            .into_iter()
            .map(|row| RetryAttempt {
                event_id: row.get("id"),
                retry_count: row.get("retry_count"),
                attempt_number: row.get::<Option<i64>, _>("attempt_number").unwrap_or(0),
                attempted_at: row.get::<Option<f64>, _>("attempted_at").unwrap_or(0.0),
                error_message: row.get("error_message"),
            })
            .collect())
    }

    /// Delete rows past the retention horizon.
    pub async fn cleanup_expired(&self) -> Result<u64, BufferError> {
        let cutoff = self.epoch_now() - (self.retention_hours * 3_600) as f64;
        let removed = sqlx::query("DELETE FROM events WHERE created_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(db_err)?
            .rows_affected();

        if removed > 0 {
            let expired = self.counters.expired.fetch_add(removed, Ordering::Relaxed) + removed;
            self.update_stat("events_expired", expired).await;
            info!(count = removed, "cleaned up expired events");
        }
        Ok(removed)
    }

    /// Spawn the hourly maintenance task (retention sweep + optimize pass).
    pub fn spawn_maintenance(
        self: &Arc<Self>,
        interval: Duration,
        shutdown: ShutdownSignal,
    ) -> tokio::task::JoinHandle<()> {
        let buffer = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                if shutdown.sleep(interval).await {
                    break;
                }
                if let Err(e) = buffer.cleanup_expired().await {
                    error!(error = %e, "buffer maintenance failed");
                }
                if let Err(e) = sqlx::query("PRAGMA optimize").execute(&buffer.pool).await {
                    warn!(error = %e, "buffer optimize pass failed");
                }
            }
        })
    }

    /// Run SQLite's integrity check; returns the verdict rows.
    ///
    /// Exposed for operator diagnostics after an unclean host shutdown.
    pub async fn integrity_check(&self) -> Result<Vec<String>, BufferError> {
        let rows = sqlx::query("PRAGMA integrity_check")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(rows
            .into_iter()
            .map(|row| row.get::<String, _>(0))
            .collect())
    }

    /// Flush and close the database.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("hot buffer closed");
    }

    async fn enforce_size_limit(&self) -> Result<(), BufferError> {
        let count: i64 = sqlx::query("SELECT COUNT(*) AS n FROM events")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?
            .get("n");

        if (count as u64) < self.max_size {
            return Ok(());
        }

        let to_remove = count as u64 - self.max_size + self.batch_size;
        let removed = sqlx::query(
            "DELETE FROM events WHERE id IN (
                SELECT id FROM events ORDER BY created_at ASC LIMIT ?
            )",
        )
        .bind(to_remove as i64)
        .execute(&self.pool)
        .await
        .map_err(db_err)?
        .rows_affected();

        warn!(count = removed, "removed oldest events to enforce buffer size limit");
        Ok(())
    }

    async fn update_stat(&self, field: &str, value: u64) {
        // Column names come from a fixed internal set, never user input.
        let sql = format!("UPDATE buffer_stats SET {field} = ?, last_updated = ? WHERE id = 1");
        if let Err(e) = sqlx::query(&sql)
            .bind(value as i64)
            .bind(self.epoch_now())
            .execute(&self.pool)
            .await
        {
            warn!(error = %e, field, "failed to update buffer stats");
        }
    }
}

async fn connect(path: &Path) -> Result<SqlitePool, BufferError> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_secs(5));

    SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await
        .map_err(db_err)
}

fn db_err(e: sqlx::Error) -> BufferError {
    BufferError::Database(e.to_string())
}

#[cfg(test)]
#[path = "buffer_tests.rs"]
mod tests;
