// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistent retry queue between the hot buffer and the wire.
//!
//! Rows carry a compressed JSON payload, a priority (higher ships earlier),
//! and an exponential retry schedule. Delivery is at-least-once: a row only
//! leaves the store through `completed` + sweep, or through `expired`.

use crate::payload::{compress_payload, decompress_payload};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use sw_config::QueueConfig;
use sw_core::{Clock, Event, QueueError, ShutdownSignal, SystemClock};
use tracing::{debug, error, info, warn};

/// Queue row status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Expired,
}

sw_core::simple_display! {
    QueueStatus {
        Pending => "pending",
        Processing => "processing",
        Completed => "completed",
        Failed => "failed",
        Expired => "expired",
    }
}

impl QueueStatus {
    fn parse(s: &str) -> Self {
        match s {
            "processing" => QueueStatus::Processing,
            "completed" => QueueStatus::Completed,
            "failed" => QueueStatus::Failed,
            "expired" => QueueStatus::Expired,
            _ => QueueStatus::Pending,
        }
    }
}

/// A dequeued row, payload decoded.
#[derive(Debug, Clone)]
pub struct QueuedEvent {
    pub id: String,
    pub payload: Event,
    pub status: QueueStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    pub next_retry: Option<f64>,
    pub error_message: Option<String>,
    pub priority: i64,
    pub compressed: bool,
    pub created_at: f64,
    pub updated_at: f64,
}

/// Queue statistics for status reporting.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueStats {
    pub current_size: u64,
    pub status_counts: HashMap<String, u64>,
    pub events_queued: u64,
    pub events_processed: u64,
    pub events_failed: u64,
    pub events_expired: u64,
    pub compressed_events: u64,
    pub total_retries: u64,
}

#[derive(Default)]
struct Counters {
    queued: AtomicU64,
    processed: AtomicU64,
    failed: AtomicU64,
    expired: AtomicU64,
    compressed: AtomicU64,
    retries: AtomicU64,
}

/// SQLite-backed persistent queue.
///
/// Generic over [`Clock`] so tests can drive the retry schedule and age
/// sweep with a fake clock; production code uses the [`SystemClock`]
/// default.
pub struct PersistentQueue<C: Clock = SystemClock> {
    pool: SqlitePool,
    max_size: u64,
    max_age_hours: u64,
    compression_threshold: usize,
    batch_size: u64,
    retry_delays: Vec<u64>,
    counters: Counters,
    clock: C,
}

impl PersistentQueue {
    /// Open (creating if necessary) the queue database.
    ///
    /// Idempotent: reopening an existing database leaves its rows intact,
    /// except that rows stranded in `processing` by a crash are returned to
    /// `pending`.
    pub async fn open(db_path: &Path, config: &QueueConfig) -> Result<Self, QueueError> {
        Self::open_with_clock(db_path, config, SystemClock).await
    }
}

impl<C: Clock + 'static> PersistentQueue<C> {
    /// [`PersistentQueue::open`] with an injected clock.
    pub async fn open_with_clock(
        db_path: &Path,
        config: &QueueConfig,
        clock: C,
    ) -> Result<Self, QueueError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| QueueError::Database(format!("create {}: {e}", parent.display())))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(db_err)?;

        let queue = Self {
            pool,
            max_size: config.max_size,
            max_age_hours: config.max_age_hours,
            compression_threshold: config.compression_threshold,
            batch_size: config.batch_size,
            retry_delays: config.retry_delays.clone(),
            counters: Counters::default(),
            clock,
        };

        queue.create_tables().await?;
        queue.recover_processing().await?;

        let size = queue.current_size().await?;
        info!(path = %db_path.display(), size, "persistent queue initialized");
        Ok(queue)
    }

    fn epoch_now(&self) -> f64 {
        self.clock.epoch_ms() as f64 / 1_000.0
    }

    async fn create_tables(&self) -> Result<(), QueueError> {
        let statements = [
            "CREATE TABLE IF NOT EXISTS events (
                id TEXT PRIMARY KEY,
                payload_data BLOB NOT NULL,
                compressed INTEGER DEFAULT 0,
                status TEXT NOT NULL,
                created_at REAL NOT NULL,
                updated_at REAL NOT NULL,
                attempts INTEGER DEFAULT 0,
                max_attempts INTEGER DEFAULT 3,
                next_retry REAL,
                error_message TEXT,
                priority INTEGER DEFAULT 0
            )",
            "CREATE INDEX IF NOT EXISTS idx_status ON events(status)",
            "CREATE INDEX IF NOT EXISTS idx_next_retry ON events(next_retry)",
            "CREATE INDEX IF NOT EXISTS idx_priority ON events(priority DESC)",
            "CREATE INDEX IF NOT EXISTS idx_created_at ON events(created_at)",
        ];
        for sql in statements {
            sqlx::query(sql).execute(&self.pool).await.map_err(db_err)?;
        }
        Ok(())
    }

    /// Rows left `processing` by a crash go back to `pending`.
    async fn recover_processing(&self) -> Result<(), QueueError> {
        let recovered = sqlx::query(
            "UPDATE events SET status = 'pending', updated_at = ? WHERE status = 'processing'",
        )
        .bind(self.epoch_now())
        .execute(&self.pool)
        .await
        .map_err(db_err)?
        .rows_affected();
        if recovered > 0 {
            warn!(count = recovered, "recovered in-flight events from previous run");
        }
        Ok(())
    }

    /// Enqueue one event. Returns the queue row id.
    ///
    /// When the queue is full an expiry sweep runs first; if it is still
    /// full the event is rejected with [`QueueError::Full`].
    pub async fn enqueue(
        &self,
        payload: &Event,
        priority: i64,
        max_attempts: Option<u32>,
    ) -> Result<String, QueueError> {
        let size = self.current_size().await?;
        if size >= self.max_size {
            self.cleanup_expired().await?;
            let size = self.current_size().await?;
            if size >= self.max_size {
                return Err(QueueError::Full { size, max_size: self.max_size });
            }
        }

        let id = uuid::Uuid::new_v4().to_string();
        let now = self.epoch_now();
        let json = serde_json::to_vec(payload)?;
        let (data, compressed) = compress_payload(json, self.compression_threshold);
        let max_attempts = max_attempts.unwrap_or(self.retry_delays.len() as u32 + 1);

        sqlx::query(
            "INSERT INTO events (
                id, payload_data, compressed, status, created_at, updated_at,
                attempts, max_attempts, priority
            ) VALUES (?, ?, ?, 'pending', ?, ?, 0, ?, ?)",
        )
        .bind(&id)
        .bind(&data)
        .bind(compressed as i64)
        .bind(now)
        .bind(now)
        .bind(max_attempts as i64)
        .bind(priority)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        self.counters.queued.fetch_add(1, Ordering::Relaxed);
        if compressed {
            self.counters.compressed.fetch_add(1, Ordering::Relaxed);
        }
        debug!(queue_id = %id, priority, compressed, "event queued");
        Ok(id)
    }

    /// Dequeue up to `batch_size` deliverable rows (`pending`, or `failed`
    /// with an elapsed retry time), ordered by priority then age, and
    /// transition them to `processing`.
    ///
    /// Rows whose payload fails to decode are marked failed and omitted.
    pub async fn dequeue_batch(&self, batch_size: Option<u64>) -> Result<Vec<QueuedEvent>, QueueError> {
        let limit = batch_size.unwrap_or(self.batch_size) as i64;
        let now = self.epoch_now();

        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let rows = sqlx::query(
            "SELECT id, payload_data, compressed, status, created_at, updated_at,
                    attempts, max_attempts, next_retry, error_message, priority
             FROM events
             WHERE status = 'pending' OR (status = 'failed' AND next_retry <= ?)
             ORDER BY priority DESC, created_at ASC
             LIMIT ?",
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&mut *tx)
        .await
        .map_err(db_err)?;

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.get("id");
            let data: Vec<u8> = row.get("payload_data");
            let compressed: i64 = row.get("compressed");
            let decoded = decompress_payload(&data, compressed != 0)
                .and_then(|bytes| serde_json::from_slice::<Event>(&bytes).map_err(QueueError::Encode));

            match decoded {
                Ok(payload) => {
                    sqlx::query("UPDATE events SET status = 'processing', updated_at = ? WHERE id = ?")
                        .bind(now)
                        .bind(&id)
                        .execute(&mut *tx)
                        .await
                        .map_err(db_err)?;

                    events.push(QueuedEvent {
                        id,
                        payload,
                        status: QueueStatus::Processing,
                        attempts: row.get::<i64, _>("attempts") as u32,
                        max_attempts: row.get::<i64, _>("max_attempts") as u32,
                        next_retry: row.get("next_retry"),
                        error_message: row.get("error_message"),
                        priority: row.get("priority"),
                        compressed: compressed != 0,
                        created_at: row.get("created_at"),
                        updated_at: now,
                    });
                }
                Err(e) => {
                    error!(queue_id = %id, error = %e, "failed to decode queued payload");
                    sqlx::query(
                        "UPDATE events SET status = 'failed', error_message = ?, updated_at = ? WHERE id = ?",
                    )
                    .bind(e.to_string())
                    .bind(now)
                    .bind(&id)
                    .execute(&mut *tx)
                    .await
                    .map_err(db_err)?;
                }
            }
        }
        tx.commit().await.map_err(db_err)?;

        if !events.is_empty() {
            debug!(count = events.len(), "dequeued events for delivery");
        }
        Ok(events)
    }

    /// `processing` → `completed`.
    pub async fn mark_completed(&self, ids: &[String]) -> Result<(), QueueError> {
        if ids.is_empty() {
            return Ok(());
        }
        let placeholders = vec!["?"; ids.len()].join(",");
        let sql = format!("UPDATE events SET status = 'completed', updated_at = ? WHERE id IN ({placeholders})");
        let mut query = sqlx::query(&sql).bind(self.epoch_now());
        for id in ids {
            query = query.bind(id);
        }
        let updated = query.execute(&self.pool).await.map_err(db_err)?.rows_affected();
        self.counters.processed.fetch_add(updated, Ordering::Relaxed);
        debug!(count = updated, "marked events completed");
        Ok(())
    }

    /// Record a delivery failure; schedule a retry while budget remains,
    /// otherwise leave the row terminally failed (no `next_retry`).
    pub async fn mark_failed(&self, id: &str, error_message: &str) -> Result<(), QueueError> {
        let now = self.epoch_now();
        let row = sqlx::query("SELECT attempts, max_attempts FROM events WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        let Some(row) = row else {
            warn!(queue_id = %id, "event not found for failure marking");
            return Ok(());
        };

        let attempts: i64 = row.get("attempts");
        let max_attempts: i64 = row.get("max_attempts");
        let new_attempts = attempts + 1;

        let retries_left = new_attempts < max_attempts && new_attempts <= self.retry_delays.len() as i64;
        if retries_left {
            let delay = self.retry_delays[(new_attempts - 1) as usize];
            info!(
                queue_id = %id,
                attempt = new_attempts,
                max_attempts,
                retry_in_secs = delay,
                "delivery failed, retry scheduled"
            );
            sqlx::query(
                "UPDATE events SET status = 'failed', attempts = ?, error_message = ?,
                        next_retry = ?, updated_at = ?
                 WHERE id = ?",
            )
            .bind(new_attempts)
            .bind(error_message)
            .bind(now + delay as f64)
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
            self.counters.retries.fetch_add(1, Ordering::Relaxed);
        } else {
            warn!(queue_id = %id, attempts = new_attempts, error = error_message, "event permanently failed");
            sqlx::query(
                "UPDATE events SET status = 'failed', attempts = ?, error_message = ?,
                        next_retry = NULL, updated_at = ?
                 WHERE id = ?",
            )
            .bind(new_attempts)
            .bind(error_message)
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Count of deliverable rows: `pending`, plus `failed` whose retry time
    /// has elapsed.
    pub async fn pending_count(&self) -> Result<u64, QueueError> {
        let count: i64 = sqlx::query(
            "SELECT COUNT(*) AS n FROM events
             WHERE status = 'pending' OR (status = 'failed' AND next_retry <= ?)",
        )
        .bind(self.epoch_now())
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?
        .get("n");
        Ok(count as u64)
    }

    /// Expiry sweep: age out non-completed rows, then delete old
    /// completed/expired rows.
    pub async fn cleanup_expired(&self) -> Result<u64, QueueError> {
        let now = self.epoch_now();
        let cutoff = now - (self.max_age_hours * 3_600) as f64;

        let expired = sqlx::query(
            "UPDATE events SET status = 'expired', updated_at = ?
             WHERE created_at < ? AND status != 'completed'",
        )
        .bind(now)
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(db_err)?
        .rows_affected();

        let deleted = sqlx::query(
            "DELETE FROM events WHERE created_at < ? AND status IN ('completed', 'expired')",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(db_err)?
        .rows_affected();

        self.counters.expired.fetch_add(expired, Ordering::Relaxed);
        if deleted > 0 {
            info!(deleted, expired, "queue expiry sweep");
        }
        Ok(deleted)
    }

    /// Delete terminally failed rows older than `older_than_hours`.
    pub async fn purge_failed(&self, older_than_hours: u64) -> Result<u64, QueueError> {
        let cutoff = self.epoch_now() - (older_than_hours * 3_600) as f64;
        let deleted = sqlx::query(
            "DELETE FROM events WHERE status = 'failed' AND next_retry IS NULL AND updated_at < ?",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(db_err)?
        .rows_affected();
        if deleted > 0 {
            info!(count = deleted, "purged permanently failed events");
        }
        Ok(deleted)
    }

    /// Queue statistics for status reporting.
    pub async fn get_stats(&self) -> Result<QueueStats, QueueError> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS count FROM events GROUP BY status")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        let mut stats = QueueStats {
            events_queued: self.counters.queued.load(Ordering::Relaxed),
            events_processed: self.counters.processed.load(Ordering::Relaxed),
            events_failed: self.counters.failed.load(Ordering::Relaxed),
            events_expired: self.counters.expired.load(Ordering::Relaxed),
            compressed_events: self.counters.compressed.load(Ordering::Relaxed),
            total_retries: self.counters.retries.load(Ordering::Relaxed),
            ..QueueStats::default()
        };
        for row in rows {
            let status: String = row.get("status");
            let count: i64 = row.get("count");
            stats.current_size += count as u64;
            stats.status_counts.insert(status, count as u64);
        }
        Ok(stats)
    }

    /// Fetch one row by id, regardless of status. Observability helper.
    pub async fn get_event(&self, id: &str) -> Result<Option<QueuedEvent>, QueueError> {
        let row = sqlx::query(
            "SELECT id, payload_data, compressed, status, created_at, updated_at,
                    attempts, max_attempts, next_retry, error_message, priority
             FROM events WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        let Some(row) = row else { return Ok(None) };

        let data: Vec<u8> = row.get("payload_data");
        let compressed: i64 = row.get("compressed");
        let bytes = decompress_payload(&data, compressed != 0)?;
        let payload: Event = serde_json::from_slice(&bytes)?;
        let status: String = row.get("status");
        Ok(Some(QueuedEvent {
            id: row.get("id"),
            payload,
            status: QueueStatus::parse(&status),
            attempts: row.get::<i64, _>("attempts") as u32,
            max_attempts: row.get::<i64, _>("max_attempts") as u32,
            next_retry: row.get("next_retry"),
            error_message: row.get("error_message"),
            priority: row.get("priority"),
            compressed: compressed != 0,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }))
    }

    /// Spawn the periodic expiry-sweep task.
    pub fn spawn_maintenance(
        self: &Arc<Self>,
        interval: Duration,
        shutdown: ShutdownSignal,
    ) -> tokio::task::JoinHandle<()> {
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                if shutdown.sleep(interval).await {
                    break;
                }
                if let Err(e) = queue.cleanup_expired().await {
                    error!(error = %e, "queue maintenance failed");
                }
            }
        })
    }

    /// Final expiry sweep, then close the database.
    pub async fn close(&self) {
        if let Err(e) = self.cleanup_expired().await {
            warn!(error = %e, "final queue sweep failed");
        }
        self.pool.close().await;
        info!("persistent queue closed");
    }

    async fn current_size(&self) -> Result<u64, QueueError> {
        let count: i64 = sqlx::query("SELECT COUNT(*) AS n FROM events")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?
            .get("n");
        Ok(count as u64)
    }
}

fn db_err(e: sqlx::Error) -> QueueError {
    QueueError::Database(e.to_string())
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
