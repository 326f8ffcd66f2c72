//! Outbox processor: leased polling, delivery, exponential retry,
//! dead-lettering, and lease reaping.
//!
//! Runs on its own pool connection so external delivery never contends with
//! the write path. Delivery failure is a normal case handled by the retry
//! machinery; storage failure halts the worker until the processor is
//! restarted.

use core::str::FromStr;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use merchkit_core::AggregateId;
use merchkit_events::{EventName, EventPublisher, PublishedEvent};

use crate::error::CoreError;
use crate::outbox::{backoff_delay, OutboxConfig, OutboxStatus};
use crate::stores::event_store::{parse_timestamp, parse_uuid};

pub struct OutboxProcessor {
    pool: SqlitePool,
    publisher: Arc<dyn EventPublisher>,
    config: OutboxConfig,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl OutboxProcessor {
    pub fn new(pool: SqlitePool, publisher: Arc<dyn EventPublisher>, config: OutboxConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            pool,
            publisher,
            config,
            shutdown,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the delivery workers and the lease reaper. No-op if running.
    pub fn start(&self) {
        let mut tasks = self.tasks.lock().expect("outbox task lock poisoned");
        if !tasks.is_empty() {
            return;
        }
        let _ = self.shutdown.send(false);

        for n in 0..self.config.worker_count.max(1) {
            let worker_id = format!("outbox-worker-{n}");
            tasks.push(tokio::spawn(worker_loop(
                self.pool.clone(),
                Arc::clone(&self.publisher),
                self.config.clone(),
                worker_id,
                self.shutdown.subscribe(),
            )));
        }
        tasks.push(tokio::spawn(reaper_loop(
            self.pool.clone(),
            self.config.clone(),
            self.shutdown.subscribe(),
        )));
    }

    /// Signal every task and wait for them to finish.
    pub async fn stop(&self) {
        let _ = self.shutdown.send(true);
        let tasks = {
            let mut guard = self.tasks.lock().expect("outbox task lock poisoned");
            std::mem::take(&mut *guard)
        };
        for task in tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "outbox task panicked during shutdown");
            }
        }
    }
}

/// A row claimed by a worker.
#[derive(Debug)]
struct LeasedEntry {
    id: String,
    aggregate_id: String,
    event_name: String,
    occurred_at: String,
    payload_json: String,
    attempts: i64,
}

async fn worker_loop(
    pool: SqlitePool,
    publisher: Arc<dyn EventPublisher>,
    config: OutboxConfig,
    worker_id: String,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        let leased = match lease_batch(&pool, &worker_id, &config).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!(worker = %worker_id, error = %e, "outbox lease failed; halting worker");
                break;
            }
        };

        if leased.is_empty() {
            tokio::select! {
                _ = tokio::time::sleep(config.poll_interval) => {}
                _ = shutdown.changed() => {}
            }
            continue;
        }

        for entry in leased {
            if let Err(e) = deliver_and_settle(&pool, publisher.as_ref(), &config, entry).await {
                tracing::error!(worker = %worker_id, error = %e, "outbox settle failed; halting worker");
                return;
            }
        }
    }
}

/// Claim up to `lease_batch_size` due pending rows for this worker.
///
/// The claim is one conditional UPDATE, so two workers can never lease the
/// same row.
async fn lease_batch(
    pool: &SqlitePool,
    worker_id: &str,
    config: &OutboxConfig,
) -> Result<Vec<LeasedEntry>, CoreError> {
    let now = Utc::now().timestamp_millis();
    let lease_expires_at = now + config.lease_duration.as_millis() as i64;

    let rows = sqlx::query(
        "UPDATE outbox SET status = ?, lease_owner = ?, lease_expires_at = ? \
         WHERE id IN (\
            SELECT id FROM outbox \
            WHERE status = ? AND next_attempt_at <= ? \
            ORDER BY occurred_at, id \
            LIMIT ?\
         ) \
         RETURNING id, aggregate_id, event_name, occurred_at, payload_json, attempts",
    )
    .bind(OutboxStatus::Inflight.as_str())
    .bind(worker_id)
    .bind(lease_expires_at)
    .bind(OutboxStatus::Pending.as_str())
    .bind(now)
    .bind(config.lease_batch_size as i64)
    .fetch_all(pool)
    .await?;

    let mut leased = Vec::with_capacity(rows.len());
    for row in rows {
        leased.push(LeasedEntry {
            id: row.try_get("id")?,
            aggregate_id: row.try_get("aggregate_id")?,
            event_name: row.try_get("event_name")?,
            occurred_at: row.try_get("occurred_at")?,
            payload_json: row.try_get("payload_json")?,
            attempts: row.try_get("attempts")?,
        });
    }
    Ok(leased)
}

async fn deliver_and_settle(
    pool: &SqlitePool,
    publisher: &dyn EventPublisher,
    config: &OutboxConfig,
    entry: LeasedEntry,
) -> Result<(), CoreError> {
    let event = PublishedEvent {
        id: parse_uuid(&entry.id)?,
        aggregate_id: parse_uuid(&entry.aggregate_id).map(AggregateId::from_uuid)?,
        event_name: EventName::from_str(&entry.event_name)
            .map_err(|e| CoreError::storage(format!("corrupt outbox row: {e}")))?,
        occurred_at: parse_timestamp(&entry.occurred_at)?,
        payload: serde_json::from_str(&entry.payload_json)?,
    };

    match publisher.publish(&event).await {
        Ok(()) => {
            sqlx::query(
                "UPDATE outbox SET status = ?, attempts = attempts + 1, \
                 lease_owner = NULL, lease_expires_at = NULL WHERE id = ?",
            )
            .bind(OutboxStatus::Delivered.as_str())
            .bind(&entry.id)
            .execute(pool)
            .await?;
            tracing::debug!(outbox_id = %entry.id, event = %event.event_name, "outbox entry delivered");
            Ok(())
        }
        Err(publish_error) => settle_failure(pool, config, entry, publish_error.to_string()).await,
    }
}

async fn settle_failure(
    pool: &SqlitePool,
    config: &OutboxConfig,
    entry: LeasedEntry,
    error: String,
) -> Result<(), CoreError> {
    let attempts = entry.attempts + 1;

    if attempts >= config.max_attempts as i64 {
        // Exhausted: mark dead and copy into the DLQ atomically.
        let mut tx = pool.begin().await?;
        sqlx::query(
            "UPDATE outbox SET status = ?, attempts = ?, last_error = ?, \
             lease_owner = NULL, lease_expires_at = NULL WHERE id = ?",
        )
        .bind(OutboxStatus::Dead.as_str())
        .bind(attempts)
        .bind(&error)
        .bind(&entry.id)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "INSERT INTO outbox_dlq \
             (id, aggregate_id, event_name, occurred_at, payload_json, status, attempts, last_error, next_attempt_at, dead_since) \
             SELECT id, aggregate_id, event_name, occurred_at, payload_json, status, attempts, last_error, next_attempt_at, ? \
             FROM outbox WHERE id = ?",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(&entry.id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::warn!(
            outbox_id = %entry.id,
            attempts,
            error = %error,
            "outbox entry dead-lettered"
        );
        return Ok(());
    }

    let delay = backoff_delay(config.backoff_base, attempts as u32);
    let next_attempt_at = Utc::now().timestamp_millis() + delay.as_millis() as i64;
    sqlx::query(
        "UPDATE outbox SET status = ?, attempts = ?, last_error = ?, \
         next_attempt_at = ?, lease_owner = NULL, lease_expires_at = NULL WHERE id = ?",
    )
    .bind(OutboxStatus::Pending.as_str())
    .bind(attempts)
    .bind(&error)
    .bind(next_attempt_at)
    .bind(&entry.id)
    .execute(pool)
    .await?;

    tracing::debug!(
        outbox_id = %entry.id,
        attempts,
        retry_in_ms = delay.as_millis() as u64,
        "outbox delivery failed; scheduled retry"
    );
    Ok(())
}

/// Return expired inflight leases to pending so a crashed worker's rows are
/// picked up again.
async fn reaper_loop(pool: SqlitePool, config: OutboxConfig, mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        let now = Utc::now().timestamp_millis();
        match sqlx::query(
            "UPDATE outbox SET status = ?, lease_owner = NULL, lease_expires_at = NULL \
             WHERE status = ? AND lease_expires_at < ?",
        )
        .bind(OutboxStatus::Pending.as_str())
        .bind(OutboxStatus::Inflight.as_str())
        .bind(now)
        .execute(&pool)
        .await
        {
            Ok(result) if result.rows_affected() > 0 => {
                tracing::info!(reclaimed = result.rows_affected(), "reaped expired outbox leases");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(error = %e, "outbox lease reaper failed; halting");
                break;
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(config.lease_duration / 2) => {}
            _ = shutdown.changed() => {}
        }
    }
}
