//! Transaction batcher: groups logical statement batches from many
//! unit-of-work scopes into fewer physical SQLite commits.
//!
//! The batcher task is the sole owner of the write connection, which makes
//! physical writes strictly serial. A logical batch is never split across
//! physical transactions; every batch in a flush is signalled with the same
//! outcome.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Connection, SqliteConnection};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::batch::{bind_params, BatchStatement};
use crate::error::CoreError;

#[derive(Debug, Clone)]
pub struct BatcherConfig {
    /// Maximum age of the oldest pending batch before a flush.
    pub flush_interval: Duration,
    /// Queue depth that triggers an immediate flush.
    pub batch_size_threshold: usize,
    /// Cap on submitted-but-uncommitted batches; beyond it submissions fail
    /// with `BackPressure`.
    pub max_queue_depth: usize,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_millis(10),
            batch_size_threshold: 32,
            max_queue_depth: 256,
        }
    }
}

/// One logical transaction: its statements plus the caller's completion
/// signal.
struct LogicalBatch {
    statements: Vec<BatchStatement>,
    done: oneshot::Sender<Result<(), CoreError>>,
}

struct BatcherHandle {
    tx: mpsc::Sender<LogicalBatch>,
    task: tokio::task::JoinHandle<()>,
    /// Batches submitted and not yet signalled. Drives back-pressure.
    depth: Arc<AtomicUsize>,
}

pub struct TransactionBatcher {
    connect_options: SqliteConnectOptions,
    config: BatcherConfig,
    handle: Mutex<Option<BatcherHandle>>,
}

impl TransactionBatcher {
    pub fn new(connect_options: SqliteConnectOptions, config: BatcherConfig) -> Self {
        Self {
            connect_options,
            config,
            handle: Mutex::new(None),
        }
    }

    /// Open the write connection and start the flush task.
    ///
    /// Allowed after a `stop()`; tests cycle the batcher this way.
    pub async fn start(&self) -> Result<(), CoreError> {
        let conn = SqliteConnection::connect_with(&self.connect_options)
            .await
            .map_err(|e| CoreError::storage(format!("failed to open write connection: {e}")))?;

        let depth = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::channel(self.config.max_queue_depth.max(1));
        let task = tokio::spawn(run_flush_loop(
            conn,
            rx,
            self.config.clone(),
            Arc::clone(&depth),
        ));

        let mut handle = self.handle.lock().expect("batcher lock poisoned");
        if handle.is_some() {
            return Err(CoreError::storage("transaction batcher is already running"));
        }
        *handle = Some(BatcherHandle { tx, task, depth });
        Ok(())
    }

    /// Submit one logical batch and wait for its physical commit.
    ///
    /// Fails fast with `BackPressure` when the queue is full.
    pub async fn submit(&self, statements: Vec<BatchStatement>) -> Result<(), CoreError> {
        let (done_tx, done_rx) = oneshot::channel();
        {
            let handle = self.handle.lock().expect("batcher lock poisoned");
            let handle = handle
                .as_ref()
                .ok_or_else(|| CoreError::storage("transaction batcher is stopped"))?;

            let previous = handle.depth.fetch_add(1, Ordering::SeqCst);
            if previous >= self.config.max_queue_depth {
                handle.depth.fetch_sub(1, Ordering::SeqCst);
                return Err(CoreError::BackPressure);
            }

            if let Err(e) = handle.tx.try_send(LogicalBatch {
                statements,
                done: done_tx,
            }) {
                handle.depth.fetch_sub(1, Ordering::SeqCst);
                return Err(match e {
                    mpsc::error::TrySendError::Full(_) => CoreError::BackPressure,
                    mpsc::error::TrySendError::Closed(_) => {
                        CoreError::storage("transaction batcher is stopped")
                    }
                });
            }
        }

        done_rx
            .await
            .map_err(|_| CoreError::storage("transaction batcher dropped the batch"))?
    }

    /// Flush everything pending, then reject further submissions.
    pub async fn stop(&self) {
        let handle = {
            let mut guard = self.handle.lock().expect("batcher lock poisoned");
            guard.take()
        };

        if let Some(BatcherHandle { tx, task, .. }) = handle {
            // Closing the channel makes the flush loop drain and exit.
            drop(tx);
            if let Err(e) = task.await {
                tracing::error!(error = %e, "batcher flush task panicked during shutdown");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.lock().expect("batcher lock poisoned").is_some()
    }
}

async fn run_flush_loop(
    mut conn: SqliteConnection,
    mut rx: mpsc::Receiver<LogicalBatch>,
    config: BatcherConfig,
    depth: Arc<AtomicUsize>,
) {
    let mut pending: Vec<LogicalBatch> = Vec::new();
    let mut oldest_enqueued = Instant::now();

    loop {
        if pending.is_empty() {
            match rx.recv().await {
                Some(batch) => {
                    pending.push(batch);
                    oldest_enqueued = Instant::now();
                    if pending.len() >= config.batch_size_threshold {
                        flush(&mut conn, &mut pending, &depth).await;
                    }
                }
                None => break,
            }
        } else {
            let deadline = oldest_enqueued + config.flush_interval;
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    flush(&mut conn, &mut pending, &depth).await;
                }
                received = rx.recv() => match received {
                    Some(batch) => {
                        pending.push(batch);
                        if pending.len() >= config.batch_size_threshold {
                            flush(&mut conn, &mut pending, &depth).await;
                        }
                    }
                    None => {
                        flush(&mut conn, &mut pending, &depth).await;
                        break;
                    }
                },
            }
        }
    }

    // Shutdown flush for anything still queued at channel close.
    while let Ok(batch) = rx.try_recv() {
        pending.push(batch);
    }
    flush(&mut conn, &mut pending, &depth).await;

    if let Err(e) = conn.close().await {
        tracing::warn!(error = %e, "failed to close batcher write connection");
    }
}

/// Commit every pending logical batch in arrival order inside one physical
/// transaction, then signal each submitter with the shared outcome.
async fn flush(
    conn: &mut SqliteConnection,
    pending: &mut Vec<LogicalBatch>,
    depth: &AtomicUsize,
) {
    if pending.is_empty() {
        return;
    }
    let batches = std::mem::take(pending);
    let statement_count: usize = batches.iter().map(|b| b.statements.len()).sum();

    let result = commit_all(conn, &batches).await;
    depth.fetch_sub(batches.len(), Ordering::SeqCst);
    match result {
        Ok(()) => {
            tracing::debug!(
                logical_batches = batches.len(),
                statements = statement_count,
                "batcher flush committed"
            );
            for batch in batches {
                let _ = batch.done.send(Ok(()));
            }
        }
        Err(e) => {
            tracing::warn!(
                logical_batches = batches.len(),
                error = %e,
                "batcher flush failed; signalling every submitter"
            );
            let message = e.to_string();
            for batch in batches {
                let _ = batch.done.send(Err(CoreError::storage(message.clone())));
            }
        }
    }
}

async fn commit_all(
    conn: &mut SqliteConnection,
    batches: &[LogicalBatch],
) -> Result<(), sqlx::Error> {
    // BEGIN IMMEDIATE takes the write lock up front so the flush never
    // deadlocks against a reader-turned-writer.
    sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

    for batch in batches {
        for statement in &batch.statements {
            tracing::trace!(kind = statement.kind.as_str(), "executing staged statement");
            let query = bind_params(sqlx::query(&statement.sql), &statement.params);
            if let Err(e) = query.execute(&mut *conn).await {
                rollback(conn).await;
                return Err(e);
            }
        }
    }

    if let Err(e) = sqlx::query("COMMIT").execute(&mut *conn).await {
        rollback(conn).await;
        return Err(e);
    }
    Ok(())
}

async fn rollback(conn: &mut SqliteConnection) {
    if let Err(e) = sqlx::query("ROLLBACK").execute(conn).await {
        tracing::warn!(error = %e, "rollback after failed flush also failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{SqlParam, StatementKind};

    fn options(path: &std::path::Path) -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
    }

    async fn scratch_batcher(
        config: BatcherConfig,
    ) -> (TransactionBatcher, sqlx::SqlitePool, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batcher.db");
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options(&path))
            .await
            .unwrap();
        sqlx::query("CREATE TABLE kv (k TEXT PRIMARY KEY, v INTEGER NOT NULL)")
            .execute(&pool)
            .await
            .unwrap();

        let batcher = TransactionBatcher::new(options(&path), config);
        batcher.start().await.unwrap();
        (batcher, pool, dir)
    }

    fn insert(k: &str, v: i64) -> BatchStatement {
        BatchStatement::new(
            StatementKind::Insert,
            "INSERT INTO kv (k, v) VALUES (?, ?)",
            vec![SqlParam::text(k), SqlParam::integer(v)],
        )
    }

    async fn count(pool: &sqlx::SqlitePool) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM kv")
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn commits_submitted_batches() {
        let (batcher, pool, _dir) = scratch_batcher(BatcherConfig::default()).await;

        batcher
            .submit(vec![insert("a", 1), insert("b", 2)])
            .await
            .unwrap();
        assert_eq!(count(&pool).await, 2);

        batcher.stop().await;
    }

    #[tokio::test]
    async fn a_failing_batch_fails_every_batch_in_the_flush() {
        let (batcher, pool, _dir) = scratch_batcher(BatcherConfig {
            // Threshold of two puts both submissions in the same flush.
            flush_interval: Duration::from_millis(500),
            batch_size_threshold: 2,
            max_queue_depth: 16,
        })
        .await;

        let good = batcher.submit(vec![insert("a", 1)]);
        // Primary-key violation: the same key twice in one batch.
        let bad = batcher.submit(vec![insert("x", 1), insert("x", 2)]);
        let (good, bad) = tokio::join!(good, bad);

        assert!(matches!(good, Err(CoreError::Storage(_))));
        assert!(matches!(bad, Err(CoreError::Storage(_))));
        assert_eq!(count(&pool).await, 0);

        // The write connection is healthy again after the rollback.
        batcher.submit(vec![insert("c", 3)]).await.unwrap();
        assert_eq!(count(&pool).await, 1);

        batcher.stop().await;
    }

    #[tokio::test]
    async fn stop_flushes_pending_work_and_rejects_new_submissions() {
        let (batcher, pool, _dir) = scratch_batcher(BatcherConfig {
            flush_interval: Duration::from_secs(5),
            batch_size_threshold: 100,
            max_queue_depth: 16,
        })
        .await;

        let pending = batcher.submit(vec![insert("a", 1)]);
        let (result, _) = tokio::join!(pending, batcher.stop());
        result.unwrap();
        assert_eq!(count(&pool).await, 1);

        let err = batcher.submit(vec![insert("b", 2)]).await.unwrap_err();
        assert!(matches!(err, CoreError::Storage(_)));
    }

    #[tokio::test]
    async fn restart_after_stop_accepts_work_again() {
        let (batcher, pool, _dir) = scratch_batcher(BatcherConfig::default()).await;
        batcher.stop().await;
        assert!(!batcher.is_running());

        batcher.start().await.unwrap();
        batcher.submit(vec![insert("again", 1)]).await.unwrap();
        assert_eq!(count(&pool).await, 1);
        batcher.stop().await;
    }

    #[tokio::test]
    async fn full_queue_back_pressures_immediately() {
        let (batcher, pool, _dir) = scratch_batcher(BatcherConfig {
            // Flush far in the future so the first batch stays queued.
            flush_interval: Duration::from_secs(5),
            batch_size_threshold: 100,
            max_queue_depth: 1,
        })
        .await;

        let mut first = Box::pin(batcher.submit(vec![insert("a", 1)]));
        // Drive the first submission to its enqueue point.
        tokio::select! {
            _ = &mut first => panic!("first batch should still be pending"),
            _ = tokio::time::sleep(Duration::from_millis(50)) => {}
        }

        let err = batcher.submit(vec![insert("b", 2)]).await.unwrap_err();
        assert!(matches!(err, CoreError::BackPressure));

        // Shutdown flushes the parked batch; its submitter sees success.
        let (result, _) = tokio::join!(first, batcher.stop());
        result.unwrap();
        assert_eq!(count(&pool).await, 1);
    }
}
