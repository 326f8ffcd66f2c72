//! Shared harness for the end-to-end tests: a core runtime on a temp SQLite
//! file, fast batcher/outbox tuning, and a scriptable publisher.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use merchkit_events::{EventPublisher, PublishError, PublishedEvent};
use merchkit_infra::batcher::BatcherConfig;
use merchkit_infra::commands::CommandEnvelope;
use merchkit_infra::outbox::OutboxConfig;
use merchkit_infra::{CoreConfig, CoreRuntime};

pub struct TestCore {
    pub runtime: CoreRuntime,
    pub publisher: Arc<FlakyPublisher>,
    _dir: tempfile::TempDir,
}

/// Publisher that fails a configured number of times, then succeeds,
/// recording every attempt.
#[derive(Debug, Default)]
pub struct FlakyPublisher {
    failures_remaining: AtomicU32,
    attempts: Mutex<Vec<PublishedEvent>>,
    delivered: Mutex<Vec<PublishedEvent>>,
}

impl FlakyPublisher {
    pub fn reliable() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing(times: u32) -> Arc<Self> {
        Arc::new(Self {
            failures_remaining: AtomicU32::new(times),
            ..Self::default()
        })
    }

    pub fn attempts(&self) -> Vec<PublishedEvent> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn delivered(&self) -> Vec<PublishedEvent> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventPublisher for FlakyPublisher {
    async fn publish(&self, event: &PublishedEvent) -> Result<(), PublishError> {
        self.attempts.lock().unwrap().push(event.clone());

        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.fetch_sub(1, Ordering::SeqCst);
            return Err(PublishError::new("simulated transport failure"));
        }

        self.delivered.lock().unwrap().push(event.clone());
        Ok(())
    }
}

pub fn fast_config(database_path: String, max_attempts: u32) -> CoreConfig {
    CoreConfig {
        database_path,
        batcher: BatcherConfig {
            flush_interval: Duration::from_millis(5),
            batch_size_threshold: 8,
            max_queue_depth: 64,
        },
        outbox: OutboxConfig {
            lease_duration: Duration::from_secs(5),
            max_attempts,
            backoff_base: Duration::from_millis(10),
            poll_interval: Duration::from_millis(20),
            worker_count: 2,
            lease_batch_size: 8,
        },
    }
}

pub async fn start_core() -> TestCore {
    start_core_with(FlakyPublisher::reliable(), 5).await
}

pub async fn start_core_with(publisher: Arc<FlakyPublisher>, max_attempts: u32) -> TestCore {
    merchkit_observability::init();
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let database_path = dir
        .path()
        .join("core.db")
        .to_string_lossy()
        .into_owned();

    let delivery: Arc<dyn EventPublisher> = publisher.clone();
    let runtime = CoreRuntime::start(fast_config(database_path, max_attempts), delivery)
        .await
        .expect("core runtime failed to start");

    TestCore {
        runtime,
        publisher,
        _dir: dir,
    }
}

/// A command envelope with a fresh header and the given payload fields.
pub fn command(kind: &str, fields: JsonValue) -> CommandEnvelope {
    let mut raw = json!({
        "type": kind,
        "id": Uuid::now_v7(),
        "user_id": Uuid::now_v7(),
        "correlation_id": Uuid::now_v7(),
    });
    let base = raw.as_object_mut().unwrap();
    for (key, value) in fields.as_object().expect("fields must be an object") {
        base.insert(key.clone(), value.clone());
    }
    serde_json::from_value(raw).expect("command envelope failed to parse")
}

pub async fn event_names_for(pool: &SqlitePool, aggregate_id: Uuid) -> Vec<(i64, String)> {
    sqlx::query("SELECT version, event_name FROM events WHERE aggregate_id = ? ORDER BY version")
        .bind(aggregate_id.to_string())
        .fetch_all(pool)
        .await
        .unwrap()
        .into_iter()
        .map(|row| (row.get::<i64, _>("version"), row.get::<String, _>("event_name")))
        .collect()
}

pub async fn event_count(pool: &SqlitePool, aggregate_id: Uuid) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM events WHERE aggregate_id = ?")
        .bind(aggregate_id.to_string())
        .fetch_one(pool)
        .await
        .unwrap()
}

pub async fn snapshot_version(pool: &SqlitePool, aggregate_id: Uuid) -> Option<i64> {
    sqlx::query_scalar("SELECT version FROM snapshots WHERE aggregate_id = ?")
        .bind(aggregate_id.to_string())
        .fetch_optional(pool)
        .await
        .unwrap()
}

/// `(id, status, attempts, last_error)` for an aggregate's outbox rows.
pub async fn outbox_rows(pool: &SqlitePool, aggregate_id: Uuid) -> Vec<(String, String, i64, Option<String>)> {
    sqlx::query(
        "SELECT id, status, attempts, last_error FROM outbox WHERE aggregate_id = ? ORDER BY id",
    )
    .bind(aggregate_id.to_string())
    .fetch_all(pool)
    .await
    .unwrap()
    .into_iter()
    .map(|row| {
        (
            row.get::<String, _>("id"),
            row.get::<String, _>("status"),
            row.get::<i64, _>("attempts"),
            row.get::<Option<String>, _>("last_error"),
        )
    })
    .collect()
}

pub async fn dlq_count(pool: &SqlitePool, aggregate_id: Uuid) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM outbox_dlq WHERE aggregate_id = ?")
        .bind(aggregate_id.to_string())
        .fetch_one(pool)
        .await
        .unwrap()
}

/// Poll until `check` passes or the timeout expires. The command path is
/// synchronous but outbox delivery is not; tests wait for it here.
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("condition not reached within {timeout:?}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
