//! Unit-of-Work: a scoped resource under which every repository write
//! commits atomically.
//!
//! Reads issued through the repositories hit the pool immediately and see
//! committed state only. Writes are staged into one logical batch owned by
//! the scope; the batch is submitted to the batcher when the scope closure
//! returns `Ok`, and simply dropped when it returns `Err` — so a failed
//! command leaves no durable effects.

use std::future::Future;
use std::sync::{Arc, Mutex};

use sqlx::SqlitePool;

use crate::batch::BatchStatement;
use crate::batcher::TransactionBatcher;
use crate::error::CoreError;
use crate::read_model::{
    collections::CollectionRepository, products::ProductRepository,
    schedules::ScheduleRepository, variants::VariantRepository,
};
use crate::stores::{event_store::EventStore, outbox_store::OutboxStore,
    snapshot_store::SnapshotStore};

/// The repository bundle handed to a unit-of-work scope.
#[derive(Clone)]
pub struct Repositories {
    inner: Arc<RepoInner>,
}

struct RepoInner {
    pool: SqlitePool,
    staged: Mutex<Vec<BatchStatement>>,
}

impl Repositories {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            inner: Arc::new(RepoInner {
                pool,
                staged: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn events(&self) -> EventStore {
        EventStore::new(self.clone())
    }

    pub fn snapshots(&self) -> SnapshotStore {
        SnapshotStore::new(self.clone())
    }

    pub fn outbox(&self) -> OutboxStore {
        OutboxStore::new(self.clone())
    }

    pub fn products(&self) -> ProductRepository {
        ProductRepository::new(self.clone())
    }

    pub fn variants(&self) -> VariantRepository {
        VariantRepository::new(self.clone())
    }

    pub fn collections(&self) -> CollectionRepository {
        CollectionRepository::new(self.clone())
    }

    pub fn schedules(&self) -> ScheduleRepository {
        ScheduleRepository::new(self.clone())
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.inner.pool
    }

    /// Stage a write for the scope's logical batch.
    pub(crate) fn stage(&self, statement: BatchStatement) {
        self.inner
            .staged
            .lock()
            .expect("staged batch lock poisoned")
            .push(statement);
    }

    pub(crate) fn take_statements(&self) -> Vec<BatchStatement> {
        std::mem::take(
            &mut *self
                .inner
                .staged
                .lock()
                .expect("staged batch lock poisoned"),
        )
    }

    /// Number of staged statements (observability and tests).
    pub fn staged_len(&self) -> usize {
        self.inner
            .staged
            .lock()
            .expect("staged batch lock poisoned")
            .len()
    }
}

pub struct UnitOfWork {
    pool: SqlitePool,
    batcher: Arc<TransactionBatcher>,
}

impl UnitOfWork {
    pub fn new(pool: SqlitePool, batcher: Arc<TransactionBatcher>) -> Self {
        Self { pool, batcher }
    }

    /// Run `f` with a fresh repository bundle; on success submit its staged
    /// writes as one logical transaction and wait for the physical commit.
    ///
    /// Returns `f`'s value. Any error — from `f` or from the commit — means
    /// nothing was persisted.
    pub async fn with_transaction<T, F, Fut>(&self, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(Repositories) -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        let repos = Repositories::new(self.pool.clone());
        let value = f(repos.clone()).await?;

        let statements = repos.take_statements();
        if !statements.is_empty() {
            self.batcher.submit(statements).await?;
        }
        Ok(value)
    }
}
