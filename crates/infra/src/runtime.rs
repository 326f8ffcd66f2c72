//! Composition root: owns the pool, the batcher and the outbox workers, and
//! exposes the command/query entry points.

use std::sync::Arc;
use std::time::Duration;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};

use merchkit_events::EventPublisher;

use crate::batcher::TransactionBatcher;
use crate::commands::{self, CommandEnvelope, CommandReceipt, CoreContext};
use crate::config::CoreConfig;
use crate::error::{CoreError, ResultEnvelope};
use crate::outbox::OutboxProcessor;
use crate::projections::ProjectionRouter;
use crate::queries::QueryRouter;
use crate::schema;
use crate::uow::UnitOfWork;

pub struct CoreRuntime {
    pool: SqlitePool,
    batcher: Arc<TransactionBatcher>,
    ctx: CoreContext,
    queries: QueryRouter,
    outbox: OutboxProcessor,
}

impl CoreRuntime {
    /// Open the database, apply the schema, start the batcher and the outbox
    /// workers.
    pub async fn start(
        config: CoreConfig,
        publisher: Arc<dyn EventPublisher>,
    ) -> Result<Self, CoreError> {
        let connect_options = SqliteConnectOptions::new()
            .filename(&config.database_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(connect_options.clone())
            .await?;
        schema::apply_schema(&pool).await?;

        let batcher = Arc::new(TransactionBatcher::new(connect_options, config.batcher));
        batcher.start().await?;

        let router = Arc::new(ProjectionRouter::new());
        let ctx = CoreContext::new(
            UnitOfWork::new(pool.clone(), Arc::clone(&batcher)),
            router,
        );
        let outbox = OutboxProcessor::new(pool.clone(), publisher, config.outbox);
        outbox.start();
        let queries = QueryRouter::new(pool.clone());

        tracing::info!("core runtime started");
        Ok(Self {
            pool,
            batcher,
            ctx,
            queries,
            outbox,
        })
    }

    /// Execute a validated write command.
    pub async fn execute(&self, envelope: CommandEnvelope) -> Result<CommandReceipt, CoreError> {
        commands::dispatch(&self.ctx, envelope).await
    }

    /// Parse and execute a raw command envelope, returning the wire-shape
    /// result.
    pub async fn execute_json(&self, raw: serde_json::Value) -> ResultEnvelope<CommandReceipt> {
        let result = match serde_json::from_value::<CommandEnvelope>(raw) {
            Ok(envelope) => self.execute(envelope).await,
            Err(e) => Err(CoreError::Validation(e.to_string())),
        };
        ResultEnvelope::from_result(result)
    }

    /// Execute with a caller-provided deadline.
    ///
    /// A deadline that fires before the scope submits its batch aborts with
    /// no durable effects. Once the batch has been handed to the batcher the
    /// commit is not cancelled; only the caller's wait is.
    pub async fn execute_with_deadline(
        &self,
        envelope: CommandEnvelope,
        deadline: Duration,
    ) -> Result<CommandReceipt, CoreError> {
        match tokio::time::timeout(deadline, self.execute(envelope)).await {
            Ok(result) => result,
            Err(_) => Err(CoreError::storage("command deadline exceeded")),
        }
    }

    /// Run a read query against the read models.
    pub async fn query(&self, raw: serde_json::Value) -> ResultEnvelope<serde_json::Value> {
        self.queries.execute(raw).await
    }

    /// Flush and stop the outbox workers and the batcher.
    pub async fn stop(&self) {
        self.outbox.stop().await;
        self.batcher.stop().await;
        tracing::info!("core runtime stopped");
    }

    /// A unit-of-work bound to this runtime's pool and batcher.
    pub fn unit_of_work(&self) -> UnitOfWork {
        UnitOfWork::new(self.pool.clone(), Arc::clone(&self.batcher))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn batcher(&self) -> &Arc<TransactionBatcher> {
        &self.batcher
    }
}
