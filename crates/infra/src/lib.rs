//! Persistence and orchestration for the commerce core.
//!
//! Write path: command service → unit-of-work (snapshot load → aggregate
//! mutation → event append → projection fan-out → outbox enqueue → snapshot
//! save) → transaction batcher → one physical SQLite commit.
//! Read path: query router → read-model selectors.
//! Publish path: outbox processor leases, delivers, retries, dead-letters.

pub mod batch;
pub mod batcher;
pub mod commands;
pub mod config;
pub mod error;
pub mod outbox;
pub mod projections;
pub mod queries;
pub mod read_model;
pub mod runtime;
pub mod schema;
pub mod stores;
pub mod uow;

pub use batcher::{BatcherConfig, TransactionBatcher};
pub use commands::{CommandEnvelope, CommandReceipt};
pub use config::CoreConfig;
pub use error::{CoreError, ErrorBody, ResultEnvelope};
pub use outbox::{OutboxConfig, OutboxProcessor, OutboxStatus};
pub use projections::ProjectionRouter;
pub use queries::{QueryEnvelope, QueryRouter};
pub use runtime::CoreRuntime;
pub use uow::{Repositories, UnitOfWork};
