//! Event, snapshot and outbox stores.

pub mod event_store;
pub mod outbox_store;
pub mod snapshot_store;

pub use event_store::EventStore;
pub use outbox_store::OutboxStore;
pub use snapshot_store::{Snapshot, SnapshotStore};
