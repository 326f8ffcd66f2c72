//! Write-side of the outbox: enqueueing entries inside the logical
//! transaction that appends their events (classical outbox pattern).

use uuid::Uuid;

use merchkit_events::DomainEvent;

use crate::batch::{BatchStatement, SqlParam, StatementKind};
use crate::error::CoreError;
use crate::outbox::OutboxStatus;
use crate::uow::Repositories;

const INSERT_OUTBOX: &str = "INSERT INTO outbox \
    (id, aggregate_id, event_name, occurred_at, payload_json, status, attempts, last_error, next_attempt_at) \
    VALUES (?, ?, ?, ?, ?, ?, 0, NULL, ?)";

pub struct OutboxStore {
    repos: Repositories,
}

impl OutboxStore {
    pub(crate) fn new(repos: Repositories) -> Self {
        Self { repos }
    }

    /// Stage an outbox entry for the event, due immediately.
    ///
    /// Returns the entry id (UUIDv7) — the consumer-side deduplication key.
    pub fn enqueue(&self, event: &DomainEvent) -> Result<Uuid, CoreError> {
        let id = Uuid::now_v7();
        let payload = serde_json::to_string(&event.payload)?;
        self.repos.stage(BatchStatement::new(
            StatementKind::Insert,
            INSERT_OUTBOX,
            vec![
                SqlParam::text(id.to_string()),
                SqlParam::text(event.aggregate_id.to_string()),
                SqlParam::text(event.event_name.as_str()),
                SqlParam::text(event.occurred_at.to_rfc3339()),
                SqlParam::text(payload),
                SqlParam::text(OutboxStatus::Pending.as_str()),
                SqlParam::integer(event.occurred_at.timestamp_millis()),
            ],
        ));
        Ok(id)
    }
}
