//! Append-only event log.
//!
//! `(aggregate_id, version)` is the primary key, so a concurrent writer that
//! slipped past the snapshot version check still fails at the physical
//! commit instead of corrupting the stream.

use core::str::FromStr;
use chrono::{DateTime, Utc};
use sqlx::Row;
use tracing::instrument;
use uuid::Uuid;

use merchkit_core::{AggregateId, CorrelationId, UserId};
use merchkit_events::{DomainEvent, EventName, EventRecord, StatePair};

use crate::batch::{BatchStatement, SqlParam, StatementKind};
use crate::error::CoreError;
use crate::uow::Repositories;

const INSERT_EVENT: &str = "INSERT INTO events \
    (aggregate_id, version, event_name, occurred_at, correlation_id, user_id, payload_json) \
    VALUES (?, ?, ?, ?, ?, ?, ?)";

pub struct EventStore {
    repos: Repositories,
}

impl EventStore {
    pub(crate) fn new(repos: Repositories) -> Self {
        Self { repos }
    }

    /// Stage an append. Executed at batcher flush time.
    pub fn append(&self, event: &DomainEvent) -> Result<(), CoreError> {
        let payload = serde_json::to_string(&event.payload)?;
        self.repos.stage(BatchStatement::new(
            StatementKind::Insert,
            INSERT_EVENT,
            vec![
                SqlParam::text(event.aggregate_id.to_string()),
                SqlParam::integer(event.version as i64),
                SqlParam::text(event.event_name.as_str()),
                SqlParam::text(event.occurred_at.to_rfc3339()),
                SqlParam::text(event.correlation_id.to_string()),
                SqlParam::text(event.user_id.to_string()),
                SqlParam::text(payload),
            ],
        ));
        Ok(())
    }

    /// Read an aggregate's full stream in version order.
    #[instrument(skip(self), fields(aggregate_id = %aggregate_id), err)]
    pub async fn events_for(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventRecord>, CoreError> {
        let rows = sqlx::query(
            "SELECT aggregate_id, version, event_name, occurred_at, correlation_id, user_id, payload_json \
             FROM events WHERE aggregate_id = ? ORDER BY version ASC",
        )
        .bind(aggregate_id.to_string())
        .fetch_all(self.repos.pool())
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(record_from_row(&row)?);
        }
        Ok(records)
    }

    pub async fn count_for(&self, aggregate_id: AggregateId) -> Result<u64, CoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM events WHERE aggregate_id = ?")
            .bind(aggregate_id.to_string())
            .fetch_one(self.repos.pool())
            .await?;
        Ok(count as u64)
    }
}

fn record_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<EventRecord, CoreError> {
    let aggregate_id: String = row.try_get("aggregate_id")?;
    let version: i64 = row.try_get("version")?;
    let event_name: String = row.try_get("event_name")?;
    let occurred_at: String = row.try_get("occurred_at")?;
    let correlation_id: String = row.try_get("correlation_id")?;
    let user_id: String = row.try_get("user_id")?;
    let payload_json: String = row.try_get("payload_json")?;

    let payload: StatePair = serde_json::from_str(&payload_json)?;
    Ok(EventRecord {
        aggregate_id: parse_uuid(&aggregate_id).map(AggregateId::from_uuid)?,
        version: version as u64,
        event_name: EventName::from_str(&event_name)
            .map_err(|e| CoreError::storage(format!("corrupt event row: {e}")))?,
        occurred_at: parse_timestamp(&occurred_at)?,
        correlation_id: parse_uuid(&correlation_id).map(CorrelationId::from_uuid)?,
        user_id: parse_uuid(&user_id).map(UserId::from_uuid)?,
        payload,
    })
}

pub(crate) fn parse_uuid(raw: &str) -> Result<Uuid, CoreError> {
    Uuid::parse_str(raw).map_err(|e| CoreError::storage(format!("corrupt uuid column: {e}")))
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, CoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CoreError::storage(format!("corrupt timestamp column: {e}")))
}
