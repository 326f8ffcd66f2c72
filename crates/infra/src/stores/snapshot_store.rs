//! Latest-state-per-aggregate snapshot store.
//!
//! One row per aggregate, replaced in place on every mutation. The
//! snapshot's version always equals the highest event version for the
//! aggregate, because both land in the same physical transaction.

use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::Row;
use tracing::instrument;

use merchkit_core::{AggregateId, CorrelationId};

use crate::batch::{BatchStatement, SqlParam, StatementKind};
use crate::error::CoreError;
use crate::stores::event_store::parse_uuid;
use crate::uow::Repositories;

const UPSERT_SNAPSHOT: &str = "INSERT INTO snapshots \
    (aggregate_id, correlation_id, version, payload_json) VALUES (?, ?, ?, ?) \
    ON CONFLICT (aggregate_id) DO UPDATE SET \
    correlation_id = excluded.correlation_id, \
    version = excluded.version, \
    payload_json = excluded.payload_json";

/// A snapshot row as loaded from storage.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub aggregate_id: AggregateId,
    pub correlation_id: CorrelationId,
    pub version: u64,
    pub payload: serde_json::Value,
}

impl Snapshot {
    /// Deserialize the payload into a typed aggregate state.
    pub fn state<S: DeserializeOwned>(&self) -> Result<S, CoreError> {
        serde_json::from_value(self.payload.clone())
            .map_err(|e| CoreError::storage(format!("corrupt snapshot payload: {e}")))
    }
}

pub struct SnapshotStore {
    repos: Repositories,
}

impl SnapshotStore {
    pub(crate) fn new(repos: Repositories) -> Self {
        Self { repos }
    }

    /// Immediate read of the latest committed snapshot.
    #[instrument(skip(self), fields(aggregate_id = %aggregate_id), err)]
    pub async fn get(&self, aggregate_id: AggregateId) -> Result<Option<Snapshot>, CoreError> {
        let row = sqlx::query(
            "SELECT aggregate_id, correlation_id, version, payload_json \
             FROM snapshots WHERE aggregate_id = ?",
        )
        .bind(aggregate_id.to_string())
        .fetch_optional(self.repos.pool())
        .await?;

        match row {
            Some(row) => {
                let aggregate_id: String = row.try_get("aggregate_id")?;
                let correlation_id: String = row.try_get("correlation_id")?;
                let version: i64 = row.try_get("version")?;
                let payload_json: String = row.try_get("payload_json")?;
                Ok(Some(Snapshot {
                    aggregate_id: parse_uuid(&aggregate_id).map(AggregateId::from_uuid)?,
                    correlation_id: parse_uuid(&correlation_id).map(CorrelationId::from_uuid)?,
                    version: version as u64,
                    payload: serde_json::from_str(&payload_json)?,
                }))
            }
            None => Ok(None),
        }
    }

    /// Stage a replace-in-place of the aggregate's snapshot.
    pub fn save<S: Serialize>(
        &self,
        aggregate_id: AggregateId,
        correlation_id: CorrelationId,
        version: u64,
        state: &S,
    ) -> Result<(), CoreError> {
        let payload = serde_json::to_string(state)?;
        self.repos.stage(BatchStatement::new(
            StatementKind::Upsert,
            UPSERT_SNAPSHOT,
            vec![
                SqlParam::text(aggregate_id.to_string()),
                SqlParam::text(correlation_id.to_string()),
                SqlParam::integer(version as i64),
                SqlParam::text(payload),
            ],
        ));
        Ok(())
    }
}
