//! Collection catalog view.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::Row;
use tracing::instrument;

use merchkit_catalog::CollectionState;
use merchkit_core::{AggregateId, AggregateStatus, CorrelationId};

use crate::batch::{BatchStatement, SqlParam, StatementKind};
use crate::error::CoreError;
use crate::read_model::{parse_status, push_paging, push_status_filter};
use crate::stores::event_store::{parse_timestamp, parse_uuid};
use crate::uow::Repositories;

const UPSERT_COLLECTION: &str = "INSERT INTO collections \
    (aggregate_id, correlation_id, version, title, slug, description, product_ids_json, status, published_at, created_at, updated_at) \
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
    ON CONFLICT (aggregate_id) DO UPDATE SET \
    correlation_id = excluded.correlation_id, \
    version = excluded.version, \
    title = excluded.title, \
    slug = excluded.slug, \
    description = excluded.description, \
    product_ids_json = excluded.product_ids_json, \
    status = excluded.status, \
    published_at = excluded.published_at, \
    updated_at = excluded.updated_at";

const SELECT_COLLECTION: &str = "SELECT aggregate_id, correlation_id, version, title, slug, \
    description, product_ids_json, status, published_at, created_at, updated_at FROM collections";

/// One denormalised collection row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionRecord {
    pub aggregate_id: AggregateId,
    pub correlation_id: CorrelationId,
    pub version: u64,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub product_ids: Vec<AggregateId>,
    pub status: AggregateStatus,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct CollectionRepository {
    repos: Repositories,
}

impl CollectionRepository {
    pub(crate) fn new(repos: Repositories) -> Self {
        Self { repos }
    }

    /// Stage an upsert mirroring the given aggregate state.
    pub fn save(&self, state: &CollectionState) -> Result<(), CoreError> {
        self.repos.stage(BatchStatement::new(
            StatementKind::Upsert,
            UPSERT_COLLECTION,
            vec![
                SqlParam::text(state.meta.id.to_string()),
                SqlParam::text(state.meta.correlation_id.to_string()),
                SqlParam::integer(state.meta.version as i64),
                SqlParam::text(state.title.clone()),
                SqlParam::text(state.slug.clone()),
                SqlParam::text(state.description.clone()),
                SqlParam::text(serde_json::to_string(&state.product_ids)?),
                SqlParam::text(state.meta.status.as_str()),
                SqlParam::opt_text(state.meta.published_at.map(|t| t.to_rfc3339())),
                SqlParam::text(state.meta.created_at.to_rfc3339()),
                SqlParam::text(state.meta.updated_at.to_rfc3339()),
            ],
        ));
        Ok(())
    }

    #[instrument(skip(self), fields(aggregate_id = %aggregate_id), err)]
    pub async fn get(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Option<CollectionRecord>, CoreError> {
        let sql = format!("{SELECT_COLLECTION} WHERE aggregate_id = ?");
        let row = sqlx::query(&sql)
            .bind(aggregate_id.to_string())
            .fetch_optional(self.repos.pool())
            .await?;
        row.as_ref().map(record_from_row).transpose()
    }

    pub async fn list(
        &self,
        status: Option<AggregateStatus>,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<CollectionRecord>, CoreError> {
        let mut sql = format!("{SELECT_COLLECTION} WHERE 1=1");
        let mut params = Vec::new();
        push_status_filter(&mut sql, &mut params, status);
        sql.push_str(" ORDER BY created_at, aggregate_id");
        push_paging(&mut sql, &mut params, limit, offset);

        let query = crate::batch::bind_params(sqlx::query(&sql), &params);
        let rows = query.fetch_all(self.repos.pool()).await?;
        rows.iter().map(record_from_row).collect()
    }
}

fn record_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<CollectionRecord, CoreError> {
    let aggregate_id: String = row.try_get("aggregate_id")?;
    let correlation_id: String = row.try_get("correlation_id")?;
    let version: i64 = row.try_get("version")?;
    let title: String = row.try_get("title")?;
    let slug: String = row.try_get("slug")?;
    let description: String = row.try_get("description")?;
    let product_ids_json: String = row.try_get("product_ids_json")?;
    let status: String = row.try_get("status")?;
    let published_at: Option<String> = row.try_get("published_at")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(CollectionRecord {
        aggregate_id: parse_uuid(&aggregate_id).map(AggregateId::from_uuid)?,
        correlation_id: parse_uuid(&correlation_id).map(CorrelationId::from_uuid)?,
        version: version as u64,
        title,
        slug,
        description,
        product_ids: serde_json::from_str(&product_ids_json)?,
        status: parse_status(&status)?,
        published_at: published_at.as_deref().map(parse_timestamp).transpose()?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}
