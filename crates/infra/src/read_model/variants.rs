//! Variant catalog view.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::Row;
use tracing::instrument;

use merchkit_catalog::{DigitalAsset, ImageCollection, VariantKind, VariantState};
use merchkit_core::{AggregateId, AggregateStatus, CorrelationId};

use crate::batch::{BatchStatement, SqlParam, StatementKind};
use crate::error::CoreError;
use crate::read_model::{parse_status, push_paging, push_status_filter};
use crate::stores::event_store::{parse_timestamp, parse_uuid};
use crate::uow::Repositories;

const UPSERT_VARIANT: &str = "INSERT INTO variants \
    (aggregate_id, correlation_id, version, product_id, sku, title, price_cents, inventory_quantity, \
     options_json, images_json, kind, digital_assets_json, status, published_at, created_at, updated_at) \
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
    ON CONFLICT (aggregate_id) DO UPDATE SET \
    correlation_id = excluded.correlation_id, \
    version = excluded.version, \
    product_id = excluded.product_id, \
    sku = excluded.sku, \
    title = excluded.title, \
    price_cents = excluded.price_cents, \
    inventory_quantity = excluded.inventory_quantity, \
    options_json = excluded.options_json, \
    images_json = excluded.images_json, \
    kind = excluded.kind, \
    digital_assets_json = excluded.digital_assets_json, \
    status = excluded.status, \
    published_at = excluded.published_at, \
    updated_at = excluded.updated_at";

const SELECT_VARIANT: &str = "SELECT aggregate_id, correlation_id, version, product_id, sku, title, \
    price_cents, inventory_quantity, options_json, images_json, kind, digital_assets_json, status, \
    published_at, created_at, updated_at FROM variants";

/// One denormalised variant row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariantRecord {
    pub aggregate_id: AggregateId,
    pub correlation_id: CorrelationId,
    pub version: u64,
    pub product_id: AggregateId,
    pub sku: String,
    pub title: String,
    pub price_cents: i64,
    pub inventory_quantity: i64,
    pub options: BTreeMap<String, String>,
    pub images: ImageCollection,
    pub kind: VariantKind,
    pub digital_assets: Vec<DigitalAsset>,
    pub status: AggregateStatus,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct VariantRepository {
    repos: Repositories,
}

impl VariantRepository {
    pub(crate) fn new(repos: Repositories) -> Self {
        Self { repos }
    }

    /// Stage an upsert mirroring the given aggregate state.
    pub fn save(&self, state: &VariantState) -> Result<(), CoreError> {
        let kind = match state.kind {
            VariantKind::Standard => "standard",
            VariantKind::DigitalDownload => "digital_download",
        };
        self.repos.stage(BatchStatement::new(
            StatementKind::Upsert,
            UPSERT_VARIANT,
            vec![
                SqlParam::text(state.meta.id.to_string()),
                SqlParam::text(state.meta.correlation_id.to_string()),
                SqlParam::integer(state.meta.version as i64),
                SqlParam::text(state.product_id.to_string()),
                SqlParam::text(state.sku.clone()),
                SqlParam::text(state.title.clone()),
                SqlParam::integer(state.price_cents),
                SqlParam::integer(state.inventory_quantity),
                SqlParam::text(serde_json::to_string(&state.options)?),
                SqlParam::text(serde_json::to_string(&state.images)?),
                SqlParam::text(kind),
                SqlParam::text(serde_json::to_string(&state.digital.assets)?),
                SqlParam::text(state.meta.status.as_str()),
                SqlParam::opt_text(state.meta.published_at.map(|t| t.to_rfc3339())),
                SqlParam::text(state.meta.created_at.to_rfc3339()),
                SqlParam::text(state.meta.updated_at.to_rfc3339()),
            ],
        ));
        Ok(())
    }

    #[instrument(skip(self), fields(aggregate_id = %aggregate_id), err)]
    pub async fn get(&self, aggregate_id: AggregateId) -> Result<Option<VariantRecord>, CoreError> {
        let sql = format!("{SELECT_VARIANT} WHERE aggregate_id = ?");
        let row = sqlx::query(&sql)
            .bind(aggregate_id.to_string())
            .fetch_optional(self.repos.pool())
            .await?;
        row.as_ref().map(record_from_row).transpose()
    }

    pub async fn list(
        &self,
        product_id: Option<AggregateId>,
        status: Option<AggregateStatus>,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<VariantRecord>, CoreError> {
        let mut sql = format!("{SELECT_VARIANT} WHERE 1=1");
        let mut params = Vec::new();
        if let Some(product_id) = product_id {
            sql.push_str(" AND product_id = ?");
            params.push(SqlParam::text(product_id.to_string()));
        }
        push_status_filter(&mut sql, &mut params, status);
        sql.push_str(" ORDER BY created_at, aggregate_id");
        push_paging(&mut sql, &mut params, limit, offset);

        let query = crate::batch::bind_params(sqlx::query(&sql), &params);
        let rows = query.fetch_all(self.repos.pool()).await?;
        rows.iter().map(record_from_row).collect()
    }
}

fn record_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<VariantRecord, CoreError> {
    let aggregate_id: String = row.try_get("aggregate_id")?;
    let correlation_id: String = row.try_get("correlation_id")?;
    let version: i64 = row.try_get("version")?;
    let product_id: String = row.try_get("product_id")?;
    let sku: String = row.try_get("sku")?;
    let title: String = row.try_get("title")?;
    let price_cents: i64 = row.try_get("price_cents")?;
    let inventory_quantity: i64 = row.try_get("inventory_quantity")?;
    let options_json: String = row.try_get("options_json")?;
    let images_json: String = row.try_get("images_json")?;
    let kind: String = row.try_get("kind")?;
    let digital_assets_json: String = row.try_get("digital_assets_json")?;
    let status: String = row.try_get("status")?;
    let published_at: Option<String> = row.try_get("published_at")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    let kind = match kind.as_str() {
        "standard" => VariantKind::Standard,
        "digital_download" => VariantKind::DigitalDownload,
        other => {
            return Err(CoreError::storage(format!(
                "corrupt variant kind column: {other}"
            )));
        }
    };

    Ok(VariantRecord {
        aggregate_id: parse_uuid(&aggregate_id).map(AggregateId::from_uuid)?,
        correlation_id: parse_uuid(&correlation_id).map(CorrelationId::from_uuid)?,
        version: version as u64,
        product_id: parse_uuid(&product_id).map(AggregateId::from_uuid)?,
        sku,
        title,
        price_cents,
        inventory_quantity,
        options: serde_json::from_str(&options_json)?,
        images: serde_json::from_str(&images_json)?,
        kind,
        digital_assets: serde_json::from_str(&digital_assets_json)?,
        status: parse_status(&status)?,
        published_at: published_at.as_deref().map(parse_timestamp).transpose()?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}
