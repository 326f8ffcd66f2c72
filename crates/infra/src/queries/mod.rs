//! Query router: validated read queries dispatched to read-model selectors.

use serde::Deserialize;
use serde_json::Value as JsonValue;
use sqlx::SqlitePool;

use merchkit_core::{AggregateId, AggregateStatus};

use crate::error::{CoreError, ResultEnvelope};
use crate::uow::Repositories;

/// The closed set of read queries.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueryEnvelope {
    GetProduct {
        product_id: AggregateId,
    },
    ListProducts {
        status: Option<AggregateStatus>,
        limit: Option<i64>,
        offset: Option<i64>,
    },
    GetVariant {
        variant_id: AggregateId,
    },
    ListVariants {
        product_id: Option<AggregateId>,
        status: Option<AggregateStatus>,
        limit: Option<i64>,
        offset: Option<i64>,
    },
    GetCollection {
        collection_id: AggregateId,
    },
    ListCollections {
        status: Option<AggregateStatus>,
        limit: Option<i64>,
        offset: Option<i64>,
    },
    GetSchedule {
        schedule_id: AggregateId,
    },
    ListSchedules {
        status: Option<AggregateStatus>,
        limit: Option<i64>,
        offset: Option<i64>,
    },
}

const KNOWN_QUERY_TYPES: &[&str] = &[
    "get_product",
    "list_products",
    "get_variant",
    "list_variants",
    "get_collection",
    "list_collections",
    "get_schedule",
    "list_schedules",
];

impl QueryEnvelope {
    fn validate(&self) -> Result<(), CoreError> {
        let (limit, offset) = match self {
            QueryEnvelope::ListProducts { limit, offset, .. }
            | QueryEnvelope::ListVariants { limit, offset, .. }
            | QueryEnvelope::ListCollections { limit, offset, .. }
            | QueryEnvelope::ListSchedules { limit, offset, .. } => (*limit, *offset),
            _ => return Ok(()),
        };

        if limit.is_some_and(|l| l < 0) {
            return Err(CoreError::Validation("limit cannot be negative".to_string()));
        }
        if offset.is_some_and(|o| o < 0) {
            return Err(CoreError::Validation("offset cannot be negative".to_string()));
        }
        Ok(())
    }
}

pub struct QueryRouter {
    repos: Repositories,
}

impl QueryRouter {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            repos: Repositories::new(pool),
        }
    }

    /// Validate and run a raw query envelope, returning the result envelope
    /// callers see.
    pub async fn execute(&self, raw: JsonValue) -> ResultEnvelope<JsonValue> {
        ResultEnvelope::from_result(self.run(raw).await)
    }

    async fn run(&self, raw: JsonValue) -> Result<JsonValue, CoreError> {
        let query_type = raw
            .get("type")
            .and_then(JsonValue::as_str)
            .unwrap_or("")
            .to_string();
        if query_type.is_empty() {
            return Err(CoreError::UnknownQueryType("<missing>".to_string()));
        }
        if !KNOWN_QUERY_TYPES.contains(&query_type.as_str()) {
            return Err(CoreError::UnknownQueryType(query_type));
        }

        let envelope: QueryEnvelope = serde_json::from_value(raw)
            .map_err(|e| CoreError::Validation(e.to_string()))?;
        envelope.validate()?;

        match envelope {
            QueryEnvelope::GetProduct { product_id } => {
                let record = self
                    .repos
                    .products()
                    .get(product_id)
                    .await?
                    .ok_or_else(|| CoreError::NotFound(format!("product {product_id} not found")))?;
                Ok(serde_json::to_value(record)?)
            }
            QueryEnvelope::ListProducts {
                status,
                limit,
                offset,
            } => {
                let records = self.repos.products().list(status, limit, offset).await?;
                list_result(records)
            }
            QueryEnvelope::GetVariant { variant_id } => {
                let record = self
                    .repos
                    .variants()
                    .get(variant_id)
                    .await?
                    .ok_or_else(|| CoreError::NotFound(format!("variant {variant_id} not found")))?;
                Ok(serde_json::to_value(record)?)
            }
            QueryEnvelope::ListVariants {
                product_id,
                status,
                limit,
                offset,
            } => {
                let records = self
                    .repos
                    .variants()
                    .list(product_id, status, limit, offset)
                    .await?;
                list_result(records)
            }
            QueryEnvelope::GetCollection { collection_id } => {
                let record = self
                    .repos
                    .collections()
                    .get(collection_id)
                    .await?
                    .ok_or_else(|| {
                        CoreError::NotFound(format!("collection {collection_id} not found"))
                    })?;
                Ok(serde_json::to_value(record)?)
            }
            QueryEnvelope::ListCollections {
                status,
                limit,
                offset,
            } => {
                let records = self.repos.collections().list(status, limit, offset).await?;
                list_result(records)
            }
            QueryEnvelope::GetSchedule { schedule_id } => {
                let record = self
                    .repos
                    .schedules()
                    .get(schedule_id)
                    .await?
                    .ok_or_else(|| {
                        CoreError::NotFound(format!("schedule {schedule_id} not found"))
                    })?;
                Ok(serde_json::to_value(record)?)
            }
            QueryEnvelope::ListSchedules {
                status,
                limit,
                offset,
            } => {
                let records = self.repos.schedules().list(status, limit, offset).await?;
                list_result(records)
            }
        }
    }
}

fn list_result<T: serde::Serialize>(records: Vec<T>) -> Result<JsonValue, CoreError> {
    Ok(serde_json::json!({
        "items": serde_json::to_value(&records)?,
        "count": records.len(),
    }))
}
