//! Command envelopes and per-command service orchestration.
//!
//! Every service runs inside `with_transaction`: validate, load snapshots,
//! enforce optimistic concurrency, call the domain, then append events,
//! fan out projections, enqueue outbox entries and save snapshots — all in
//! one logical transaction. Services catch nothing; errors bubble out and
//! the unit-of-work guarantees nothing was persisted.

pub mod collections;
pub mod products;
pub mod schedules;
pub mod variants;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use merchkit_catalog::{ImageOp, ProductDetails, VariantKind};
use merchkit_core::{AggregateId, CorrelationId, UserId};
use merchkit_events::{DomainEvent, PendingEvent};

use crate::error::CoreError;
use crate::projections::ProjectionRouter;
use crate::uow::{Repositories, UnitOfWork};

/// Shared fields of every command envelope.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CommandHeader {
    /// Command id (UUIDv7), for tracing/idempotency at the caller's edge.
    pub id: Uuid,
    pub user_id: UserId,
    pub correlation_id: CorrelationId,
}

/// What a successful write returns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandReceipt {
    pub aggregate_id: AggregateId,
    pub version: u64,
}

/// The closed set of write commands.
///
/// Create commands take no `expected_version`; every other mutation
/// requires the caller's last-seen aggregate version.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommandEnvelope {
    CreateProduct {
        #[serde(flatten)]
        header: CommandHeader,
        product_id: AggregateId,
        title: String,
        #[serde(default)]
        description: String,
        #[serde(default)]
        tags: Vec<String>,
    },
    UpdateProductDetails {
        #[serde(flatten)]
        header: CommandHeader,
        product_id: AggregateId,
        expected_version: u64,
        title: String,
        #[serde(default)]
        description: String,
        #[serde(default)]
        tags: Vec<String>,
    },
    UpdateProductImages {
        #[serde(flatten)]
        header: CommandHeader,
        product_id: AggregateId,
        expected_version: u64,
        #[serde(flatten)]
        image_op: ImageOp,
    },
    PublishProduct {
        #[serde(flatten)]
        header: CommandHeader,
        product_id: AggregateId,
        expected_version: u64,
    },
    ArchiveProduct {
        #[serde(flatten)]
        header: CommandHeader,
        product_id: AggregateId,
        expected_version: u64,
    },

    CreateVariant {
        #[serde(flatten)]
        header: CommandHeader,
        variant_id: AggregateId,
        product_id: AggregateId,
        #[serde(default)]
        sku: String,
        #[serde(default)]
        title: String,
        price_cents: i64,
        inventory_quantity: i64,
        #[serde(default)]
        options: BTreeMap<String, String>,
        #[serde(default = "default_variant_kind")]
        kind: VariantKind,
    },
    UpdateVariantDetails {
        #[serde(flatten)]
        header: CommandHeader,
        variant_id: AggregateId,
        expected_version: u64,
        title: String,
        #[serde(default)]
        options: BTreeMap<String, String>,
    },
    UpdateVariantPrice {
        #[serde(flatten)]
        header: CommandHeader,
        variant_id: AggregateId,
        expected_version: u64,
        price_cents: i64,
    },
    UpdateVariantInventory {
        #[serde(flatten)]
        header: CommandHeader,
        variant_id: AggregateId,
        expected_version: u64,
        inventory_quantity: i64,
    },
    UpdateVariantImages {
        #[serde(flatten)]
        header: CommandHeader,
        variant_id: AggregateId,
        expected_version: u64,
        #[serde(flatten)]
        image_op: ImageOp,
    },
    PublishVariant {
        #[serde(flatten)]
        header: CommandHeader,
        variant_id: AggregateId,
        expected_version: u64,
    },
    ArchiveVariant {
        #[serde(flatten)]
        header: CommandHeader,
        variant_id: AggregateId,
        expected_version: u64,
    },
    AttachDigitalAsset {
        #[serde(flatten)]
        header: CommandHeader,
        variant_id: AggregateId,
        expected_version: u64,
        url: String,
        file_name: String,
    },
    DetachDigitalAsset {
        #[serde(flatten)]
        header: CommandHeader,
        variant_id: AggregateId,
        expected_version: u64,
        asset_id: Uuid,
    },

    CreateCollection {
        #[serde(flatten)]
        header: CommandHeader,
        collection_id: AggregateId,
        title: String,
        slug: String,
        #[serde(default)]
        description: String,
    },
    UpdateCollectionDetails {
        #[serde(flatten)]
        header: CommandHeader,
        collection_id: AggregateId,
        expected_version: u64,
        title: String,
        #[serde(default)]
        description: String,
    },
    PublishCollection {
        #[serde(flatten)]
        header: CommandHeader,
        collection_id: AggregateId,
        expected_version: u64,
    },
    ArchiveCollection {
        #[serde(flatten)]
        header: CommandHeader,
        collection_id: AggregateId,
        expected_version: u64,
    },
    AddCollectionProduct {
        #[serde(flatten)]
        header: CommandHeader,
        collection_id: AggregateId,
        expected_version: u64,
        product_id: AggregateId,
    },
    RemoveCollectionProduct {
        #[serde(flatten)]
        header: CommandHeader,
        collection_id: AggregateId,
        expected_version: u64,
        product_id: AggregateId,
    },

    CreateSchedule {
        #[serde(flatten)]
        header: CommandHeader,
        schedule_id: AggregateId,
        name: String,
    },
    PublishSchedule {
        #[serde(flatten)]
        header: CommandHeader,
        schedule_id: AggregateId,
        expected_version: u64,
    },
    ArchiveSchedule {
        #[serde(flatten)]
        header: CommandHeader,
        schedule_id: AggregateId,
        expected_version: u64,
    },
    AddScheduleEntry {
        #[serde(flatten)]
        header: CommandHeader,
        schedule_id: AggregateId,
        expected_version: u64,
        entry_id: AggregateId,
        label: String,
        starts_at: DateTime<Utc>,
        /// Present for paired entries, absent for single ones.
        ends_at: Option<DateTime<Utc>>,
    },
    ActivateScheduleEntry {
        #[serde(flatten)]
        header: CommandHeader,
        schedule_id: AggregateId,
        expected_version: u64,
        entry_id: AggregateId,
    },
    CompleteScheduleEntry {
        #[serde(flatten)]
        header: CommandHeader,
        schedule_id: AggregateId,
        expected_version: u64,
        entry_id: AggregateId,
    },
    CancelScheduleEntry {
        #[serde(flatten)]
        header: CommandHeader,
        schedule_id: AggregateId,
        expected_version: u64,
        entry_id: AggregateId,
    },
    CancelSchedule {
        #[serde(flatten)]
        header: CommandHeader,
        schedule_id: AggregateId,
        expected_version: u64,
    },
}

fn default_variant_kind() -> VariantKind {
    VariantKind::Standard
}

/// Everything a command service needs.
pub struct CoreContext {
    pub(crate) uow: UnitOfWork,
    pub(crate) router: Arc<ProjectionRouter>,
}

impl CoreContext {
    pub fn new(uow: UnitOfWork, router: Arc<ProjectionRouter>) -> Self {
        Self { uow, router }
    }
}

/// Route a validated envelope to its service.
pub async fn dispatch(
    ctx: &CoreContext,
    envelope: CommandEnvelope,
) -> Result<CommandReceipt, CoreError> {
    match envelope {
        CommandEnvelope::CreateProduct {
            header,
            product_id,
            title,
            description,
            tags,
        } => {
            products::create_product(
                ctx,
                header,
                product_id,
                ProductDetails {
                    title,
                    description,
                    tags,
                },
            )
            .await
        }
        CommandEnvelope::UpdateProductDetails {
            header,
            product_id,
            expected_version,
            title,
            description,
            tags,
        } => {
            products::update_details(
                ctx,
                header,
                product_id,
                expected_version,
                ProductDetails {
                    title,
                    description,
                    tags,
                },
            )
            .await
        }
        CommandEnvelope::UpdateProductImages {
            header,
            product_id,
            expected_version,
            image_op,
        } => products::update_images(ctx, header, product_id, expected_version, image_op).await,
        CommandEnvelope::PublishProduct {
            header,
            product_id,
            expected_version,
        } => products::publish(ctx, header, product_id, expected_version).await,
        CommandEnvelope::ArchiveProduct {
            header,
            product_id,
            expected_version,
        } => products::archive(ctx, header, product_id, expected_version).await,

        CommandEnvelope::CreateVariant {
            header,
            variant_id,
            product_id,
            sku,
            title,
            price_cents,
            inventory_quantity,
            options,
            kind,
        } => {
            variants::create_variant(
                ctx,
                header,
                variant_id,
                merchkit_catalog::variant::NewVariant {
                    product_id,
                    sku,
                    title,
                    price_cents,
                    inventory_quantity,
                    options,
                    kind,
                },
            )
            .await
        }
        CommandEnvelope::UpdateVariantDetails {
            header,
            variant_id,
            expected_version,
            title,
            options,
        } => variants::update_details(ctx, header, variant_id, expected_version, title, options).await,
        CommandEnvelope::UpdateVariantPrice {
            header,
            variant_id,
            expected_version,
            price_cents,
        } => variants::update_price(ctx, header, variant_id, expected_version, price_cents).await,
        CommandEnvelope::UpdateVariantInventory {
            header,
            variant_id,
            expected_version,
            inventory_quantity,
        } => {
            variants::update_inventory(ctx, header, variant_id, expected_version, inventory_quantity)
                .await
        }
        CommandEnvelope::UpdateVariantImages {
            header,
            variant_id,
            expected_version,
            image_op,
        } => variants::update_images(ctx, header, variant_id, expected_version, image_op).await,
        CommandEnvelope::PublishVariant {
            header,
            variant_id,
            expected_version,
        } => variants::publish(ctx, header, variant_id, expected_version).await,
        CommandEnvelope::ArchiveVariant {
            header,
            variant_id,
            expected_version,
        } => variants::archive(ctx, header, variant_id, expected_version).await,
        CommandEnvelope::AttachDigitalAsset {
            header,
            variant_id,
            expected_version,
            url,
            file_name,
        } => {
            variants::attach_digital_asset(ctx, header, variant_id, expected_version, url, file_name)
                .await
        }
        CommandEnvelope::DetachDigitalAsset {
            header,
            variant_id,
            expected_version,
            asset_id,
        } => variants::detach_digital_asset(ctx, header, variant_id, expected_version, asset_id).await,

        CommandEnvelope::CreateCollection {
            header,
            collection_id,
            title,
            slug,
            description,
        } => collections::create_collection(ctx, header, collection_id, title, slug, description).await,
        CommandEnvelope::UpdateCollectionDetails {
            header,
            collection_id,
            expected_version,
            title,
            description,
        } => {
            collections::update_details(ctx, header, collection_id, expected_version, title, description)
                .await
        }
        CommandEnvelope::PublishCollection {
            header,
            collection_id,
            expected_version,
        } => collections::publish(ctx, header, collection_id, expected_version).await,
        CommandEnvelope::ArchiveCollection {
            header,
            collection_id,
            expected_version,
        } => collections::archive(ctx, header, collection_id, expected_version).await,
        CommandEnvelope::AddCollectionProduct {
            header,
            collection_id,
            expected_version,
            product_id,
        } => collections::add_product(ctx, header, collection_id, expected_version, product_id).await,
        CommandEnvelope::RemoveCollectionProduct {
            header,
            collection_id,
            expected_version,
            product_id,
        } => collections::remove_product(ctx, header, collection_id, expected_version, product_id).await,

        CommandEnvelope::CreateSchedule {
            header,
            schedule_id,
            name,
        } => schedules::create_schedule(ctx, header, schedule_id, name).await,
        CommandEnvelope::PublishSchedule {
            header,
            schedule_id,
            expected_version,
        } => schedules::publish(ctx, header, schedule_id, expected_version).await,
        CommandEnvelope::ArchiveSchedule {
            header,
            schedule_id,
            expected_version,
        } => schedules::archive(ctx, header, schedule_id, expected_version).await,
        CommandEnvelope::AddScheduleEntry {
            header,
            schedule_id,
            expected_version,
            entry_id,
            label,
            starts_at,
            ends_at,
        } => {
            schedules::add_entry(
                ctx,
                header,
                schedule_id,
                expected_version,
                entry_id,
                label,
                starts_at,
                ends_at,
            )
            .await
        }
        CommandEnvelope::ActivateScheduleEntry {
            header,
            schedule_id,
            expected_version,
            entry_id,
        } => schedules::activate_entry(ctx, header, schedule_id, expected_version, entry_id).await,
        CommandEnvelope::CompleteScheduleEntry {
            header,
            schedule_id,
            expected_version,
            entry_id,
        } => schedules::complete_entry(ctx, header, schedule_id, expected_version, entry_id).await,
        CommandEnvelope::CancelScheduleEntry {
            header,
            schedule_id,
            expected_version,
            entry_id,
        } => schedules::cancel_entry(ctx, header, schedule_id, expected_version, entry_id).await,
        CommandEnvelope::CancelSchedule {
            header,
            schedule_id,
            expected_version,
        } => schedules::cancel_schedule(ctx, header, schedule_id, expected_version).await,
    }
}

/// Append, project and enqueue every pending event, then save the snapshot.
/// All of it lands in the scope's single logical transaction.
pub(crate) fn persist<S: Serialize>(
    repos: &Repositories,
    router: &ProjectionRouter,
    header: &CommandHeader,
    aggregate_id: AggregateId,
    version: u64,
    state: &S,
    pending: Vec<PendingEvent<S>>,
) -> Result<(), CoreError> {
    for pending_event in pending {
        let event = DomainEvent::from_pending(
            aggregate_id,
            header.correlation_id,
            header.user_id,
            pending_event,
        )?;
        repos.events().append(&event)?;
        router.handle(&event, repos)?;
        repos.outbox().enqueue(&event)?;
    }
    repos
        .snapshots()
        .save(aggregate_id, header.correlation_id, version, state)?;
    Ok(())
}

/// Load a typed aggregate state and its snapshot version.
pub(crate) async fn load_state<S: DeserializeOwned>(
    repos: &Repositories,
    aggregate_id: AggregateId,
) -> Result<Option<(S, u64)>, CoreError> {
    match repos.snapshots().get(aggregate_id).await? {
        Some(snapshot) => {
            let state = snapshot.state()?;
            Ok(Some((state, snapshot.version)))
        }
        None => Ok(None),
    }
}

/// The optimistic-concurrency gate.
pub(crate) fn require_version(expected: u64, found: u64) -> Result<(), CoreError> {
    if expected != found {
        return Err(CoreError::ConcurrencyConflict { expected, found });
    }
    Ok(())
}

/// Create commands require no snapshot — and refuse an existing one.
pub(crate) async fn ensure_new_aggregate(
    repos: &Repositories,
    aggregate_id: AggregateId,
    kind: &str,
) -> Result<(), CoreError> {
    if repos.snapshots().get(aggregate_id).await?.is_some() {
        return Err(CoreError::DomainRule(format!(
            "{kind} {aggregate_id} already exists"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_parses_from_tagged_json() {
        let raw = serde_json::json!({
            "type": "create_variant",
            "id": Uuid::now_v7(),
            "user_id": Uuid::now_v7(),
            "correlation_id": Uuid::now_v7(),
            "variant_id": Uuid::now_v7(),
            "product_id": Uuid::now_v7(),
            "sku": "SKU-1",
            "price_cents": 1000,
            "inventory_quantity": 5,
            "options": {"Size": "M"}
        });

        let envelope: CommandEnvelope = serde_json::from_value(raw).unwrap();
        match envelope {
            CommandEnvelope::CreateVariant { sku, kind, .. } => {
                assert_eq!(sku, "SKU-1");
                assert_eq!(kind, VariantKind::Standard);
            }
            other => panic!("unexpected envelope: {other:?}"),
        }
    }

    #[test]
    fn mutation_envelopes_require_expected_version() {
        let raw = serde_json::json!({
            "type": "publish_variant",
            "id": Uuid::now_v7(),
            "user_id": Uuid::now_v7(),
            "correlation_id": Uuid::now_v7(),
            "variant_id": Uuid::now_v7()
        });
        assert!(serde_json::from_value::<CommandEnvelope>(raw).is_err());
    }

    #[test]
    fn unknown_command_type_is_rejected() {
        let raw = serde_json::json!({
            "type": "explode_variant",
            "id": Uuid::now_v7(),
            "user_id": Uuid::now_v7(),
            "correlation_id": Uuid::now_v7()
        });
        assert!(serde_json::from_value::<CommandEnvelope>(raw).is_err());
    }

    #[test]
    fn image_op_flattens_into_the_envelope() {
        let raw = serde_json::json!({
            "type": "update_variant_images",
            "id": Uuid::now_v7(),
            "user_id": Uuid::now_v7(),
            "correlation_id": Uuid::now_v7(),
            "variant_id": Uuid::now_v7(),
            "expected_version": 3,
            "op": "reorder",
            "ordered_image_ids": [Uuid::now_v7(), Uuid::now_v7()]
        });

        let envelope: CommandEnvelope = serde_json::from_value(raw).unwrap();
        match envelope {
            CommandEnvelope::UpdateVariantImages { image_op, .. } => {
                assert!(matches!(image_op, ImageOp::Reorder { .. }));
            }
            other => panic!("unexpected envelope: {other:?}"),
        }
    }
}
