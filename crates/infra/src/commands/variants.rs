//! Variant command services, including the cross-aggregate SKU reservation.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use merchkit_catalog::{
    DigitalAsset, ImageOp, NewVariant, SkuReservation, SkuReservationState, Variant, VariantState,
};
use merchkit_core::{AggregateId, AggregateRoot, DomainError};

use crate::commands::{
    ensure_new_aggregate, load_state, persist, require_version, CommandHeader, CommandReceipt,
    CoreContext,
};
use crate::error::CoreError;

/// Create a variant and reserve its SKU in the same logical transaction.
///
/// A taken SKU fails the whole command: no variant snapshot, no events, no
/// outbox rows survive.
pub(crate) async fn create_variant(
    ctx: &CoreContext,
    header: CommandHeader,
    variant_id: AggregateId,
    new: NewVariant,
) -> Result<CommandReceipt, CoreError> {
    let router = Arc::clone(&ctx.router);
    ctx.uow
        .with_transaction(move |repos| async move {
            ensure_new_aggregate(&repos, variant_id, "variant").await?;

            let now = Utc::now();
            let sku = new.sku.clone();
            let mut variant = Variant::create(variant_id, header.correlation_id, new, now)?;

            if !sku.trim().is_empty() {
                let reservation_id = SkuReservation::reservation_id(&sku);
                match load_state::<SkuReservationState>(&repos, reservation_id).await? {
                    None => {
                        let mut reservation =
                            SkuReservation::create(header.correlation_id, sku, variant_id, now)?;
                        persist(
                            &repos,
                            &router,
                            &header,
                            reservation_id,
                            reservation.version(),
                            &reservation.to_state(),
                            reservation.take_uncommitted(),
                        )?;
                    }
                    Some((state, _version)) => {
                        let mut reservation = SkuReservation::load_from_snapshot(state);
                        reservation.reclaim(variant_id, now)?;
                        persist(
                            &repos,
                            &router,
                            &header,
                            reservation_id,
                            reservation.version(),
                            &reservation.to_state(),
                            reservation.take_uncommitted(),
                        )?;
                    }
                }
            }

            persist(
                &repos,
                &router,
                &header,
                variant_id,
                variant.version(),
                &variant.to_state(),
                variant.take_uncommitted(),
            )?;
            Ok(CommandReceipt {
                aggregate_id: variant_id,
                version: variant.version(),
            })
        })
        .await
}

pub(crate) async fn update_details(
    ctx: &CoreContext,
    header: CommandHeader,
    variant_id: AggregateId,
    expected_version: u64,
    title: String,
    options: BTreeMap<String, String>,
) -> Result<CommandReceipt, CoreError> {
    mutate(ctx, header, variant_id, expected_version, move |variant, now| {
        variant.update_details(title, options, now)
    })
    .await
}

pub(crate) async fn update_price(
    ctx: &CoreContext,
    header: CommandHeader,
    variant_id: AggregateId,
    expected_version: u64,
    price_cents: i64,
) -> Result<CommandReceipt, CoreError> {
    mutate(ctx, header, variant_id, expected_version, move |variant, now| {
        variant.update_price(price_cents, now)
    })
    .await
}

pub(crate) async fn update_inventory(
    ctx: &CoreContext,
    header: CommandHeader,
    variant_id: AggregateId,
    expected_version: u64,
    inventory_quantity: i64,
) -> Result<CommandReceipt, CoreError> {
    mutate(ctx, header, variant_id, expected_version, move |variant, now| {
        variant.update_inventory(inventory_quantity, now)
    })
    .await
}

pub(crate) async fn update_images(
    ctx: &CoreContext,
    header: CommandHeader,
    variant_id: AggregateId,
    expected_version: u64,
    image_op: ImageOp,
) -> Result<CommandReceipt, CoreError> {
    mutate(ctx, header, variant_id, expected_version, move |variant, now| {
        variant.update_images(&image_op, now)
    })
    .await
}

pub(crate) async fn publish(
    ctx: &CoreContext,
    header: CommandHeader,
    variant_id: AggregateId,
    expected_version: u64,
) -> Result<CommandReceipt, CoreError> {
    mutate(ctx, header, variant_id, expected_version, |variant, now| {
        variant.publish(now)
    })
    .await
}

/// Archive the variant and release its SKU reservation in the same logical
/// transaction.
pub(crate) async fn archive(
    ctx: &CoreContext,
    header: CommandHeader,
    variant_id: AggregateId,
    expected_version: u64,
) -> Result<CommandReceipt, CoreError> {
    let router = Arc::clone(&ctx.router);
    ctx.uow
        .with_transaction(move |repos| async move {
            let (state, version) = load_state::<VariantState>(&repos, variant_id)
                .await?
                .ok_or_else(|| CoreError::NotFound(format!("variant {variant_id} not found")))?;
            require_version(expected_version, version)?;

            let now = Utc::now();
            let mut variant = Variant::load_from_snapshot(state);
            let sku = variant.sku().to_string();
            variant.archive(now)?;

            if !sku.trim().is_empty() {
                let reservation_id = SkuReservation::reservation_id(&sku);
                if let Some((state, _)) =
                    load_state::<SkuReservationState>(&repos, reservation_id).await?
                {
                    let mut reservation = SkuReservation::load_from_snapshot(state);
                    if !reservation.is_released() && reservation.variant_id() == variant_id {
                        reservation.release(now)?;
                        persist(
                            &repos,
                            &router,
                            &header,
                            reservation_id,
                            reservation.version(),
                            &reservation.to_state(),
                            reservation.take_uncommitted(),
                        )?;
                    }
                }
            }

            persist(
                &repos,
                &router,
                &header,
                variant_id,
                variant.version(),
                &variant.to_state(),
                variant.take_uncommitted(),
            )?;
            Ok(CommandReceipt {
                aggregate_id: variant_id,
                version: variant.version(),
            })
        })
        .await
}

pub(crate) async fn attach_digital_asset(
    ctx: &CoreContext,
    header: CommandHeader,
    variant_id: AggregateId,
    expected_version: u64,
    url: String,
    file_name: String,
) -> Result<CommandReceipt, CoreError> {
    mutate(ctx, header, variant_id, expected_version, move |variant, now| {
        variant.attach_digital_asset(
            DigitalAsset {
                asset_id: Uuid::now_v7(),
                url,
                file_name,
                attached_at: now,
            },
            now,
        )
    })
    .await
}

pub(crate) async fn detach_digital_asset(
    ctx: &CoreContext,
    header: CommandHeader,
    variant_id: AggregateId,
    expected_version: u64,
    asset_id: Uuid,
) -> Result<CommandReceipt, CoreError> {
    mutate(ctx, header, variant_id, expected_version, move |variant, now| {
        variant.detach_digital_asset(asset_id, now)
    })
    .await
}

/// Load → version check → domain mutation → persist, in one scope.
async fn mutate<F>(
    ctx: &CoreContext,
    header: CommandHeader,
    variant_id: AggregateId,
    expected_version: u64,
    apply: F,
) -> Result<CommandReceipt, CoreError>
where
    F: FnOnce(&mut Variant, DateTime<Utc>) -> Result<(), DomainError>,
{
    let router = Arc::clone(&ctx.router);
    ctx.uow
        .with_transaction(move |repos| async move {
            let (state, version) = load_state::<VariantState>(&repos, variant_id)
                .await?
                .ok_or_else(|| CoreError::NotFound(format!("variant {variant_id} not found")))?;
            require_version(expected_version, version)?;

            let mut variant = Variant::load_from_snapshot(state);
            apply(&mut variant, Utc::now())?;
            persist(
                &repos,
                &router,
                &header,
                variant_id,
                variant.version(),
                &variant.to_state(),
                variant.take_uncommitted(),
            )?;
            Ok(CommandReceipt {
                aggregate_id: variant_id,
                version: variant.version(),
            })
        })
        .await
}
