//! Product command services.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use merchkit_catalog::{ImageOp, Product, ProductDetails, ProductState};
use merchkit_core::{AggregateId, AggregateRoot, DomainError};

use crate::commands::{
    ensure_new_aggregate, load_state, persist, require_version, CommandHeader, CommandReceipt,
    CoreContext,
};
use crate::error::CoreError;

pub(crate) async fn create_product(
    ctx: &CoreContext,
    header: CommandHeader,
    product_id: AggregateId,
    details: ProductDetails,
) -> Result<CommandReceipt, CoreError> {
    let router = Arc::clone(&ctx.router);
    ctx.uow
        .with_transaction(move |repos| async move {
            ensure_new_aggregate(&repos, product_id, "product").await?;

            let now = Utc::now();
            let mut product = Product::create(product_id, header.correlation_id, details, now)?;
            persist(
                &repos,
                &router,
                &header,
                product_id,
                product.version(),
                &product.to_state(),
                product.take_uncommitted(),
            )?;
            Ok(CommandReceipt {
                aggregate_id: product_id,
                version: product.version(),
            })
        })
        .await
}

pub(crate) async fn update_details(
    ctx: &CoreContext,
    header: CommandHeader,
    product_id: AggregateId,
    expected_version: u64,
    details: ProductDetails,
) -> Result<CommandReceipt, CoreError> {
    mutate(ctx, header, product_id, expected_version, move |product, now| {
        product.update_details(details, now)
    })
    .await
}

pub(crate) async fn update_images(
    ctx: &CoreContext,
    header: CommandHeader,
    product_id: AggregateId,
    expected_version: u64,
    image_op: ImageOp,
) -> Result<CommandReceipt, CoreError> {
    mutate(ctx, header, product_id, expected_version, move |product, now| {
        product.update_images(&image_op, now)
    })
    .await
}

pub(crate) async fn publish(
    ctx: &CoreContext,
    header: CommandHeader,
    product_id: AggregateId,
    expected_version: u64,
) -> Result<CommandReceipt, CoreError> {
    mutate(ctx, header, product_id, expected_version, |product, now| {
        product.publish(now)
    })
    .await
}

pub(crate) async fn archive(
    ctx: &CoreContext,
    header: CommandHeader,
    product_id: AggregateId,
    expected_version: u64,
) -> Result<CommandReceipt, CoreError> {
    mutate(ctx, header, product_id, expected_version, |product, now| {
        product.archive(now)
    })
    .await
}

/// Load → version check → domain mutation → persist, in one scope.
async fn mutate<F>(
    ctx: &CoreContext,
    header: CommandHeader,
    product_id: AggregateId,
    expected_version: u64,
    apply: F,
) -> Result<CommandReceipt, CoreError>
where
    F: FnOnce(&mut Product, DateTime<Utc>) -> Result<(), DomainError>,
{
    let router = Arc::clone(&ctx.router);
    ctx.uow
        .with_transaction(move |repos| async move {
            let (state, version) = load_state::<ProductState>(&repos, product_id)
                .await?
                .ok_or_else(|| CoreError::NotFound(format!("product {product_id} not found")))?;
            require_version(expected_version, version)?;

            let mut product = Product::load_from_snapshot(state);
            apply(&mut product, Utc::now())?;
            persist(
                &repos,
                &router,
                &header,
                product_id,
                product.version(),
                &product.to_state(),
                product.take_uncommitted(),
            )?;
            Ok(CommandReceipt {
                aggregate_id: product_id,
                version: product.version(),
            })
        })
        .await
}
