//! Collection command services.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use merchkit_catalog::{Collection, CollectionState};
use merchkit_core::{AggregateId, AggregateRoot, DomainError};

use crate::commands::{
    ensure_new_aggregate, load_state, persist, require_version, CommandHeader, CommandReceipt,
    CoreContext,
};
use crate::error::CoreError;

pub(crate) async fn create_collection(
    ctx: &CoreContext,
    header: CommandHeader,
    collection_id: AggregateId,
    title: String,
    slug: String,
    description: String,
) -> Result<CommandReceipt, CoreError> {
    let router = Arc::clone(&ctx.router);
    ctx.uow
        .with_transaction(move |repos| async move {
            ensure_new_aggregate(&repos, collection_id, "collection").await?;

            let now = Utc::now();
            let mut collection = Collection::create(
                collection_id,
                header.correlation_id,
                title,
                slug,
                description,
                now,
            )?;
            persist(
                &repos,
                &router,
                &header,
                collection_id,
                collection.version(),
                &collection.to_state(),
                collection.take_uncommitted(),
            )?;
            Ok(CommandReceipt {
                aggregate_id: collection_id,
                version: collection.version(),
            })
        })
        .await
}

pub(crate) async fn update_details(
    ctx: &CoreContext,
    header: CommandHeader,
    collection_id: AggregateId,
    expected_version: u64,
    title: String,
    description: String,
) -> Result<CommandReceipt, CoreError> {
    mutate(ctx, header, collection_id, expected_version, move |collection, now| {
        collection.update_details(title, description, now)
    })
    .await
}

pub(crate) async fn publish(
    ctx: &CoreContext,
    header: CommandHeader,
    collection_id: AggregateId,
    expected_version: u64,
) -> Result<CommandReceipt, CoreError> {
    mutate(ctx, header, collection_id, expected_version, |collection, now| {
        collection.publish(now)
    })
    .await
}

pub(crate) async fn archive(
    ctx: &CoreContext,
    header: CommandHeader,
    collection_id: AggregateId,
    expected_version: u64,
) -> Result<CommandReceipt, CoreError> {
    mutate(ctx, header, collection_id, expected_version, |collection, now| {
        collection.archive(now)
    })
    .await
}

pub(crate) async fn add_product(
    ctx: &CoreContext,
    header: CommandHeader,
    collection_id: AggregateId,
    expected_version: u64,
    product_id: AggregateId,
) -> Result<CommandReceipt, CoreError> {
    mutate(ctx, header, collection_id, expected_version, move |collection, now| {
        collection.add_product(product_id, now)
    })
    .await
}

pub(crate) async fn remove_product(
    ctx: &CoreContext,
    header: CommandHeader,
    collection_id: AggregateId,
    expected_version: u64,
    product_id: AggregateId,
) -> Result<CommandReceipt, CoreError> {
    mutate(ctx, header, collection_id, expected_version, move |collection, now| {
        collection.remove_product(product_id, now)
    })
    .await
}

/// Load → version check → domain mutation → persist, in one scope.
async fn mutate<F>(
    ctx: &CoreContext,
    header: CommandHeader,
    collection_id: AggregateId,
    expected_version: u64,
    apply: F,
) -> Result<CommandReceipt, CoreError>
where
    F: FnOnce(&mut Collection, DateTime<Utc>) -> Result<(), DomainError>,
{
    let router = Arc::clone(&ctx.router);
    ctx.uow
        .with_transaction(move |repos| async move {
            let (state, version) = load_state::<CollectionState>(&repos, collection_id)
                .await?
                .ok_or_else(|| {
                    CoreError::NotFound(format!("collection {collection_id} not found"))
                })?;
            require_version(expected_version, version)?;

            let mut collection = Collection::load_from_snapshot(state);
            apply(&mut collection, Utc::now())?;
            persist(
                &repos,
                &router,
                &header,
                collection_id,
                collection.version(),
                &collection.to_state(),
                collection.take_uncommitted(),
            )?;
            Ok(CommandReceipt {
                aggregate_id: collection_id,
                version: collection.version(),
            })
        })
        .await
}
