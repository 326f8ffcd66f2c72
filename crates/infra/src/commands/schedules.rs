//! Schedule command services.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use merchkit_catalog::{Schedule, ScheduleState};
use merchkit_core::{AggregateId, AggregateRoot, DomainError};

use crate::commands::{
    ensure_new_aggregate, load_state, persist, require_version, CommandHeader, CommandReceipt,
    CoreContext,
};
use crate::error::CoreError;

pub(crate) async fn create_schedule(
    ctx: &CoreContext,
    header: CommandHeader,
    schedule_id: AggregateId,
    name: String,
) -> Result<CommandReceipt, CoreError> {
    let router = Arc::clone(&ctx.router);
    ctx.uow
        .with_transaction(move |repos| async move {
            ensure_new_aggregate(&repos, schedule_id, "schedule").await?;

            let now = Utc::now();
            let mut schedule = Schedule::create(schedule_id, header.correlation_id, name, now)?;
            persist(
                &repos,
                &router,
                &header,
                schedule_id,
                schedule.version(),
                &schedule.to_state(),
                schedule.take_uncommitted(),
            )?;
            Ok(CommandReceipt {
                aggregate_id: schedule_id,
                version: schedule.version(),
            })
        })
        .await
}

pub(crate) async fn publish(
    ctx: &CoreContext,
    header: CommandHeader,
    schedule_id: AggregateId,
    expected_version: u64,
) -> Result<CommandReceipt, CoreError> {
    mutate(ctx, header, schedule_id, expected_version, |schedule, now| {
        schedule.publish(now)
    })
    .await
}

pub(crate) async fn archive(
    ctx: &CoreContext,
    header: CommandHeader,
    schedule_id: AggregateId,
    expected_version: u64,
) -> Result<CommandReceipt, CoreError> {
    mutate(ctx, header, schedule_id, expected_version, |schedule, now| {
        schedule.archive(now)
    })
    .await
}

#[allow(clippy::too_many_arguments)]
pub(crate) async fn add_entry(
    ctx: &CoreContext,
    header: CommandHeader,
    schedule_id: AggregateId,
    expected_version: u64,
    entry_id: AggregateId,
    label: String,
    starts_at: DateTime<Utc>,
    ends_at: Option<DateTime<Utc>>,
) -> Result<CommandReceipt, CoreError> {
    mutate(ctx, header, schedule_id, expected_version, move |schedule, now| {
        match ends_at {
            Some(ends_at) => schedule.add_paired_entry(entry_id, label, starts_at, ends_at, now),
            None => schedule.add_single_entry(entry_id, label, starts_at, now),
        }
    })
    .await
}

pub(crate) async fn activate_entry(
    ctx: &CoreContext,
    header: CommandHeader,
    schedule_id: AggregateId,
    expected_version: u64,
    entry_id: AggregateId,
) -> Result<CommandReceipt, CoreError> {
    mutate(ctx, header, schedule_id, expected_version, move |schedule, now| {
        schedule.activate_entry(entry_id, now)
    })
    .await
}

pub(crate) async fn complete_entry(
    ctx: &CoreContext,
    header: CommandHeader,
    schedule_id: AggregateId,
    expected_version: u64,
    entry_id: AggregateId,
) -> Result<CommandReceipt, CoreError> {
    mutate(ctx, header, schedule_id, expected_version, move |schedule, now| {
        schedule.complete_entry(entry_id, now)
    })
    .await
}

pub(crate) async fn cancel_entry(
    ctx: &CoreContext,
    header: CommandHeader,
    schedule_id: AggregateId,
    expected_version: u64,
    entry_id: AggregateId,
) -> Result<CommandReceipt, CoreError> {
    mutate(ctx, header, schedule_id, expected_version, move |schedule, now| {
        schedule.cancel_entry(entry_id, now)
    })
    .await
}

pub(crate) async fn cancel_schedule(
    ctx: &CoreContext,
    header: CommandHeader,
    schedule_id: AggregateId,
    expected_version: u64,
) -> Result<CommandReceipt, CoreError> {
    mutate(ctx, header, schedule_id, expected_version, |schedule, now| {
        schedule.cancel(now)
    })
    .await
}

/// Load → version check → domain mutation → persist, in one scope.
async fn mutate<F>(
    ctx: &CoreContext,
    header: CommandHeader,
    schedule_id: AggregateId,
    expected_version: u64,
    apply: F,
) -> Result<CommandReceipt, CoreError>
where
    F: FnOnce(&mut Schedule, DateTime<Utc>) -> Result<(), DomainError>,
{
    let router = Arc::clone(&ctx.router);
    ctx.uow
        .with_transaction(move |repos| async move {
            let (state, version) = load_state::<ScheduleState>(&repos, schedule_id)
                .await?
                .ok_or_else(|| CoreError::NotFound(format!("schedule {schedule_id} not found")))?;
            require_version(expected_version, version)?;

            let mut schedule = Schedule::load_from_snapshot(state);
            apply(&mut schedule, Utc::now())?;
            persist(
                &repos,
                &router,
                &header,
                schedule_id,
                schedule.version(),
                &schedule.to_state(),
                schedule.take_uncommitted(),
            )?;
            Ok(CommandReceipt {
                aggregate_id: schedule_id,
                version: schedule.version(),
            })
        })
        .await
}
