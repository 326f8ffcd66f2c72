//! Variant view projector.

use merchkit_catalog::VariantState;
use merchkit_events::DomainEvent;

use crate::error::CoreError;
use crate::uow::Repositories;

/// Mirror the event's `new_state` into the variants view, keyed on
/// `aggregate_id`.
pub(crate) fn project(event: &DomainEvent, repos: &Repositories) -> Result<(), CoreError> {
    let state: VariantState = serde_json::from_value(event.payload.new_state.clone())?;
    repos.variants().save(&state)
}
