//! Collection view projector.

use merchkit_catalog::CollectionState;
use merchkit_events::DomainEvent;

use crate::error::CoreError;
use crate::uow::Repositories;

/// Mirror the event's `new_state` into the collections view, keyed on
/// `aggregate_id`.
pub(crate) fn project(event: &DomainEvent, repos: &Repositories) -> Result<(), CoreError> {
    let state: CollectionState = serde_json::from_value(event.payload.new_state.clone())?;
    repos.collections().save(&state)
}
