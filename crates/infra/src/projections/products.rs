//! Product view projector.

use merchkit_catalog::ProductState;
use merchkit_events::DomainEvent;

use crate::error::CoreError;
use crate::uow::Repositories;

/// Mirror the event's `new_state` into the products view, keyed on
/// `aggregate_id`. Creation inserts the row; every later event upserts it.
pub(crate) fn project(event: &DomainEvent, repos: &Repositories) -> Result<(), CoreError> {
    let state: ProductState = serde_json::from_value(event.payload.new_state.clone())?;
    repos.products().save(&state)
}
