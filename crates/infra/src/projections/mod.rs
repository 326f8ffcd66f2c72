//! Projection router: applies committed domain events to read models within
//! the same logical transaction.
//!
//! Every known event name gets a projector registered at construction time;
//! dispatching an event with no registered projector is a fatal invariant
//! violation, not an error to recover from.

pub mod collections;
pub mod products;
pub mod schedules;
pub mod variants;

use std::collections::HashMap;

use merchkit_events::{DomainEvent, EventName};

use crate::error::CoreError;
use crate::uow::Repositories;

/// A projector writes one event into one or more read models using the
/// scope's staged batch. No other I/O, no globals.
type Projector = fn(&DomainEvent, &Repositories) -> Result<(), CoreError>;

pub struct ProjectionRouter {
    routes: HashMap<EventName, Projector>,
}

impl ProjectionRouter {
    pub fn new() -> Self {
        let mut router = Self {
            routes: HashMap::new(),
        };

        router.register(EventName::ProductCreated, products::project);
        router.register(EventName::ProductUpdated, products::project);
        router.register(EventName::ProductPublished, products::project);
        router.register(EventName::ProductArchived, products::project);
        router.register(EventName::ProductImagesUpdated, products::project);

        router.register(EventName::VariantCreated, variants::project);
        router.register(EventName::VariantUpdated, variants::project);
        router.register(EventName::VariantPriceUpdated, variants::project);
        router.register(EventName::VariantInventoryUpdated, variants::project);
        router.register(EventName::VariantImagesUpdated, variants::project);
        router.register(EventName::VariantPublished, variants::project);
        router.register(EventName::VariantArchived, variants::project);
        router.register(EventName::VariantDigitalAssetAttached, variants::project);
        router.register(EventName::VariantDigitalAssetDetached, variants::project);

        router.register(EventName::CollectionCreated, collections::project);
        router.register(EventName::CollectionUpdated, collections::project);
        router.register(EventName::CollectionPublished, collections::project);
        router.register(EventName::CollectionArchived, collections::project);
        router.register(EventName::CollectionProductsUpdated, collections::project);

        router.register(EventName::ScheduleCreated, schedules::project);
        router.register(EventName::SchedulePublished, schedules::project);
        router.register(EventName::ScheduleArchived, schedules::project);
        router.register(EventName::ScheduleEntryAdded, schedules::project);
        router.register(EventName::ScheduleEntryActivated, schedules::project);
        router.register(EventName::ScheduleEntryCompleted, schedules::project);
        router.register(EventName::ScheduleEntryCancelled, schedules::project);
        router.register(EventName::ScheduleCancelled, schedules::project);

        // SKU reservations have no read-model view.
        router.register(EventName::SkuCreated, skip);
        router.register(EventName::SkuReserved, skip);
        router.register(EventName::SkuReleased, skip);

        router.assert_exhaustive();
        router
    }

    fn register(&mut self, name: EventName, projector: Projector) {
        self.routes.insert(name, projector);
    }

    /// Every event name must be routable before the core starts serving.
    fn assert_exhaustive(&self) {
        for name in EventName::all() {
            assert!(
                self.routes.contains_key(name),
                "no projector registered for event {name}"
            );
        }
    }

    /// Apply the event to its read models. Panics if no projector is
    /// registered for the event's name.
    pub fn handle(&self, event: &DomainEvent, repos: &Repositories) -> Result<(), CoreError> {
        let projector = self.routes.get(&event.event_name).unwrap_or_else(|| {
            panic!("no projector registered for event {}", event.event_name)
        });
        projector(event, repos)
    }
}

impl Default for ProjectionRouter {
    fn default() -> Self {
        Self::new()
    }
}

fn skip(_event: &DomainEvent, _repos: &Repositories) -> Result<(), CoreError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn router_covers_every_event_name() {
        let router = ProjectionRouter::new();
        for name in EventName::all() {
            assert!(router.routes.contains_key(name));
        }
    }

    #[test]
    #[should_panic(expected = "no projector registered")]
    fn missing_registration_is_fatal_at_construction() {
        let mut router = ProjectionRouter {
            routes: HashMap::new(),
        };
        router.register(EventName::ProductCreated, skip);
        router.assert_exhaustive();
    }
}
