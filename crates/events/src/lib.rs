//! Domain event model: names, state-pair payloads, records, publication.

pub mod name;
pub mod publisher;
pub mod record;

pub use name::EventName;
pub use publisher::{EventPublisher, InMemoryPublisher, PublishError, PublishedEvent};
pub use record::{DomainEvent, EventRecord, PendingEvent, StatePair};
