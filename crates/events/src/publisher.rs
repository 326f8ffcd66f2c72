//! External event publication seam.
//!
//! The outbox processor hands committed events to an [`EventPublisher`].
//! Delivery is at-least-once: a publisher may see the same event id more
//! than once and consumers deduplicate on it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use thiserror::Error;
use uuid::Uuid;

use merchkit_core::AggregateId;

use crate::name::EventName;

/// The externally-visible shape of a delivered event.
///
/// `id` is the outbox entry id and the consumer-side deduplication key; it is
/// stable across delivery retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedEvent {
    pub id: Uuid,
    pub aggregate_id: AggregateId,
    pub event_name: EventName,
    pub occurred_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

/// A failed delivery attempt. Transient by definition; the outbox retry
/// machinery decides when to give up.
#[derive(Debug, Error, Clone)]
#[error("delivery failed: {0}")]
pub struct PublishError(pub String);

impl PublishError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &PublishedEvent) -> Result<(), PublishError>;
}

/// Publisher that records deliveries in memory. For tests and local runs.
#[derive(Debug, Default)]
pub struct InMemoryPublisher {
    delivered: Mutex<Vec<PublishedEvent>>,
}

impl InMemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delivered(&self) -> Vec<PublishedEvent> {
        self.delivered.lock().expect("publisher lock poisoned").clone()
    }

    pub fn delivered_count(&self) -> usize {
        self.delivered.lock().expect("publisher lock poisoned").len()
    }
}

#[async_trait]
impl EventPublisher for InMemoryPublisher {
    async fn publish(&self, event: &PublishedEvent) -> Result<(), PublishError> {
        self.delivered
            .lock()
            .map_err(|_| PublishError::new("publisher lock poisoned"))?
            .push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_publisher_records_deliveries() {
        let publisher = InMemoryPublisher::new();
        let event = PublishedEvent {
            id: Uuid::now_v7(),
            aggregate_id: AggregateId::new(),
            event_name: EventName::ProductCreated,
            occurred_at: Utc::now(),
            payload: serde_json::json!({"new_state": {}}),
        };

        publisher.publish(&event).await.unwrap();
        publisher.publish(&event).await.unwrap();

        let delivered = publisher.delivered();
        assert_eq!(delivered.len(), 2);
        assert_eq!(delivered[0].id, event.id);
    }
}
