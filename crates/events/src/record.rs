//! Event records: the unit of persistence and projection fan-out.
//!
//! An event's payload is the full aggregate state on both sides of the
//! mutation. Snapshots are therefore complete and replay is never required to
//! rehydrate an aggregate; the event log exists for audit and outbox fan-out.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use merchkit_core::{AggregateId, CorrelationId, UserId};

use crate::name::EventName;

/// The `{prior_state, new_state}` payload carried by every event.
///
/// `prior_state` is `None` for creation events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatePair {
    pub prior_state: Option<serde_json::Value>,
    pub new_state: serde_json::Value,
}

/// An event recorded by an aggregate but not yet serialised.
///
/// Generic over the aggregate's state struct so domain code stays free of
/// JSON concerns; command services convert these into [`DomainEvent`]s.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingEvent<S> {
    pub name: EventName,
    /// Aggregate version after the mutation (0 for creation).
    pub version: u64,
    pub occurred_at: DateTime<Utc>,
    pub prior_state: Option<S>,
    pub new_state: S,
}

/// A fully-addressed domain event, ready for persistence and projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    pub aggregate_id: AggregateId,
    pub version: u64,
    pub event_name: EventName,
    pub occurred_at: DateTime<Utc>,
    pub correlation_id: CorrelationId,
    pub user_id: UserId,
    pub payload: StatePair,
}

impl DomainEvent {
    /// Serialise a pending aggregate event into its persistable form.
    pub fn from_pending<S: Serialize>(
        aggregate_id: AggregateId,
        correlation_id: CorrelationId,
        user_id: UserId,
        pending: PendingEvent<S>,
    ) -> Result<Self, serde_json::Error> {
        let prior_state = pending
            .prior_state
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;
        let new_state = serde_json::to_value(&pending.new_state)?;

        Ok(Self {
            aggregate_id,
            version: pending.version,
            event_name: pending.name,
            occurred_at: pending.occurred_at,
            correlation_id,
            user_id,
            payload: StatePair {
                prior_state,
                new_state,
            },
        })
    }
}

/// An event as read back from the event store.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub aggregate_id: AggregateId,
    pub version: u64,
    pub event_name: EventName,
    pub occurred_at: DateTime<Utc>,
    pub correlation_id: CorrelationId,
    pub user_id: UserId,
    pub payload: StatePair,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct DummyState {
        version: u64,
        title: String,
    }

    #[test]
    fn from_pending_serialises_both_sides() {
        let pending = PendingEvent {
            name: EventName::ProductUpdated,
            version: 3,
            occurred_at: Utc::now(),
            prior_state: Some(DummyState {
                version: 2,
                title: "before".to_string(),
            }),
            new_state: DummyState {
                version: 3,
                title: "after".to_string(),
            },
        };

        let event = DomainEvent::from_pending(
            AggregateId::new(),
            CorrelationId::new(),
            UserId::new(),
            pending,
        )
        .unwrap();

        assert_eq!(event.version, 3);
        assert_eq!(event.payload.prior_state.unwrap()["title"], "before");
        assert_eq!(event.payload.new_state["title"], "after");
    }

    #[test]
    fn creation_events_have_no_prior_state() {
        let pending = PendingEvent {
            name: EventName::ProductCreated,
            version: 0,
            occurred_at: Utc::now(),
            prior_state: None::<DummyState>,
            new_state: DummyState {
                version: 0,
                title: "new".to_string(),
            },
        };

        let event = DomainEvent::from_pending(
            AggregateId::new(),
            CorrelationId::new(),
            UserId::new(),
            pending,
        )
        .unwrap();

        assert!(event.payload.prior_state.is_none());
    }
}
