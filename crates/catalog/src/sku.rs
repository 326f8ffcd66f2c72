//! Aggregate root: SKU reservation.
//!
//! Each reserved SKU is its own aggregate whose id is derived
//! deterministically from the SKU string, so catalog-wide uniqueness falls
//! out of the snapshot store's primary key: creating a reservation for a
//! taken SKU finds an existing snapshot and fails. Reserving a SKU and
//! creating its variant happen in the same logical transaction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use merchkit_core::{AggregateId, AggregateMeta, AggregateRoot, CorrelationId, DomainError};
use merchkit_events::{EventName, PendingEvent};

/// Namespace for deriving reservation ids from SKU strings (UUIDv5).
const SKU_NAMESPACE: Uuid = Uuid::from_u128(0x6f2c_9a41_8d37_4c1e_b05a_2e71_93c4_d8f6);

/// Full serialisable reservation state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkuReservationState {
    #[serde(flatten)]
    pub meta: AggregateMeta,
    pub sku: String,
    pub variant_id: AggregateId,
    pub released: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkuReservation {
    meta: AggregateMeta,
    sku: String,
    variant_id: AggregateId,
    released: bool,
    uncommitted: Vec<PendingEvent<SkuReservationState>>,
}

impl AggregateRoot for SkuReservation {
    fn id(&self) -> AggregateId {
        self.meta.id
    }

    fn version(&self) -> u64 {
        self.meta.version
    }
}

impl SkuReservation {
    /// The aggregate id a given SKU reserves under.
    pub fn reservation_id(sku: &str) -> AggregateId {
        AggregateId::from_uuid(Uuid::new_v5(&SKU_NAMESPACE, sku.as_bytes()))
    }

    pub fn create(
        correlation_id: CorrelationId,
        sku: String,
        variant_id: AggregateId,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if sku.trim().is_empty() {
            return Err(DomainError::validation("SKU cannot be empty"));
        }

        let id = Self::reservation_id(&sku);
        let mut reservation = Self {
            meta: AggregateMeta::new(id, correlation_id, now),
            sku,
            variant_id,
            released: false,
            uncommitted: Vec::new(),
        };
        let new_state = reservation.to_state();
        reservation.uncommitted.push(PendingEvent {
            name: EventName::SkuCreated,
            version: 0,
            occurred_at: now,
            prior_state: None,
            new_state,
        });
        Ok(reservation)
    }

    pub fn load_from_snapshot(state: SkuReservationState) -> Self {
        Self {
            meta: state.meta,
            sku: state.sku,
            variant_id: state.variant_id,
            released: state.released,
            uncommitted: Vec::new(),
        }
    }

    pub fn to_state(&self) -> SkuReservationState {
        SkuReservationState {
            meta: self.meta.clone(),
            sku: self.sku.clone(),
            variant_id: self.variant_id,
            released: self.released,
        }
    }

    pub fn sku(&self) -> &str {
        &self.sku
    }

    pub fn variant_id(&self) -> AggregateId {
        self.variant_id
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn take_uncommitted(&mut self) -> Vec<PendingEvent<SkuReservationState>> {
        std::mem::take(&mut self.uncommitted)
    }

    /// Free the SKU, e.g. when its variant is archived.
    pub fn release(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.released {
            return Err(DomainError::rule(format!(
                "SKU \"{}\" is already released",
                self.sku
            )));
        }

        let prior = self.to_state();
        self.released = true;
        self.record(EventName::SkuReleased, prior, now);
        Ok(())
    }

    /// Re-reserve a previously released SKU for a new variant.
    pub fn reclaim(
        &mut self,
        variant_id: AggregateId,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if !self.released {
            return Err(DomainError::rule(format!(
                "SKU \"{}\" is already reserved by variant {}",
                self.sku, self.variant_id
            )));
        }

        let prior = self.to_state();
        self.released = false;
        self.variant_id = variant_id;
        self.record(EventName::SkuReserved, prior, now);
        Ok(())
    }

    fn record(&mut self, name: EventName, prior: SkuReservationState, now: DateTime<Utc>) {
        self.meta.touch(now);
        let new_state = self.to_state();
        self.uncommitted.push(PendingEvent {
            name,
            version: self.meta.version,
            occurred_at: now,
            prior_state: Some(prior),
            new_state,
        });
    }
}
