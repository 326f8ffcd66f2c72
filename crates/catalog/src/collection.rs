//! Aggregate root: product Collection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use merchkit_core::{
    AggregateId, AggregateMeta, AggregateRoot, AggregateStatus, CorrelationId, DomainError,
};
use merchkit_events::{EventName, PendingEvent};

/// Full serialisable collection state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionState {
    #[serde(flatten)]
    pub meta: AggregateMeta,
    pub title: String,
    pub slug: String,
    pub description: String,
    /// Member products in display order.
    pub product_ids: Vec<AggregateId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Collection {
    meta: AggregateMeta,
    title: String,
    slug: String,
    description: String,
    product_ids: Vec<AggregateId>,
    uncommitted: Vec<PendingEvent<CollectionState>>,
}

impl AggregateRoot for Collection {
    fn id(&self) -> AggregateId {
        self.meta.id
    }

    fn version(&self) -> u64 {
        self.meta.version
    }
}

impl Collection {
    pub fn create(
        id: AggregateId,
        correlation_id: CorrelationId,
        title: String,
        slug: String,
        description: String,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if title.trim().is_empty() {
            return Err(DomainError::validation("collection title cannot be empty"));
        }
        if slug.trim().is_empty() {
            return Err(DomainError::validation("collection slug cannot be empty"));
        }

        let mut collection = Self {
            meta: AggregateMeta::new(id, correlation_id, now),
            title,
            slug,
            description,
            product_ids: Vec::new(),
            uncommitted: Vec::new(),
        };
        let new_state = collection.to_state();
        collection.uncommitted.push(PendingEvent {
            name: EventName::CollectionCreated,
            version: 0,
            occurred_at: now,
            prior_state: None,
            new_state,
        });
        Ok(collection)
    }

    pub fn load_from_snapshot(state: CollectionState) -> Self {
        Self {
            meta: state.meta,
            title: state.title,
            slug: state.slug,
            description: state.description,
            product_ids: state.product_ids,
            uncommitted: Vec::new(),
        }
    }

    pub fn to_state(&self) -> CollectionState {
        CollectionState {
            meta: self.meta.clone(),
            title: self.title.clone(),
            slug: self.slug.clone(),
            description: self.description.clone(),
            product_ids: self.product_ids.clone(),
        }
    }

    pub fn status(&self) -> AggregateStatus {
        self.meta.status
    }

    pub fn product_ids(&self) -> &[AggregateId] {
        &self.product_ids
    }

    pub fn take_uncommitted(&mut self) -> Vec<PendingEvent<CollectionState>> {
        std::mem::take(&mut self.uncommitted)
    }

    pub fn update_details(
        &mut self,
        title: String,
        description: String,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.ensure_not_archived("update")?;
        if title.trim().is_empty() {
            return Err(DomainError::validation("collection title cannot be empty"));
        }

        let prior = self.to_state();
        self.title = title;
        self.description = description;
        self.record(EventName::CollectionUpdated, prior, now);
        Ok(())
    }

    pub fn add_product(
        &mut self,
        product_id: AggregateId,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.ensure_not_archived("add a product to")?;
        if self.product_ids.contains(&product_id) {
            return Err(DomainError::rule(format!(
                "product {product_id} is already in the collection"
            )));
        }

        let prior = self.to_state();
        self.product_ids.push(product_id);
        self.record(EventName::CollectionProductsUpdated, prior, now);
        Ok(())
    }

    pub fn remove_product(
        &mut self,
        product_id: AggregateId,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.ensure_not_archived("remove a product from")?;
        if !self.product_ids.contains(&product_id) {
            return Err(DomainError::rule(format!(
                "product {product_id} is not in the collection"
            )));
        }

        let prior = self.to_state();
        self.product_ids.retain(|id| *id != product_id);
        self.record(EventName::CollectionProductsUpdated, prior, now);
        Ok(())
    }

    pub fn publish(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        let prior = self.to_state();
        self.meta.transition_to(AggregateStatus::Active, now)?;
        self.record(EventName::CollectionPublished, prior, now);
        Ok(())
    }

    pub fn archive(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        let prior = self.to_state();
        self.meta.transition_to(AggregateStatus::Archived, now)?;
        self.record(EventName::CollectionArchived, prior, now);
        Ok(())
    }

    fn ensure_not_archived(&self, action: &str) -> Result<(), DomainError> {
        if self.meta.status == AggregateStatus::Archived {
            return Err(DomainError::rule(format!(
                "cannot {action} an archived collection"
            )));
        }
        Ok(())
    }

    fn record(&mut self, name: EventName, prior: CollectionState, now: DateTime<Utc>) {
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

#[cfg(test)]
mod tests {
    use super::*;

    fn new_collection() -> Collection {
        Collection::create(
            AggregateId::new(),
            CorrelationId::new(),
            "Summer".to_string(),
            "summer".to_string(),
            "Summer picks".to_string(),
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn create_requires_title_and_slug() {
        let err = Collection::create(
            AggregateId::new(),
            CorrelationId::new(),
            "Summer".to_string(),
            " ".to_string(),
            String::new(),
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn membership_is_ordered_and_duplicate_free() {
        let mut collection = new_collection();
        let p1 = AggregateId::new();
        let p2 = AggregateId::new();

        collection.add_product(p1, Utc::now()).unwrap();
        collection.add_product(p2, Utc::now()).unwrap();
        assert_eq!(collection.product_ids(), &[p1, p2]);

        let err = collection.add_product(p1, Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::RuleViolation(_)));

        collection.remove_product(p1, Utc::now()).unwrap();
        assert_eq!(collection.product_ids(), &[p2]);

        let err = collection.remove_product(p1, Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::RuleViolation(_)));
    }

    #[test]
    fn membership_changes_emit_products_updated() {
        let mut collection = new_collection();
        collection.take_uncommitted();

        collection.add_product(AggregateId::new(), Utc::now()).unwrap();
        let events = collection.take_uncommitted();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, EventName::CollectionProductsUpdated);
        assert_eq!(events[0].version, 1);
    }

    #[test]
    fn archived_collection_is_frozen() {
        let mut collection = new_collection();
        collection.archive(Utc::now()).unwrap();

        let err = collection
            .add_product(AggregateId::new(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, DomainError::RuleViolation(_)));
    }
}
