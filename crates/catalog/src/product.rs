//! Aggregate root: Product.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use merchkit_core::{
    AggregateId, AggregateMeta, AggregateRoot, AggregateStatus, CorrelationId, DomainError,
};
use merchkit_events::{EventName, PendingEvent};

use crate::images::{ImageCollection, ImageOp};

/// Full serialisable product state. This is both the snapshot payload and the
/// `{prior_state, new_state}` side of every product event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductState {
    #[serde(flatten)]
    pub meta: AggregateMeta,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub images: ImageCollection,
}

/// Parameters for creating a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductDetails {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    meta: AggregateMeta,
    title: String,
    description: String,
    tags: Vec<String>,
    images: ImageCollection,
    uncommitted: Vec<PendingEvent<ProductState>>,
}

impl AggregateRoot for Product {
    fn id(&self) -> AggregateId {
        self.meta.id
    }

    fn version(&self) -> u64 {
        self.meta.version
    }
}

impl Product {
    pub fn create(
        id: AggregateId,
        correlation_id: CorrelationId,
        details: ProductDetails,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if details.title.trim().is_empty() {
            return Err(DomainError::validation("product title cannot be empty"));
        }

        let mut product = Self {
            meta: AggregateMeta::new(id, correlation_id, now),
            title: details.title,
            description: details.description,
            tags: details.tags,
            images: ImageCollection::new(),
            uncommitted: Vec::new(),
        };
        let new_state = product.to_state();
        product.uncommitted.push(PendingEvent {
            name: EventName::ProductCreated,
            version: 0,
            occurred_at: now,
            prior_state: None,
            new_state,
        });
        Ok(product)
    }

    pub fn load_from_snapshot(state: ProductState) -> Self {
        Self {
            meta: state.meta,
            title: state.title,
            description: state.description,
            tags: state.tags,
            images: state.images,
            uncommitted: Vec::new(),
        }
    }

    pub fn to_state(&self) -> ProductState {
        ProductState {
            meta: self.meta.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            tags: self.tags.clone(),
            images: self.images.clone(),
        }
    }

    pub fn status(&self) -> AggregateStatus {
        self.meta.status
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn images(&self) -> &ImageCollection {
        &self.images
    }

    pub fn take_uncommitted(&mut self) -> Vec<PendingEvent<ProductState>> {
        std::mem::take(&mut self.uncommitted)
    }

    pub fn update_details(
        &mut self,
        details: ProductDetails,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.ensure_not_archived("update")?;
        if details.title.trim().is_empty() {
            return Err(DomainError::validation("product title cannot be empty"));
        }

        let prior = self.to_state();
        self.title = details.title;
        self.description = details.description;
        self.tags = details.tags;
        self.record(EventName::ProductUpdated, prior, now);
        Ok(())
    }

    pub fn update_images(&mut self, op: &ImageOp, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.ensure_not_archived("update images of")?;

        let prior = self.to_state();
        self.images = self.images.apply(op)?;
        self.record(EventName::ProductImagesUpdated, prior, now);
        Ok(())
    }

    pub fn publish(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        let prior = self.to_state();
        self.meta.transition_to(AggregateStatus::Active, now)?;
        self.record(EventName::ProductPublished, prior, now);
        Ok(())
    }

    pub fn archive(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        let prior = self.to_state();
        self.meta.transition_to(AggregateStatus::Archived, now)?;
        self.record(EventName::ProductArchived, prior, now);
        Ok(())
    }

    fn ensure_not_archived(&self, action: &str) -> Result<(), DomainError> {
        if self.meta.status == AggregateStatus::Archived {
            return Err(DomainError::rule(format!(
                "cannot {action} an archived product"
            )));
        }
        Ok(())
    }

    fn record(&mut self, name: EventName, prior: ProductState, now: DateTime<Utc>) {
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
    use crate::images::ImageRecord;
    use merchkit_core::ImageId;

    fn details(title: &str) -> ProductDetails {
        ProductDetails {
            title: title.to_string(),
            description: "A product".to_string(),
            tags: vec!["tag".to_string()],
        }
    }

    fn new_product() -> Product {
        Product::create(
            AggregateId::new(),
            CorrelationId::new(),
            details("Shirt"),
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn create_emits_created_event_at_version_zero() {
        let mut product = new_product();
        assert_eq!(product.version(), 0);
        assert_eq!(product.status(), AggregateStatus::Draft);

        let events = product.take_uncommitted();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, EventName::ProductCreated);
        assert_eq!(events[0].version, 0);
        assert!(events[0].prior_state.is_none());
    }

    #[test]
    fn create_rejects_empty_title() {
        let err = Product::create(
            AggregateId::new(),
            CorrelationId::new(),
            details("   "),
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn each_mutation_advances_version_by_one() {
        let mut product = new_product();
        product.update_details(details("Blue shirt"), Utc::now()).unwrap();
        product.publish(Utc::now()).unwrap();

        assert_eq!(product.version(), 2);
        let events = product.take_uncommitted();
        let versions: Vec<u64> = events.iter().map(|e| e.version).collect();
        assert_eq!(versions, vec![0, 1, 2]);
    }

    #[test]
    fn events_carry_prior_and_new_state() {
        let mut product = new_product();
        product.take_uncommitted();

        product.update_details(details("Renamed"), Utc::now()).unwrap();
        let events = product.take_uncommitted();
        let prior = events[0].prior_state.as_ref().unwrap();
        assert_eq!(prior.title, "Shirt");
        assert_eq!(events[0].new_state.title, "Renamed");
        assert_eq!(events[0].new_state.meta.version, prior.meta.version + 1);
    }

    #[test]
    fn publish_sets_published_at_once() {
        let mut product = new_product();
        product.publish(Utc::now()).unwrap();
        let published_at = product.to_state().meta.published_at.unwrap();

        product.archive(Utc::now()).unwrap();
        assert_eq!(product.to_state().meta.published_at, Some(published_at));
    }

    #[test]
    fn archived_product_rejects_further_mutations() {
        let mut product = new_product();
        product.archive(Utc::now()).unwrap();

        let err = product
            .update_details(details("Again"), Utc::now())
            .unwrap_err();
        assert!(matches!(err, DomainError::RuleViolation(_)));

        let err = product.publish(Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::RuleViolation(_)));
    }

    #[test]
    fn failed_mutation_emits_nothing() {
        let mut product = new_product();
        product.take_uncommitted();
        let before = product.to_state();

        let _ = product.update_details(details(""), Utc::now()).unwrap_err();
        assert!(product.take_uncommitted().is_empty());
        assert_eq!(product.to_state(), before);
    }

    #[test]
    fn update_images_emits_single_event() {
        let mut product = new_product();
        product.take_uncommitted();

        let op = ImageOp::Add {
            image: ImageRecord {
                image_id: ImageId::new(),
                urls: vec!["https://cdn.test/a.jpg".to_string()],
                uploaded_at: Utc::now(),
                alt_text: None,
            },
        };
        product.update_images(&op, Utc::now()).unwrap();

        let events = product.take_uncommitted();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, EventName::ProductImagesUpdated);
        assert_eq!(events[0].new_state.images.len(), 1);
    }

    #[test]
    fn snapshot_round_trip_preserves_state() {
        let mut product = new_product();
        product.publish(Utc::now()).unwrap();
        let state = product.to_state();

        let loaded = Product::load_from_snapshot(state.clone());
        assert_eq!(loaded.to_state(), state);
        assert_eq!(loaded.version(), 1);
    }
}
