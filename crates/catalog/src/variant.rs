//! Aggregate root: product Variant.
//!
//! A variant has a kind tag. The shared state covers every kind; the
//! digital-download extension only carries data for that kind, and the
//! asset operations reject any other kind.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use merchkit_core::{
    AggregateId, AggregateMeta, AggregateRoot, AggregateStatus, CorrelationId, DomainError,
};
use merchkit_events::{EventName, PendingEvent};

use crate::images::{ImageCollection, ImageOp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantKind {
    Standard,
    DigitalDownload,
}

/// A downloadable asset attached to a digital variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigitalAsset {
    pub asset_id: Uuid,
    pub url: String,
    pub file_name: String,
    pub attached_at: DateTime<Utc>,
}

/// Kind-specific extension state. Empty for standard variants.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DigitalDownloadState {
    pub assets: Vec<DigitalAsset>,
}

/// Full serialisable variant state (snapshot payload and event state pair).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantState {
    #[serde(flatten)]
    pub meta: AggregateMeta,
    pub product_id: AggregateId,
    pub sku: String,
    pub title: String,
    pub price_cents: i64,
    pub inventory_quantity: i64,
    pub options: BTreeMap<String, String>,
    pub images: ImageCollection,
    pub kind: VariantKind,
    #[serde(default)]
    pub digital: DigitalDownloadState,
}

/// Parameters for creating a variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewVariant {
    pub product_id: AggregateId,
    #[serde(default)]
    pub sku: String,
    #[serde(default)]
    pub title: String,
    pub price_cents: i64,
    pub inventory_quantity: i64,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
    #[serde(default = "NewVariant::default_kind")]
    pub kind: VariantKind,
}

impl NewVariant {
    fn default_kind() -> VariantKind {
        VariantKind::Standard
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variant {
    meta: AggregateMeta,
    product_id: AggregateId,
    sku: String,
    title: String,
    price_cents: i64,
    inventory_quantity: i64,
    options: BTreeMap<String, String>,
    images: ImageCollection,
    kind: VariantKind,
    digital: DigitalDownloadState,
    uncommitted: Vec<PendingEvent<VariantState>>,
}

impl AggregateRoot for Variant {
    fn id(&self) -> AggregateId {
        self.meta.id
    }

    fn version(&self) -> u64 {
        self.meta.version
    }
}

impl Variant {
    pub fn create(
        id: AggregateId,
        correlation_id: CorrelationId,
        new: NewVariant,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if new.price_cents < 0 {
            return Err(DomainError::validation("variant price cannot be negative"));
        }
        if new.inventory_quantity < 0 {
            return Err(DomainError::validation(
                "variant inventory cannot be negative",
            ));
        }

        let mut variant = Self {
            meta: AggregateMeta::new(id, correlation_id, now),
            product_id: new.product_id,
            sku: new.sku,
            title: new.title,
            price_cents: new.price_cents,
            inventory_quantity: new.inventory_quantity,
            options: new.options,
            images: ImageCollection::new(),
            kind: new.kind,
            digital: DigitalDownloadState::default(),
            uncommitted: Vec::new(),
        };
        let new_state = variant.to_state();
        variant.uncommitted.push(PendingEvent {
            name: EventName::VariantCreated,
            version: 0,
            occurred_at: now,
            prior_state: None,
            new_state,
        });
        Ok(variant)
    }

    pub fn load_from_snapshot(state: VariantState) -> Self {
        Self {
            meta: state.meta,
            product_id: state.product_id,
            sku: state.sku,
            title: state.title,
            price_cents: state.price_cents,
            inventory_quantity: state.inventory_quantity,
            options: state.options,
            images: state.images,
            kind: state.kind,
            digital: state.digital,
            uncommitted: Vec::new(),
        }
    }

    pub fn to_state(&self) -> VariantState {
        VariantState {
            meta: self.meta.clone(),
            product_id: self.product_id,
            sku: self.sku.clone(),
            title: self.title.clone(),
            price_cents: self.price_cents,
            inventory_quantity: self.inventory_quantity,
            options: self.options.clone(),
            images: self.images.clone(),
            kind: self.kind,
            digital: self.digital.clone(),
        }
    }

    pub fn status(&self) -> AggregateStatus {
        self.meta.status
    }

    pub fn sku(&self) -> &str {
        &self.sku
    }

    pub fn kind(&self) -> VariantKind {
        self.kind
    }

    pub fn images(&self) -> &ImageCollection {
        &self.images
    }

    pub fn take_uncommitted(&mut self) -> Vec<PendingEvent<VariantState>> {
        std::mem::take(&mut self.uncommitted)
    }

    pub fn update_details(
        &mut self,
        title: String,
        options: BTreeMap<String, String>,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.ensure_not_archived("update")?;

        let prior = self.to_state();
        self.title = title;
        self.options = options;
        self.record(EventName::VariantUpdated, prior, now);
        Ok(())
    }

    pub fn update_price(&mut self, price_cents: i64, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.ensure_not_archived("reprice")?;
        if price_cents < 0 {
            return Err(DomainError::validation("variant price cannot be negative"));
        }

        let prior = self.to_state();
        self.price_cents = price_cents;
        self.record(EventName::VariantPriceUpdated, prior, now);
        Ok(())
    }

    pub fn update_inventory(
        &mut self,
        inventory_quantity: i64,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.ensure_not_archived("restock")?;
        if inventory_quantity < 0 {
            return Err(DomainError::validation(
                "variant inventory cannot be negative",
            ));
        }

        let prior = self.to_state();
        self.inventory_quantity = inventory_quantity;
        self.record(EventName::VariantInventoryUpdated, prior, now);
        Ok(())
    }

    pub fn update_images(&mut self, op: &ImageOp, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.ensure_not_archived("update images of")?;

        let prior = self.to_state();
        self.images = self.images.apply(op)?;
        self.record(EventName::VariantImagesUpdated, prior, now);
        Ok(())
    }

    pub fn publish(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.sku.trim().is_empty() {
            return Err(DomainError::rule("Cannot publish variant without a SKU"));
        }

        let prior = self.to_state();
        self.meta.transition_to(AggregateStatus::Active, now)?;
        self.record(EventName::VariantPublished, prior, now);
        Ok(())
    }

    pub fn archive(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        let prior = self.to_state();
        self.meta.transition_to(AggregateStatus::Archived, now)?;
        self.record(EventName::VariantArchived, prior, now);
        Ok(())
    }

    pub fn attach_digital_asset(
        &mut self,
        asset: DigitalAsset,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.ensure_not_archived("attach an asset to")?;
        if self.kind != VariantKind::DigitalDownload {
            return Err(DomainError::rule(
                "digital assets can only be attached to digital-download variants",
            ));
        }
        if self.digital.assets.iter().any(|a| a.asset_id == asset.asset_id) {
            return Err(DomainError::rule(format!(
                "asset {} is already attached",
                asset.asset_id
            )));
        }

        let prior = self.to_state();
        self.digital.assets.push(asset);
        self.record(EventName::VariantDigitalAssetAttached, prior, now);
        Ok(())
    }

    pub fn detach_digital_asset(
        &mut self,
        asset_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.ensure_not_archived("detach an asset from")?;
        if !self.digital.assets.iter().any(|a| a.asset_id == asset_id) {
            return Err(DomainError::rule(format!("asset {asset_id} is not attached")));
        }

        let prior = self.to_state();
        self.digital.assets.retain(|a| a.asset_id != asset_id);
        self.record(EventName::VariantDigitalAssetDetached, prior, now);
        Ok(())
    }

    fn ensure_not_archived(&self, action: &str) -> Result<(), DomainError> {
        if self.meta.status == AggregateStatus::Archived {
            return Err(DomainError::rule(format!(
                "cannot {action} an archived variant"
            )));
        }
        Ok(())
    }

    fn record(&mut self, name: EventName, prior: VariantState, now: DateTime<Utc>) {
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
