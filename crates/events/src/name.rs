//! The closed enumeration of domain event names.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable event name identifiers.
///
/// Convention: `{aggregate}.{action}`. Names are persisted with events and
/// must never change once written; add new variants instead.
///
/// The enum is closed on purpose: projection dispatch matches on it
/// exhaustively, so a new event name cannot be added without deciding how
/// every read model reacts to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventName {
    #[serde(rename = "product.created")]
    ProductCreated,
    #[serde(rename = "product.updated")]
    ProductUpdated,
    #[serde(rename = "product.published")]
    ProductPublished,
    #[serde(rename = "product.archived")]
    ProductArchived,
    #[serde(rename = "product.images_updated")]
    ProductImagesUpdated,

    #[serde(rename = "variant.created")]
    VariantCreated,
    #[serde(rename = "variant.updated")]
    VariantUpdated,
    #[serde(rename = "variant.price_updated")]
    VariantPriceUpdated,
    #[serde(rename = "variant.inventory_updated")]
    VariantInventoryUpdated,
    #[serde(rename = "variant.images_updated")]
    VariantImagesUpdated,
    #[serde(rename = "variant.published")]
    VariantPublished,
    #[serde(rename = "variant.archived")]
    VariantArchived,
    #[serde(rename = "variant.digital_asset_attached")]
    VariantDigitalAssetAttached,
    #[serde(rename = "variant.digital_asset_detached")]
    VariantDigitalAssetDetached,

    #[serde(rename = "collection.created")]
    CollectionCreated,
    #[serde(rename = "collection.updated")]
    CollectionUpdated,
    #[serde(rename = "collection.published")]
    CollectionPublished,
    #[serde(rename = "collection.archived")]
    CollectionArchived,
    #[serde(rename = "collection.products_updated")]
    CollectionProductsUpdated,

    #[serde(rename = "schedule.created")]
    ScheduleCreated,
    #[serde(rename = "schedule.published")]
    SchedulePublished,
    #[serde(rename = "schedule.archived")]
    ScheduleArchived,
    #[serde(rename = "schedule.entry_added")]
    ScheduleEntryAdded,
    #[serde(rename = "schedule.entry_activated")]
    ScheduleEntryActivated,
    #[serde(rename = "schedule.entry_completed")]
    ScheduleEntryCompleted,
    #[serde(rename = "schedule.entry_cancelled")]
    ScheduleEntryCancelled,
    #[serde(rename = "schedule.cancelled")]
    ScheduleCancelled,

    #[serde(rename = "sku.created")]
    SkuCreated,
    #[serde(rename = "sku.reserved")]
    SkuReserved,
    #[serde(rename = "sku.released")]
    SkuReleased,
}

impl EventName {
    pub fn as_str(self) -> &'static str {
        match self {
            EventName::ProductCreated => "product.created",
            EventName::ProductUpdated => "product.updated",
            EventName::ProductPublished => "product.published",
            EventName::ProductArchived => "product.archived",
            EventName::ProductImagesUpdated => "product.images_updated",
            EventName::VariantCreated => "variant.created",
            EventName::VariantUpdated => "variant.updated",
            EventName::VariantPriceUpdated => "variant.price_updated",
            EventName::VariantInventoryUpdated => "variant.inventory_updated",
            EventName::VariantImagesUpdated => "variant.images_updated",
            EventName::VariantPublished => "variant.published",
            EventName::VariantArchived => "variant.archived",
            EventName::VariantDigitalAssetAttached => "variant.digital_asset_attached",
            EventName::VariantDigitalAssetDetached => "variant.digital_asset_detached",
            EventName::CollectionCreated => "collection.created",
            EventName::CollectionUpdated => "collection.updated",
            EventName::CollectionPublished => "collection.published",
            EventName::CollectionArchived => "collection.archived",
            EventName::CollectionProductsUpdated => "collection.products_updated",
            EventName::ScheduleCreated => "schedule.created",
            EventName::SchedulePublished => "schedule.published",
            EventName::ScheduleArchived => "schedule.archived",
            EventName::ScheduleEntryAdded => "schedule.entry_added",
            EventName::ScheduleEntryActivated => "schedule.entry_activated",
            EventName::ScheduleEntryCompleted => "schedule.entry_completed",
            EventName::ScheduleEntryCancelled => "schedule.entry_cancelled",
            EventName::ScheduleCancelled => "schedule.cancelled",
            EventName::SkuCreated => "sku.created",
            EventName::SkuReserved => "sku.reserved",
            EventName::SkuReleased => "sku.released",
        }
    }

    const ALL: &'static [EventName] = &[
        EventName::ProductCreated,
        EventName::ProductUpdated,
        EventName::ProductPublished,
        EventName::ProductArchived,
        EventName::ProductImagesUpdated,
        EventName::VariantCreated,
        EventName::VariantUpdated,
        EventName::VariantPriceUpdated,
        EventName::VariantInventoryUpdated,
        EventName::VariantImagesUpdated,
        EventName::VariantPublished,
        EventName::VariantArchived,
        EventName::VariantDigitalAssetAttached,
        EventName::VariantDigitalAssetDetached,
        EventName::CollectionCreated,
        EventName::CollectionUpdated,
        EventName::CollectionPublished,
        EventName::CollectionArchived,
        EventName::CollectionProductsUpdated,
        EventName::ScheduleCreated,
        EventName::SchedulePublished,
        EventName::ScheduleArchived,
        EventName::ScheduleEntryAdded,
        EventName::ScheduleEntryActivated,
        EventName::ScheduleEntryCompleted,
        EventName::ScheduleEntryCancelled,
        EventName::ScheduleCancelled,
        EventName::SkuCreated,
        EventName::SkuReserved,
        EventName::SkuReleased,
    ];

    /// All known event names, for startup-time registry checks.
    pub fn all() -> &'static [EventName] {
        Self::ALL
    }
}

impl core::fmt::Display for EventName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown event name: {0}")]
pub struct UnknownEventName(pub String);

impl FromStr for EventName {
    type Err = UnknownEventName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| UnknownEventName(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_round_trip() {
        for name in EventName::all() {
            let parsed: EventName = name.as_str().parse().unwrap();
            assert_eq!(parsed, *name);
        }
    }

    #[test]
    fn serde_uses_dotted_names() {
        let json = serde_json::to_string(&EventName::VariantImagesUpdated).unwrap();
        assert_eq!(json, "\"variant.images_updated\"");
        let back: EventName = serde_json::from_str(&json).unwrap();
        assert_eq!(back, EventName::VariantImagesUpdated);
    }

    #[test]
    fn unknown_name_is_rejected() {
        let err = "variant.exploded".parse::<EventName>().unwrap_err();
        assert_eq!(err.0, "variant.exploded");
    }

    #[test]
    fn names_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for name in EventName::all() {
            assert!(seen.insert(name.as_str()), "duplicate name {}", name);
        }
    }
}
