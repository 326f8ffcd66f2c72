//! The catalog write model: aggregates and their owned value objects.
//!
//! Every mutation on an aggregate emits exactly one event whose payload is
//! the full aggregate state before and after the change. Aggregates are
//! rehydrated from snapshots, never by replay.

pub mod collection;
pub mod images;
pub mod product;
pub mod schedule;
pub mod sku;
pub mod variant;

pub use collection::{Collection, CollectionState};
pub use images::{ImageCollection, ImageOp, ImageRecord};
pub use product::{Product, ProductDetails, ProductState};
pub use schedule::{Schedule, ScheduleEntry, ScheduleEntryStatus, ScheduleState, ScheduleWindow};
pub use sku::{SkuReservation, SkuReservationState};
pub use variant::{DigitalAsset, NewVariant, Variant, VariantKind, VariantState};
