//! Ordered image collection value object.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use merchkit_core::{DomainError, ImageId, ValueObject};

/// One image and its derived renditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub image_id: ImageId,
    /// Rendition URLs, original first.
    pub urls: Vec<String>,
    pub uploaded_at: DateTime<Utc>,
    pub alt_text: Option<String>,
}

/// Insertion-ordered collection of images.
///
/// Persistent: every operation returns a new collection and never hands out
/// interior mutable references. Capped at [`ImageCollection::MAX_IMAGES`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageCollection {
    images: Vec<ImageRecord>,
}

impl ValueObject for ImageCollection {}

/// A single mutation of an image collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ImageOp {
    Add { image: ImageRecord },
    Remove { image_id: ImageId },
    Reorder { ordered_image_ids: Vec<ImageId> },
    UpdateAltText {
        image_id: ImageId,
        alt_text: Option<String>,
    },
}

impl ImageCollection {
    pub const MAX_IMAGES: usize = 100;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn ids(&self) -> Vec<ImageId> {
        self.images.iter().map(|i| i.image_id).collect()
    }

    pub fn get(&self, image_id: ImageId) -> Option<&ImageRecord> {
        self.images.iter().find(|i| i.image_id == image_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ImageRecord> {
        self.images.iter()
    }

    /// Apply one [`ImageOp`], returning the resulting collection.
    pub fn apply(&self, op: &ImageOp) -> Result<Self, DomainError> {
        match op {
            ImageOp::Add { image } => self.add(image.clone()),
            ImageOp::Remove { image_id } => self.remove(*image_id),
            ImageOp::Reorder { ordered_image_ids } => self.reorder(ordered_image_ids),
            ImageOp::UpdateAltText {
                image_id,
                alt_text,
            } => self.update_alt_text(*image_id, alt_text.clone()),
        }
    }

    pub fn add(&self, image: ImageRecord) -> Result<Self, DomainError> {
        if self.images.len() >= Self::MAX_IMAGES {
            return Err(DomainError::rule(format!(
                "image collection is limited to {} images",
                Self::MAX_IMAGES
            )));
        }
        if self.get(image.image_id).is_some() {
            return Err(DomainError::rule(format!(
                "image {} is already in the collection",
                image.image_id
            )));
        }

        let mut images = self.images.clone();
        images.push(image);
        Ok(Self { images })
    }

    pub fn remove(&self, image_id: ImageId) -> Result<Self, DomainError> {
        if self.get(image_id).is_none() {
            return Err(DomainError::rule(format!(
                "image {} is not in the collection",
                image_id
            )));
        }

        let images = self
            .images
            .iter()
            .filter(|i| i.image_id != image_id)
            .cloned()
            .collect();
        Ok(Self { images })
    }

    /// Reorder to exactly the given id sequence.
    ///
    /// The sequence must be a permutation of the current ids; anything else
    /// (wrong count, unknown id, duplicate) is a rule violation.
    pub fn reorder(&self, ordered_image_ids: &[ImageId]) -> Result<Self, DomainError> {
        if ordered_image_ids.len() != self.images.len() {
            return Err(DomainError::rule(format!(
                "reorder must name all {} images, got {}",
                self.images.len(),
                ordered_image_ids.len()
            )));
        }

        let mut images = Vec::with_capacity(ordered_image_ids.len());
        let mut remaining: Vec<&ImageRecord> = self.images.iter().collect();
        for id in ordered_image_ids {
            let idx = remaining
                .iter()
                .position(|i| i.image_id == *id)
                .ok_or_else(|| {
                    DomainError::rule(format!("reorder names unknown or duplicate image {id}"))
                })?;
            images.push(remaining.swap_remove(idx).clone());
        }

        Ok(Self { images })
    }

    pub fn update_alt_text(
        &self,
        image_id: ImageId,
        alt_text: Option<String>,
    ) -> Result<Self, DomainError> {
        if self.get(image_id).is_none() {
            return Err(DomainError::rule(format!(
                "image {} is not in the collection",
                image_id
            )));
        }

        let images = self
            .images
            .iter()
            .map(|i| {
                if i.image_id == image_id {
                    let mut updated = i.clone();
                    updated.alt_text = alt_text.clone();
                    updated
                } else {
                    i.clone()
                }
            })
            .collect();
        Ok(Self { images })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn image(n: u64) -> ImageRecord {
        ImageRecord {
            image_id: ImageId::from_uuid(uuid::Uuid::from_u64_pair(0, n + 1)),
            urls: vec![format!("https://cdn.test/img/{n}.jpg")],
            uploaded_at: Utc::now(),
            alt_text: None,
        }
    }

    fn collection_of(n: u64) -> ImageCollection {
        let mut c = ImageCollection::new();
        for i in 0..n {
            c = c.add(image(i)).unwrap();
        }
        c
    }

    #[test]
    fn add_preserves_insertion_order() {
        let c = collection_of(3);
        assert_eq!(
            c.ids(),
            vec![image(0).image_id, image(1).image_id, image(2).image_id]
        );
    }

    #[test]
    fn add_rejects_duplicate_id() {
        let c = collection_of(1);
        let err = c.add(image(0)).unwrap_err();
        assert!(matches!(err, DomainError::RuleViolation(_)));
    }

    #[test]
    fn add_rejects_past_the_cap() {
        let c = collection_of(ImageCollection::MAX_IMAGES as u64);
        let err = c.add(image(200)).unwrap_err();
        assert!(matches!(err, DomainError::RuleViolation(_)));
    }

    #[test]
    fn reorder_applies_permutation() {
        let c = collection_of(3);
        let ids = c.ids();
        let reordered = c.reorder(&[ids[2], ids[0], ids[1]]).unwrap();
        assert_eq!(reordered.ids(), vec![ids[2], ids[0], ids[1]]);
        assert_eq!(reordered.len(), c.len());
    }

    #[test]
    fn reorder_rejects_wrong_count() {
        let c = collection_of(3);
        let ids = c.ids();
        let err = c.reorder(&[ids[2], ids[0]]).unwrap_err();
        assert!(matches!(err, DomainError::RuleViolation(_)));
    }

    #[test]
    fn reorder_rejects_duplicate_ids() {
        let c = collection_of(2);
        let ids = c.ids();
        let err = c.reorder(&[ids[0], ids[0]]).unwrap_err();
        assert!(matches!(err, DomainError::RuleViolation(_)));
    }

    #[test]
    fn update_alt_text_replaces_only_the_target() {
        let c = collection_of(2);
        let ids = c.ids();
        let updated = c
            .update_alt_text(ids[0], Some("front view".to_string()))
            .unwrap();
        assert_eq!(
            updated.get(ids[0]).unwrap().alt_text.as_deref(),
            Some("front view")
        );
        assert_eq!(updated.get(ids[1]).unwrap().alt_text, None);
        // The original is untouched.
        assert_eq!(c.get(ids[0]).unwrap().alt_text, None);
    }

    #[test]
    fn remove_of_missing_image_fails() {
        let c = collection_of(1);
        let err = c.remove(image(7).image_id).unwrap_err();
        assert!(matches!(err, DomainError::RuleViolation(_)));
    }

    proptest! {
        #[test]
        fn reorder_with_any_permutation_holds_the_laws(
            n in 1usize..12,
            seed in any::<u64>(),
        ) {
            let c = collection_of(n as u64);
            let mut ids = c.ids();

            // Deterministic Fisher-Yates driven by the seed.
            let mut state = seed | 1;
            for i in (1..ids.len()).rev() {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                let j = (state >> 33) as usize % (i + 1);
                ids.swap(i, j);
            }

            let reordered = c.reorder(&ids).unwrap();
            prop_assert_eq!(reordered.ids(), ids);
            prop_assert_eq!(reordered.len(), c.len());
        }

        #[test]
        fn add_then_remove_is_identity(n in 0usize..8) {
            let c = collection_of(n as u64);
            let extra = image(500);
            let round_tripped = c.add(extra.clone()).unwrap().remove(extra.image_id).unwrap();
            prop_assert_eq!(round_tripped, c);
        }
    }
}
