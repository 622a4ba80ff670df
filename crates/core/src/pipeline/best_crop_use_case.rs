use std::sync::Arc;

use crate::gallery::domain::crop_storage::CropStorage;
use crate::gallery::domain::gallery_entry::GalleryEntry;
use crate::gallery::domain::gallery_store::{GalleryStore, StoreError};
use crate::gallery::domain::identity::HumanIdentity;

/// Picks the most presentable crop of an identity for reports: the one
/// covering the most pixels.
pub struct BestCropSelector {
    store: Arc<dyn GalleryStore>,
    crops: Arc<dyn CropStorage>,
}

impl BestCropSelector {
    pub fn new(store: Arc<dyn GalleryStore>, crops: Arc<dyn CropStorage>) -> Self {
        Self { store, crops }
    }

    /// The live entry with the largest crop area; ties go to the earliest
    /// entry. Crops that cannot be read are skipped. `None` when the
    /// identity is unknown or none of its crops are readable.
    pub fn select(&self, identity: &HumanIdentity) -> Result<Option<GalleryEntry>, StoreError> {
        let mut best: Option<(u64, GalleryEntry)> = None;
        for entry in self.store.get_all(identity)? {
            let (width, height) = match self.crops.dimensions(&entry.crop_ref) {
                Ok(dims) => dims,
                Err(e) => {
                    log::warn!("Skipping crop of entry {}: {e}", entry.id);
                    continue;
                }
            };
            let area = width as u64 * height as u64;
            if best.as_ref().map_or(true, |(best_area, _)| area > *best_area) {
                best = Some((area, entry));
            }
        }
        Ok(best.map(|(_, entry)| entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gallery::domain::embedding::Embedding;
    use crate::gallery::infrastructure::in_memory_crop_storage::InMemoryCropStorage;
    use crate::gallery::infrastructure::in_memory_gallery_store::InMemoryGalleryStore;
    use crate::shared::frame::Frame;

    fn crop(width: u32, height: u32) -> Frame {
        Frame::new(vec![0; (width * height * 3) as usize], width, height, 3, 0)
    }

    fn emb(axis: usize) -> Embedding {
        let mut v = vec![0.0f32; 4];
        v[axis] = 1.0;
        Embedding::new(v).unwrap()
    }

    fn setup() -> (Arc<InMemoryGalleryStore>, Arc<InMemoryCropStorage>, BestCropSelector) {
        let crops = Arc::new(InMemoryCropStorage::new());
        let store = Arc::new(InMemoryGalleryStore::new(crops.clone()));
        let selector = BestCropSelector::new(store.clone(), crops.clone());
        (store, crops, selector)
    }

    #[test]
    fn test_picks_largest_area() {
        let (store, _crops, selector) = setup();
        let id = HumanIdentity::from("alice");
        store.insert(&id, emb(0), &crop(10, 20)).unwrap();
        let big = store.insert(&id, emb(1), &crop(30, 60)).unwrap();
        store.insert(&id, emb(2), &crop(20, 20)).unwrap();

        let best = selector.select(&id).unwrap().unwrap();
        assert_eq!(best.id, big);
    }

    #[test]
    fn test_ties_go_to_earliest_entry() {
        let (store, _crops, selector) = setup();
        let id = HumanIdentity::from("alice");
        let first = store.insert(&id, emb(0), &crop(10, 40)).unwrap();
        store.insert(&id, emb(1), &crop(40, 10)).unwrap();

        assert_eq!(selector.select(&id).unwrap().unwrap().id, first);
    }

    #[test]
    fn test_unreadable_crops_are_skipped() {
        let (store, crops, selector) = setup();
        let id = HumanIdentity::from("alice");
        let big = store.insert(&id, emb(0), &crop(50, 50)).unwrap();
        let small = store.insert(&id, emb(1), &crop(5, 5)).unwrap();

        let entries = store.get_all(&id).unwrap();
        let big_entry = entries.iter().find(|e| e.id == big).unwrap();
        crops.archive(&id, big, &big_entry.crop_ref).unwrap();

        assert_eq!(selector.select(&id).unwrap().unwrap().id, small);
    }

    #[test]
    fn test_unknown_identity_has_no_crop() {
        let (_store, _crops, selector) = setup();
        assert!(selector
            .select(&HumanIdentity::from("nobody"))
            .unwrap()
            .is_none());
    }
}
