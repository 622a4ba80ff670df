use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use crate::gallery::domain::crop_storage::CropStorage;
use crate::gallery::domain::embedding::Embedding;
use crate::gallery::domain::gallery_entry::{CropRef, GalleryEntry, NearestMatch};
use crate::gallery::domain::gallery_store::{GalleryStore, StoreError};
use crate::gallery::domain::identity::{EntryId, HumanIdentity};
use crate::shared::frame::Frame;
use crate::shared::validation::ValidationError;

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    next_entry_id: u64,
    entries: Vec<GalleryEntry>,
}

#[derive(Default)]
struct GalleryState {
    next_entry_id: u64,
    /// Fixed by the first stored embedding.
    dimension: Option<usize>,
    entries: BTreeMap<EntryId, GalleryEntry>,
    by_identity: BTreeMap<HumanIdentity, Vec<EntryId>>,
}

impl GalleryState {
    fn check_dimension(&self, embedding: &Embedding) -> Result<(), ValidationError> {
        match self.dimension {
            Some(expected) if expected != embedding.dimension() => {
                Err(ValidationError::DimensionMismatch {
                    expected,
                    actual: embedding.dimension(),
                })
            }
            _ => Ok(()),
        }
    }

    fn reserve_id(&mut self) -> EntryId {
        let id = EntryId(self.next_entry_id);
        self.next_entry_id += 1;
        id
    }

    fn owns_all(&self, identity: &HumanIdentity, ids: &[EntryId]) -> bool {
        let owned = self.by_identity.get(identity);
        ids.iter()
            .all(|id| owned.is_some_and(|owned| owned.contains(id)))
    }

    fn add(&mut self, entry: GalleryEntry) {
        self.dimension.get_or_insert(entry.embedding.dimension());
        self.by_identity
            .entry(entry.identity.clone())
            .or_default()
            .push(entry.id);
        self.entries.insert(entry.id, entry);
    }

    fn remove(&mut self, id: EntryId) -> Option<GalleryEntry> {
        let entry = self.entries.remove(&id)?;
        if let Some(ids) = self.by_identity.get_mut(&entry.identity) {
            ids.retain(|other| *other != id);
            if ids.is_empty() {
                self.by_identity.remove(&entry.identity);
            }
        }
        Some(entry)
    }
}

/// Gallery held in process memory, optionally persisted as a JSON snapshot.
///
/// Brute-force nearest-neighbor search; fine for galleries of a few
/// thousand entries. Crop I/O happens outside the state lock: an entry id
/// is reserved first, the crop written, then the entry published.
pub struct InMemoryGalleryStore {
    state: RwLock<GalleryState>,
    crops: Arc<dyn CropStorage>,
}

impl InMemoryGalleryStore {
    pub fn new(crops: Arc<dyn CropStorage>) -> Self {
        Self {
            state: RwLock::new(GalleryState::default()),
            crops,
        }
    }

    /// Loads a snapshot written by [`save`](Self::save). A missing file
    /// yields an empty gallery.
    pub fn open(path: &Path, crops: Arc<dyn CropStorage>) -> Result<Self, StoreError> {
        if !path.exists() {
            log::info!("No gallery snapshot at {}, starting empty", path.display());
            return Ok(Self::new(crops));
        }
        let json = std::fs::read_to_string(path).map_err(|source| StoreError::SnapshotIo {
            path: path.to_path_buf(),
            source,
        })?;
        let snapshot: Snapshot =
            serde_json::from_str(&json).map_err(|source| StoreError::SnapshotFormat {
                path: path.to_path_buf(),
                source,
            })?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(StoreError::Inconsistent(format!(
                "unsupported snapshot version {} in {}",
                snapshot.version,
                path.display()
            )));
        }

        let mut state = GalleryState::default();
        for entry in snapshot.entries {
            state.check_dimension(&entry.embedding)?;
            if state.entries.contains_key(&entry.id) {
                return Err(StoreError::Inconsistent(format!(
                    "duplicate entry id {} in {}",
                    entry.id,
                    path.display()
                )));
            }
            state.next_entry_id = state.next_entry_id.max(entry.id.0 + 1);
            state.add(entry);
        }
        state.next_entry_id = state.next_entry_id.max(snapshot.next_entry_id);

        log::info!(
            "Loaded gallery snapshot: {} entries across {} identities",
            state.entries.len(),
            state.by_identity.len()
        );
        Ok(Self {
            state: RwLock::new(state),
            crops,
        })
    }

    /// Writes the gallery to `path` via a temporary sibling file and rename.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let io_err = |source: std::io::Error| StoreError::SnapshotIo {
            path: path.to_path_buf(),
            source,
        };
        let json = {
            let state = self.read()?;
            let snapshot = Snapshot {
                version: SNAPSHOT_VERSION,
                next_entry_id: state.next_entry_id,
                entries: state.entries.values().cloned().collect(),
            };
            serde_json::to_string_pretty(&snapshot).map_err(|source| {
                StoreError::SnapshotFormat {
                    path: path.to_path_buf(),
                    source,
                }
            })?
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let part = path.with_extension("json.part");
        std::fs::write(&part, json).map_err(io_err)?;
        std::fs::rename(&part, path).map_err(io_err)?;
        log::debug!("Saved gallery snapshot to {}", path.display());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.read().map(|s| s.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, GalleryState>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Inconsistent("gallery lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, GalleryState>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Inconsistent("gallery lock poisoned".into()))
    }

    fn archive_all(&self, removed: &[GalleryEntry]) {
        for entry in removed {
            self.discard_crop(&entry.identity, entry.id, &entry.crop_ref);
        }
    }

    fn discard_crop(&self, identity: &HumanIdentity, id: EntryId, crop_ref: &CropRef) {
        if let Err(e) = self.crops.archive(identity, id, crop_ref) {
            log::warn!("Failed to archive crop of entry {id}: {e}");
        }
    }
}

impl GalleryStore for InMemoryGalleryStore {
    fn insert(
        &self,
        identity: &HumanIdentity,
        embedding: Embedding,
        crop: &Frame,
    ) -> Result<EntryId, StoreError> {
        let id = {
            let mut state = self.write()?;
            state.check_dimension(&embedding)?;
            state.reserve_id()
        };

        let crop_ref = self.crops.store(identity, id, crop)?;

        let mut state = self.write()?;
        if let Err(e) = state.check_dimension(&embedding) {
            drop(state);
            self.discard_crop(identity, id, &crop_ref);
            return Err(e.into());
        }
        state.add(GalleryEntry {
            id,
            identity: identity.clone(),
            embedding,
            crop_ref,
        });
        log::debug!("Inserted entry {id} for {identity}");
        Ok(id)
    }

    fn query_nearest(
        &self,
        embedding: &Embedding,
        k: usize,
    ) -> Result<Vec<NearestMatch>, StoreError> {
        if k == 0 {
            return Err(ValidationError::NonPositiveTopK.into());
        }
        let state = self.read()?;
        state.check_dimension(embedding)?;

        // BTreeMap iteration is in id order, so the stable sort keeps
        // insertion order among equal distances.
        let mut matches: Vec<NearestMatch> = state
            .entries
            .values()
            .map(|entry| NearestMatch {
                identity: entry.identity.clone(),
                entry_id: entry.id,
                distance: embedding.cosine_distance(&entry.embedding),
            })
            .collect();
        matches.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        matches.truncate(k);
        Ok(matches)
    }

    fn get_all(&self, identity: &HumanIdentity) -> Result<Vec<GalleryEntry>, StoreError> {
        let state = self.read()?;
        Ok(state
            .by_identity
            .get(identity)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.entries.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }

    fn delete(&self, ids: &[EntryId]) -> Result<(), StoreError> {
        let removed: Vec<GalleryEntry> = {
            let mut state = self.write()?;
            ids.iter().filter_map(|id| state.remove(*id)).collect()
        };
        self.archive_all(&removed);
        Ok(())
    }

    fn replace(
        &self,
        identity: &HumanIdentity,
        evict: &[EntryId],
        admit: Option<(Embedding, &Frame)>,
    ) -> Result<Option<EntryId>, StoreError> {
        let foreign = || {
            StoreError::Inconsistent(format!(
                "eviction set contains entries not owned by {identity}"
            ))
        };

        let reserved = {
            let mut state = self.write()?;
            if !state.owns_all(identity, evict) {
                return Err(foreign());
            }
            match &admit {
                Some((embedding, _)) => {
                    state.check_dimension(embedding)?;
                    Some(state.reserve_id())
                }
                None => None,
            }
        };

        let admitted = match (reserved, admit) {
            (Some(id), Some((embedding, crop))) => {
                let crop_ref = self.crops.store(identity, id, crop)?;
                Some(GalleryEntry {
                    id,
                    identity: identity.clone(),
                    embedding,
                    crop_ref,
                })
            }
            _ => None,
        };

        let mut state = self.write()?;
        if !state.owns_all(identity, evict) {
            drop(state);
            if let Some(entry) = admitted {
                self.discard_crop(identity, entry.id, &entry.crop_ref);
            }
            return Err(foreign());
        }
        let removed: Vec<GalleryEntry> = evict.iter().filter_map(|id| state.remove(*id)).collect();
        let admitted_id = admitted.map(|entry| {
            let id = entry.id;
            state.add(entry);
            id
        });
        drop(state);

        self.archive_all(&removed);
        log::debug!(
            "Replaced {} entries of {identity}, admitted {admitted_id:?}",
            removed.len()
        );
        Ok(admitted_id)
    }

    fn identities(&self) -> Result<Vec<(HumanIdentity, usize)>, StoreError> {
        let state = self.read()?;
        Ok(state
            .by_identity
            .iter()
            .map(|(identity, ids)| (identity.clone(), ids.len()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gallery::infrastructure::in_memory_crop_storage::InMemoryCropStorage;
    use approx::assert_abs_diff_eq;
    use std::thread;

    fn emb(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec()).unwrap()
    }

    fn crop() -> Frame {
        Frame::new(vec![0; 4 * 8 * 3], 4, 8, 3, 0)
    }

    fn store() -> (InMemoryGalleryStore, Arc<InMemoryCropStorage>) {
        let crops = Arc::new(InMemoryCropStorage::new());
        (InMemoryGalleryStore::new(crops.clone()), crops)
    }

    fn alice() -> HumanIdentity {
        HumanIdentity::from("alice")
    }

    fn bob() -> HumanIdentity {
        HumanIdentity::from("bob")
    }

    #[test]
    fn test_insert_assigns_increasing_ids() {
        let (store, crops) = store();
        let a = store.insert(&alice(), emb(&[1.0, 0.0]), &crop()).unwrap();
        let b = store.insert(&bob(), emb(&[0.0, 1.0]), &crop()).unwrap();
        assert!(a < b);
        assert_eq!(store.len(), 2);
        assert_eq!(crops.live_count(), 2);
    }

    #[test]
    fn test_get_all_in_insertion_order() {
        let (store, _) = store();
        let first = store.insert(&alice(), emb(&[1.0, 0.0]), &crop()).unwrap();
        store.insert(&bob(), emb(&[0.0, 1.0]), &crop()).unwrap();
        let second = store.insert(&alice(), emb(&[1.0, 1.0]), &crop()).unwrap();

        let ids: Vec<EntryId> = store.get_all(&alice()).unwrap().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![first, second]);
        assert!(store.get_all(&HumanIdentity::from("carol")).unwrap().is_empty());
    }

    #[test]
    fn test_query_nearest_on_empty_store() {
        let (store, _) = store();
        assert!(store.query_nearest(&emb(&[1.0, 0.0]), 1).unwrap().is_empty());
    }

    #[test]
    fn test_query_nearest_orders_by_distance() {
        let (store, _) = store();
        store.insert(&alice(), emb(&[1.0, 0.0]), &crop()).unwrap();
        store.insert(&bob(), emb(&[0.0, 1.0]), &crop()).unwrap();

        let hits = store.query_nearest(&emb(&[0.1, 1.0]), 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].identity, bob());
        assert_eq!(hits[1].identity, alice());
        assert!(hits[0].distance <= hits[1].distance);
    }

    #[test]
    fn test_query_nearest_ties_keep_insertion_order() {
        let (store, _) = store();
        let first = store.insert(&bob(), emb(&[1.0, 0.0]), &crop()).unwrap();
        store.insert(&alice(), emb(&[2.0, 0.0]), &crop()).unwrap();

        let hits = store.query_nearest(&emb(&[1.0, 0.0]), 1).unwrap();
        assert_eq!(hits[0].entry_id, first);
        assert_abs_diff_eq!(hits[0].distance, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_query_nearest_rejects_zero_k() {
        let (store, _) = store();
        let err = store.query_nearest(&emb(&[1.0]), 0).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Validation(ValidationError::NonPositiveTopK)
        ));
    }

    #[test]
    fn test_dimension_mismatch_is_rejected() {
        let (store, crops) = store();
        store.insert(&alice(), emb(&[1.0, 0.0]), &crop()).unwrap();

        let err = store.insert(&alice(), emb(&[1.0, 0.0, 0.0]), &crop()).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Validation(ValidationError::DimensionMismatch {
                expected: 2,
                actual: 3
            })
        ));
        assert!(store.query_nearest(&emb(&[1.0, 0.0, 0.0]), 1).is_err());
        assert_eq!(crops.live_count(), 1);
    }

    #[test]
    fn test_crop_failure_leaves_store_unchanged() {
        let (store, crops) = store();
        crops.set_fail_writes(true);
        let err = store.insert(&alice(), emb(&[1.0, 0.0]), &crop()).unwrap_err();
        assert!(matches!(err, StoreError::Crop(_)));
        assert!(store.is_empty());
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_delete_archives_and_ignores_unknown() {
        let (store, crops) = store();
        let a = store.insert(&alice(), emb(&[1.0, 0.0]), &crop()).unwrap();
        let b = store.insert(&alice(), emb(&[0.0, 1.0]), &crop()).unwrap();

        store.delete(&[a, EntryId(999)]).unwrap();

        let remaining: Vec<EntryId> = store.get_all(&alice()).unwrap().iter().map(|e| e.id).collect();
        assert_eq!(remaining, vec![b]);
        assert_eq!(crops.archived().len(), 1);
    }

    #[test]
    fn test_delete_last_entry_forgets_identity() {
        let (store, _) = store();
        let a = store.insert(&alice(), emb(&[1.0, 0.0]), &crop()).unwrap();
        store.delete(&[a]).unwrap();
        assert!(store.identities().unwrap().is_empty());
    }

    #[test]
    fn test_replace_evicts_and_admits() {
        let (store, crops) = store();
        let a = store.insert(&alice(), emb(&[1.0, 0.0]), &crop()).unwrap();
        let b = store.insert(&alice(), emb(&[0.0, 1.0]), &crop()).unwrap();

        let admitted = store
            .replace(&alice(), &[a], Some((emb(&[1.0, 1.0]), &crop())))
            .unwrap()
            .unwrap();

        let ids: Vec<EntryId> = store.get_all(&alice()).unwrap().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![b, admitted]);
        assert_eq!(crops.archived().len(), 1);
    }

    #[test]
    fn test_replace_without_admit() {
        let (store, _) = store();
        let a = store.insert(&alice(), emb(&[1.0, 0.0]), &crop()).unwrap();
        assert_eq!(store.replace(&alice(), &[a], None).unwrap(), None);
        assert!(store.get_all(&alice()).unwrap().is_empty());
    }

    #[test]
    fn test_replace_rejects_foreign_entries() {
        let (store, crops) = store();
        let a = store.insert(&alice(), emb(&[1.0, 0.0]), &crop()).unwrap();
        let b = store.insert(&bob(), emb(&[0.0, 1.0]), &crop()).unwrap();

        let err = store
            .replace(&alice(), &[a, b], Some((emb(&[1.0, 1.0]), &crop())))
            .unwrap_err();

        assert!(err.is_fatal());
        assert_eq!(store.len(), 2);
        assert_eq!(crops.live_count(), 2);
        assert!(crops.archived().is_empty());
    }

    #[test]
    fn test_identities_with_counts() {
        let (store, _) = store();
        store.insert(&bob(), emb(&[1.0, 0.0]), &crop()).unwrap();
        store.insert(&alice(), emb(&[1.0, 0.0]), &crop()).unwrap();
        store.insert(&alice(), emb(&[0.0, 1.0]), &crop()).unwrap();
        assert_eq!(store.identities().unwrap(), vec![(alice(), 2), (bob(), 1)]);
    }

    #[test]
    fn test_concurrent_inserts_get_unique_ids() {
        let (store, _) = store();
        let store = Arc::new(store);
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let store = store.clone();
                thread::spawn(move || {
                    let id = HumanIdentity::from(format!("p{t}"));
                    (0..25)
                        .map(|i| store.insert(&id, emb(&[1.0, i as f32]), &crop()).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let mut all: Vec<EntryId> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 100);
        assert_eq!(store.len(), 100);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gallery.json");
        let crops = Arc::new(InMemoryCropStorage::new());

        let store = InMemoryGalleryStore::new(crops.clone());
        let a = store.insert(&alice(), emb(&[1.0, 0.0]), &crop()).unwrap();
        let b = store.insert(&bob(), emb(&[0.0, 1.0]), &crop()).unwrap();
        store.delete(&[b]).unwrap();
        store.save(&path).unwrap();
        assert!(!path.with_extension("json.part").exists());

        let reopened = InMemoryGalleryStore::open(&path, crops).unwrap();
        assert_eq!(reopened.get_all(&alice()).unwrap(), store.get_all(&alice()).unwrap());
        assert_eq!(reopened.identities().unwrap(), vec![(alice(), 1)]);

        let next = reopened.insert(&bob(), emb(&[0.0, 1.0]), &crop()).unwrap();
        assert!(next > b && next > a);
    }

    #[test]
    fn test_open_missing_snapshot_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = InMemoryGalleryStore::open(
            &dir.path().join("absent.json"),
            Arc::new(InMemoryCropStorage::new()),
        )
        .unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_open_malformed_snapshot_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gallery.json");
        std::fs::write(&path, "{ not json").unwrap();
        let result = InMemoryGalleryStore::open(&path, Arc::new(InMemoryCropStorage::new()));
        assert!(matches!(result, Err(StoreError::SnapshotFormat { .. })));
    }

    #[test]
    fn test_open_rejects_empty_embedding() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gallery.json");
        std::fs::write(
            &path,
            r#"{"version":1,"next_entry_id":1,"entries":[
                {"id":0,"identity":"a","embedding":[],"crop_ref":"x"}]}"#,
        )
        .unwrap();
        let result = InMemoryGalleryStore::open(&path, Arc::new(InMemoryCropStorage::new()));
        assert!(matches!(result, Err(StoreError::SnapshotFormat { .. })));
    }
}
