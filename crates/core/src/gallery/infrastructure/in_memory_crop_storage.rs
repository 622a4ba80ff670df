use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::gallery::domain::crop_storage::{CropStorage, CropStorageError};
use crate::gallery::domain::gallery_entry::CropRef;
use crate::gallery::domain::identity::{EntryId, HumanIdentity};
use crate::shared::frame::Frame;

#[derive(Default)]
struct Crops {
    live: BTreeMap<CropRef, (u32, u32)>,
    archived: Vec<CropRef>,
}

/// Keeps crop dimensions in memory instead of writing image files.
///
/// Used for ephemeral galleries and in tests; `fail_writes` simulates a
/// full disk.
#[derive(Default)]
pub struct InMemoryCropStorage {
    crops: Mutex<Crops>,
    fail_writes: AtomicBool,
}

impl InMemoryCropStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn live_count(&self) -> usize {
        self.crops.lock().map(|c| c.live.len()).unwrap_or(0)
    }

    pub fn archived(&self) -> Vec<CropRef> {
        self.crops
            .lock()
            .map(|c| c.archived.clone())
            .unwrap_or_default()
    }
}

impl CropStorage for InMemoryCropStorage {
    fn store(
        &self,
        identity: &HumanIdentity,
        entry: EntryId,
        crop: &Frame,
    ) -> Result<CropRef, CropStorageError> {
        let crop_ref = CropRef::new(format!("mem://{identity}/{entry}"));
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CropStorageError::Write {
                path: PathBuf::from(crop_ref.as_str()),
                message: "simulated write failure".into(),
            });
        }
        let mut crops = self.crops.lock().map_err(|_| CropStorageError::Poisoned)?;
        crops
            .live
            .insert(crop_ref.clone(), (crop.width(), crop.height()));
        Ok(crop_ref)
    }

    fn archive(
        &self,
        _identity: &HumanIdentity,
        _entry: EntryId,
        crop_ref: &CropRef,
    ) -> Result<(), CropStorageError> {
        let mut crops = self.crops.lock().map_err(|_| CropStorageError::Poisoned)?;
        if crops.live.remove(crop_ref).is_some() {
            crops.archived.push(crop_ref.clone());
        }
        Ok(())
    }

    fn dimensions(&self, crop_ref: &CropRef) -> Result<(u32, u32), CropStorageError> {
        let crops = self.crops.lock().map_err(|_| CropStorageError::Poisoned)?;
        crops
            .live
            .get(crop_ref)
            .copied()
            .ok_or_else(|| CropStorageError::Read {
                crop_ref: crop_ref.clone(),
                message: "no such crop".into(),
            })
    }
}
