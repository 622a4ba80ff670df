use std::path::PathBuf;

use thiserror::Error;

use crate::gallery::domain::gallery_entry::CropRef;
use crate::gallery::domain::identity::{EntryId, HumanIdentity};
use crate::shared::frame::Frame;

#[derive(Error, Debug)]
pub enum CropStorageError {
    #[error("failed to write crop {path}: {message}")]
    Write { path: PathBuf, message: String },
    #[error("failed to archive crop {from} to {to}: {source}")]
    Archive {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read crop {crop_ref}: {message}")]
    Read { crop_ref: CropRef, message: String },
    #[error("crop storage lock poisoned")]
    Poisoned,
}

/// Persists person crops alongside gallery entries.
///
/// Evicted crops are archived rather than destroyed so every crop that
/// ever represented an identity stays auditable.
pub trait CropStorage: Send + Sync {
    fn store(
        &self,
        identity: &HumanIdentity,
        entry: EntryId,
        crop: &Frame,
    ) -> Result<CropRef, CropStorageError>;

    /// Moves a live crop to the archive area. Archiving a crop that no
    /// longer exists is not an error.
    fn archive(
        &self,
        identity: &HumanIdentity,
        entry: EntryId,
        crop_ref: &CropRef,
    ) -> Result<(), CropStorageError>;

    /// `(width, height)` of a live crop.
    fn dimensions(&self, crop_ref: &CropRef) -> Result<(u32, u32), CropStorageError>;
}
