use std::path::{Path, PathBuf};

use crate::gallery::domain::crop_storage::{CropStorage, CropStorageError};
use crate::gallery::domain::gallery_entry::CropRef;
use crate::gallery::domain::identity::{EntryId, HumanIdentity};
use crate::shared::constants::{ARCHIVED_CROPS_DIR, LIVE_CROPS_DIR};
use crate::shared::frame::Frame;

/// Stores crops as JPEG files under a gallery root:
///
/// ```text
/// <root>/huid_crops/<identity>/<identity>_<entry>.jpg   live
/// <root>/trash_crops/<identity>/<identity>_<entry>.jpg  archived
/// ```
///
/// Crop refs are paths relative to the root, so a gallery directory can be
/// moved as a whole.
pub struct FileCropStorage {
    root: PathBuf,
}

impl FileCropStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of a live crop.
    pub fn resolve(&self, crop_ref: &CropRef) -> PathBuf {
        self.root.join(crop_ref.as_str())
    }

    fn file_name(identity: &HumanIdentity, entry: EntryId) -> String {
        format!("{identity}_{entry}.jpg")
    }

    fn relative(area: &str, identity: &HumanIdentity, entry: EntryId) -> PathBuf {
        Path::new(area)
            .join(identity.as_str())
            .join(Self::file_name(identity, entry))
    }
}

fn to_rgb_image(frame: &Frame) -> Result<image::RgbImage, String> {
    let data = frame.data().to_vec();
    match frame.channels() {
        3 => image::RgbImage::from_raw(frame.width(), frame.height(), data)
            .ok_or_else(|| "crop data does not match its dimensions".to_string()),
        4 => image::RgbaImage::from_raw(frame.width(), frame.height(), data)
            .map(|rgba| image::DynamicImage::ImageRgba8(rgba).to_rgb8())
            .ok_or_else(|| "crop data does not match its dimensions".to_string()),
        n => Err(format!("unsupported channel count {n}")),
    }
}

impl CropStorage for FileCropStorage {
    fn store(
        &self,
        identity: &HumanIdentity,
        entry: EntryId,
        crop: &Frame,
    ) -> Result<CropRef, CropStorageError> {
        let relative = Self::relative(LIVE_CROPS_DIR, identity, entry);
        let path = self.root.join(&relative);
        let write_err = |message: String| CropStorageError::Write {
            path: path.clone(),
            message,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| write_err(e.to_string()))?;
        }
        let img = to_rgb_image(crop).map_err(write_err)?;
        img.save(&path).map_err(|e| write_err(e.to_string()))?;

        Ok(CropRef::new(relative.to_string_lossy()))
    }

    fn archive(
        &self,
        identity: &HumanIdentity,
        entry: EntryId,
        crop_ref: &CropRef,
    ) -> Result<(), CropStorageError> {
        let from = self.resolve(crop_ref);
        if !from.exists() {
            log::debug!("Crop {crop_ref} already gone, nothing to archive");
            return Ok(());
        }
        let to = self
            .root
            .join(Self::relative(ARCHIVED_CROPS_DIR, identity, entry));
        let archive_err = |source: std::io::Error| CropStorageError::Archive {
            from: from.clone(),
            to: to.clone(),
            source,
        };

        if let Some(parent) = to.parent() {
            std::fs::create_dir_all(parent).map_err(archive_err)?;
        }
        std::fs::rename(&from, &to).map_err(archive_err)?;
        Ok(())
    }

    fn dimensions(&self, crop_ref: &CropRef) -> Result<(u32, u32), CropStorageError> {
        image::image_dimensions(self.resolve(crop_ref)).map_err(|e| CropStorageError::Read {
            crop_ref: crop_ref.clone(),
            message: e.to_string(),
        })
    }
}
