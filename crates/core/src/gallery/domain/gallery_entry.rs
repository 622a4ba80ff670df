use std::fmt;

use serde::{Deserialize, Serialize};

use crate::gallery::domain::embedding::Embedding;
use crate::gallery::domain::identity::{EntryId, HumanIdentity};

/// Opaque handle to a stored crop image, issued by a `CropStorage`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CropRef(String);

impl CropRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CropRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One representative observation of an identity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GalleryEntry {
    pub id: EntryId,
    pub identity: HumanIdentity,
    pub embedding: Embedding,
    pub crop_ref: CropRef,
}

/// A nearest-neighbor hit from [`GalleryStore::query_nearest`].
///
/// [`GalleryStore::query_nearest`]: crate::gallery::domain::gallery_store::GalleryStore::query_nearest
#[derive(Clone, Debug, PartialEq)]
pub struct NearestMatch {
    pub identity: HumanIdentity,
    pub entry_id: EntryId,
    pub distance: f64,
}
