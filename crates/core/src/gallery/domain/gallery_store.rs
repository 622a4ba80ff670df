use std::path::PathBuf;

use thiserror::Error;

use crate::gallery::domain::crop_storage::CropStorageError;
use crate::gallery::domain::embedding::Embedding;
use crate::gallery::domain::gallery_entry::{GalleryEntry, NearestMatch};
use crate::gallery::domain::identity::{EntryId, HumanIdentity};
use crate::shared::frame::Frame;
use crate::shared::validation::ValidationError;

#[derive(Error, Debug)]
pub enum StoreError {
    /// Transient backend outage; callers skip the observation and move on.
    #[error("gallery backend unavailable: {0}")]
    Unavailable(String),
    /// The store can no longer be trusted (poisoned lock, foreign entry ids).
    #[error("gallery state inconsistent: {0}")]
    Inconsistent(String),
    #[error(transparent)]
    Crop(#[from] CropStorageError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("failed to access gallery snapshot {path}: {source}")]
    SnapshotIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed gallery snapshot {path}: {source}")]
    SnapshotFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    /// Fatal errors abort a whole scan; everything else is contained to
    /// the observation that triggered it.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::Inconsistent(_))
    }
}

/// Persistent mapping from identity to a bounded set of gallery entries,
/// with nearest-neighbor search across all identities.
///
/// Shared by concurrent scans, hence `Send + Sync` and `&self` everywhere.
/// Each call is atomic on its own; read-then-write sequences spanning
/// several calls need external per-identity serialization.
pub trait GalleryStore: Send + Sync {
    /// Appends a new entry for `identity`, persisting `crop` alongside it.
    fn insert(
        &self,
        identity: &HumanIdentity,
        embedding: Embedding,
        crop: &Frame,
    ) -> Result<EntryId, StoreError>;

    /// Up to `k` entries ordered by ascending cosine distance; ties keep
    /// insertion order. Empty when the store is empty.
    fn query_nearest(&self, embedding: &Embedding, k: usize)
        -> Result<Vec<NearestMatch>, StoreError>;

    /// All entries of `identity` in insertion order; empty when unknown.
    fn get_all(&self, identity: &HumanIdentity) -> Result<Vec<GalleryEntry>, StoreError>;

    /// Removes entries all-or-nothing and archives their crops. Unknown ids
    /// are ignored.
    fn delete(&self, ids: &[EntryId]) -> Result<(), StoreError>;

    /// Evicts `evict` and admits `admit` for `identity` as one atomic unit.
    ///
    /// Every id in `evict` must belong to `identity`; otherwise nothing
    /// changes and `StoreError::Inconsistent` is returned.
    fn replace(
        &self,
        identity: &HumanIdentity,
        evict: &[EntryId],
        admit: Option<(Embedding, &Frame)>,
    ) -> Result<Option<EntryId>, StoreError>;

    /// Known identities with their entry counts, ordered by identity.
    fn identities(&self) -> Result<Vec<(HumanIdentity, usize)>, StoreError>;
}
