use std::path::PathBuf;

use thiserror::Error;

use crate::gallery::domain::gallery_store::StoreError;
use crate::shared::validation::ValidationError;

/// Reasons a whole scan is abandoned. Per-observation failures never
/// surface here; they are counted in the scan report instead.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("cannot open video source {path}: {message}")]
    SourceUnavailable { path: PathBuf, message: String },
    #[error("failed to read frame {frame}: {message}")]
    FrameRead { frame: usize, message: String },
    #[error("gallery store failed unrecoverably: {0}")]
    Store(#[source] StoreError),
    #[error("scan cancelled")]
    Cancelled,
    #[error(transparent)]
    Validation(#[from] ValidationError),
}
