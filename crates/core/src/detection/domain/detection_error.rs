use thiserror::Error;

use crate::shared::validation::ValidationError;

/// Failure on a single observation. Always recovered by skipping it.
#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("tracker failed on frame {frame}: {message}")]
    Tracker { frame: usize, message: String },
    #[error("embedding extraction failed for track {track}: {message}")]
    Embedding { track: u32, message: String },
    #[error("empty crop for track {track}")]
    EmptyCrop { track: u32 },
    #[error(transparent)]
    Validation(#[from] ValidationError),
}
