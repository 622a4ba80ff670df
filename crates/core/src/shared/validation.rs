use thiserror::Error;

/// Malformed input rejected at a boundary before it reaches resolution logic.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("embedding must not be empty")]
    EmptyEmbedding,
    #[error("embedding contains a non-finite value at index {0}")]
    NonFiniteEmbedding(usize),
    #[error("embedding dimension {actual} does not match gallery dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("top_k must be positive")]
    NonPositiveTopK,
    #[error("gallery cap must be positive")]
    InvalidCap,
    #[error("match threshold must be within [0, 2], got {0}")]
    InvalidThreshold(f64),
    #[error("refresh interval must be positive")]
    InvalidRefreshInterval,
    #[error("detection confidence must be within [0, 1], got {0}")]
    InvalidConfidence(f64),
}
