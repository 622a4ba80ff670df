use crate::shared::frame::Frame;

/// Domain interface for appearance feature extraction.
///
/// Given the same crop, returns the same fixed-length vector.
pub trait EmbeddingExtractor: Send {
    fn extract(&self, crop: &Frame) -> Result<Vec<f32>, Box<dyn std::error::Error>>;
}
