use serde::{Deserialize, Serialize};

use crate::shared::validation::ValidationError;

/// Fixed-length appearance vector for one person crop.
///
/// Opaque to the identity layer apart from distance computation. Always
/// non-empty and finite; construction goes through [`Embedding::new`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "Vec<f32>")]
pub struct Embedding(Vec<f32>);

impl Embedding {
    pub fn new(values: Vec<f32>) -> Result<Self, ValidationError> {
        if values.is_empty() {
            return Err(ValidationError::EmptyEmbedding);
        }
        if let Some(idx) = values.iter().position(|v| !v.is_finite()) {
            return Err(ValidationError::NonFiniteEmbedding(idx));
        }
        Ok(Self(values))
    }

    pub fn values(&self) -> &[f32] {
        &self.0
    }

    pub fn dimension(&self) -> usize {
        self.0.len()
    }

    pub fn norm(&self) -> f64 {
        self.0
            .iter()
            .map(|v| (*v as f64) * (*v as f64))
            .sum::<f64>()
            .sqrt()
    }

    /// Cosine distance `1 - cos(a, b)`, within `[0, 2]`.
    ///
    /// A zero vector has no direction and sits at distance 1 from everything.
    pub fn cosine_distance(&self, other: &Embedding) -> f64 {
        let norms = self.norm() * other.norm();
        if norms == 0.0 {
            return 1.0;
        }
        let dot: f64 = self
            .0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (*a as f64) * (*b as f64))
            .sum();
        (1.0 - dot / norms).clamp(0.0, 2.0)
    }
}

impl TryFrom<Vec<f32>> for Embedding {
    type Error = ValidationError;

    fn try_from(values: Vec<f32>) -> Result<Self, Self::Error> {
        Self::new(values)
    }
}

impl From<Embedding> for Vec<f32> {
    fn from(embedding: Embedding) -> Self {
        embedding.0
    }
}
