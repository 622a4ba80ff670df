use crate::gallery::domain::diversity_selector::{DiversitySelector, SelectionError};
use crate::gallery::domain::embedding::Embedding;
use crate::gallery::infrastructure::math::{binomial, normalized_rows, subset_log_det, Combinations};

/// Default ceiling on subsets scored per call. At cap 5 with one new
/// candidate only 6 subsets are scored; the ceiling guards misconfigured caps.
pub const DEFAULT_MAX_COMBINATIONS: u64 = 100_000;

/// A later subset must beat the incumbent by more than this to replace it,
/// so numerically equal scores resolve to the lexicographically first subset.
const TIE_EPSILON: f64 = 1e-9;

/// Scores every `target`-subset of the candidates and keeps the one whose
/// unit-normalized embeddings span the largest volume (maximum log-det of
/// the Gram matrix).
pub struct ExhaustiveDiversitySelector {
    max_combinations: u64,
}

impl ExhaustiveDiversitySelector {
    pub fn new() -> Self {
        Self {
            max_combinations: DEFAULT_MAX_COMBINATIONS,
        }
    }

    pub fn with_max_combinations(max_combinations: u64) -> Self {
        Self { max_combinations }
    }
}

impl Default for ExhaustiveDiversitySelector {
    fn default() -> Self {
        Self::new()
    }
}

impl DiversitySelector for ExhaustiveDiversitySelector {
    fn select(&self, candidates: &[Embedding], target: usize) -> Result<Vec<usize>, SelectionError> {
        if target == 0 {
            return Err(SelectionError::ZeroTarget);
        }
        if candidates.len() <= target {
            return Ok((0..candidates.len()).collect());
        }

        let combinations = binomial(candidates.len(), target);
        if combinations > self.max_combinations {
            return Err(SelectionError::TooManyCombinations {
                candidates: candidates.len(),
                target,
                combinations,
                limit: self.max_combinations,
            });
        }

        let rows = normalized_rows(candidates);
        let mut best: Option<(f64, Vec<usize>)> = None;
        for subset in Combinations::new(candidates.len(), target) {
            let score = subset_log_det(&rows, &subset);
            let better = match &best {
                None => true,
                Some((best_score, _)) => score > best_score + TIE_EPSILON,
            };
            if better {
                best = Some((score, subset));
            }
        }

        log::trace!(
            "Exhaustive selection scored {combinations} subsets of {} candidates",
            candidates.len()
        );
        Ok(best.map(|(_, subset)| subset).unwrap_or_default())
    }

    fn name(&self) -> &'static str {
        "exhaustive"
    }
}
