use crate::gallery::domain::diversity_selector::{DiversitySelector, SelectionError};
use crate::gallery::domain::embedding::Embedding;
use crate::gallery::infrastructure::math::{normalized_rows, subset_log_det};

const TIE_EPSILON: f64 = 1e-9;

/// Greedy MAP approximation of the log-det objective: grows the kept set
/// one candidate at a time, each time adding whichever candidate yields the
/// largest volume. Linear in the candidate count per step, so it scales to
/// caps where exhaustive enumeration is out of reach.
pub struct GreedyDiversitySelector;

impl DiversitySelector for GreedyDiversitySelector {
    fn select(&self, candidates: &[Embedding], target: usize) -> Result<Vec<usize>, SelectionError> {
        if target == 0 {
            return Err(SelectionError::ZeroTarget);
        }
        if candidates.len() <= target {
            return Ok((0..candidates.len()).collect());
        }

        let rows = normalized_rows(candidates);
        let mut chosen: Vec<usize> = Vec::with_capacity(target);
        let mut trial: Vec<usize> = Vec::with_capacity(target);

        while chosen.len() < target {
            let mut best: Option<(f64, usize)> = None;
            for idx in (0..candidates.len()).filter(|i| !chosen.contains(i)) {
                trial.clear();
                trial.extend_from_slice(&chosen);
                trial.push(idx);
                let score = subset_log_det(&rows, &trial);
                let better = match best {
                    None => true,
                    Some((best_score, _)) => score > best_score + TIE_EPSILON,
                };
                if better {
                    best = Some((score, idx));
                }
            }
            match best {
                Some((_, idx)) => chosen.push(idx),
                None => break,
            }
        }

        chosen.sort_unstable();
        Ok(chosen)
    }

    fn name(&self) -> &'static str {
        "greedy"
    }
}
