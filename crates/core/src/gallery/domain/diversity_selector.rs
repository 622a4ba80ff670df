use thiserror::Error;

use crate::gallery::domain::embedding::Embedding;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SelectionError {
    #[error("selection target must be positive")]
    ZeroTarget,
    #[error(
        "exhaustive selection of {target} from {candidates} candidates needs {combinations} \
         subsets, above the limit of {limit}"
    )]
    TooManyCombinations {
        candidates: usize,
        target: usize,
        combinations: u64,
        limit: u64,
    },
}

/// Picks which gallery candidates survive when an identity is over its cap.
///
/// Implementations return indices into `candidates`, ascending, of length
/// `min(target, candidates.len())`. The complement is evicted.
pub trait DiversitySelector: Send + Sync {
    fn select(&self, candidates: &[Embedding], target: usize) -> Result<Vec<usize>, SelectionError>;

    fn name(&self) -> &'static str;
}
