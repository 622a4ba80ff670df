//! Box post-processing shared by detection backends.

use crate::shared::bounding_box::BoundingBox;

#[derive(Clone, Debug, PartialEq)]
pub struct ScoredBox {
    pub bbox: BoundingBox,
    pub score: f64,
}

/// Greedy NMS: sort by score descending, suppress boxes overlapping a kept
/// box by more than `iou_thresh`.
pub fn nms(mut boxes: Vec<ScoredBox>, iou_thresh: f64) -> Vec<ScoredBox> {
    boxes.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut keep: Vec<ScoredBox> = Vec::new();
    for candidate in boxes {
        if keep
            .iter()
            .all(|kept| kept.bbox.iou(&candidate.bbox) <= iou_thresh)
        {
            keep.push(candidate);
        }
    }
    keep
}
