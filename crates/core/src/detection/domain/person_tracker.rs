use crate::gallery::domain::identity::TrackId;
use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;

/// One tracked person in one frame, in frame pixel coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackedPerson {
    pub bbox: BoundingBox,
    pub track_id: TrackId,
}

/// Domain interface for person detection plus tracking.
///
/// Track ids are stable across consecutive frames of one video only.
/// Implementations carry tracking state, hence `&mut self`; `reset` starts
/// a fresh tracking session for the next video.
pub trait PersonTracker: Send {
    fn track(
        &mut self,
        frame: &Frame,
        confidence: f64,
    ) -> Result<Vec<TrackedPerson>, Box<dyn std::error::Error>>;

    fn reset(&mut self);
}
