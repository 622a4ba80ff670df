use std::path::Path;

use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;

/// A finite, ordered sequence of decoded frames.
///
/// Single pass: once `frames` has been drained, the source must be
/// reopened to scan again.
pub trait FrameSource: Send {
    /// Opens the resource at `path`; fails if it is missing or unreadable.
    fn open(&mut self, path: &Path) -> Result<VideoMetadata, Box<dyn std::error::Error>>;

    /// Frames in decode order.
    fn frames(
        &mut self,
    ) -> Box<dyn Iterator<Item = Result<Frame, Box<dyn std::error::Error>>> + '_>;

    fn close(&mut self);
}
