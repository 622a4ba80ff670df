/// Axis-aligned person box in frame pixel coordinates, `(x1, y1)` inclusive
/// top-left and `(x2, y2)` exclusive bottom-right.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

/// Integer pixel rectangle clamped to a frame, guaranteed non-empty.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelRect {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl BoundingBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f64 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f64 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    pub fn iou(&self, other: &BoundingBox) -> f64 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);

        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        if inter == 0.0 {
            return 0.0;
        }
        inter / (self.area() + other.area() - inter)
    }

    /// Truncates to whole pixels and clamps to the frame.
    ///
    /// Returns `None` when nothing of the box lies inside the frame.
    pub fn to_pixel_rect(&self, frame_width: u32, frame_height: u32) -> Option<PixelRect> {
        let clamp = |v: f64, max: u32| -> usize {
            if v.is_nan() {
                0
            } else {
                (v.max(0.0) as usize).min(max as usize)
            }
        };
        let x1 = clamp(self.x1, frame_width);
        let y1 = clamp(self.y1, frame_height);
        let x2 = clamp(self.x2, frame_width);
        let y2 = clamp(self.y2, frame_height);

        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(PixelRect {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
        })
    }
}
