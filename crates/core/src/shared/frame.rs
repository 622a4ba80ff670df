use ndarray::ArrayView3;

use crate::shared::bounding_box::BoundingBox;

/// A single video frame or person crop: contiguous RGB bytes in row-major order.
///
/// Format conversion happens at I/O boundaries only; the identity layer
/// treats pixel data as opaque.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    index: usize,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8, index: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
            index,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    /// Decode-order position within the source video. Crops inherit the
    /// index of the frame they were cut from.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn as_ndarray(&self) -> Option<ArrayView3<'_, u8>> {
        ArrayView3::from_shape(
            (
                self.height as usize,
                self.width as usize,
                self.channels as usize,
            ),
            &self.data,
        )
        .ok()
    }

    /// Cuts out the pixels under `bbox`, clamped to the frame.
    ///
    /// Returns `None` when the clamped box is empty.
    pub fn crop(&self, bbox: &BoundingBox) -> Option<Frame> {
        let rect = bbox.to_pixel_rect(self.width, self.height)?;
        let channels = self.channels as usize;
        let row_bytes = rect.width * channels;
        let stride = self.width as usize * channels;

        let mut data = Vec::with_capacity(rect.height * row_bytes);
        for row in rect.y..rect.y + rect.height {
            let start = row * stride + rect.x * channels;
            data.extend_from_slice(self.data.get(start..start + row_bytes)?);
        }

        Some(Frame::new(
            data,
            rect.width as u32,
            rect.height as u32,
            self.channels,
            self.index,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Frame whose red channel encodes the column and green the row.
    fn gradient_frame(width: u32, height: u32) -> Frame {
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[x as u8, y as u8, 0]);
            }
        }
        Frame::new(data, width, height, 3, 7)
    }

    #[test]
    fn test_construction_and_accessors() {
        let data = vec![0u8; 12]; // 2x2x3
        let frame = Frame::new(data.clone(), 2, 2, 3, 5);
        assert_eq!(frame.width(), 2);
        assert_eq!(frame.height(), 2);
        assert_eq!(frame.channels(), 3);
        assert_eq!(frame.index(), 5);
        assert_eq!(frame.pixel_count(), 4);
        assert_eq!(frame.data(), &data[..]);
    }

    #[test]
    #[should_panic(expected = "data length must equal width * height * channels")]
    fn test_mismatched_data_length_panics_in_debug() {
        Frame::new(vec![0u8; 10], 2, 2, 3, 0);
    }

    #[test]
    fn test_as_ndarray_shape() {
        let frame = Frame::new(vec![0u8; 24], 4, 2, 3, 0);
        let arr = frame.as_ndarray().unwrap();
        assert_eq!(arr.shape(), &[2, 4, 3]);
    }

    #[test]
    fn test_crop_copies_region() {
        let frame = gradient_frame(10, 8);
        let crop = frame.crop(&BoundingBox::new(2.0, 3.0, 5.0, 7.0)).unwrap();

        assert_eq!(crop.width(), 3);
        assert_eq!(crop.height(), 4);
        assert_eq!(crop.index(), 7);
        let arr = crop.as_ndarray().unwrap();
        assert_eq!(arr[[0, 0, 0]], 2);
        assert_eq!(arr[[0, 0, 1]], 3);
        assert_eq!(arr[[3, 2, 0]], 4);
        assert_eq!(arr[[3, 2, 1]], 6);
    }

    #[test]
    fn test_crop_clamps_at_frame_edge() {
        let frame = gradient_frame(10, 8);
        let crop = frame.crop(&BoundingBox::new(7.0, 5.0, 20.0, 20.0)).unwrap();
        assert_eq!(crop.width(), 3);
        assert_eq!(crop.height(), 3);
    }

    #[test]
    fn test_crop_outside_frame_is_none() {
        let frame = gradient_frame(10, 8);
        assert!(frame.crop(&BoundingBox::new(11.0, 0.0, 15.0, 4.0)).is_none());
    }
}
