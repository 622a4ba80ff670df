/// COCO YOLO person detector plus ByteTrack, via ONNX Runtime.
///
/// Expects an Ultralytics-style export whose output is
/// `[1, 4 + classes, N]` (or its transpose) with box centre, size, then
/// per-class scores. Only class 0 (person) is used.
use std::path::Path;

use ndarray::Array4;

use crate::detection::domain::person_tracker::{PersonTracker, TrackedPerson};
use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;

use super::bytetrack_tracker::{ByteTracker, Detection};
use super::math::{nms, ScoredBox};
use super::onnx_session::{fixed_input_side, open_session};

const DEFAULT_INPUT_SIZE: u32 = 640;
const NMS_IOU_THRESH: f64 = 0.45;
const BOX_VALUES: usize = 4;
const PERSON_CLASS: usize = 0;
const LETTERBOX_GRAY: f32 = 114.0 / 255.0;

pub struct OnnxPersonTracker {
    session: ort::session::Session,
    tracker: ByteTracker,
    input_size: u32,
}

impl OnnxPersonTracker {
    pub fn new(model_path: &Path, max_lost: usize) -> Result<Self, Box<dyn std::error::Error>> {
        let session = open_session(model_path)?;
        let input_size = fixed_input_side(&session).unwrap_or(DEFAULT_INPUT_SIZE);
        Ok(Self {
            session,
            tracker: ByteTracker::new(max_lost),
            input_size,
        })
    }
}

impl PersonTracker for OnnxPersonTracker {
    fn track(
        &mut self,
        frame: &Frame,
        confidence: f64,
    ) -> Result<Vec<TrackedPerson>, Box<dyn std::error::Error>> {
        let (input, letterboxed) = letterbox(frame, self.input_size)?;

        let input_value = ort::value::Tensor::from_array(input)?;
        let outputs = self.session.run(ort::inputs![input_value])?;
        if outputs.len() == 0 {
            return Err("person detector produced no outputs".into());
        }
        let tensor = outputs[0].try_extract_array::<f32>()?;
        let data = tensor.as_slice().ok_or("cannot get detector output slice")?;

        let people = decode_people(data, tensor.shape(), confidence, &letterboxed)?;
        let people = nms(people, NMS_IOU_THRESH);

        let detections: Vec<Detection> = people
            .into_iter()
            .map(|p| Detection {
                bbox: p.bbox,
                score: p.score,
            })
            .collect();
        let tracks = self.tracker.update(&detections);

        Ok(tracks
            .into_iter()
            .map(|t| TrackedPerson {
                bbox: t.bbox,
                track_id: t.id,
            })
            .collect())
    }

    fn reset(&mut self) {
        self.tracker.reset();
    }
}

/// Mapping from letterboxed model coordinates back to the frame.
struct Letterbox {
    scale: f64,
    pad_x: u32,
    pad_y: u32,
}

impl Letterbox {
    fn to_frame(&self, cx: f64, cy: f64, w: f64, h: f64) -> BoundingBox {
        let px = self.pad_x as f64;
        let py = self.pad_y as f64;
        BoundingBox::new(
            (cx - w / 2.0 - px) / self.scale,
            (cy - h / 2.0 - py) / self.scale,
            (cx + w / 2.0 - px) / self.scale,
            (cy + h / 2.0 - py) / self.scale,
        )
    }
}

/// Aspect-preserving resize into a gray-padded square, NCHW in `[0, 1]`.
fn letterbox(
    frame: &Frame,
    target_size: u32,
) -> Result<(Array4<f32>, Letterbox), Box<dyn std::error::Error>> {
    let src = frame
        .as_ndarray()
        .filter(|_| frame.channels() >= 3 && frame.pixel_count() > 0)
        .ok_or("frame is not a non-empty RGB image")?;
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;

    let target = target_size as f64;
    let scale = (target / src_w as f64).min(target / src_h as f64);
    let new_w = ((src_w as f64 * scale).round() as u32).min(target_size);
    let new_h = ((src_h as f64 * scale).round() as u32).min(target_size);
    let pad_x = (target_size - new_w) / 2;
    let pad_y = (target_size - new_h) / 2;

    let side = target_size as usize;
    let mut tensor = Array4::<f32>::from_elem((1, 3, side, side), LETTERBOX_GRAY);
    for y in 0..new_h as usize {
        let src_y = ((y as f64 / scale) as usize).min(src_h - 1);
        for x in 0..new_w as usize {
            let src_x = ((x as f64 / scale) as usize).min(src_w - 1);
            let ty = pad_y as usize + y;
            let tx = pad_x as usize + x;
            for c in 0..3 {
                tensor[[0, c, ty, tx]] = src[[src_y, src_x, c]] as f32 / 255.0;
            }
        }
    }

    Ok((
        tensor,
        Letterbox {
            scale,
            pad_x,
            pad_y,
        },
    ))
}

/// Pulls person boxes at or above `confidence` out of the raw output,
/// mapped back to frame coordinates.
fn decode_people(
    data: &[f32],
    shape: &[usize],
    confidence: f64,
    letterbox: &Letterbox,
) -> Result<Vec<ScoredBox>, String> {
    if shape.len() != 3 {
        return Err(format!("unexpected detector output shape {shape:?}"));
    }
    // Fewer features than candidates means the [1, features, N] layout.
    let transposed = shape[1] < shape[2];
    let (num_dets, num_feats) = if transposed {
        (shape[2], shape[1])
    } else {
        (shape[1], shape[2])
    };
    if num_feats <= BOX_VALUES + PERSON_CLASS {
        return Err(format!("detector output has no class scores: {shape:?}"));
    }
    if data.len() < num_dets * num_feats {
        return Err("detector output shorter than its shape".into());
    }

    let at = |det: usize, feat: usize| -> f64 {
        let idx = if transposed {
            feat * num_dets + det
        } else {
            det * num_feats + feat
        };
        data[idx] as f64
    };

    Ok((0..num_dets)
        .filter_map(|i| {
            let score = at(i, BOX_VALUES + PERSON_CLASS);
            (score >= confidence).then(|| ScoredBox {
                bbox: letterbox.to_frame(at(i, 0), at(i, 1), at(i, 2), at(i, 3)),
                score,
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn gray_frame(width: u32, height: u32, value: u8) -> Frame {
        Frame::new(
            vec![value; (width * height * 3) as usize],
            width,
            height,
            3,
            0,
        )
    }

    fn identity_letterbox() -> Letterbox {
        Letterbox {
            scale: 1.0,
            pad_x: 0,
            pad_y: 0,
        }
    }

    #[test]
    fn test_letterbox_preserves_aspect_ratio() {
        let (tensor, lb) = letterbox(&gray_frame(200, 100, 128), 640).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 640, 640]);
        assert_abs_diff_eq!(lb.scale, 3.2, epsilon = 1e-9);
        assert_eq!(lb.pad_x, 0);
        assert_eq!(lb.pad_y, 160);
    }

    #[test]
    fn test_letterbox_pads_with_gray_and_normalizes() {
        let (tensor, lb) = letterbox(&gray_frame(100, 50, 255), 640).unwrap();
        let y = lb.pad_y as usize + 1;
        assert_abs_diff_eq!(tensor[[0, 0, y, 1]], 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(tensor[[0, 0, 0, 0]], LETTERBOX_GRAY, epsilon = 1e-6);
    }

    #[test]
    fn test_letterbox_rejects_empty_frame() {
        let frame = Frame::new(Vec::new(), 0, 0, 3, 0);
        assert!(letterbox(&frame, 640).is_err());
    }

    #[test]
    fn test_letterbox_coordinates_round_trip() {
        let lb = Letterbox {
            scale: 2.0,
            pad_x: 0,
            pad_y: 100,
        };
        let bbox = lb.to_frame(100.0, 300.0, 40.0, 80.0);
        assert_eq!(bbox, BoundingBox::new(40.0, 80.0, 60.0, 120.0));
    }

    #[test]
    fn test_decode_people_feature_major_layout() {
        // 8 candidates, 5 features (box + person), laid out [1, 5, 8].
        #[rustfmt::skip]
        let data = [
            50.0, 200.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0,   // cx
            60.0, 200.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0,   // cy
            20.0, 10.0,  0.0, 0.0, 0.0, 0.0, 0.0, 0.0,   // w
            40.0, 10.0,  0.0, 0.0, 0.0, 0.0, 0.0, 0.0,   // h
            0.9,  0.2,   0.0, 0.0, 0.0, 0.0, 0.0, 0.0,   // person
        ];
        let people = decode_people(&data, &[1, 5, 8], 0.7, &identity_letterbox()).unwrap();
        assert_eq!(people.len(), 1);
        assert_eq!(people[0].bbox, BoundingBox::new(40.0, 40.0, 60.0, 80.0));
        assert_abs_diff_eq!(people[0].score, 0.9, epsilon = 1e-6);
    }

    #[test]
    fn test_decode_people_candidate_major_layout() {
        #[rustfmt::skip]
        let data = [
            10.0, 10.0, 4.0, 4.0, 0.8,
            30.0, 30.0, 4.0, 4.0, 0.75,
            50.0, 50.0, 4.0, 4.0, 0.1,
            70.0, 70.0, 4.0, 4.0, 0.99,
            90.0, 90.0, 4.0, 4.0, 0.71,
            11.0, 11.0, 4.0, 4.0, 0.0,
        ];
        let people = decode_people(&data, &[1, 6, 5], 0.7, &identity_letterbox()).unwrap();
        assert_eq!(people.len(), 4);
    }

    #[test]
    fn test_decode_people_rejects_bad_shape() {
        assert!(decode_people(&[0.0; 4], &[4], 0.5, &identity_letterbox()).is_err());
        assert!(decode_people(&[0.0; 8], &[1, 4, 2], 0.5, &identity_letterbox()).is_err());
    }
}
