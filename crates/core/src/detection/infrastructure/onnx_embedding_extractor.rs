/// Person re-identification embeddings (OSNet-style) via ONNX Runtime.
///
/// Crops are stretched to 256×128 (height × width), normalized with
/// ImageNet statistics, and the output vector is L2-normalized.
use std::path::Path;
use std::sync::Mutex;

use ndarray::Array4;

use crate::detection::domain::embedding_extractor::EmbeddingExtractor;
use crate::shared::frame::Frame;

use super::onnx_session::open_session;

const INPUT_HEIGHT: usize = 256;
const INPUT_WIDTH: usize = 128;
const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

pub struct OnnxEmbeddingExtractor {
    session: Mutex<ort::session::Session>,
}

impl OnnxEmbeddingExtractor {
    pub fn new(model_path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self {
            session: Mutex::new(open_session(model_path)?),
        })
    }
}

impl EmbeddingExtractor for OnnxEmbeddingExtractor {
    fn extract(&self, crop: &Frame) -> Result<Vec<f32>, Box<dyn std::error::Error>> {
        let tensor = preprocess(crop)?;
        let input_value = ort::value::Tensor::from_array(tensor)?;
        let mut session = self
            .session
            .lock()
            .map_err(|e| format!("Lock poisoned: {e}"))?;
        let outputs = session.run(ort::inputs![input_value])?;
        let first = if outputs.len() == 0 {
            None
        } else {
            let array = outputs[0].try_extract_array::<f32>()?;
            Some(array.iter().copied().collect())
        };
        to_embedding(first)
    }
}

/// Unit-length embedding from the model's first output tensor.
fn to_embedding(first_output: Option<Vec<f32>>) -> Result<Vec<f32>, Box<dyn std::error::Error>> {
    let mut embedding = first_output.ok_or("embedding model produced no outputs")?;
    if embedding.is_empty() {
        return Err("embedding model produced an empty vector".into());
    }
    l2_normalize(&mut embedding);
    Ok(embedding)
}

/// Nearest-neighbor resize to the network input, NCHW.
fn preprocess(crop: &Frame) -> Result<Array4<f32>, Box<dyn std::error::Error>> {
    let src = crop
        .as_ndarray()
        .filter(|_| crop.channels() >= 3 && crop.pixel_count() > 0)
        .ok_or("crop is not a non-empty RGB image")?;
    let src_h = crop.height() as usize;
    let src_w = crop.width() as usize;

    let mut tensor = Array4::<f32>::zeros((1, 3, INPUT_HEIGHT, INPUT_WIDTH));
    for y in 0..INPUT_HEIGHT {
        let src_y =
            (((y as f64 + 0.5) * src_h as f64 / INPUT_HEIGHT as f64) as usize).min(src_h - 1);
        for x in 0..INPUT_WIDTH {
            let src_x =
                (((x as f64 + 0.5) * src_w as f64 / INPUT_WIDTH as f64) as usize).min(src_w - 1);
            for c in 0..3 {
                let v = src[[src_y, src_x, c]] as f32 / 255.0;
                tensor[[0, c, y, x]] = (v - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
            }
        }
    }
    Ok(tensor)
}

pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}
