pub mod bytetrack_tracker;
mod math;
pub mod onnx_embedding_extractor;
pub mod onnx_person_tracker;
mod onnx_session;
