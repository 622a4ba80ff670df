use std::path::Path;

use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;

/// Opens an ONNX model with the platform's preferred execution provider.
///
/// CoreML on macOS and DirectML on Windows; elsewhere ONNX Runtime's CPU
/// provider. Unavailable providers fall back to CPU inside `ort`.
pub fn open_session(model_path: &Path) -> Result<Session, Box<dyn std::error::Error>> {
    if !model_path.is_file() {
        return Err(format!("model not found: {}", model_path.display()).into());
    }
    let intra_threads = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let session = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_inter_threads(1)?
        .with_intra_threads(intra_threads)?
        .with_execution_providers(preferred_execution_providers())?
        .commit_from_file(model_path)?;
    log::debug!("Loaded ONNX model {}", model_path.display());
    Ok(session)
}

fn preferred_execution_providers() -> Vec<ort::execution_providers::ExecutionProviderDispatch> {
    #[cfg(target_os = "macos")]
    {
        vec![ort::execution_providers::CoreMLExecutionProvider::default().build()]
    }
    #[cfg(target_os = "windows")]
    {
        vec![ort::execution_providers::DirectMLExecutionProvider::default().build()]
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        vec![]
    }
}

/// Reads the square input side from an NCHW model input, if fixed.
pub fn fixed_input_side(session: &Session) -> Option<u32> {
    session.inputs().first().and_then(|input| {
        if let ort::value::ValueType::Tensor { ref shape, .. } = input.dtype() {
            (shape.len() >= 4 && shape[2] > 0).then(|| shape[2] as u32)
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_model_is_rejected_before_loading() {
        let dir = tempfile::tempdir().unwrap();
        let err = open_session(&dir.path().join("absent.onnx")).unwrap_err();
        assert!(err.to_string().contains("model not found"));
    }
}
