//! Model loader strategies, tried in order by the classifier.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use ort::session::Session;
use ort::value::Tensor;
use rten_tensor::prelude::*;
use rten_tensor::NdTensor;

use crate::error::{Error, Result};
use crate::models::{ModelKind, PreprocessedTensor};

/// File name of the ONNX model inside the model directory.
pub const ONNX_MODEL_FILE: &str = "model.onnx";

/// File name of the RTen model inside the model directory.
pub const RTEN_MODEL_FILE: &str = "model.rten";

/// A loaded classification network.
pub trait LesionModel: Send + Sync {
    /// Which backend this is.
    fn kind(&self) -> ModelKind;

    /// Run one forward pass on a (1, H, W, 3) tensor, returning the raw
    /// per-class output.
    fn forward(&self, input: &PreprocessedTensor) -> Result<Vec<f32>>;
}

/// One way of obtaining a model. Loaders are tried in sequence until one succeeds.
pub trait ModelLoader: Send + Sync {
    /// Human-readable name (used in logs)
    fn name(&self) -> &str;

    fn load(&self) -> Result<Box<dyn LesionModel>>;
}

/// Loads `model.onnx` with ONNX Runtime.
pub struct OnnxLoader {
    path: PathBuf,
}

impl OnnxLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ModelLoader for OnnxLoader {
    fn name(&self) -> &str {
        "onnx"
    }

    fn load(&self) -> Result<Box<dyn LesionModel>> {
        ensure_exists(&self.path)?;
        let load_error = |reason: String| Error::ModelLoad {
            name: self.path.display().to_string(),
            reason,
        };

        let session = Session::builder()
            .map_err(|e| load_error(e.to_string()))?
            .commit_from_file(&self.path)
            .map_err(|e| load_error(e.to_string()))?;

        Ok(Box::new(OnnxModel {
            session: Mutex::new(session),
        }))
    }
}

/// ONNX Runtime session. `Session::run` needs exclusive access, so
/// concurrent predictions are serialized by the mutex.
pub struct OnnxModel {
    session: Mutex<Session>,
}

impl LesionModel for OnnxModel {
    fn kind(&self) -> ModelKind {
        ModelKind::Onnx
    }

    fn forward(&self, input: &PreprocessedTensor) -> Result<Vec<f32>> {
        let mut session = self.session.lock().map_err(|_| Error::Inference {
            reason: "ONNX session lock poisoned".to_string(),
        })?;

        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| Error::ShapeMismatch {
                expected: "probability output".to_string(),
                actual: "no outputs".to_string(),
            })?;

        let input_value = Tensor::from_array(input.clone()).map_err(inference_error)?;
        let outputs = session
            .run(ort::inputs![input_value])
            .map_err(inference_error)?;

        let (_, data) = outputs[output_name.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(inference_error)?;
        Ok(data.to_vec())
    }
}

/// Loads `model.rten` with the RTen runtime.
pub struct RtenLoader {
    path: PathBuf,
}

impl RtenLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ModelLoader for RtenLoader {
    fn name(&self) -> &str {
        "rten"
    }

    fn load(&self) -> Result<Box<dyn LesionModel>> {
        ensure_exists(&self.path)?;
        let model = rten::Model::load_file(&self.path).map_err(|e| Error::ModelLoad {
            name: self.path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(Box::new(RtenModel { model }))
    }
}

pub struct RtenModel {
    model: rten::Model,
}

impl LesionModel for RtenModel {
    fn kind(&self) -> ModelKind {
        ModelKind::Rten
    }

    fn forward(&self, input: &PreprocessedTensor) -> Result<Vec<f32>> {
        let (n, h, w, c) = input.dim();
        let data: Vec<f32> = input.iter().copied().collect();
        let tensor = NdTensor::from_data([n, h, w, c], data);

        let output = self
            .model
            .run_one(tensor.view().into(), None)
            .map_err(inference_error)?;
        let probs: rten_tensor::Tensor<f32> = output.try_into().map_err(inference_error)?;
        Ok(probs.to_vec())
    }
}

fn ensure_exists(path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(Error::ModelLoad {
            name: path.display().to_string(),
            reason: "file not found".to_string(),
        })
    }
}

fn inference_error(err: impl std::fmt::Display) -> Error {
    Error::Inference {
        reason: err.to_string(),
    }
}

/// The standard strategy order for a model directory: ONNX, then RTen.
pub fn default_loaders(model_dir: &Path) -> Vec<Box<dyn ModelLoader>> {
    vec![
        Box::new(OnnxLoader::new(model_dir.join(ONNX_MODEL_FILE))),
        Box::new(RtenLoader::new(model_dir.join(RTEN_MODEL_FILE))),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_files_fail_without_touching_runtimes() {
        let dir = tempfile::TempDir::new().unwrap();
        for loader in default_loaders(dir.path()) {
            let err = loader.load().err().unwrap();
            assert!(matches!(err, Error::ModelLoad { .. }), "{}", loader.name());
        }
    }

    #[test]
    fn test_corrupt_rten_file_is_a_load_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(RTEN_MODEL_FILE);
        std::fs::write(&path, b"definitely not a model").unwrap();
        assert!(RtenLoader::new(path).load().is_err());
    }
}
