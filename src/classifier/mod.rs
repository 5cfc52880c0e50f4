//! Lesion classifier adapter.
//!
//! The [`Classifier`] is an explicitly constructed service object. Its
//! model is loaded lazily, once, on first use: each [`ModelLoader`]
//! strategy is tried in order and the seeded [`PlaceholderModel`] is the
//! final fallback, so a classifier is always able to answer.

pub mod loader;
pub mod placeholder;

use std::path::Path;
use std::sync::OnceLock;

use crate::error::{Error, Result};
use crate::models::{Diagnosis, ModelKind, Prediction, PreprocessedTensor, CLASS_LABELS, NUM_CLASSES};
use crate::preprocess::RGB_CHANNELS;

pub use loader::{default_loaders, LesionModel, ModelLoader, OnnxLoader, RtenLoader};
pub use placeholder::{PlaceholderModel, DEFAULT_PLACEHOLDER_SEED};

/// Tolerance for treating raw model output as an already-normalized distribution.
const DISTRIBUTION_TOLERANCE: f32 = 1e-3;

pub struct Classifier {
    loaders: Vec<Box<dyn ModelLoader>>,
    placeholder_seed: u64,
    model: OnceLock<Box<dyn LesionModel>>,
}

impl Classifier {
    /// Classifier that tries `loaders` in order before falling back to the placeholder.
    pub fn new(loaders: Vec<Box<dyn ModelLoader>>, placeholder_seed: u64) -> Self {
        Self {
            loaders,
            placeholder_seed,
            model: OnceLock::new(),
        }
    }

    /// ONNX then RTen artifacts from `model_dir`, then the placeholder.
    pub fn from_model_dir(model_dir: impl AsRef<Path>, placeholder_seed: u64) -> Self {
        Self::new(default_loaders(model_dir.as_ref()), placeholder_seed)
    }

    /// Classifier that always uses the seeded placeholder.
    pub fn placeholder(seed: u64) -> Self {
        Self::new(Vec::new(), seed)
    }

    /// The loaded model, loading it on first call.
    pub fn model(&self) -> &dyn LesionModel {
        self.model.get_or_init(|| self.load()).as_ref()
    }

    pub fn is_loaded(&self) -> bool {
        self.model.get().is_some()
    }

    /// Backend in use (forces loading).
    pub fn model_kind(&self) -> ModelKind {
        self.model().kind()
    }

    fn load(&self) -> Box<dyn LesionModel> {
        for loader in &self.loaders {
            match loader.load() {
                Ok(model) => {
                    tracing::info!("Model loaded successfully with {} loader", loader.name());
                    return model;
                }
                Err(err) => {
                    tracing::warn!("Model loader {} failed: {err}", loader.name());
                }
            }
        }

        tracing::warn!(
            "No model could be loaded; using placeholder model (seed {}). Predictions are not meaningful.",
            self.placeholder_seed
        );
        Box::new(PlaceholderModel::new(self.placeholder_seed))
    }

    /// Classify a preprocessed tensor.
    ///
    /// Never fails: inference errors become [`Prediction::Unknown`].
    pub fn predict(&self, tensor: &PreprocessedTensor) -> Prediction {
        match self.try_predict(tensor) {
            Ok(diagnosis) => Prediction::Diagnosed(diagnosis),
            Err(err) => {
                tracing::error!("Error in predict: {err}");
                Prediction::Unknown {
                    error: err.to_string(),
                }
            }
        }
    }

    fn try_predict(&self, tensor: &PreprocessedTensor) -> Result<Diagnosis> {
        let shape = tensor.shape();
        if shape[0] != 1 || shape[3] != RGB_CHANNELS {
            return Err(Error::ShapeMismatch {
                expected: format!("(1, H, W, {RGB_CHANNELS})"),
                actual: format!("{shape:?}"),
            });
        }

        let model = self.model();
        let raw = model.forward(tensor)?;
        let probabilities = to_distribution(&raw)?;

        let (class_index, best) = probabilities
            .iter()
            .copied()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |acc, (i, p)| if p > acc.1 { (i, p) } else { acc });

        Ok(Diagnosis {
            label: CLASS_LABELS[class_index],
            confidence: percentage(best),
            class_index,
            probabilities,
            model: model.kind(),
        })
    }
}

/// Turn raw output into a probability distribution over the classes.
///
/// Output that already is a distribution is kept as is; anything else
/// (e.g. logits) goes through a softmax.
pub fn to_distribution(raw: &[f32]) -> Result<[f32; NUM_CLASSES]> {
    if raw.len() != NUM_CLASSES {
        return Err(Error::ShapeMismatch {
            expected: format!("{NUM_CLASSES} class scores"),
            actual: format!("{} values", raw.len()),
        });
    }
    if raw.iter().any(|v| !v.is_finite()) {
        return Err(Error::Inference {
            reason: "model produced non-finite scores".to_string(),
        });
    }

    let sum: f32 = raw.iter().sum();
    let normalized = raw.iter().all(|v| *v >= 0.0) && (sum - 1.0).abs() <= DISTRIBUTION_TOLERANCE;

    let mut out = [0.0f32; NUM_CLASSES];
    if normalized {
        out.copy_from_slice(raw);
    } else {
        out.copy_from_slice(&placeholder::softmax(raw));
    }
    Ok(out)
}

/// Probability as a percentage rounded to two decimals, within [0, 100].
fn percentage(p: f32) -> f64 {
    ((f64::from(p) * 100.0 * 100.0).round() / 100.0).clamp(0.0, 100.0)
}
