//! Skin lesion image classification.
//!
//! An image goes through [`preprocess`] into a normalized tensor, the
//! [`Classifier`] turns it into a [`Prediction`] over nine lesion classes,
//! and optionally [`analysis`] measures color, texture and shape while
//! the [`NarrativeEnricher`] asks a language model to explain the result.
//! [`DiagnosisService`] wires these together behind upload validation.

pub mod analysis;
pub mod classifier;
pub mod conditions;
pub mod config;
pub mod error;
pub mod models;
pub mod narrative;
pub mod pipeline;
pub mod preprocess;
pub mod service;
pub mod upload;

pub use analysis::{extract_features, extract_image_features};
pub use classifier::Classifier;
pub use config::AppConfig;
pub use error::{Error, Result, UploadError};
pub use models::{
    CLASS_LABELS, Diagnosis, FeatureReport, FeatureSet, ModelKind, Prediction, PreprocessedTensor,
};
pub use narrative::{Narrative, NarrativeEnricher};
pub use pipeline::{DebugConfig, MetadataValue, Pipeline, PipelineContext, PipelineData, PipelineStep};
pub use preprocess::{Preprocessor, preprocess};
pub use service::{ApiResponse, DiagnosisReport, DiagnosisService};
pub use upload::{UploadPolicy, UploadStore};
