mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from lesionscan for tests
pub use lesionscan::classifier::{LesionModel, ModelLoader};
pub use lesionscan::{
    AppConfig, Classifier, DiagnosisService, FeatureReport, ModelKind, NarrativeEnricher, Prediction,
    Preprocessor, UploadPolicy, UploadStore,
};
