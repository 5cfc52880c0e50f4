//! Error types for lesionscan.

use std::path::PathBuf;
use thiserror::Error;

/// Message shown to end users for any internal failure.
pub const GENERIC_USER_MESSAGE: &str = "An error occurred during processing. Please try again.";

/// Main error type for the lesionscan library.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to open or decode an image file.
    #[error("failed to load image from {path}: {source}")]
    ImageLoad {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Failed to write an image file.
    #[error("failed to save image to {path}: {source}")]
    ImageSave {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// The upload was rejected before any processing happened.
    #[error(transparent)]
    Upload(#[from] UploadError),

    /// A model artifact could not be loaded by one loader strategy.
    #[error("failed to load model {name}: {reason}")]
    ModelLoad { name: String, reason: String },

    /// The forward pass failed.
    #[error("model inference failed: {reason}")]
    Inference { reason: String },

    /// Tensor or image array had an unexpected layout.
    #[error("shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    /// Invalid parameter value.
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    /// The narrative enrichment service could not be reached or understood.
    #[error("narrative enrichment failed: {0}")]
    Narrative(String),

    /// A timestamp could not be formatted.
    #[error("failed to format timestamp: {0}")]
    Timestamp(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Client-side upload problems (HTTP 400 class).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    #[error("No file part")]
    MissingFile,

    #[error("No selected file")]
    EmptyFilename,

    #[error("The uploaded file is empty")]
    EmptyPayload,

    #[error("File type not allowed. Please upload a JPG, JPEG, or PNG image.")]
    DisallowedExtension { extension: String },

    #[error("File too large: {size} bytes (maximum {max} bytes)")]
    TooLarge { size: u64, max: u64 },
}

impl Error {
    /// Whether the failure was caused by the caller's input.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::Upload(_))
    }

    /// Message safe to show to an end user.
    ///
    /// Upload problems are described precisely; everything else collapses
    /// into [`GENERIC_USER_MESSAGE`] so internals never leak.
    pub fn user_message(&self) -> String {
        match self {
            Error::Upload(err) => err.to_string(),
            _ => GENERIC_USER_MESSAGE.to_string(),
        }
    }
}

/// Result type alias for lesionscan operations.
pub type Result<T> = std::result::Result<T, Error>;
