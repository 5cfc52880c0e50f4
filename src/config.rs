//! Application configuration.
//!
//! Defaults match a local development setup. [`AppConfig::from_env`]
//! overlays environment variables and [`AppConfig::from_json_file`] reads
//! a serialized config:
//!
//! | variable                 | field                            |
//! |--------------------------|----------------------------------|
//! | `UPLOAD_FOLDER`          | `upload.dir`                     |
//! | `MAX_CONTENT_LENGTH`     | `upload.policy.max_bytes`        |
//! | `MODEL_DIR`              | `classifier.model_dir`           |
//! | `PLACEHOLDER_SEED`       | `classifier.placeholder_seed`    |
//! | `GROQ_API_KEY`           | `narrative.api_key`              |
//! | `GROQ_MODEL`             | `narrative.model`                |
//! | `GROQ_ENDPOINT`          | `narrative.endpoint`             |
//! | `NARRATIVE_TIMEOUT_SECS` | `narrative.timeout`              |

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::classifier::DEFAULT_PLACEHOLDER_SEED;
use crate::error::{Error, Result};
use crate::narrative::NarrativeConfig;
use crate::preprocess::DEFAULT_TARGET_SIZE;
use crate::upload::UploadPolicy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub upload: UploadConfig,
    pub classifier: ClassifierConfig,
    pub narrative: NarrativeConfig,
    /// Attach color/texture/shape statistics to each diagnosis
    #[serde(default)]
    pub extract_features: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadConfig {
    pub dir: PathBuf,
    pub policy: UploadPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Directory holding `model.onnx` and/or `model.rten`
    pub model_dir: PathBuf,
    /// Classifier input as (height, width)
    pub input_size: (u32, u32),
    pub placeholder_seed: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            upload: UploadConfig {
                dir: PathBuf::from("static/uploads"),
                policy: UploadPolicy::default(),
            },
            classifier: ClassifierConfig {
                model_dir: PathBuf::from("static/models"),
                input_size: DEFAULT_TARGET_SIZE,
                placeholder_seed: DEFAULT_PLACEHOLDER_SEED,
            },
            narrative: NarrativeConfig::default(),
            extract_features: false,
        }
    }
}

impl AppConfig {
    /// Defaults overlaid with environment variables
    pub fn from_env() -> Result<Self> {
        Self::default().with_vars(|key| std::env::var(key).ok())
    }

    /// Overlay values from `lookup` (an environment-like source)
    pub fn with_vars(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(dir) = lookup("UPLOAD_FOLDER") {
            self.upload.dir = PathBuf::from(dir);
        }
        if let Some(max) = lookup("MAX_CONTENT_LENGTH") {
            self.upload.policy.max_bytes = parse_var("MAX_CONTENT_LENGTH", &max)?;
        }
        if let Some(dir) = lookup("MODEL_DIR") {
            self.classifier.model_dir = PathBuf::from(dir);
        }
        if let Some(seed) = lookup("PLACEHOLDER_SEED") {
            self.classifier.placeholder_seed = parse_var("PLACEHOLDER_SEED", &seed)?;
        }
        if let Some(key) = lookup("GROQ_API_KEY") {
            self.narrative.api_key = Some(key).filter(|k| !k.trim().is_empty());
        }
        if let Some(model) = lookup("GROQ_MODEL") {
            self.narrative.model = model;
        }
        if let Some(endpoint) = lookup("GROQ_ENDPOINT") {
            self.narrative.endpoint = endpoint;
        }
        if let Some(secs) = lookup("NARRATIVE_TIMEOUT_SECS") {
            self.narrative.timeout = Duration::from_secs(parse_var("NARRATIVE_TIMEOUT_SECS", &secs)?);
        }
        self.validate()?;
        Ok(self)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_file(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any parameter is out of valid range.
    pub fn validate(&self) -> Result<()> {
        let (height, width) = self.classifier.input_size;
        if height == 0 || width == 0 {
            return Err(invalid("classifier.input_size", "must be positive"));
        }
        if self.upload.policy.max_bytes == 0 {
            return Err(invalid("upload.policy.max_bytes", "must be greater than 0"));
        }
        if self.upload.policy.allowed_extensions.is_empty() {
            return Err(invalid("upload.policy.allowed_extensions", "must not be empty"));
        }
        if self.narrative.timeout.is_zero() {
            return Err(invalid("narrative.timeout", "must be greater than 0"));
        }
        Ok(())
    }
}

fn invalid(name: &str, reason: &str) -> Error {
    Error::InvalidParameter {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| invalid(name, &format!("cannot parse {value:?}")))
}
