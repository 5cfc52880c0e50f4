//! Preprocessing as a chain of image-to-image steps.
//!
//! Each step consumes one [`PipelineData`] and returns a new one; images
//! are never edited in place. With a debug directory every intermediate
//! image is written to `NN_step_name/01.png`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::DynamicImage;

use crate::error::{Error, Result};

#[derive(Clone)]
pub struct PipelineData {
    /// The current image (grayscale, RGB or RGBA depending on the step)
    pub image: DynamicImage,

    /// The decoded input image (shared efficiently via Arc)
    pub original: Arc<DynamicImage>,

    /// Metadata recorded by steps (e.g., "source_channels", "resized")
    pub metadata: HashMap<String, MetadataValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    Bool(bool),
    Int(i32),
    String(String),
}

impl PipelineData {
    /// Wrap a freshly decoded image; it doubles as the original
    pub fn from_image(image: DynamicImage) -> Self {
        let original = Arc::new(image.clone());
        Self {
            image,
            original,
            metadata: HashMap::new(),
        }
    }

    /// Replace the image, keeping the original and metadata
    pub fn with_image(&self, image: DynamicImage) -> Self {
        Self {
            image,
            original: self.original.clone(),
            metadata: self.metadata.clone(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: MetadataValue) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.metadata.get(key) {
            Some(MetadataValue::Bool(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_int(&self, key: &str) -> Option<i32> {
        match self.metadata.get(key) {
            Some(MetadataValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        match self.metadata.get(key) {
            Some(MetadataValue::String(v)) => Some(v.as_str()),
            _ => None,
        }
    }
}

/// Where intermediate images go
#[derive(Clone, Debug)]
pub struct DebugConfig {
    pub output_dir: PathBuf,
}

/// Shared by every step of one run
#[derive(Clone, Default)]
pub struct PipelineContext {
    pub debug: Option<DebugConfig>,
}

impl PipelineContext {
    pub fn debug_dir(&self) -> Option<&Path> {
        self.debug.as_ref().map(|d| d.output_dir.as_path())
    }
}

pub trait PipelineStep: Send + Sync {
    /// Transform one image into a new one
    fn process(&self, data: PipelineData, context: &PipelineContext) -> Result<PipelineData>;

    /// Human-readable name for this step (used in logs and debug directory names)
    fn name(&self) -> &str;
}

#[derive(Clone)]
pub struct Pipeline {
    steps: Vec<Arc<dyn PipelineStep>>,
    context: PipelineContext,
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            context: PipelineContext::default(),
        }
    }

    /// Write intermediate images under `output_dir`, which must be empty or absent
    pub fn with_debug(mut self, output_dir: PathBuf) -> Result<Self> {
        if output_dir.exists() {
            if std::fs::read_dir(&output_dir)?.next().is_some() {
                return Err(Error::InvalidParameter {
                    name: "debug_out".to_string(),
                    reason: format!("directory is not empty: {}", output_dir.display()),
                });
            }
        } else {
            std::fs::create_dir_all(&output_dir)?;
        }

        self.context.debug = Some(DebugConfig { output_dir });
        Ok(self)
    }

    pub fn add_step(mut self, step: Arc<dyn PipelineStep>) -> Self {
        self.steps.push(step);
        self
    }

    pub fn add_step_boxed(mut self, step: Box<dyn PipelineStep>) -> Self {
        self.steps.push(Arc::from(step));
        self
    }

    /// Names of the configured steps, in order
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Run every step in order on an input image
    pub fn run(&self, input: DynamicImage) -> Result<PipelineData> {
        self.run_partial(input, self.steps.len())
    }

    /// Run the pipeline but stop after `num_steps` steps (useful for debugging)
    pub fn run_partial(&self, input: DynamicImage, num_steps: usize) -> Result<PipelineData> {
        if let Some(dir) = self.context.debug_dir() {
            save_debug_image(&input, &dir.join("00_input"))?;
        }

        let mut data = PipelineData::from_image(input);

        for (step_idx, step) in self.steps.iter().take(num_steps).enumerate() {
            tracing::debug!(
                "Running step {}: {} ({}x{})",
                step_idx + 1,
                step.name(),
                data.image.width(),
                data.image.height()
            );

            data = step.process(data, &self.context)?;

            if let Some(dir) = self.context.debug_dir() {
                let step_dir_name = format!(
                    "{:02}_{}",
                    step_idx + 1,
                    step.name().to_lowercase().replace(' ', "_")
                );
                save_debug_image(&data.image, &dir.join(&step_dir_name))?;
                tracing::debug!("Debug: saved {}/01.png", step_dir_name);
            }
        }

        Ok(data)
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

fn save_debug_image(image: &DynamicImage, step_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(step_dir)?;
    let path = step_dir.join("01.png");
    image.save(&path).map_err(|source| Error::ImageSave { path, source })
}
