//! Image loading and classifier preprocessing.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{DynamicImage, ImageError, ImageReader, RgbImage};
use ndarray::Array4;

use crate::analysis::enhance::ClaheParams;
use crate::analysis::steps::{EnhanceStep, ResizeStep, RgbStep};
use crate::error::{Error, Result};
use crate::models::PreprocessedTensor;
use crate::pipeline::Pipeline;

/// Classifier input resolution as (height, width).
pub const DEFAULT_TARGET_SIZE: (u32, u32) = (180, 180);

/// Number of channels fed to the classifier.
pub const RGB_CHANNELS: usize = 3;

/// Decode an image file, detecting the format from its contents.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
    let path = path.as_ref();
    ImageReader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .map_err(ImageError::IoError)
        .and_then(|reader| reader.decode())
        .map_err(|source| Error::ImageLoad {
            path: path.to_path_buf(),
            source,
        })
}

/// Load an image and turn it into a (1, H, W, 3) tensor in [0, 1].
///
/// The image is:
/// 1. Decoded from the path
/// 2. Resized to `target_size` (height, width) with bicubic interpolation
/// 3. Converted to RGB (gray replicated, alpha dropped)
/// 4. Given a leading batch dimension and divided by 255
///
/// # Errors
///
/// Any decode or transform failure is returned to the caller.
pub fn preprocess<P: AsRef<Path>>(path: P, target_size: (u32, u32)) -> Result<PreprocessedTensor> {
    Preprocessor::new(target_size).run_path(path)
}

/// Same as [`preprocess`] for an already decoded image.
pub fn preprocess_image(image: &DynamicImage, target_size: (u32, u32)) -> Result<PreprocessedTensor> {
    Preprocessor::new(target_size).run_image(image.clone())
}

/// Configurable preprocessing: resize, RGB conversion and optional contrast enhancement.
#[derive(Clone)]
pub struct Preprocessor {
    target_size: (u32, u32),
    enhance: Option<ClaheParams>,
    debug_out: Option<PathBuf>,
}

impl Preprocessor {
    pub fn new(target_size: (u32, u32)) -> Self {
        Self {
            target_size,
            enhance: None,
            debug_out: None,
        }
    }

    /// Equalize lightness after resizing
    pub fn with_enhancement(mut self, params: ClaheParams) -> Self {
        self.enhance = Some(params);
        self
    }

    /// Save every intermediate image under `dir` (must be empty or absent)
    pub fn with_debug(mut self, dir: PathBuf) -> Self {
        self.debug_out = Some(dir);
        self
    }

    pub fn target_size(&self) -> (u32, u32) {
        self.target_size
    }

    /// Build the step pipeline
    pub fn pipeline(&self) -> Result<Pipeline> {
        let (height, width) = self.target_size;
        let mut pipeline = Pipeline::new()
            .add_step(Arc::new(ResizeStep::new(height, width)))
            .add_step(Arc::new(RgbStep));

        if let Some(params) = self.enhance {
            pipeline = pipeline.add_step(Arc::new(EnhanceStep { params }));
        }
        if let Some(dir) = &self.debug_out {
            pipeline = pipeline.with_debug(dir.clone())?;
        }
        Ok(pipeline)
    }

    pub fn run_path<P: AsRef<Path>>(&self, path: P) -> Result<PreprocessedTensor> {
        let path = path.as_ref();
        let img = load_image(path).inspect_err(|err| {
            tracing::error!("Error preprocessing image: {err}");
        })?;
        let tensor = self.run_image(img)?;
        tracing::info!("Image preprocessed successfully: {}", path.display());
        Ok(tensor)
    }

    pub fn run_image(&self, image: DynamicImage) -> Result<PreprocessedTensor> {
        let data = self.pipeline()?.run(image)?;
        Ok(image_to_tensor(&data.image.to_rgb8()))
    }
}

/// Convert an RGB image to a normalized NHWC tensor.
pub fn image_to_tensor(rgb: &RgbImage) -> PreprocessedTensor {
    let (width, height) = (rgb.width() as usize, rgb.height() as usize);
    let mut tensor = Array4::<f32>::zeros((1, height, width, RGB_CHANNELS));

    for (x, y, pixel) in rgb.enumerate_pixels() {
        for c in 0..RGB_CHANNELS {
            tensor[[0, y as usize, x as usize, c]] = f32::from(pixel[c]) / 255.0;
        }
    }

    tensor
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgba, RgbaImage};

    #[test]
    fn test_tensor_shape() {
        let img = DynamicImage::new_rgb8(100, 60);
        let tensor = preprocess_image(&img, (32, 48)).unwrap();
        assert_eq!(tensor.shape(), &[1, 32, 48, 3]);
    }

    #[test]
    fn test_normalization_range() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(50, 50, |x, y| {
            image::Rgb([(x * 5) as u8, (y * 5) as u8, 255])
        }));
        let tensor = preprocess_image(&img, DEFAULT_TARGET_SIZE).unwrap();
        assert!(tensor.iter().all(|v| (0.0..=1.0).contains(v)));
        assert!(tensor.iter().any(|v| *v == 1.0));
    }

    #[test]
    fn test_gray_input_becomes_three_equal_channels() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(10, 10, Luma([51])));
        let tensor = preprocess_image(&img, (10, 10)).unwrap();
        assert_eq!(tensor.shape(), &[1, 10, 10, 3]);
        for c in 0..3 {
            assert!((tensor[[0, 4, 4, c]] - 0.2).abs() < 1e-6);
        }
    }

    #[test]
    fn test_alpha_is_dropped() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([255, 0, 0, 10])));
        let tensor = preprocess_image(&img, (8, 8)).unwrap();
        assert_eq!(tensor.shape()[3], 3);
        assert!((tensor[[0, 0, 0, 0]] - 1.0).abs() < 1e-6);
        assert_eq!(tensor[[0, 0, 0, 1]], 0.0);
    }

    #[test]
    fn test_enhancement_adds_a_step() {
        let plain = Preprocessor::new(DEFAULT_TARGET_SIZE).pipeline().unwrap();
        assert_eq!(plain.step_names(), ["Resize", "RGB Conversion"]);

        let enhanced = Preprocessor::new(DEFAULT_TARGET_SIZE)
            .with_enhancement(ClaheParams::default())
            .pipeline()
            .unwrap();
        assert_eq!(enhanced.step_names().last(), Some(&"Contrast Enhancement"));
        let tensor = Preprocessor::new((16, 16))
            .with_enhancement(ClaheParams::default())
            .run_image(DynamicImage::new_rgb8(20, 20))
            .unwrap();
        assert_eq!(tensor.shape(), &[1, 16, 16, 3]);
    }

    #[test]
    fn test_zero_target_size_is_an_error() {
        let img = DynamicImage::new_rgb8(8, 8);
        assert!(preprocess_image(&img, (0, 8)).is_err());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = preprocess("/definitely/not/here.png", DEFAULT_TARGET_SIZE).unwrap_err();
        assert!(matches!(err, Error::ImageLoad { .. }));
    }
}
