use crate::analysis::enhance::{self, ClaheParams};
use crate::error::{Error, Result};
use crate::pipeline::{MetadataValue, PipelineContext, PipelineData, PipelineStep};
use image::DynamicImage;
use image::imageops::FilterType;

/// Resize to a fixed resolution, ignoring aspect ratio
pub struct ResizeStep {
    pub height: u32,
    pub width: u32,
    pub filter: FilterType,
}

impl ResizeStep {
    /// Bicubic resize to (height, width)
    pub fn new(height: u32, width: u32) -> Self {
        Self {
            height,
            width,
            filter: FilterType::CatmullRom,
        }
    }
}

impl PipelineStep for ResizeStep {
    fn process(&self, data: PipelineData, _context: &PipelineContext) -> Result<PipelineData> {
        if self.height == 0 || self.width == 0 {
            return Err(Error::InvalidParameter {
                name: "target_size".to_string(),
                reason: format!("must be positive, got {}x{}", self.height, self.width),
            });
        }

        let resized = data.image.resize_exact(self.width, self.height, self.filter);
        let source = format!("{}x{}", data.image.width(), data.image.height());
        Ok(data
            .with_image(resized)
            .with_metadata("resized_from", MetadataValue::String(source)))
    }

    fn name(&self) -> &str {
        "Resize"
    }
}

/// Normalize channel count to exactly three (RGB)
/// Grayscale is replicated into every channel; alpha is dropped
pub struct RgbStep;

impl PipelineStep for RgbStep {
    fn process(&self, data: PipelineData, _context: &PipelineContext) -> Result<PipelineData> {
        let channels = data.image.color().channel_count();
        let rgb = DynamicImage::ImageRgb8(data.image.to_rgb8());
        Ok(data
            .with_image(rgb)
            .with_metadata("source_channels", MetadataValue::Int(i32::from(channels))))
    }

    fn name(&self) -> &str {
        "RGB Conversion"
    }
}

/// Contrast enhancement (CLAHE on lightness)
pub struct EnhanceStep {
    pub params: ClaheParams,
}

impl PipelineStep for EnhanceStep {
    fn process(&self, data: PipelineData, _context: &PipelineContext) -> Result<PipelineData> {
        let enhanced = enhance::enhance(&data.image.to_rgb8(), &self.params);
        Ok(data
            .with_image(DynamicImage::ImageRgb8(enhanced))
            .with_metadata("enhanced", MetadataValue::Bool(true)))
    }

    fn name(&self) -> &str {
        "Contrast Enhancement"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgba, RgbaImage};

    #[test]
    fn test_resize_step_exact_dimensions() {
        let data = PipelineData::from_image(DynamicImage::new_rgb8(300, 120));
        let out = ResizeStep::new(180, 90).process(data, &PipelineContext::default()).unwrap();
        assert_eq!(out.image.width(), 90);
        assert_eq!(out.image.height(), 180);
        assert_eq!(out.get_string("resized_from"), Some("300x120"));
    }

    #[test]
    fn test_resize_step_rejects_zero() {
        let data = PipelineData::from_image(DynamicImage::new_rgb8(10, 10));
        assert!(ResizeStep::new(0, 10).process(data, &PipelineContext::default()).is_err());
    }

    #[test]
    fn test_rgb_step_replicates_gray() {
        let gray = GrayImage::from_pixel(2, 2, Luma([77]));
        let data = PipelineData::from_image(DynamicImage::ImageLuma8(gray));
        let out = RgbStep.process(data, &PipelineContext::default()).unwrap();
        assert_eq!(out.get_int("source_channels"), Some(1));
        assert_eq!(out.image.to_rgb8().get_pixel(1, 1).0, [77, 77, 77]);
    }

    #[test]
    fn test_rgb_step_drops_alpha() {
        let rgba = RgbaImage::from_pixel(2, 2, Rgba([10, 20, 30, 0]));
        let data = PipelineData::from_image(DynamicImage::ImageRgba8(rgba));
        let out = RgbStep.process(data, &PipelineContext::default()).unwrap();
        assert_eq!(out.get_int("source_channels"), Some(4));
        assert!(matches!(out.image, DynamicImage::ImageRgb8(_)));
        assert_eq!(out.image.to_rgb8().get_pixel(0, 0).0, [10, 20, 30]);
    }
}
