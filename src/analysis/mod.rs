//! Descriptive color, texture and shape statistics for a lesion image.
//!
//! Extraction is independent from the classifier and never fails the
//! caller: every error is logged and returned as [`FeatureReport::Failed`].

pub mod color;
pub mod contours;
pub mod enhance;
pub mod preprocessing;
pub mod steps;

use image::{DynamicImage, GrayImage, Rgb, RgbImage};
use ndarray::{ArrayViewD, Axis, Ix3};

use crate::error::{Error, Result};
use crate::models::{ColorFeatures, FeatureReport, FeatureSet, ShapeFeatures, TextureFeatures};
use color::Moments;

/// Element types accepted as image intensities.
///
/// Integers are taken as 8-bit values; floats as [0, 1] values that are
/// scaled by 255 and truncated.
pub trait Intensity: Copy {
    fn to_u8(self) -> u8;
}

impl Intensity for u8 {
    fn to_u8(self) -> u8 {
        self
    }
}

impl Intensity for f32 {
    fn to_u8(self) -> u8 {
        (self * 255.0).clamp(0.0, 255.0) as u8
    }
}

impl Intensity for f64 {
    fn to_u8(self) -> u8 {
        (self * 255.0).clamp(0.0, 255.0) as u8
    }
}

/// Extract features from an (H, W, C) or (N, H, W, C) array.
///
/// Batched input uses the first element. C must be 1, 3 or 4; a
/// single channel is replicated and alpha is ignored.
pub fn extract_features<T: Intensity>(image: ArrayViewD<'_, T>) -> FeatureReport {
    into_report(array_to_rgb(image).and_then(|rgb| compute_features(&rgb)))
}

/// Extract features from a decoded image.
pub fn extract_image_features(image: &DynamicImage) -> FeatureReport {
    into_report(compute_features(&image.to_rgb8()))
}

fn into_report(result: Result<FeatureSet>) -> FeatureReport {
    match result {
        Ok(features) => {
            tracing::info!("Features extracted successfully");
            FeatureReport::Extracted(features)
        }
        Err(err) => {
            tracing::error!("Error extracting features: {err}");
            FeatureReport::Failed {
                error: err.to_string(),
            }
        }
    }
}

/// Compute every feature group from an RGB image.
pub fn compute_features(rgb: &RgbImage) -> Result<FeatureSet> {
    if rgb.width() == 0 || rgb.height() == 0 {
        return Err(Error::ShapeMismatch {
            expected: "non-empty image".to_string(),
            actual: format!("{}x{}", rgb.width(), rgb.height()),
        });
    }

    let gray = preprocessing::rgb_to_grayscale(rgb);
    Ok(FeatureSet {
        color: color_features(rgb),
        texture: texture_features(&gray),
        shape: shape_features(&gray),
    })
}

/// Mean and standard deviation of each HSV channel.
pub fn color_features(rgb: &RgbImage) -> ColorFeatures {
    let mut channels = [Moments::default(); 3];
    for pixel in rgb.pixels() {
        let hsv = color::rgb_to_hsv(*pixel);
        for (moments, value) in channels.iter_mut().zip(hsv) {
            moments.push(f64::from(value));
        }
    }
    let [h, s, v] = channels;
    ColorFeatures {
        hue_avg: h.mean(),
        saturation_avg: s.mean(),
        value_avg: v.mean(),
        hue_std: h.std_dev(),
        saturation_std: s.std_dev(),
        value_std: v.std_dev(),
    }
}

pub fn texture_features(gray: &GrayImage) -> TextureFeatures {
    let mut moments = Moments::default();
    for pixel in gray.pixels() {
        moments.push(f64::from(pixel[0]));
    }
    TextureFeatures {
        contrast: moments.std_dev(),
        energy: moments.mean_sq(),
    }
}

/// Geometry of the largest dark region after Otsu binarization.
///
/// A uniform image has no foreground and yields all zeros.
pub fn shape_features(gray: &GrayImage) -> ShapeFeatures {
    let mut values = gray.pixels().map(|p| p[0]);
    let first = values.next();
    if values.all(|v| Some(v) == first) {
        return ShapeFeatures::default();
    }

    let (binary, level) = preprocessing::binarize_otsu_inverted(gray);
    match contours::largest_external_contour(&binary) {
        Some(contour) => {
            tracing::debug!(
                "Largest contour at threshold {level}: {} points, {}x{}",
                contour.points.len(),
                contour.width(),
                contour.height()
            );
            contour.shape_features()
        }
        None => ShapeFeatures::default(),
    }
}

/// Convert an intensity array to an RGB image.
pub fn array_to_rgb<T: Intensity>(image: ArrayViewD<'_, T>) -> Result<RgbImage> {
    let image = match image.ndim() {
        4 => {
            if image.shape()[0] == 0 {
                return Err(Error::ShapeMismatch {
                    expected: "batch of at least one image".to_string(),
                    actual: format!("{:?}", image.shape()),
                });
            }
            image.index_axis_move(Axis(0), 0)
        }
        3 => image,
        _ => {
            return Err(Error::ShapeMismatch {
                expected: "(H, W, C) or (N, H, W, C)".to_string(),
                actual: format!("{:?}", image.shape()),
            })
        }
    };

    let image = image
        .into_dimensionality::<Ix3>()
        .map_err(|e| Error::ShapeMismatch {
            expected: "3D image".to_string(),
            actual: e.to_string(),
        })?;

    let (height, width, channels) = image.dim();
    if !matches!(channels, 1 | 3 | 4) {
        return Err(Error::ShapeMismatch {
            expected: "1, 3 or 4 channels".to_string(),
            actual: format!("{channels} channels"),
        });
    }

    let (w, h) = (
        u32::try_from(width).map_err(|_| too_large(width))?,
        u32::try_from(height).map_err(|_| too_large(height))?,
    );

    Ok(RgbImage::from_fn(w, h, |x, y| {
        let (x, y) = (x as usize, y as usize);
        if channels == 1 {
            let v = image[[y, x, 0]].to_u8();
            Rgb([v, v, v])
        } else {
            Rgb([
                image[[y, x, 0]].to_u8(),
                image[[y, x, 1]].to_u8(),
                image[[y, x, 2]].to_u8(),
            ])
        }
    }))
}

fn too_large(dim: usize) -> Error {
    Error::ShapeMismatch {
        expected: "dimension that fits in u32".to_string(),
        actual: dim.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array3, Array4};

    #[test]
    fn test_batched_and_unbatched_agree() {
        let mut single = Array3::<f32>::zeros((20, 20, 3));
        single.slice_mut(ndarray::s![5..15, 5..15, ..]).fill(1.0);
        let batched = single.clone().insert_axis(Axis(0));

        let a = extract_features(single.view().into_dyn());
        let b = extract_features(batched.view().into_dyn());
        assert_eq!(a, b);
        assert!(a.features().is_some());
    }

    #[test]
    fn test_u8_arrays_are_not_rescaled() {
        let img = Array3::<u8>::from_elem((4, 4, 3), 200);
        let rgb = array_to_rgb(img.view().into_dyn()).unwrap();
        assert_eq!(rgb.get_pixel(0, 0).0, [200, 200, 200]);
    }

    #[test]
    fn test_single_channel_array_is_replicated() {
        let img = Array3::<f32>::from_elem((4, 4, 1), 0.5);
        let rgb = array_to_rgb(img.view().into_dyn()).unwrap();
        assert_eq!(rgb.get_pixel(3, 3).0, [127, 127, 127]);
    }

    #[test]
    fn test_bad_shapes_degrade_to_failed_report() {
        let two_d = ndarray::Array2::<f32>::zeros((8, 8));
        let report = extract_features(two_d.view().into_dyn());
        assert!(report.error().is_some());

        let two_channels = Array3::<f32>::zeros((8, 8, 2));
        assert!(extract_features(two_channels.view().into_dyn()).error().is_some());

        let empty_batch = Array4::<f32>::zeros((0, 8, 8, 3));
        assert!(extract_features(empty_batch.view().into_dyn()).error().is_some());

        let empty = Array3::<f32>::zeros((0, 0, 3));
        assert!(extract_features(empty.view().into_dyn()).error().is_some());
    }

    #[test]
    fn test_uniform_images_have_no_shape() {
        for value in [0u8, 128, 255] {
            let gray = GrayImage::from_pixel(16, 16, image::Luma([value]));
            assert_eq!(shape_features(&gray), ShapeFeatures::default());
        }
    }

    #[test]
    fn test_texture_of_checkerboard() {
        let gray = GrayImage::from_fn(10, 10, |x, y| {
            if (x + y) % 2 == 0 { image::Luma([0]) } else { image::Luma([200]) }
        });
        let texture = texture_features(&gray);
        assert!((texture.contrast - 100.0).abs() < 1e-9);
        assert!((texture.energy - 20000.0).abs() < 1e-9);
    }
}
