use image::{DynamicImage, GrayImage, Luma, RgbImage};
use imageproc::contrast::otsu_level;

use super::color;

/// Convert image to grayscale using the luma weights of [`color::rgb_to_gray`]
pub fn to_grayscale(img: &DynamicImage) -> GrayImage {
    color::rgb_to_gray(&img.to_rgb8())
}

/// Convert an RGB image to grayscale
pub fn rgb_to_grayscale(img: &RgbImage) -> GrayImage {
    color::rgb_to_gray(img)
}

/// Binarize with Otsu's threshold, inverted: pixels at or below the
/// threshold (the darker class) become 255, the rest 0.
/// Returns the binary image and the threshold that was used.
pub fn binarize_otsu_inverted(gray: &GrayImage) -> (GrayImage, u8) {
    let level = otsu_level(gray);
    let binary = GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        if gray.get_pixel(x, y)[0] <= level {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    });
    (binary, level)
}
