//! Color space conversions used by feature extraction.
//!
//! Images are kept in RGB channel order everywhere in this crate. The
//! conversions below use the 8-bit conventions of OpenCV's BGR2HSV and
//! BGR2GRAY, reading the channels as R, G, B, so applying them to an RGB
//! buffer gives the same numbers as swapping RGB→BGR and converting.
//!
//! - HSV: H in [0, 180) (degrees halved), S and V in [0, 255]
//! - Gray: 0.299 R + 0.587 G + 0.114 B, fixed-point rounded

use image::{GrayImage, Luma, Rgb, RgbImage};
use palette::{FromColor, Hsv, Srgb};

/// Fixed-point luma weights (scaled by 2^14).
const GRAY_R: u32 = 4899;
const GRAY_G: u32 = 9617;
const GRAY_B: u32 = 1868;
const GRAY_SHIFT: u32 = 14;

/// Convert one RGB pixel to 8-bit HSV.
pub fn rgb_to_hsv(pixel: Rgb<u8>) -> [u8; 3] {
    let [r, g, b] = pixel.0;
    let hsv: Hsv = Hsv::from_color(Srgb::new(r, g, b).into_format::<f32>());

    let half = (hsv.hue.into_positive_degrees() / 2.0).round();
    let h = if half >= 180.0 { half - 180.0 } else { half };
    let s = (hsv.saturation * 255.0).round();
    let v = (hsv.value * 255.0).round();

    [h as u8, s as u8, v as u8]
}

pub fn rgb_to_gray_pixel(pixel: Rgb<u8>) -> u8 {
    let [r, g, b] = pixel.0.map(u32::from);
    ((r * GRAY_R + g * GRAY_G + b * GRAY_B + (1 << (GRAY_SHIFT - 1))) >> GRAY_SHIFT) as u8
}

pub fn rgb_to_gray(image: &RgbImage) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        Luma([rgb_to_gray_pixel(*image.get_pixel(x, y))])
    })
}

/// Running mean / population standard deviation accumulator.
#[derive(Debug, Default, Clone, Copy)]
pub struct Moments {
    count: u64,
    sum: f64,
    sum_sq: f64,
}

impl Moments {
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.sum_sq += value * value;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.sum / self.count as f64
    }

    /// Mean of squared values.
    pub fn mean_sq(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.sum_sq / self.count as f64
    }

    pub fn std_dev(&self) -> f64 {
        let mean = self.mean();
        (self.mean_sq() - mean * mean).max(0.0).sqrt()
    }
}
