//! Contrast enhancement for lesion photographs.
//!
//! Contrast-limited adaptive histogram equalization (CLAHE) is applied to
//! the L* channel of CIE L*a*b*, so brightness is redistributed locally
//! while hue and chroma are left alone.

use std::path::Path;

use image::{GrayImage, Luma, Rgb, RgbImage};
use palette::{FromColor, IntoColor, Lab, Srgb};

use crate::error::{Error, Result};

/// CLAHE parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClaheParams {
    /// Histogram clip limit relative to a uniform histogram; <= 0 disables clipping
    pub clip_limit: f32,
    /// Number of tile columns
    pub tiles_x: u32,
    /// Number of tile rows
    pub tiles_y: u32,
}

impl Default for ClaheParams {
    fn default() -> Self {
        Self {
            clip_limit: 2.0,
            tiles_x: 8,
            tiles_y: 8,
        }
    }
}

/// Apply CLAHE to a grayscale image.
pub fn clahe(gray: &GrayImage, params: &ClaheParams) -> GrayImage {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return gray.clone();
    }

    let tile_w = width.div_ceil(params.tiles_x.clamp(1, width));
    let tile_h = height.div_ceil(params.tiles_y.clamp(1, height));
    let tiles_x = width.div_ceil(tile_w);
    let tiles_y = height.div_ceil(tile_h);

    let mut luts = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = (x0 + tile_w).min(width);
            let y1 = (y0 + tile_h).min(height);
            luts.push(tile_lut(gray, (x0, y0, x1, y1), params.clip_limit));
        }
    }

    let lut_at = |tx: u32, ty: u32| &luts[(ty * tiles_x + tx) as usize];

    GrayImage::from_fn(width, height, |x, y| {
        let v = gray.get_pixel(x, y)[0] as usize;

        let txf = x as f32 / tile_w as f32 - 0.5;
        let tyf = y as f32 / tile_h as f32 - 0.5;
        let tx1 = txf.floor();
        let ty1 = tyf.floor();
        let xa = txf - tx1;
        let ya = tyf - ty1;

        let clamp_x = |t: f32| t.clamp(0.0, (tiles_x - 1) as f32) as u32;
        let clamp_y = |t: f32| t.clamp(0.0, (tiles_y - 1) as f32) as u32;
        let (lx, rx) = (clamp_x(tx1), clamp_x(tx1 + 1.0));
        let (ty_top, ty_bottom) = (clamp_y(ty1), clamp_y(ty1 + 1.0));

        let top = f32::from(lut_at(lx, ty_top)[v]) * (1.0 - xa)
            + f32::from(lut_at(rx, ty_top)[v]) * xa;
        let bottom = f32::from(lut_at(lx, ty_bottom)[v]) * (1.0 - xa)
            + f32::from(lut_at(rx, ty_bottom)[v]) * xa;
        let value = top * (1.0 - ya) + bottom * ya;

        Luma([value.round().clamp(0.0, 255.0) as u8])
    })
}

/// Equalization lookup table for one tile, with clipped histogram.
fn tile_lut(gray: &GrayImage, (x0, y0, x1, y1): (u32, u32, u32, u32), clip_limit: f32) -> [u8; 256] {
    let mut hist = [0u32; 256];
    for y in y0..y1 {
        for x in x0..x1 {
            hist[gray.get_pixel(x, y)[0] as usize] += 1;
        }
    }
    let area = (x1 - x0) * (y1 - y0);

    if clip_limit > 0.0 {
        let clip = ((clip_limit * area as f32 / 256.0) as u32).max(1);
        let mut excess = 0u32;
        for bin in hist.iter_mut() {
            if *bin > clip {
                excess += *bin - clip;
                *bin = clip;
            }
        }

        let per_bin = excess / 256;
        let mut residual = excess - per_bin * 256;
        for bin in hist.iter_mut() {
            *bin += per_bin;
        }
        if residual > 0 {
            let step = (256 / residual as usize).max(1);
            for bin in hist.iter_mut().step_by(step) {
                if residual == 0 {
                    break;
                }
                *bin += 1;
                residual -= 1;
            }
        }
    }

    let scale = 255.0 / area as f32;
    let mut lut = [0u8; 256];
    let mut sum = 0u32;
    for (i, count) in hist.iter().enumerate() {
        sum += count;
        lut[i] = (sum as f32 * scale).round().min(255.0) as u8;
    }
    lut
}

/// Equalize the lightness of an RGB image, keeping its colors.
pub fn enhance(image: &RgbImage, params: &ClaheParams) -> RgbImage {
    let (width, height) = image.dimensions();
    let labs: Vec<Lab> = image
        .pixels()
        .map(|p| {
            let srgb = Srgb::new(
                f32::from(p[0]) / 255.0,
                f32::from(p[1]) / 255.0,
                f32::from(p[2]) / 255.0,
            );
            Lab::from_color(srgb)
        })
        .collect();

    let lightness = GrayImage::from_fn(width, height, |x, y| {
        let l = labs[(y * width + x) as usize].l;
        Luma([(l / 100.0 * 255.0).round().clamp(0.0, 255.0) as u8])
    });
    let equalized = clahe(&lightness, params);

    RgbImage::from_fn(width, height, |x, y| {
        let mut lab = labs[(y * width + x) as usize];
        lab.l = f32::from(equalized.get_pixel(x, y)[0]) / 255.0 * 100.0;
        let srgb: Srgb = lab.into_color();
        Rgb([
            (srgb.red.clamp(0.0, 1.0) * 255.0).round() as u8,
            (srgb.green.clamp(0.0, 1.0) * 255.0).round() as u8,
            (srgb.blue.clamp(0.0, 1.0) * 255.0).round() as u8,
        ])
    })
}

/// Load, enhance and save an image. Failures are logged, never raised.
pub fn enhance_image(image_path: impl AsRef<Path>, output_path: impl AsRef<Path>) -> bool {
    let (image_path, output_path) = (image_path.as_ref(), output_path.as_ref());
    match try_enhance_image(image_path, output_path) {
        Ok(()) => {
            tracing::info!("Image enhanced successfully: {}", output_path.display());
            true
        }
        Err(err) => {
            tracing::error!("Error enhancing image {}: {err}", image_path.display());
            false
        }
    }
}

fn try_enhance_image(image_path: &Path, output_path: &Path) -> Result<()> {
    let img = crate::preprocess::load_image(image_path)?;
    let enhanced = enhance(&img.to_rgb8(), &ClaheParams::default());
    enhanced.save(output_path).map_err(|source| Error::ImageSave {
        path: output_path.to_path_buf(),
        source,
    })
}
