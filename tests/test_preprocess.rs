//! Integration tests for image preprocessing.
//!
//! Tests cover:
//! - Tensor shape and value range for files on disk
//! - Gray and RGBA inputs becoming three-channel tensors
//! - Debug output of the preprocessing pipeline
//! - Decode failures surfacing as errors

mod common;

use common::*;
use lesionscan::preprocess::{DEFAULT_TARGET_SIZE, preprocess};

#[test]
fn test_preprocess_file_shape_and_range() -> anyhow::Result<()> {
    let file = save_temp_png(&disc_image(100, 30.0));

    let tensor = preprocess(file.path(), DEFAULT_TARGET_SIZE)?;
    assert_eq!(tensor.shape(), &[1, 180, 180, 3]);
    assert!(tensor.iter().all(|v| (0.0..=1.0).contains(v)));

    Ok(())
}

#[test]
fn test_non_square_target_size() -> anyhow::Result<()> {
    let file = save_temp_png(&white_image());

    let tensor = preprocess(file.path(), (24, 40))?;
    assert_eq!(tensor.shape(), &[1, 24, 40, 3]);
    assert!(tensor.iter().all(|v| (*v - 1.0).abs() < 1e-6));

    Ok(())
}

#[test]
fn test_gray_and_rgba_inputs() -> anyhow::Result<()> {
    let gray = save_temp_png(&gray_image(102));
    let tensor = preprocess(gray.path(), (16, 16))?;
    assert_eq!(tensor.shape(), &[1, 16, 16, 3]);
    assert!((tensor[[0, 8, 8, 0]] - 0.4).abs() < 1e-6);
    assert_eq!(tensor[[0, 8, 8, 0]], tensor[[0, 8, 8, 2]]);

    let rgba = save_temp_png(&rgba_image());
    let tensor = preprocess(rgba.path(), (16, 16))?;
    assert_eq!(tensor.shape(), &[1, 16, 16, 3]);

    Ok(())
}

#[test]
fn test_debug_output_written_per_step() -> anyhow::Result<()> {
    let dir = temp_dir();
    let debug_dir = dir.path().join("debug");
    let file = save_temp_png(&disc_image(64, 20.0));

    let preprocessor = Preprocessor::new((32, 32)).with_debug(debug_dir.clone());
    let tensor = preprocessor.run_path(file.path())?;
    assert_eq!(tensor.shape(), &[1, 32, 32, 3]);

    assert!(debug_dir.join("00_input").join("01.png").exists());
    let step_dirs = std::fs::read_dir(&debug_dir)?.count();
    assert_eq!(step_dirs, 3, "input plus one directory per step");

    Ok(())
}

#[test]
fn test_corrupt_file_is_an_error() -> anyhow::Result<()> {
    let file = tempfile::Builder::new().suffix(".png").tempfile()?;
    std::fs::write(file.path(), b"definitely not a png")?;

    let result = preprocess(file.path(), DEFAULT_TARGET_SIZE);
    assert!(matches!(result, Err(lesionscan::Error::ImageLoad { .. })));

    Ok(())
}
