//! Untrained stand-in network used when no model artifact can be loaded.
//!
//! Architecture: 3x3 convolution (16 filters) + ReLU, 2x2 max-pool,
//! global average pool, dense 16 -> 9. Weights are Glorot-uniform from a
//! seeded RNG, so the same seed always yields the same outputs.

use ndarray::{Array1, Array2, Array4};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{Error, Result};
use crate::models::{ModelKind, PreprocessedTensor, NUM_CLASSES};
use crate::preprocess::RGB_CHANNELS;

use super::loader::LesionModel;

/// Seed used when the configuration does not name one.
pub const DEFAULT_PLACEHOLDER_SEED: u64 = 42;

const FILTERS: usize = 16;
const KERNEL: usize = 3;
const POOL: usize = 2;

pub struct PlaceholderModel {
    seed: u64,
    /// (filter, ky, kx, channel)
    conv_weights: Array4<f32>,
    conv_bias: Array1<f32>,
    /// (filter, class)
    dense_weights: Array2<f32>,
    dense_bias: Array1<f32>,
}

impl PlaceholderModel {
    pub fn new(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);

        let conv_fan_in = KERNEL * KERNEL * RGB_CHANNELS;
        let conv_fan_out = KERNEL * KERNEL * FILTERS;
        let conv_limit = glorot_limit(conv_fan_in, conv_fan_out);
        let conv_weights = Array4::from_shape_simple_fn((FILTERS, KERNEL, KERNEL, RGB_CHANNELS), || {
            rng.gen_range(-conv_limit..conv_limit)
        });

        let dense_limit = glorot_limit(FILTERS, NUM_CLASSES);
        let dense_weights =
            Array2::from_shape_simple_fn((FILTERS, NUM_CLASSES), || rng.gen_range(-dense_limit..dense_limit));

        Self {
            seed,
            conv_weights,
            conv_bias: Array1::zeros(FILTERS),
            dense_weights,
            dense_bias: Array1::zeros(NUM_CLASSES),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    fn conv_at(&self, input: &ndarray::ArrayView3<'_, f32>, filter: usize, y: usize, x: usize) -> f32 {
        let mut acc = self.conv_bias[filter];
        for ky in 0..KERNEL {
            for kx in 0..KERNEL {
                for c in 0..RGB_CHANNELS {
                    acc += self.conv_weights[[filter, ky, kx, c]] * input[[y + ky, x + kx, c]];
                }
            }
        }
        acc.max(0.0)
    }
}

fn glorot_limit(fan_in: usize, fan_out: usize) -> f32 {
    (6.0 / (fan_in + fan_out) as f32).sqrt()
}

impl LesionModel for PlaceholderModel {
    fn kind(&self) -> ModelKind {
        ModelKind::Placeholder
    }

    fn forward(&self, input: &PreprocessedTensor) -> Result<Vec<f32>> {
        let (batch, height, width, channels) = input.dim();
        let min_side = KERNEL - 1 + POOL;
        if batch != 1 || channels != RGB_CHANNELS || height < min_side || width < min_side {
            return Err(Error::ShapeMismatch {
                expected: format!("(1, >={min_side}, >={min_side}, {RGB_CHANNELS})"),
                actual: format!("{:?}", input.shape()),
            });
        }

        let image = input.index_axis(ndarray::Axis(0), 0);
        let pooled_h = (height - KERNEL + 1) / POOL;
        let pooled_w = (width - KERNEL + 1) / POOL;
        let cells = (pooled_h * pooled_w) as f32;

        let mut features = Array1::<f32>::zeros(FILTERS);
        for filter in 0..FILTERS {
            let mut sum = 0.0f32;
            for py in 0..pooled_h {
                for px in 0..pooled_w {
                    let mut best = f32::MIN;
                    for dy in 0..POOL {
                        for dx in 0..POOL {
                            best = best.max(self.conv_at(&image, filter, py * POOL + dy, px * POOL + dx));
                        }
                    }
                    sum += best;
                }
            }
            features[filter] = sum / cells;
        }

        let logits = features.dot(&self.dense_weights) + &self.dense_bias;
        Ok(softmax(logits.as_slice().unwrap_or(&[])))
    }
}

/// Numerically stable softmax.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|v| (v - max).exp()).collect();
    let total: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(size: usize) -> PreprocessedTensor {
        Array4::from_shape_fn((1, size, size, 3), |(_, y, x, c)| {
            ((x + y * 2 + c * 7) % 255) as f32 / 255.0
        })
    }

    #[test]
    fn test_same_seed_same_output() {
        let input = gradient(24);
        let a = PlaceholderModel::new(7).forward(&input).unwrap();
        let b = PlaceholderModel::new(7).forward(&input).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_output_is_distribution() {
        let out = PlaceholderModel::new(DEFAULT_PLACEHOLDER_SEED).forward(&gradient(16)).unwrap();
        assert_eq!(out.len(), NUM_CLASSES);
        assert!(out.iter().all(|p| (0.0..=1.0).contains(p)));
        assert!((out.iter().sum::<f32>() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_rejects_tiny_input() {
        let input = PreprocessedTensor::zeros((1, 3, 3, 3));
        assert!(PlaceholderModel::new(1).forward(&input).is_err());
    }

    #[test]
    fn test_softmax_is_shift_invariant() {
        let a = softmax(&[1.0, 2.0, 3.0]);
        let b = softmax(&[101.0, 102.0, 103.0]);
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-6);
        }
    }
}
