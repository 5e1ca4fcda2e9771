// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Parameter initialisation.

use rand::rngs::StdRng;
use st_tensor::{PureResult, Tensor, TensorError};

/// Draws every tensor from `U(-bound, bound)` using one shared RNG stream, so
/// a seeded model is reproducible regardless of how many tensors it owns.
#[derive(Debug)]
pub struct UniformInit {
    bound: f32,
    rng: StdRng,
}

impl UniformInit {
    /// Creates an initialiser with an explicit bound.
    pub fn new(bound: f32, seed: Option<u64>) -> PureResult<Self> {
        if !bound.is_finite() || bound <= 0.0 {
            return Err(TensorError::NonFiniteValue {
                label: "uniform_init_bound",
                value: bound,
            });
        }
        Ok(Self {
            bound,
            rng: spiral_config::rng_for(seed, "st-nn/init/uniform"),
        })
    }

    /// Standard `1/sqrt(hidden)` bound used by recurrent and attention layers.
    pub fn for_hidden(hidden: usize, seed: Option<u64>) -> PureResult<Self> {
        if hidden == 0 {
            return Err(TensorError::InvalidDimensions {
                rows: hidden,
                cols: hidden,
            });
        }
        Self::new(1.0 / (hidden as f32).sqrt(), seed)
    }

    pub fn bound(&self) -> f32 {
        self.bound
    }

    /// Samples a fresh `(rows, cols)` tensor.
    pub fn sample(&mut self, rows: usize, cols: usize) -> PureResult<Tensor> {
        Tensor::random_uniform_with(rows, cols, -self.bound, self.bound, &mut self.rng)
    }
}
