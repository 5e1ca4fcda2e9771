// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::init::UniformInit;
use crate::module::{Module, Parameter, Parameterised};
use crate::{PureResult, Tensor, TensorError};

fn token_to_index(value: f32, vocab_size: usize) -> PureResult<usize> {
    if !value.is_finite() || value < 0.0 || value.fract() != 0.0 {
        return Err(TensorError::NonFiniteValue {
            label: "embedding_token",
            value,
        });
    }
    let idx = value as usize;
    if idx >= vocab_size {
        return Err(TensorError::IndexOutOfBounds {
            label: "embedding_token",
            index: idx,
            len: vocab_size,
        });
    }
    Ok(idx)
}

/// Item lookup table shaped `(vocab_size, embed_dim)`.
///
/// Index-based `lookup`/`accumulate` are the primary surface. The [`Module`]
/// impl accepts a `(n, 1)` column of integer ids stored as floats and returns
/// `(n, embed_dim)` rows.
#[derive(Debug)]
pub struct Embedding {
    weight: Parameter,
}

impl Embedding {
    pub fn new(
        name: impl Into<String>,
        vocab_size: usize,
        embed_dim: usize,
        init: &mut UniformInit,
    ) -> PureResult<Self> {
        if vocab_size == 0 || embed_dim == 0 {
            return Err(TensorError::InvalidDimensions {
                rows: vocab_size,
                cols: embed_dim,
            });
        }
        let name = name.into();
        Ok(Self {
            weight: Parameter::new(format!("{name}::weight"), init.sample(vocab_size, embed_dim)?),
        })
    }

    pub fn vocab_size(&self) -> usize {
        self.weight.value().rows()
    }

    pub fn embed_dim(&self) -> usize {
        self.weight.value().cols()
    }

    pub fn weight(&self) -> &Parameter {
        &self.weight
    }

    pub fn weight_mut(&mut self) -> &mut Parameter {
        &mut self.weight
    }

    /// Gathers one row per id.
    pub fn lookup(&self, ids: &[usize]) -> PureResult<Tensor> {
        if ids.is_empty() {
            return Err(TensorError::EmptyInput("Embedding::lookup"));
        }
        self.weight.value().gather_rows(ids)
    }

    /// Scatters `grad` rows back onto the ids they were read from.
    pub fn accumulate(&mut self, ids: &[usize], grad: &Tensor) -> PureResult<()> {
        self.weight.accumulate_rows(ids, grad)
    }

    fn ids_from_column(&self, input: &Tensor) -> PureResult<Vec<usize>> {
        if input.cols() != 1 {
            return Err(TensorError::ShapeMismatch {
                left: input.shape(),
                right: (input.rows(), 1),
            });
        }
        input
            .data()
            .iter()
            .map(|&value| token_to_index(value, self.vocab_size()))
            .collect()
    }
}

impl Parameterised for Embedding {
    fn visit_parameters(
        &self,
        visitor: &mut dyn FnMut(&Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        visitor(&self.weight)
    }

    fn visit_parameters_mut(
        &mut self,
        visitor: &mut dyn FnMut(&mut Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        visitor(&mut self.weight)
    }
}

impl Module for Embedding {
    fn forward(&self, input: &Tensor) -> PureResult<Tensor> {
        let ids = self.ids_from_column(input)?;
        self.lookup(&ids)
    }

    fn backward(&mut self, input: &Tensor, grad_output: &Tensor) -> PureResult<Tensor> {
        let ids = self.ids_from_column(input)?;
        self.accumulate(&ids, grad_output)?;
        // Integer ids carry no gradient.
        Tensor::zeros(input.rows(), 1)
    }
}
