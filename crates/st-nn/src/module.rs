// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use st_tensor::{PureResult, Tensor, TensorError};

/// Trainable tensor paired with its Euclidean gradient accumulator.
pub struct Parameter {
    name: String,
    value: Tensor,
    gradient: Option<Tensor>,
}

impl core::fmt::Debug for Parameter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let (rows, cols) = self.value.shape();
        write!(
            f,
            "Parameter(name={},shape=({},{}),has_grad={})",
            self.name,
            rows,
            cols,
            self.gradient.is_some()
        )
    }
}

impl Parameter {
    /// Creates a new parameter with the provided tensor value.
    pub fn new(name: impl Into<String>, value: Tensor) -> Self {
        Self {
            name: name.into(),
            value,
            gradient: None,
        }
    }

    /// Returns the identifier assigned to the parameter.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Provides an immutable view into the underlying tensor value.
    pub fn value(&self) -> &Tensor {
        &self.value
    }

    /// Provides a mutable view into the underlying tensor value.
    pub fn value_mut(&mut self) -> &mut Tensor {
        &mut self.value
    }

    /// Replaces the value, keeping the shape fixed.
    pub fn assign(&mut self, value: Tensor) -> PureResult<()> {
        self.assert_shape(&value)?;
        self.value = value;
        Ok(())
    }

    /// Returns the gradient accumulated since the last reset, if any.
    pub fn gradient(&self) -> Option<&Tensor> {
        self.gradient.as_ref()
    }

    fn assert_shape(&self, tensor: &Tensor) -> PureResult<()> {
        if self.value.shape() != tensor.shape() {
            return Err(TensorError::ShapeMismatch {
                left: self.value.shape(),
                right: tensor.shape(),
            });
        }
        Ok(())
    }

    /// Adds `update` into the gradient buffer, allocating it on first use.
    pub fn accumulate(&mut self, update: &Tensor) -> PureResult<()> {
        self.assert_shape(update)?;
        match self.gradient.as_mut() {
            Some(existing) => existing.add_scaled(update, 1.0)?,
            None => self.gradient = Some(update.clone()),
        }
        Ok(())
    }

    /// Adds `rows[i]` into gradient row `indices[i]`. Used by sparse lookups
    /// that only touch a few rows of a large table.
    pub fn accumulate_rows(&mut self, indices: &[usize], rows: &Tensor) -> PureResult<()> {
        if self.gradient.is_none() {
            let (r, c) = self.value.shape();
            self.gradient = Some(Tensor::zeros(r, c)?);
        }
        match self.gradient.as_mut() {
            Some(gradient) => gradient.scatter_add_rows(indices, rows),
            None => Err(TensorError::MissingParameter {
                name: self.name.clone(),
            }),
        }
    }

    /// Clears the gradient buffer.
    pub fn zero_gradient(&mut self) {
        self.gradient = None;
    }
}

/// Anything that owns trainable parameters.
pub trait Parameterised {
    /// Visits immutable parameters.
    fn visit_parameters(
        &self,
        visitor: &mut dyn FnMut(&Parameter) -> PureResult<()>,
    ) -> PureResult<()>;

    /// Visits mutable parameters.
    fn visit_parameters_mut(
        &mut self,
        visitor: &mut dyn FnMut(&mut Parameter) -> PureResult<()>,
    ) -> PureResult<()>;

    /// Clears accumulators across every parameter.
    fn zero_accumulators(&mut self) -> PureResult<()> {
        self.visit_parameters_mut(&mut |param| {
            param.zero_gradient();
            Ok(())
        })
    }

    /// Total number of scalar weights.
    fn parameter_count(&self) -> PureResult<usize> {
        let mut total = 0usize;
        self.visit_parameters(&mut |param| {
            total += param.value().len();
            Ok(())
        })?;
        Ok(total)
    }
}

/// Single-input layer with a hand-written backward pass.
pub trait Module: Parameterised {
    /// Runs a forward pass.
    fn forward(&self, input: &Tensor) -> PureResult<Tensor>;

    /// Propagates a gradient backwards. Implementations should populate the
    /// relevant parameter accumulators before returning the gradient with
    /// respect to `input`.
    fn backward(&mut self, input: &Tensor, grad_output: &Tensor) -> PureResult<Tensor>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulate_sums_updates_and_checks_shape() {
        let mut param = Parameter::new("w", Tensor::zeros(1, 2).unwrap());
        let update = Tensor::from_vec(1, 2, vec![1.0, -2.0]).unwrap();
        param.accumulate(&update).unwrap();
        param.accumulate(&update).unwrap();
        assert_eq!(param.gradient().unwrap().data(), &[2.0, -4.0]);

        let wrong = Tensor::zeros(2, 1).unwrap();
        assert!(param.accumulate(&wrong).is_err());

        param.zero_gradient();
        assert!(param.gradient().is_none());
    }

    #[test]
    fn row_accumulation_allocates_full_table() {
        let mut param = Parameter::new("table", Tensor::zeros(4, 2).unwrap());
        let rows = Tensor::from_vec(2, 2, vec![1.0, 1.0, 0.5, 0.5]).unwrap();
        param.accumulate_rows(&[3, 3], &rows).unwrap();
        let grad = param.gradient().unwrap();
        assert_eq!(grad.shape(), (4, 2));
        assert_eq!(grad.row(3).unwrap(), &[1.5, 1.5]);
        assert_eq!(grad.row(0).unwrap(), &[0.0, 0.0]);
    }
}
