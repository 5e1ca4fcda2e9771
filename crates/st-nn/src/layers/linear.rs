// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::init::UniformInit;
use crate::module::{Module, Parameter, Parameterised};
use crate::{PureResult, Tensor, TensorError};

/// Fully-connected layer computing `x W + b` with `W` stored `(input, output)`.
#[derive(Debug)]
pub struct Linear {
    weight: Parameter,
    bias: Option<Parameter>,
}

impl Linear {
    /// Creates a linear layer with a bias row.
    pub fn new(
        name: impl Into<String>,
        input_dim: usize,
        output_dim: usize,
        init: &mut UniformInit,
    ) -> PureResult<Self> {
        let name = name.into();
        let mut layer = Self::without_bias(name.clone(), input_dim, output_dim, init)?;
        layer.bias = Some(Parameter::new(
            format!("{name}::bias"),
            init.sample(1, output_dim)?,
        ));
        Ok(layer)
    }

    /// Creates a bias-free projection.
    pub fn without_bias(
        name: impl Into<String>,
        input_dim: usize,
        output_dim: usize,
        init: &mut UniformInit,
    ) -> PureResult<Self> {
        if input_dim == 0 || output_dim == 0 {
            return Err(TensorError::InvalidDimensions {
                rows: input_dim,
                cols: output_dim,
            });
        }
        let name = name.into();
        Ok(Self {
            weight: Parameter::new(
                format!("{name}::weight"),
                init.sample(input_dim, output_dim)?,
            ),
            bias: None,
        })
    }

    /// Returns a reference to the weight parameter.
    pub fn weight(&self) -> &Parameter {
        &self.weight
    }

    pub fn weight_mut(&mut self) -> &mut Parameter {
        &mut self.weight
    }

    /// Returns the bias parameter when the layer carries one.
    pub fn bias(&self) -> Option<&Parameter> {
        self.bias.as_ref()
    }

    pub fn bias_mut(&mut self) -> Option<&mut Parameter> {
        self.bias.as_mut()
    }

    pub fn input_dim(&self) -> usize {
        self.weight.value().rows()
    }

    pub fn output_dim(&self) -> usize {
        self.weight.value().cols()
    }
}

impl Parameterised for Linear {
    fn visit_parameters(
        &self,
        visitor: &mut dyn FnMut(&Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        visitor(&self.weight)?;
        if let Some(bias) = self.bias.as_ref() {
            visitor(bias)?;
        }
        Ok(())
    }

    fn visit_parameters_mut(
        &mut self,
        visitor: &mut dyn FnMut(&mut Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        visitor(&mut self.weight)?;
        if let Some(bias) = self.bias.as_mut() {
            visitor(bias)?;
        }
        Ok(())
    }
}

impl Module for Linear {
    fn forward(&self, input: &Tensor) -> PureResult<Tensor> {
        if input.cols() != self.input_dim() {
            return Err(TensorError::ShapeMismatch {
                left: input.shape(),
                right: self.weight.value().shape(),
            });
        }
        let mut out = input.matmul(self.weight.value())?;
        if let Some(bias) = self.bias.as_ref() {
            out.add_row_inplace(bias.value().data())?;
        }
        Ok(out)
    }

    /// Gradients are summed over rows; batch averaging belongs to the loss.
    fn backward(&mut self, input: &Tensor, grad_output: &Tensor) -> PureResult<Tensor> {
        if input.rows() != grad_output.rows() || grad_output.cols() != self.output_dim() {
            return Err(TensorError::ShapeMismatch {
                left: input.shape(),
                right: grad_output.shape(),
            });
        }
        let grad_w = input.transpose_matmul(grad_output)?;
        self.weight.accumulate(&grad_w)?;

        if let Some(bias) = self.bias.as_mut() {
            let summed = grad_output.sum_axis0();
            let grad_b = Tensor::from_vec(1, summed.len(), summed)?;
            bias.accumulate(&grad_b)?;
        }

        grad_output.matmul_transposed(self.weight.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn init() -> UniformInit {
        UniformInit::for_hidden(4, Some(17)).unwrap()
    }

    #[test]
    fn linear_forward_matches_manual() {
        let layer = Linear::new("fc", 3, 2, &mut init()).unwrap();
        let input = Tensor::from_vec(1, 3, vec![1.0, -2.0, 0.5]).unwrap();
        let output = layer.forward(&input).unwrap();
        let mut expected = input.matmul(layer.weight().value()).unwrap();
        expected
            .add_row_inplace(layer.bias().unwrap().value().data())
            .unwrap();
        assert_eq!(output, expected);
    }

    #[test]
    fn bias_free_layer_exposes_single_parameter() {
        let layer = Linear::without_bias("proj", 4, 4, &mut init()).unwrap();
        assert!(layer.bias().is_none());
        assert_eq!(layer.parameter_count().unwrap(), 16);
    }

    #[test]
    fn backward_matches_finite_differences() {
        let mut layer = Linear::new("fc", 3, 2, &mut init()).unwrap();
        let input = Tensor::from_vec(2, 3, vec![0.1, 0.2, -0.3, 0.4, -0.5, 0.6]).unwrap();
        // Loss = sum(output), so dL/dout is all ones.
        let ones = Tensor::from_vec(2, 2, vec![1.0; 4]).unwrap();
        let grad_input = layer.backward(&input, &ones).unwrap();

        let eps = 1e-2f32;
        let base = layer.weight().value().clone();
        let analytic = layer.weight().gradient().unwrap().clone();
        for idx in 0..base.len() {
            let mut plus = base.clone();
            plus.data_mut()[idx] += eps;
            layer.weight_mut().assign(plus).unwrap();
            let up: f32 = layer.forward(&input).unwrap().data().iter().sum();
            let mut minus = base.clone();
            minus.data_mut()[idx] -= eps;
            layer.weight_mut().assign(minus).unwrap();
            let down: f32 = layer.forward(&input).unwrap().data().iter().sum();
            assert_abs_diff_eq!(analytic.data()[idx], (up - down) / (2.0 * eps), epsilon = 1e-3);
        }
        layer.weight_mut().assign(base).unwrap();

        let bias_grad = layer.bias().unwrap().gradient().unwrap();
        assert_eq!(bias_grad.data(), &[2.0, 2.0]);
        let row_sums = layer.weight().value().sum_axis1();
        assert_abs_diff_eq!(grad_input.row(0).unwrap()[0], row_sums[0], epsilon = 1e-6);
    }
}
