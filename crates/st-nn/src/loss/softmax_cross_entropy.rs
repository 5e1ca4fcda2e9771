// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use super::Loss;
use crate::{PureResult, Tensor};
use st_tensor::TensorError;

/// Cross entropy over raw logits, averaged across the batch.
///
/// The softmax is folded in and evaluated with a max shift so large logits do
/// not overflow. Targets are either class indices ([`Self::forward_classes`])
/// or a one-hot / probability tensor through the [`Loss`] impl.
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftmaxCrossEntropy;

fn log_softmax_row(row: &[f32], out: &mut Vec<f32>) {
    let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let log_sum = row.iter().map(|v| (v - max).exp()).sum::<f32>().ln() + max;
    out.extend(row.iter().map(|v| v - log_sum));
}

impl SoftmaxCrossEntropy {
    pub fn new() -> Self {
        Self
    }

    /// Row-wise log-softmax of `logits`.
    pub fn log_softmax(logits: &Tensor) -> PureResult<Tensor> {
        let mut out = Vec::with_capacity(logits.len());
        for row in logits.data().chunks(logits.cols()) {
            log_softmax_row(row, &mut out);
        }
        Tensor::from_vec(logits.rows(), logits.cols(), out)
    }

    fn guard_classes(logits: &Tensor, classes: &[usize]) -> PureResult<()> {
        if classes.len() != logits.rows() {
            return Err(TensorError::DataLength {
                expected: logits.rows(),
                got: classes.len(),
            });
        }
        if let Some(&bad) = classes.iter().find(|&&c| c >= logits.cols()) {
            return Err(TensorError::IndexOutOfBounds {
                label: "target_class",
                index: bad,
                len: logits.cols(),
            });
        }
        Ok(())
    }

    /// Mean negative log-likelihood of `classes` (0-indexed) under `logits`.
    pub fn forward_classes(&self, logits: &Tensor, classes: &[usize]) -> PureResult<f32> {
        Self::guard_classes(logits, classes)?;
        let log_probs = Self::log_softmax(logits)?;
        let total: f32 = classes
            .iter()
            .enumerate()
            .map(|(row, &class)| -log_probs.data()[row * logits.cols() + class])
            .sum();
        Ok(total / logits.rows() as f32)
    }

    /// Gradient of [`Self::forward_classes`]: `(softmax - onehot) / batch`.
    pub fn backward_classes(&self, logits: &Tensor, classes: &[usize]) -> PureResult<Tensor> {
        Self::guard_classes(logits, classes)?;
        let cols = logits.cols();
        let inv_batch = 1.0 / logits.rows() as f32;
        let mut grad = Self::log_softmax(logits)?.map(|v| v.exp() * inv_batch);
        for (row, &class) in classes.iter().enumerate() {
            grad.data_mut()[row * cols + class] -= inv_batch;
        }
        Ok(grad)
    }
}

impl Loss for SoftmaxCrossEntropy {
    fn forward(&mut self, prediction: &Tensor, target: &Tensor) -> PureResult<Tensor> {
        if prediction.shape() != target.shape() {
            return Err(TensorError::ShapeMismatch {
                left: prediction.shape(),
                right: target.shape(),
            });
        }
        let log_probs = Self::log_softmax(prediction)?;
        let sum: f32 = log_probs
            .data()
            .iter()
            .zip(target.data().iter())
            .map(|(lp, t)| -t * lp)
            .sum();
        Tensor::from_vec(1, 1, vec![sum / prediction.rows() as f32])
    }

    fn backward(&mut self, prediction: &Tensor, target: &Tensor) -> PureResult<Tensor> {
        if prediction.shape() != target.shape() {
            return Err(TensorError::ShapeMismatch {
                left: prediction.shape(),
                right: target.shape(),
            });
        }
        let inv_batch = 1.0 / prediction.rows() as f32;
        let probs = Self::log_softmax(prediction)?.map(f32::exp);
        probs.zip_map(target, |p, t| (p - t) * inv_batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn class_loss_matches_manual_log_softmax() {
        let loss = SoftmaxCrossEntropy::new();
        let logits = Tensor::from_vec(2, 3, vec![1.0, 2.0, 3.0, 0.0, 0.0, 0.0]).unwrap();
        let value = loss.forward_classes(&logits, &[2, 1]).unwrap();
        let denom = 1f32.exp() + 2f32.exp() + 3f32.exp();
        let expected = (-(3f32.exp() / denom).ln() + 3f32.ln()) / 2.0;
        assert_abs_diff_eq!(value, expected, epsilon = 1e-5);
    }

    #[test]
    fn large_logits_stay_finite() {
        let loss = SoftmaxCrossEntropy::new();
        let logits = Tensor::from_vec(1, 2, vec![1000.0, 0.0]).unwrap();
        let value = loss.forward_classes(&logits, &[1]).unwrap();
        assert_abs_diff_eq!(value, 1000.0, epsilon = 1e-2);
        let grad = loss.backward_classes(&logits, &[1]).unwrap();
        assert!(grad.is_finite());
        assert_abs_diff_eq!(grad.data()[0], 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(grad.data()[1], -1.0, epsilon = 1e-6);
    }

    #[test]
    fn gradient_rows_sum_to_zero_and_one_hot_path_agrees() {
        let mut loss = SoftmaxCrossEntropy::new();
        let logits = Tensor::from_vec(2, 3, vec![0.3, -1.2, 0.8, 2.0, 0.1, -0.4]).unwrap();
        let grad = loss.backward_classes(&logits, &[0, 2]).unwrap();
        for sum in grad.sum_axis1() {
            assert_abs_diff_eq!(sum, 0.0, epsilon = 1e-6);
        }
        let one_hot = Tensor::from_vec(2, 3, vec![1.0, 0.0, 0.0, 0.0, 0.0, 1.0]).unwrap();
        let dense = loss.backward(&logits, &one_hot).unwrap();
        for (a, b) in grad.data().iter().zip(dense.data().iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-6);
        }
        let value = loss.forward(&logits, &one_hot).unwrap();
        assert_abs_diff_eq!(
            value.data()[0],
            loss.forward_classes(&logits, &[0, 2]).unwrap(),
            epsilon = 1e-6
        );
    }

    #[test]
    fn out_of_range_class_is_reported() {
        let loss = SoftmaxCrossEntropy::new();
        let logits = Tensor::zeros(1, 3).unwrap();
        assert_eq!(
            loss.forward_classes(&logits, &[3]),
            Err(TensorError::IndexOutOfBounds {
                label: "target_class",
                index: 3,
                len: 3
            })
        );
    }
}
