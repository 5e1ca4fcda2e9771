// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

mod softmax_cross_entropy;

use crate::{PureResult, Tensor};

pub use softmax_cross_entropy::SoftmaxCrossEntropy;

/// Batch-mean loss over dense `(batch, classes)` targets.
pub trait Loss {
    /// `(1, 1)` mean loss.
    fn forward(&mut self, prediction: &Tensor, target: &Tensor) -> PureResult<Tensor>;

    /// Gradient shaped like `prediction`, already divided by the batch size.
    fn backward(&mut self, prediction: &Tensor, target: &Tensor) -> PureResult<Tensor>;
}
