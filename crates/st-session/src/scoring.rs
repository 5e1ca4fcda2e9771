// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Scores fused session vectors against the shared item table.

use st_tensor::{PureResult, Tensor, TensorError};

/// Gradients produced by [`score_backward`].
#[derive(Debug, Clone)]
pub struct ScoreGrad {
    /// `(batch, hidden)` gradient for the fused session vectors.
    pub session: Tensor,
    /// `(n_node - 1, hidden)` gradient for table rows `1..n_node`.
    pub candidates: Tensor,
}

fn candidates(table: &Tensor) -> PureResult<Tensor> {
    if table.rows() < 2 {
        return Err(TensorError::InvalidDimensions {
            rows: table.rows(),
            cols: table.cols(),
        });
    }
    table.slice_rows(1, table.rows())
}

/// `(batch, n_node - 1)` logits; column `j` scores item id `j + 1`.
pub fn score(session: &Tensor, table: &Tensor) -> PureResult<Tensor> {
    session.matmul_transposed(&candidates(table)?)
}

pub fn score_backward(session: &Tensor, table: &Tensor, grad_scores: &Tensor) -> PureResult<ScoreGrad> {
    let candidates = candidates(table)?;
    if grad_scores.shape() != (session.rows(), candidates.rows()) {
        return Err(TensorError::ShapeMismatch {
            left: grad_scores.shape(),
            right: (session.rows(), candidates.rows()),
        });
    }
    Ok(ScoreGrad {
        session: grad_scores.matmul(&candidates)?,
        candidates: grad_scores.transpose_matmul(session)?,
    })
}
