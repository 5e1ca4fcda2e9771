// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Dual attention readout: the raw and propagated session sequences attend to
//! each other through a shared affinity matrix before fusing into one vector.

use st_nn::{Linear, Module, Parameter, Parameterised, UniformInit};
use st_tensor::{PureResult, Tensor, TensorError};

/// Index of the last real position, `sum(mask) - 1`.
///
/// An all-zero mask wraps around to the final position, matching negative
/// indexing on the sequence axis.
pub fn last_position(mask: &[f32]) -> usize {
    let real = mask.iter().sum::<f32>() as usize;
    match real {
        0 => mask.len().saturating_sub(1),
        n => n - 1,
    }
}

#[derive(Debug)]
pub struct DualAttentionReadout {
    hidden: usize,
    affinity: Linear,
    local: Linear,
    global: Linear,
    local_score: Linear,
    global_score: Linear,
    fusion: Linear,
}

/// One attention branch: `H = tanh(pre)`, weights `alpha` and pooled `z`.
#[derive(Debug, Clone)]
struct BranchTrace {
    activated: Tensor,
    alpha: Vec<f32>,
}

/// Recorded readout for one session.
#[derive(Debug, Clone)]
pub struct ReadoutTrace {
    u_l: Tensor,
    u_s: Tensor,
    mask: Vec<f32>,
    last: usize,
    projected_s: Tensor,
    affinity: Tensor,
    query_l: Tensor,
    query_s: Tensor,
    local: BranchTrace,
    global: BranchTrace,
    fused_input: Tensor,
}

impl ReadoutTrace {
    /// Attention weights of the raw-embedding branch.
    pub fn local_weights(&self) -> &[f32] {
        &self.local.alpha
    }

    /// Attention weights of the propagated branch.
    pub fn global_weights(&self) -> &[f32] {
        &self.global.alpha
    }

    /// Position used for the last-item vectors.
    pub fn last(&self) -> usize {
        self.last
    }
}

impl DualAttentionReadout {
    pub fn new(name: impl Into<String>, hidden: usize, init: &mut UniformInit) -> PureResult<Self> {
        let name = name.into();
        Ok(Self {
            hidden,
            affinity: Linear::without_bias(format!("{name}::w_c"), hidden, hidden, init)?,
            local: Linear::without_bias(format!("{name}::w_l"), hidden, hidden, init)?,
            global: Linear::without_bias(format!("{name}::w_s"), hidden, hidden, init)?,
            local_score: Linear::without_bias(format!("{name}::w_hl"), hidden, 1, init)?,
            global_score: Linear::without_bias(format!("{name}::w_hs"), hidden, 1, init)?,
            fusion: Linear::new(format!("{name}::fusion"), 4 * hidden, hidden, init)?,
        })
    }

    pub fn hidden(&self) -> usize {
        self.hidden
    }

    /// Fuses `(seq, hidden)` sequences into a `(1, hidden)` session vector.
    pub fn forward(&self, u_l: &Tensor, u_s: &Tensor, mask: &[f32]) -> PureResult<Tensor> {
        self.forward_traced(u_l, u_s, mask).map(|(out, _)| out)
    }

    pub fn forward_traced(
        &self,
        u_l: &Tensor,
        u_s: &Tensor,
        mask: &[f32],
    ) -> PureResult<(Tensor, ReadoutTrace)> {
        if u_l.shape() != u_s.shape() || u_l.cols() != self.hidden {
            return Err(TensorError::ShapeMismatch {
                left: u_l.shape(),
                right: u_s.shape(),
            });
        }
        if mask.len() != u_l.rows() {
            return Err(TensorError::DataLength {
                expected: u_l.rows(),
                got: mask.len(),
            });
        }
        let projected_s = self.affinity.forward(u_s)?;
        let affinity = u_l.matmul_transposed(&projected_s)?;
        let query_l = self.local.forward(u_l)?;
        let query_s = self.global.forward(u_s)?;

        let pre_l = query_l.add(&affinity.transpose_matmul(&query_s)?)?;
        let local = self.branch(&self.local_score, pre_l, mask)?;
        let pre_s = query_s.add(&affinity.matmul(&query_l)?)?;
        let global = self.branch(&self.global_score, pre_s, mask)?;

        let last = last_position(mask);
        let z_l = pool(u_l, &local.alpha, mask)?;
        let z_s = pool(u_s, &global.alpha, mask)?;
        let l_ht = u_l.slice_rows(last, last + 1)?;
        let s_ht = u_s.slice_rows(last, last + 1)?;
        let fused_input = Tensor::cat_cols(&[&z_l, &l_ht, &z_s, &s_ht])?;
        let out = self.fusion.forward(&fused_input)?;
        Ok((
            out,
            ReadoutTrace {
                u_l: u_l.clone(),
                u_s: u_s.clone(),
                mask: mask.to_vec(),
                last,
                projected_s,
                affinity,
                query_l,
                query_s,
                local,
                global,
                fused_input,
            },
        ))
    }

    fn branch(&self, score: &Linear, pre: Tensor, mask: &[f32]) -> PureResult<BranchTrace> {
        let activated = pre.map(f32::tanh);
        let logits = score.forward(&activated)?;
        // Plain exponentials; the normaliser is not shifted by the max.
        let weights: Vec<f32> = logits
            .data()
            .iter()
            .zip(mask.iter())
            .map(|(e, m)| e.exp() * m)
            .collect();
        let total: f32 = weights.iter().sum();
        let alpha = weights.into_iter().map(|w| w / total).collect();
        Ok(BranchTrace { activated, alpha })
    }

    /// Returns `(dU_l, dU_s)` and accumulates every readout parameter.
    pub fn backward(
        &mut self,
        trace: &ReadoutTrace,
        grad_output: &Tensor,
    ) -> PureResult<(Tensor, Tensor)> {
        let d = self.hidden;
        let grad_fused = self.fusion.backward(&trace.fused_input, grad_output)?;
        let grad_z_l = grad_fused.narrow_cols(0, d)?;
        let grad_l_ht = grad_fused.narrow_cols(d, d)?;
        let grad_z_s = grad_fused.narrow_cols(2 * d, d)?;
        let grad_s_ht = grad_fused.narrow_cols(3 * d, d)?;

        let (seq, _) = trace.u_l.shape();
        let mut grad_u_l = Tensor::zeros(seq, d)?;
        let mut grad_u_s = Tensor::zeros(seq, d)?;
        grad_u_l.scatter_add_rows(&[trace.last], &grad_l_ht)?;
        grad_u_s.scatter_add_rows(&[trace.last], &grad_s_ht)?;

        let grad_pre_l = branch_backward(
            &mut self.local_score,
            &trace.local,
            &trace.u_l,
            &trace.mask,
            grad_z_l.data(),
            &mut grad_u_l,
        )?;
        let grad_pre_s = branch_backward(
            &mut self.global_score,
            &trace.global,
            &trace.u_s,
            &trace.mask,
            grad_z_s.data(),
            &mut grad_u_s,
        )?;

        // pre_l = Q_l + C^T Q_s and pre_s = Q_s + C Q_l.
        let grad_query_l = grad_pre_l.add(&trace.affinity.transpose_matmul(&grad_pre_s)?)?;
        let grad_query_s = grad_pre_s.add(&trace.affinity.matmul(&grad_pre_l)?)?;
        let mut grad_affinity = trace.query_s.matmul_transposed(&grad_pre_l)?;
        grad_affinity.add_scaled(&grad_pre_s.matmul_transposed(&trace.query_l)?, 1.0)?;

        grad_u_l.add_scaled(&self.local.backward(&trace.u_l, &grad_query_l)?, 1.0)?;
        grad_u_s.add_scaled(&self.global.backward(&trace.u_s, &grad_query_s)?, 1.0)?;

        // C = U_l P^T with P = W_c(U_s).
        grad_u_l.add_scaled(&grad_affinity.matmul(&trace.projected_s)?, 1.0)?;
        let grad_projected = grad_affinity.transpose_matmul(&trace.u_l)?;
        grad_u_s.add_scaled(&self.affinity.backward(&trace.u_s, &grad_projected)?, 1.0)?;
        Ok((grad_u_l, grad_u_s))
    }
}

/// `z = sum_t alpha_t * mask_t * U[t]` as a `(1, hidden)` row.
fn pool(sequence: &Tensor, alpha: &[f32], mask: &[f32]) -> PureResult<Tensor> {
    let cols = sequence.cols();
    let mut out = vec![0.0f32; cols];
    for (t, row) in sequence.data().chunks(cols).enumerate() {
        let w = alpha[t] * mask[t];
        for (acc, value) in out.iter_mut().zip(row.iter()) {
            *acc += w * value;
        }
    }
    Tensor::from_vec(1, cols, out)
}

/// Pushes `dz` through pooling, the masked softmax and the tanh, returning the
/// gradient with respect to the branch pre-activation.
fn branch_backward(
    score: &mut Linear,
    branch: &BranchTrace,
    sequence: &Tensor,
    mask: &[f32],
    grad_z: &[f32],
    grad_sequence: &mut Tensor,
) -> PureResult<Tensor> {
    let (seq, cols) = sequence.shape();
    let mut grad_alpha = vec![0.0f32; seq];
    {
        let grad_rows = grad_sequence.data_mut();
        for t in 0..seq {
            let row = &sequence.data()[t * cols..(t + 1) * cols];
            let w = branch.alpha[t] * mask[t];
            let mut dot = 0.0f32;
            for c in 0..cols {
                grad_rows[t * cols + c] += w * grad_z[c];
                dot += grad_z[c] * row[c];
            }
            grad_alpha[t] = mask[t] * dot;
        }
    }
    let weighted: f32 = grad_alpha
        .iter()
        .zip(branch.alpha.iter())
        .map(|(g, a)| g * a)
        .sum();
    let grad_logits: Vec<f32> = grad_alpha
        .iter()
        .zip(branch.alpha.iter())
        .map(|(g, a)| a * (g - weighted))
        .collect();
    let grad_logits = Tensor::from_vec(seq, 1, grad_logits)?;
    let grad_activated = score.backward(&branch.activated, &grad_logits)?;
    grad_activated.zip_map(&branch.activated, |g, h| g * (1.0 - h * h))
}

impl Parameterised for DualAttentionReadout {
    fn visit_parameters(
        &self,
        visitor: &mut dyn FnMut(&Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        self.affinity.visit_parameters(visitor)?;
        self.local.visit_parameters(visitor)?;
        self.global.visit_parameters(visitor)?;
        self.local_score.visit_parameters(visitor)?;
        self.global_score.visit_parameters(visitor)?;
        self.fusion.visit_parameters(visitor)
    }

    fn visit_parameters_mut(
        &mut self,
        visitor: &mut dyn FnMut(&mut Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        self.affinity.visit_parameters_mut(visitor)?;
        self.local.visit_parameters_mut(visitor)?;
        self.global.visit_parameters_mut(visitor)?;
        self.local_score.visit_parameters_mut(visitor)?;
        self.global_score.visit_parameters_mut(visitor)?;
        self.fusion.visit_parameters_mut(visitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn readout(hidden: usize) -> DualAttentionReadout {
        let mut init = UniformInit::for_hidden(hidden, Some(21)).unwrap();
        DualAttentionReadout::new("readout", hidden, &mut init).unwrap()
    }

    #[test]
    fn last_position_follows_mask_length() {
        assert_eq!(last_position(&[1.0, 1.0, 0.0]), 1);
        assert_eq!(last_position(&[1.0, 1.0, 1.0]), 2);
        assert_eq!(last_position(&[1.0, 0.0, 0.0]), 0);
        assert_eq!(last_position(&[0.0, 0.0, 0.0]), 2);
    }

    #[test]
    fn attention_weights_sum_to_one_over_real_positions() {
        let module = readout(4);
        let u_l = Tensor::random_uniform(5, 4, -1.0, 1.0, Some(1)).unwrap();
        let u_s = Tensor::random_uniform(5, 4, -1.0, 1.0, Some(2)).unwrap();
        let mask = [1.0, 1.0, 1.0, 0.0, 0.0];
        let (out, trace) = module.forward_traced(&u_l, &u_s, &mask).unwrap();
        assert_eq!(out.shape(), (1, 4));
        for weights in [trace.local_weights(), trace.global_weights()] {
            assert_abs_diff_eq!(weights.iter().sum::<f32>(), 1.0, epsilon = 1e-5);
            assert_eq!(weights[3], 0.0);
            assert_eq!(weights[4], 0.0);
        }
        assert_eq!(trace.last(), 2);
    }

    #[test]
    fn empty_mask_yields_nan() {
        let module = readout(3);
        let u = Tensor::random_uniform(2, 3, -1.0, 1.0, Some(3)).unwrap();
        let out = module.forward(&u, &u, &[0.0, 0.0]).unwrap();
        assert!(out.data().iter().any(|v| v.is_nan()));
    }

    #[test]
    fn mismatched_inputs_are_rejected() {
        let module = readout(3);
        let a = Tensor::zeros(2, 3).unwrap();
        let b = Tensor::zeros(3, 3).unwrap();
        assert!(module.forward(&a, &b, &[1.0, 1.0]).is_err());
        assert!(module.forward(&a, &a, &[1.0]).is_err());
    }
}
