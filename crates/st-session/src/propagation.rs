// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Gated graph propagation over a session's item-transition graph.

use st_nn::{Linear, Module, Parameter, Parameterised, UniformInit};
use st_tensor::{PureResult, Tensor, TensorError};

fn sigmoid(value: f32) -> f32 {
    1.0 / (1.0 + (-value).exp())
}

/// GRU-style node update driven by messages along incoming and outgoing edges.
///
/// Gate weights are laid out `(input, 3 * hidden)` with the reset, update and
/// candidate blocks side by side.
#[derive(Debug)]
pub struct GatedGraphPropagation {
    hidden: usize,
    step: usize,
    weight_ih: Parameter,
    weight_hh: Parameter,
    bias_ih: Parameter,
    bias_hh: Parameter,
    bias_iah: Parameter,
    bias_oah: Parameter,
    edge_in: Linear,
    edge_out: Linear,
}

/// Values one cell iteration needs for its backward pass.
#[derive(Debug, Clone)]
struct CellCache {
    hidden: Tensor,
    inputs: Tensor,
    reset: Vec<f32>,
    update: Vec<f32>,
    candidate: Vec<f32>,
    /// Candidate block of `H W_hh + b_hh`, before the reset gate is applied.
    hidden_candidate: Vec<f32>,
}

/// Recorded forward pass for one session graph.
#[derive(Debug, Clone)]
pub struct PropagationTrace {
    incoming: Tensor,
    outgoing: Tensor,
    cells: Vec<CellCache>,
}

impl PropagationTrace {
    /// Number of recorded iterations.
    pub fn steps(&self) -> usize {
        self.cells.len()
    }
}

impl GatedGraphPropagation {
    pub fn new(
        name: impl Into<String>,
        hidden: usize,
        step: usize,
        init: &mut UniformInit,
    ) -> PureResult<Self> {
        if hidden == 0 {
            return Err(TensorError::InvalidDimensions {
                rows: hidden,
                cols: hidden,
            });
        }
        let name = name.into();
        let gates = 3 * hidden;
        Ok(Self {
            hidden,
            step,
            weight_ih: Parameter::new(format!("{name}::w_ih"), init.sample(2 * hidden, gates)?),
            weight_hh: Parameter::new(format!("{name}::w_hh"), init.sample(hidden, gates)?),
            bias_ih: Parameter::new(format!("{name}::b_ih"), init.sample(1, gates)?),
            bias_hh: Parameter::new(format!("{name}::b_hh"), init.sample(1, gates)?),
            bias_iah: Parameter::new(format!("{name}::b_iah"), init.sample(1, hidden)?),
            bias_oah: Parameter::new(format!("{name}::b_oah"), init.sample(1, hidden)?),
            edge_in: Linear::new(format!("{name}::edge_in"), hidden, hidden, init)?,
            edge_out: Linear::new(format!("{name}::edge_out"), hidden, hidden, init)?,
        })
    }

    pub fn hidden(&self) -> usize {
        self.hidden
    }

    pub fn step(&self) -> usize {
        self.step
    }

    fn split_adjacency(&self, adjacency: &Tensor, hidden: &Tensor) -> PureResult<(Tensor, Tensor)> {
        let nodes = hidden.rows();
        if adjacency.shape() != (nodes, 2 * nodes) || hidden.cols() != self.hidden {
            return Err(TensorError::ShapeMismatch {
                left: adjacency.shape(),
                right: hidden.shape(),
            });
        }
        Ok((adjacency.narrow_cols(0, nodes)?, adjacency.narrow_cols(nodes, nodes)?))
    }

    /// Runs `step` iterations. `step == 0` returns `hidden` unchanged.
    pub fn forward(&self, adjacency: &Tensor, hidden: &Tensor) -> PureResult<Tensor> {
        self.forward_traced(adjacency, hidden).map(|(out, _)| out)
    }

    /// Forward pass that also records what [`Self::backward`] needs.
    pub fn forward_traced(
        &self,
        adjacency: &Tensor,
        hidden: &Tensor,
    ) -> PureResult<(Tensor, PropagationTrace)> {
        let (incoming, outgoing) = self.split_adjacency(adjacency, hidden)?;
        let mut state = hidden.clone();
        let mut cells = Vec::with_capacity(self.step);
        for _ in 0..self.step {
            let (next, cache) = self.cell(&incoming, &outgoing, state)?;
            cells.push(cache);
            state = next;
        }
        Ok((
            state,
            PropagationTrace {
                incoming,
                outgoing,
                cells,
            },
        ))
    }

    fn cell(
        &self,
        incoming: &Tensor,
        outgoing: &Tensor,
        hidden: Tensor,
    ) -> PureResult<(Tensor, CellCache)> {
        let d = self.hidden;
        let mut input_in = incoming.matmul(&self.edge_in.forward(&hidden)?)?;
        input_in.add_row_inplace(self.bias_iah.value().data())?;
        let mut input_out = outgoing.matmul(&self.edge_out.forward(&hidden)?)?;
        input_out.add_row_inplace(self.bias_oah.value().data())?;
        let inputs = Tensor::cat_cols(&[&input_in, &input_out])?;

        let mut gi = inputs.matmul(self.weight_ih.value())?;
        gi.add_row_inplace(self.bias_ih.value().data())?;
        let mut gh = hidden.matmul(self.weight_hh.value())?;
        gh.add_row_inplace(self.bias_hh.value().data())?;

        let nodes = hidden.rows();
        let mut reset = vec![0.0f32; nodes * d];
        let mut update = vec![0.0f32; nodes * d];
        let mut candidate = vec![0.0f32; nodes * d];
        let mut hidden_candidate = vec![0.0f32; nodes * d];
        let mut next = vec![0.0f32; nodes * d];
        for node in 0..nodes {
            let gi_row = &gi.data()[node * 3 * d..(node + 1) * 3 * d];
            let gh_row = &gh.data()[node * 3 * d..(node + 1) * 3 * d];
            for unit in 0..d {
                let idx = node * d + unit;
                let r = sigmoid(gi_row[unit] + gh_row[unit]);
                let z = sigmoid(gi_row[d + unit] + gh_row[d + unit]);
                let h_n = gh_row[2 * d + unit];
                let n = (gi_row[2 * d + unit] + r * h_n).tanh();
                // Blend toward the previous state by the update gate.
                next[idx] = n + z * (hidden.data()[idx] - n);
                reset[idx] = r;
                update[idx] = z;
                candidate[idx] = n;
                hidden_candidate[idx] = h_n;
            }
        }
        Ok((
            Tensor::from_vec(nodes, d, next)?,
            CellCache {
                hidden,
                inputs,
                reset,
                update,
                candidate,
                hidden_candidate,
            },
        ))
    }

    /// Accumulates parameter gradients for a traced pass and returns the
    /// gradient with respect to the initial hidden state.
    pub fn backward(&mut self, trace: &PropagationTrace, grad_output: &Tensor) -> PureResult<Tensor> {
        let mut grad = grad_output.clone();
        for cache in trace.cells.iter().rev() {
            grad = self.cell_backward(&trace.incoming, &trace.outgoing, cache, &grad)?;
        }
        Ok(grad)
    }

    fn cell_backward(
        &mut self,
        incoming: &Tensor,
        outgoing: &Tensor,
        cache: &CellCache,
        grad_output: &Tensor,
    ) -> PureResult<Tensor> {
        let d = self.hidden;
        let nodes = cache.hidden.rows();
        if grad_output.shape() != (nodes, d) {
            return Err(TensorError::ShapeMismatch {
                left: grad_output.shape(),
                right: (nodes, d),
            });
        }
        let mut grad_gi = vec![0.0f32; nodes * 3 * d];
        let mut grad_gh = vec![0.0f32; nodes * 3 * d];
        let mut grad_hidden = vec![0.0f32; nodes * d];
        for node in 0..nodes {
            for unit in 0..d {
                let idx = node * d + unit;
                let g = grad_output.data()[idx];
                let r = cache.reset[idx];
                let z = cache.update[idx];
                let n = cache.candidate[idx];
                let h = cache.hidden.data()[idx];

                let dn = g * (1.0 - z);
                let dz = g * (h - n);
                grad_hidden[idx] = g * z;

                let dpre_n = dn * (1.0 - n * n);
                let dr = dpre_n * cache.hidden_candidate[idx];
                let dpre_r = dr * r * (1.0 - r);
                let dpre_z = dz * z * (1.0 - z);

                let base = node * 3 * d;
                grad_gi[base + unit] = dpre_r;
                grad_gi[base + d + unit] = dpre_z;
                grad_gi[base + 2 * d + unit] = dpre_n;
                grad_gh[base + unit] = dpre_r;
                grad_gh[base + d + unit] = dpre_z;
                grad_gh[base + 2 * d + unit] = dpre_n * r;
            }
        }
        let grad_gi = Tensor::from_vec(nodes, 3 * d, grad_gi)?;
        let grad_gh = Tensor::from_vec(nodes, 3 * d, grad_gh)?;
        let mut grad_hidden = Tensor::from_vec(nodes, d, grad_hidden)?;

        self.weight_ih
            .accumulate(&cache.inputs.transpose_matmul(&grad_gi)?)?;
        self.bias_ih.accumulate(&row_sums(&grad_gi)?)?;
        self.weight_hh
            .accumulate(&cache.hidden.transpose_matmul(&grad_gh)?)?;
        self.bias_hh.accumulate(&row_sums(&grad_gh)?)?;
        grad_hidden.add_scaled(&grad_gh.matmul_transposed(self.weight_hh.value())?, 1.0)?;

        let grad_inputs = grad_gi.matmul_transposed(self.weight_ih.value())?;
        let grad_in = grad_inputs.narrow_cols(0, d)?;
        let grad_out = grad_inputs.narrow_cols(d, d)?;
        self.bias_iah.accumulate(&row_sums(&grad_in)?)?;
        self.bias_oah.accumulate(&row_sums(&grad_out)?)?;

        let grad_edge_in = incoming.transpose_matmul(&grad_in)?;
        grad_hidden.add_scaled(&self.edge_in.backward(&cache.hidden, &grad_edge_in)?, 1.0)?;
        let grad_edge_out = outgoing.transpose_matmul(&grad_out)?;
        grad_hidden.add_scaled(&self.edge_out.backward(&cache.hidden, &grad_edge_out)?, 1.0)?;
        Ok(grad_hidden)
    }
}

fn row_sums(tensor: &Tensor) -> PureResult<Tensor> {
    let summed = tensor.sum_axis0();
    Tensor::from_vec(1, summed.len(), summed)
}

impl Parameterised for GatedGraphPropagation {
    fn visit_parameters(
        &self,
        visitor: &mut dyn FnMut(&Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        visitor(&self.weight_ih)?;
        visitor(&self.weight_hh)?;
        visitor(&self.bias_ih)?;
        visitor(&self.bias_hh)?;
        visitor(&self.bias_iah)?;
        visitor(&self.bias_oah)?;
        self.edge_in.visit_parameters(visitor)?;
        self.edge_out.visit_parameters(visitor)
    }

    fn visit_parameters_mut(
        &mut self,
        visitor: &mut dyn FnMut(&mut Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        visitor(&mut self.weight_ih)?;
        visitor(&mut self.weight_hh)?;
        visitor(&mut self.bias_ih)?;
        visitor(&mut self.bias_hh)?;
        visitor(&mut self.bias_iah)?;
        visitor(&mut self.bias_oah)?;
        self.edge_in.visit_parameters_mut(visitor)?;
        self.edge_out.visit_parameters_mut(visitor)
    }
}
