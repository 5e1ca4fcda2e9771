// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use rayon::prelude::*;
use st_nn::{Embedding, Parameter, Parameterised, UniformInit};
use st_tensor::{backend, PureResult, Tensor};
use tracing::debug;

use crate::batch::{SessionBatch, SessionSample};
use crate::config::SessionGraphConfig;
use crate::error::SessionResult;
use crate::metrics::top_k_indices;
use crate::propagation::{GatedGraphPropagation, PropagationTrace};
use crate::readout::{DualAttentionReadout, ReadoutTrace};
use crate::scoring;

/// Session-graph recommender: shared item table, gated propagation, dual
/// attention readout and dot-product scoring.
#[derive(Debug)]
pub struct SessionGraph {
    config: SessionGraphConfig,
    embedding: Embedding,
    propagation: GatedGraphPropagation,
    readout: DualAttentionReadout,
}

#[derive(Debug, Clone)]
struct SessionForward {
    items: Vec<usize>,
    alias: Vec<usize>,
    propagation: PropagationTrace,
    readout: ReadoutTrace,
    fused: Tensor,
}

/// Everything [`SessionGraph::backward_batch`] needs from a forward pass.
#[derive(Debug, Clone)]
pub struct BatchTrace {
    sessions: Vec<SessionForward>,
    fused: Tensor,
}

impl BatchTrace {
    /// `(batch, hidden)` fused session vectors fed to the scorer.
    pub fn fused(&self) -> &Tensor {
        &self.fused
    }
}

impl SessionGraph {
    /// Builds the model with every weight drawn from `U(-1/sqrt(d), 1/sqrt(d))`.
    pub fn new(config: &SessionGraphConfig) -> SessionResult<Self> {
        config.validate()?;
        let hidden = config.hidden_size;
        let mut init = UniformInit::for_hidden(hidden, config.seed)?;
        let embedding = Embedding::new("session::embedding", config.n_node, hidden, &mut init)?;
        let propagation =
            GatedGraphPropagation::new("session::propagation", hidden, config.step, &mut init)?;
        let readout = DualAttentionReadout::new("session::readout", hidden, &mut init)?;
        let model = Self {
            config: config.clone(),
            embedding,
            propagation,
            readout,
        };
        debug!(
            n_node = config.n_node,
            hidden,
            step = config.step,
            parameters = model.parameter_count()?,
            "session graph initialised"
        );
        Ok(model)
    }

    pub fn config(&self) -> &SessionGraphConfig {
        &self.config
    }

    pub fn n_node(&self) -> usize {
        self.config.n_node
    }

    pub fn hidden_size(&self) -> usize {
        self.config.hidden_size
    }

    pub fn embedding(&self) -> &Embedding {
        &self.embedding
    }

    pub fn propagation(&self) -> &GatedGraphPropagation {
        &self.propagation
    }

    pub fn readout(&self) -> &DualAttentionReadout {
        &self.readout
    }

    fn forward_session(&self, session: &SessionSample) -> PureResult<SessionForward> {
        let initial = self.embedding.lookup(&session.items)?;
        let (propagated, propagation) = self
            .propagation
            .forward_traced(&session.adjacency, &initial)?;
        let u_l = initial.gather_rows(&session.alias)?;
        let u_s = propagated.gather_rows(&session.alias)?;
        let (fused, readout) = self
            .readout
            .forward_traced(&u_l, &u_s, &session.mask_weights())?;
        Ok(SessionForward {
            items: session.items.clone(),
            alias: session.alias.clone(),
            propagation,
            readout,
            fused,
        })
    }

    /// Scores every candidate for every session and keeps the trace for a
    /// backward pass. Returns `(batch, n_node - 1)` logits.
    pub fn forward_batch(&self, batch: &SessionBatch) -> SessionResult<(Tensor, BatchTrace)> {
        batch.check_catalogue(self.n_node())?;
        let sessions: Vec<SessionForward> = if backend::active().is_parallel() {
            batch
                .sessions()
                .par_iter()
                .map(|session| self.forward_session(session))
                .collect::<PureResult<_>>()?
        } else {
            batch
                .sessions()
                .iter()
                .map(|session| self.forward_session(session))
                .collect::<PureResult<_>>()?
        };
        let rows: Vec<Tensor> = sessions.iter().map(|s| s.fused.clone()).collect();
        let fused = Tensor::cat_rows(&rows)?;
        let scores = scoring::score(&fused, self.embedding.weight().value())?;
        Ok((scores, BatchTrace { sessions, fused }))
    }

    /// Logits only.
    pub fn scores(&self, batch: &SessionBatch) -> SessionResult<Tensor> {
        self.forward_batch(batch).map(|(scores, _)| scores)
    }

    /// Accumulates gradients for every parameter from `d loss / d scores`.
    pub fn backward_batch(&mut self, trace: &BatchTrace, grad_scores: &Tensor) -> SessionResult<()> {
        let grads = scoring::score_backward(&trace.fused, self.embedding.weight().value(), grad_scores)?;
        let candidate_ids: Vec<usize> = (1..self.n_node()).collect();
        self.embedding.accumulate(&candidate_ids, &grads.candidates)?;

        for (index, session) in trace.sessions.iter().enumerate() {
            let grad_fused = grads.session.slice_rows(index, index + 1)?;
            let (grad_u_l, grad_u_s) = self.readout.backward(&session.readout, &grad_fused)?;
            let (nodes, hidden) = (session.items.len(), self.hidden_size());
            let mut grad_propagated = Tensor::zeros(nodes, hidden)?;
            grad_propagated.scatter_add_rows(&session.alias, &grad_u_s)?;
            let mut grad_initial = self
                .propagation
                .backward(&session.propagation, &grad_propagated)?;
            grad_initial.scatter_add_rows(&session.alias, &grad_u_l)?;
            self.embedding.accumulate(&session.items, &grad_initial)?;
        }
        Ok(())
    }

    /// Top `k` 1-indexed item ids per session, best first. `k` is clamped to
    /// the candidate count.
    pub fn predict_top_k(&self, batch: &SessionBatch, k: usize) -> SessionResult<Vec<Vec<usize>>> {
        let scores = self.scores(batch)?;
        let k = k.min(self.config.candidates());
        Ok(scores
            .data()
            .chunks(scores.cols())
            .map(|row| top_k_indices(row, k).into_iter().map(|idx| idx + 1).collect())
            .collect())
    }
}

impl Parameterised for SessionGraph {
    fn visit_parameters(
        &self,
        visitor: &mut dyn FnMut(&Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        self.embedding.visit_parameters(visitor)?;
        self.propagation.visit_parameters(visitor)?;
        self.readout.visit_parameters(visitor)
    }

    fn visit_parameters_mut(
        &mut self,
        visitor: &mut dyn FnMut(&mut Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        self.embedding.visit_parameters_mut(visitor)?;
        self.propagation.visit_parameters_mut(visitor)?;
        self.readout.visit_parameters_mut(visitor)
    }
}
