// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! One-epoch train + evaluate driver.

use st_nn::{Adam, AdamConfig, ModuleTrainer, SoftmaxCrossEntropy, StepLrScheduler};
use tracing::{debug, info, info_span, warn};

use crate::batch::{BatchSource, SessionBatch};
use crate::config::SessionGraphConfig;
use crate::error::{SessionError, SessionResult};
use crate::metrics::RankingMetrics;
use crate::model::SessionGraph;

/// Summary of one training pass.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainSummary {
    pub total_loss: f32,
    pub batches: usize,
    /// Learning rate the pass ran with (before the epoch-end decay).
    pub learning_rate: f32,
}

impl TrainSummary {
    pub fn mean_loss(&self) -> f32 {
        if self.batches == 0 {
            return 0.0;
        }
        self.total_loss / self.batches as f32
    }
}

/// Everything [`SessionTrainer::run_epoch_report`] measured.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochReport {
    pub epoch: u32,
    pub total_loss: f32,
    pub mean_loss: f32,
    pub batches: usize,
    pub sessions_evaluated: usize,
    pub learning_rate: f32,
    /// Hit@K percentage.
    pub hit: f32,
    /// MRR@K percentage.
    pub mrr: f32,
}

/// Owns the model and its optimiser state across epochs.
#[derive(Debug)]
pub struct SessionTrainer {
    model: SessionGraph,
    trainer: ModuleTrainer,
    loss: SoftmaxCrossEntropy,
}

impl SessionTrainer {
    pub fn new(config: SessionGraphConfig) -> SessionResult<Self> {
        let model = SessionGraph::new(&config)?;
        let optimizer = Adam::new(
            AdamConfig::default()
                .with_learning_rate(config.learning_rate)
                .with_weight_decay(config.weight_decay),
        )?;
        let scheduler = StepLrScheduler::new(
            config.learning_rate,
            config.lr_decay_factor,
            config.lr_decay_every_n_epochs,
        )?;
        Ok(Self {
            model,
            trainer: ModuleTrainer::new(optimizer, scheduler),
            loss: SoftmaxCrossEntropy::new(),
        })
    }

    /// Positional construction used by command-line drivers.
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        hidden_size: usize,
        step: usize,
        n_node: usize,
        batch_size: usize,
        learning_rate: f32,
        weight_decay: f32,
        lr_decay_factor: f32,
        lr_decay_every_n_epochs: u32,
    ) -> SessionResult<Self> {
        Self::new(SessionGraphConfig::build(
            hidden_size,
            step,
            n_node,
            batch_size,
            learning_rate,
            weight_decay,
            lr_decay_factor,
            lr_decay_every_n_epochs,
        )?)
    }

    pub fn model(&self) -> &SessionGraph {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut SessionGraph {
        &mut self.model
    }

    pub fn config(&self) -> &SessionGraphConfig {
        self.model.config()
    }

    /// Learning rate the next optimiser step will use.
    pub fn learning_rate(&self) -> f32 {
        self.trainer.learning_rate()
    }

    /// Completed training epochs.
    pub fn epochs(&self) -> u32 {
        self.trainer.epochs()
    }

    /// Zero, forward, loss, backward and step on one batch. Returns the batch
    /// loss.
    pub fn train_batch(&mut self, batch: &SessionBatch) -> SessionResult<f32> {
        self.trainer.zero(&mut self.model)?;
        let (scores, trace) = self.model.forward_batch(batch)?;
        let classes: Vec<usize> = batch.targets().iter().map(|t| t - 1).collect();
        let loss = self.loss.forward_classes(&scores, &classes)?;
        if !loss.is_finite() {
            warn!(loss, sessions = batch.len(), "non-finite batch loss");
        }
        let grad = self.loss.backward_classes(&scores, &classes)?;
        self.model.backward_batch(&trace, &grad)?;
        self.trainer.step(&mut self.model)?;
        Ok(loss)
    }

    /// One pass over `source`, then one learning-rate schedule step.
    pub fn train_epoch<S: BatchSource + ?Sized>(&mut self, source: &mut S) -> SessionResult<TrainSummary> {
        let span = info_span!("train", epoch = self.epochs() + 1);
        let _guard = span.enter();
        if source.is_empty() {
            return Err(SessionError::EmptyDataset);
        }
        let learning_rate = self.learning_rate();
        let slices = source.generate_batch(self.config().batch_size)?;
        let total = slices.len();
        let report_every = total / 5 + 1;
        info!(batches = total, learning_rate, "start training");

        let mut total_loss = 0.0f32;
        for (index, slice) in slices.iter().enumerate() {
            let batch = source.get_slice(slice)?;
            let loss = self.train_batch(&batch)?;
            total_loss += loss;
            if index % report_every == 0 {
                debug!(batch = index, of = total, loss, "batch loss");
            }
        }
        let next_lr = self.trainer.end_epoch()?;
        info!(total_loss, next_learning_rate = next_lr, "training finished");
        Ok(TrainSummary {
            total_loss,
            batches: total,
            learning_rate,
        })
    }

    /// Ranks every session in `source`; no gradients are recorded.
    pub fn evaluate<S: BatchSource + ?Sized>(&self, source: &mut S) -> SessionResult<RankingMetrics> {
        let span = info_span!("evaluate", epoch = self.epochs());
        let _guard = span.enter();
        if source.is_empty() {
            return Err(SessionError::EmptyDataset);
        }
        let mut metrics = RankingMetrics::new(self.config().effective_top_k());
        for slice in source.generate_batch(self.config().batch_size)? {
            let batch = source.get_slice(&slice)?;
            let scores = self.model.scores(&batch)?;
            metrics.observe_scores(&scores, &batch.targets())?;
        }
        info!(
            k = metrics.k(),
            sessions = metrics.sessions(),
            hit = metrics.hit_rate(),
            mrr = metrics.mrr(),
            "evaluation finished"
        );
        Ok(metrics)
    }

    /// Train on `train`, evaluate on `test`; returns `(hit, mrr)` percentages.
    pub fn run_epoch<T, E>(&mut self, train: &mut T, test: &mut E) -> SessionResult<(f32, f32)>
    where
        T: BatchSource + ?Sized,
        E: BatchSource + ?Sized,
    {
        let report = self.run_epoch_report(train, test)?;
        Ok((report.hit, report.mrr))
    }

    pub fn run_epoch_report<T, E>(&mut self, train: &mut T, test: &mut E) -> SessionResult<EpochReport>
    where
        T: BatchSource + ?Sized,
        E: BatchSource + ?Sized,
    {
        let summary = self.train_epoch(train)?;
        let metrics = self.evaluate(test)?;
        Ok(EpochReport {
            epoch: self.epochs(),
            total_loss: summary.total_loss,
            mean_loss: summary.mean_loss(),
            batches: summary.batches,
            sessions_evaluated: metrics.sessions(),
            learning_rate: summary.learning_rate,
            hit: metrics.hit_rate(),
            mrr: metrics.mrr(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SessionData;

    fn data() -> SessionData {
        SessionData::new(
            vec![vec![1, 2], vec![2, 3], vec![3, 1, 2], vec![4]],
            vec![3, 4, 4, 1],
            false,
        )
        .unwrap()
    }

    #[test]
    fn train_epoch_counts_batches_and_decays() {
        let config = SessionGraphConfig::new(5)
            .with_hidden_size(4)
            .with_batch_size(3)
            .with_lr_decay(0.5, 1)
            .with_seed(2);
        let mut trainer = SessionTrainer::new(config).unwrap();
        let summary = trainer.train_epoch(&mut data()).unwrap();
        assert_eq!(summary.batches, 2);
        assert!(summary.total_loss.is_finite());
        assert!((summary.learning_rate - 0.001).abs() < 1e-9);
        assert!((trainer.learning_rate() - 0.0005).abs() < 1e-9);
        assert_eq!(trainer.epochs(), 1);
    }

    #[test]
    fn evaluation_leaves_weights_untouched() {
        let config = SessionGraphConfig::new(5).with_hidden_size(4).with_seed(3);
        let trainer = SessionTrainer::new(config).unwrap();
        let before = trainer.model().embedding().weight().value().clone();
        let metrics = trainer.evaluate(&mut data()).unwrap();
        assert_eq!(metrics.sessions(), 4);
        // Only four candidates exist, so every target is inside the list.
        assert!((metrics.hit_rate() - 100.0).abs() < 1e-4);
        assert_eq!(&before, trainer.model().embedding().weight().value());
    }
}
