// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use tracing::debug;

use crate::module::Parameterised;
use crate::optim::{Adam, LrScheduler, StepLrScheduler};
use crate::PureResult;

/// Owns the optimiser and its epoch-level learning-rate schedule so the
/// training loop only deals with "zero, step, end of epoch".
#[derive(Debug, Clone)]
pub struct ModuleTrainer {
    optimizer: Adam,
    scheduler: StepLrScheduler,
    epochs: u32,
}

impl ModuleTrainer {
    pub fn new(optimizer: Adam, scheduler: StepLrScheduler) -> Self {
        Self {
            optimizer,
            scheduler,
            epochs: 0,
        }
    }

    pub fn optimizer(&self) -> &Adam {
        &self.optimizer
    }

    /// Learning rate the next optimiser step will use.
    pub fn learning_rate(&self) -> f32 {
        self.optimizer.learning_rate()
    }

    /// Completed epochs.
    pub fn epochs(&self) -> u32 {
        self.epochs
    }

    /// Clears accumulated gradients.
    pub fn zero<M: Parameterised + ?Sized>(&self, module: &mut M) -> PureResult<()> {
        self.optimizer.zero_grad(module)
    }

    /// Applies one optimiser update.
    pub fn step<M: Parameterised + ?Sized>(&mut self, module: &mut M) -> PureResult<()> {
        self.optimizer.step(module)
    }

    /// Advances the schedule; returns the learning rate for the next epoch.
    pub fn end_epoch(&mut self) -> PureResult<f32> {
        let previous = self.optimizer.learning_rate();
        let lr = self.scheduler.step_optimizer(&mut self.optimizer)?;
        self.epochs += 1;
        if lr != previous {
            debug!(epoch = self.epochs, previous, lr, "learning rate decayed");
        }
        Ok(lr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::init::UniformInit;
    use crate::layers::linear::Linear;
    use crate::module::Module;
    use crate::optim::AdamConfig;
    use crate::Tensor;

    #[test]
    fn trainer_steps_and_decays() {
        let adam = Adam::new(AdamConfig::default().with_learning_rate(0.01)).unwrap();
        let scheduler = StepLrScheduler::new(0.01, 0.1, 2).unwrap();
        let mut trainer = ModuleTrainer::new(adam, scheduler);

        let mut init = UniformInit::for_hidden(2, Some(4)).unwrap();
        let mut layer = Linear::new("fc", 2, 1, &mut init).unwrap();
        let input = Tensor::from_vec(1, 2, vec![1.0, -1.0]).unwrap();
        let target = Tensor::from_vec(1, 1, vec![0.5]).unwrap();
        let out = layer.forward(&input).unwrap();
        let grad = out.sub(&target).unwrap();
        layer.backward(&input, &grad).unwrap();
        let before = layer.weight().value().clone();
        trainer.step(&mut layer).unwrap();
        assert_ne!(&before, layer.weight().value());
        trainer.zero(&mut layer).unwrap();
        assert!(layer.weight().gradient().is_none());

        assert!((trainer.end_epoch().unwrap() - 0.01).abs() < 1e-9);
        assert!((trainer.end_epoch().unwrap() - 0.001).abs() < 1e-9);
        assert_eq!(trainer.epochs(), 2);
        assert!((trainer.learning_rate() - 0.001).abs() < 1e-9);
    }
}
