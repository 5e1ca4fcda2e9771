// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use std::collections::HashMap;

use crate::module::Parameterised;
use crate::PureResult;
use st_tensor::TensorError;

/// Adam hyperparameters. Weight decay is coupled: it is folded into the
/// gradient before the moment updates, matching classic L2 regularisation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdamConfig {
    pub learning_rate: f32,
    pub beta1: f32,
    pub beta2: f32,
    pub eps: f32,
    pub weight_decay: f32,
}

impl Default for AdamConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-3,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            weight_decay: 0.0,
        }
    }
}

impl AdamConfig {
    pub fn with_learning_rate(mut self, learning_rate: f32) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_weight_decay(mut self, weight_decay: f32) -> Self {
        self.weight_decay = weight_decay;
        self
    }

    fn validate(&self) -> PureResult<()> {
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(TensorError::NonPositiveLearningRate {
                rate: self.learning_rate,
            });
        }
        for (label, value) in [("adam_beta1", self.beta1), ("adam_beta2", self.beta2)] {
            if !(0.0..1.0).contains(&value) {
                return Err(TensorError::NonFiniteValue { label, value });
            }
        }
        if !self.eps.is_finite() || self.eps <= 0.0 {
            return Err(TensorError::NonFiniteValue {
                label: "adam_eps",
                value: self.eps,
            });
        }
        if !self.weight_decay.is_finite() || self.weight_decay < 0.0 {
            return Err(TensorError::NonFiniteValue {
                label: "adam_weight_decay",
                value: self.weight_decay,
            });
        }
        Ok(())
    }
}

/// First/second moments for one parameter plus its own step count for bias
/// correction.
#[derive(Debug, Clone)]
struct MomentBuf {
    m: Vec<f32>,
    v: Vec<f32>,
    step: u32,
}

impl MomentBuf {
    fn zeros(n: usize) -> Self {
        Self {
            m: vec![0.0; n],
            v: vec![0.0; n],
            step: 0,
        }
    }
}

/// Adam optimiser keyed by parameter name.
///
/// Parameters that carry no accumulated gradient at step time are left
/// untouched and their moments do not advance.
#[derive(Debug, Clone)]
pub struct Adam {
    config: AdamConfig,
    moments: HashMap<String, MomentBuf>,
}

impl Adam {
    pub fn new(config: AdamConfig) -> PureResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            moments: HashMap::new(),
        })
    }

    pub fn config(&self) -> &AdamConfig {
        &self.config
    }

    pub fn learning_rate(&self) -> f32 {
        self.config.learning_rate
    }

    /// Overrides the learning rate, typically from a scheduler.
    pub fn set_learning_rate(&mut self, learning_rate: f32) -> PureResult<()> {
        if !learning_rate.is_finite() || learning_rate <= 0.0 {
            return Err(TensorError::NonPositiveLearningRate {
                rate: learning_rate,
            });
        }
        self.config.learning_rate = learning_rate;
        Ok(())
    }

    /// Number of parameters with live moment buffers.
    pub fn tracked_parameters(&self) -> usize {
        self.moments.len()
    }

    /// Clears the accumulated gradients of every parameter in `module`.
    pub fn zero_grad<M: Parameterised + ?Sized>(&self, module: &mut M) -> PureResult<()> {
        module.zero_accumulators()
    }

    /// Applies one update to every parameter that has a gradient.
    pub fn step<M: Parameterised + ?Sized>(&mut self, module: &mut M) -> PureResult<()> {
        let AdamConfig {
            learning_rate,
            beta1,
            beta2,
            eps,
            weight_decay,
        } = self.config;
        let moments = &mut self.moments;
        module.visit_parameters_mut(&mut |param| {
            let Some(grad) = param.gradient().cloned() else {
                return Ok(());
            };
            let state = moments
                .entry(param.name().to_string())
                .or_insert_with(|| MomentBuf::zeros(grad.len()));
            if state.m.len() != grad.len() {
                return Err(TensorError::DataLength {
                    expected: state.m.len(),
                    got: grad.len(),
                });
            }
            state.step += 1;
            let bc1 = 1.0 - beta1.powi(state.step as i32);
            let bc2_sqrt = (1.0 - beta2.powi(state.step as i32)).sqrt();
            let step_size = learning_rate / bc1;

            let values = param.value_mut().data_mut();
            for (i, (value, g)) in values.iter_mut().zip(grad.data().iter()).enumerate() {
                let g = g + weight_decay * *value;
                state.m[i] = beta1 * state.m[i] + (1.0 - beta1) * g;
                state.v[i] = beta2 * state.v[i] + (1.0 - beta2) * g * g;
                let denom = state.v[i].sqrt() / bc2_sqrt + eps;
                *value -= step_size * state.m[i] / denom;
            }
            Ok(())
        })
    }
}

/// Trait implemented by learning-rate schedules that cooperate with [`Adam`].
pub trait LrScheduler {
    /// Advances the schedule returning the new learning rate.
    fn step(&mut self) -> f32;
    /// Returns the most recent learning rate produced by [`step`].
    fn current_lr(&self) -> f32;
    /// Resets the scheduler to its initial state.
    fn reset(&mut self);

    /// Advances the schedule and pushes the new rate into `optimizer`.
    fn step_optimizer(&mut self, optimizer: &mut Adam) -> PureResult<f32> {
        let lr = self.step();
        optimizer.set_learning_rate(lr)?;
        Ok(lr)
    }
}

/// Multiplies the learning rate by `gamma` every `step_size` scheduler steps.
#[derive(Debug, Clone)]
pub struct StepLrScheduler {
    base_lr: f32,
    gamma: f32,
    step_size: u32,
    step: u32,
    last_lr: f32,
}

impl StepLrScheduler {
    pub fn new(base_lr: f32, gamma: f32, step_size: u32) -> PureResult<Self> {
        if base_lr <= 0.0 || !base_lr.is_finite() {
            return Err(TensorError::NonPositiveLearningRate { rate: base_lr });
        }
        if gamma <= 0.0 || !gamma.is_finite() {
            return Err(TensorError::NonFiniteValue {
                label: "scheduler_gamma",
                value: gamma,
            });
        }
        if step_size == 0 {
            return Err(TensorError::InvalidValue {
                label: "scheduler_step_size",
            });
        }
        Ok(Self {
            base_lr,
            gamma,
            step_size,
            step: 0,
            last_lr: base_lr,
        })
    }

    /// Scheduler steps taken so far.
    pub fn steps_taken(&self) -> u32 {
        self.step
    }
}

impl LrScheduler for StepLrScheduler {
    fn step(&mut self) -> f32 {
        self.step = self.step.saturating_add(1);
        let decays = (self.step / self.step_size) as i32;
        self.last_lr = self.base_lr * self.gamma.powi(decays);
        self.last_lr
    }

    fn current_lr(&self) -> f32 {
        self.last_lr
    }

    fn reset(&mut self) {
        self.step = 0;
        self.last_lr = self.base_lr;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::init::UniformInit;
    use crate::layers::linear::Linear;
    use crate::module::Module;
    use crate::Tensor;
    use approx::assert_abs_diff_eq;

    #[test]
    fn first_adam_step_moves_by_learning_rate() {
        let mut init = UniformInit::for_hidden(2, Some(1)).unwrap();
        let mut layer = Linear::without_bias("fc", 2, 1, &mut init).unwrap();
        let before = layer.weight().value().clone();
        let input = Tensor::from_vec(1, 2, vec![1.0, -1.0]).unwrap();
        let grad = Tensor::from_vec(1, 1, vec![1.0]).unwrap();
        layer.backward(&input, &grad).unwrap();

        let mut adam = Adam::new(AdamConfig::default().with_learning_rate(0.1)).unwrap();
        adam.step(&mut layer).unwrap();
        let after = layer.weight().value();
        // Bias-corrected first step is lr * sign(g).
        assert_abs_diff_eq!(after.data()[0], before.data()[0] - 0.1, epsilon = 1e-5);
        assert_abs_diff_eq!(after.data()[1], before.data()[1] + 0.1, epsilon = 1e-5);
        assert_eq!(adam.tracked_parameters(), 1);
    }

    #[test]
    fn parameters_without_gradient_are_skipped() {
        let mut init = UniformInit::for_hidden(2, Some(2)).unwrap();
        let mut layer = Linear::new("fc", 2, 2, &mut init).unwrap();
        let before = layer.weight().value().clone();
        let mut adam = Adam::new(AdamConfig::default().with_weight_decay(0.5)).unwrap();
        adam.step(&mut layer).unwrap();
        assert_eq!(&before, layer.weight().value());
        assert_eq!(adam.tracked_parameters(), 0);
    }

    #[test]
    fn step_lr_decays_on_boundaries() {
        let mut scheduler = StepLrScheduler::new(0.001, 0.1, 3).unwrap();
        assert_abs_diff_eq!(scheduler.step(), 0.001);
        assert_abs_diff_eq!(scheduler.step(), 0.001);
        assert_abs_diff_eq!(scheduler.step(), 0.0001, epsilon = 1e-9);
        for _ in 0..3 {
            scheduler.step();
        }
        assert_abs_diff_eq!(scheduler.current_lr(), 0.00001, epsilon = 1e-10);
        scheduler.reset();
        assert_abs_diff_eq!(scheduler.current_lr(), 0.001);
    }

    #[test]
    fn scheduler_pushes_rate_into_optimizer() {
        let mut adam = Adam::new(AdamConfig::default()).unwrap();
        let mut scheduler = StepLrScheduler::new(0.01, 0.5, 1).unwrap();
        let lr = scheduler.step_optimizer(&mut adam).unwrap();
        assert_abs_diff_eq!(lr, 0.005);
        assert_abs_diff_eq!(adam.learning_rate(), 0.005);
        assert!(StepLrScheduler::new(0.01, 0.5, 0).is_err());
        assert!(Adam::new(AdamConfig::default().with_learning_rate(0.0)).is_err());
    }
}
