// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Neural building blocks for the session recommender.
//!
//! Layers implement hand-written backward passes: every `backward` call
//! accumulates into the [`Parameter`] gradients and returns the gradient with
//! respect to its input. [`optim::Adam`] consumes those accumulators and
//! [`trainer::ModuleTrainer`] ties it to an epoch-level schedule.

pub mod init;
pub mod layers;
pub mod loss;
pub mod module;
pub mod optim;
pub mod trainer;

pub use init::UniformInit;
pub use layers::{Embedding, Linear};
pub use loss::{Loss, SoftmaxCrossEntropy};
pub use module::{Module, Parameter, Parameterised};
pub use optim::{Adam, AdamConfig, LrScheduler, StepLrScheduler};
pub use trainer::ModuleTrainer;

pub use st_tensor::{PureResult, Tensor, TensorError};
