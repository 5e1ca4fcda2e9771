// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Hyperparameters for [`crate::SessionGraph`] and its training loop.

use serde::{Deserialize, Serialize};

use crate::error::{SessionError, SessionResult};

fn default_hidden_size() -> usize {
    100
}

fn default_step() -> usize {
    1
}

fn default_batch_size() -> usize {
    100
}

fn default_learning_rate() -> f32 {
    1e-3
}

fn default_weight_decay() -> f32 {
    1e-5
}

fn default_lr_decay_factor() -> f32 {
    0.1
}

fn default_lr_decay_every_n_epochs() -> u32 {
    3
}

fn default_top_k() -> usize {
    20
}

/// Model and optimiser settings. Only `n_node` has no default; it counts the
/// padding id, so a catalogue of `N` real items uses `n_node = N + 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionGraphConfig {
    pub n_node: usize,
    #[serde(default = "default_hidden_size")]
    pub hidden_size: usize,
    /// Propagation iterations; `0` skips the graph update entirely.
    #[serde(default = "default_step")]
    pub step: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f32,
    #[serde(default = "default_weight_decay")]
    pub weight_decay: f32,
    #[serde(default = "default_lr_decay_factor")]
    pub lr_decay_factor: f32,
    #[serde(default = "default_lr_decay_every_n_epochs")]
    pub lr_decay_every_n_epochs: u32,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Fixed seed for parameter init and shuffling; falls back to the
    /// deterministic runtime configuration when unset.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl SessionGraphConfig {
    /// Defaults for everything except the item count.
    pub fn new(n_node: usize) -> Self {
        Self {
            n_node,
            hidden_size: default_hidden_size(),
            step: default_step(),
            batch_size: default_batch_size(),
            learning_rate: default_learning_rate(),
            weight_decay: default_weight_decay(),
            lr_decay_factor: default_lr_decay_factor(),
            lr_decay_every_n_epochs: default_lr_decay_every_n_epochs(),
            top_k: default_top_k(),
            seed: None,
        }
    }

    /// Full construction contract used by training drivers.
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
        let config = Self {
            hidden_size,
            step,
            batch_size,
            learning_rate,
            weight_decay,
            lr_decay_factor,
            lr_decay_every_n_epochs,
            ..Self::new(n_node)
        };
        config.validate()?;
        Ok(config)
    }

    /// Parses a JSON document, filling omitted fields with defaults.
    pub fn from_json(raw: &str) -> SessionResult<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> SessionResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn with_hidden_size(mut self, hidden_size: usize) -> Self {
        self.hidden_size = hidden_size;
        self
    }

    pub fn with_step(mut self, step: usize) -> Self {
        self.step = step;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_learning_rate(mut self, learning_rate: f32) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_weight_decay(mut self, weight_decay: f32) -> Self {
        self.weight_decay = weight_decay;
        self
    }

    pub fn with_lr_decay(mut self, factor: f32, every_n_epochs: u32) -> Self {
        self.lr_decay_factor = factor;
        self.lr_decay_every_n_epochs = every_n_epochs;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Number of scoreable items (`n_node - 1`, padding excluded).
    pub fn candidates(&self) -> usize {
        self.n_node.saturating_sub(1)
    }

    /// `top_k` clamped to the candidate count.
    pub fn effective_top_k(&self) -> usize {
        self.top_k.min(self.candidates())
    }

    pub fn validate(&self) -> SessionResult<()> {
        if self.n_node < 2 {
            return Err(SessionError::config(
                "n_node",
                format!("needs the padding id plus at least one item, got {}", self.n_node),
            ));
        }
        if self.hidden_size == 0 {
            return Err(SessionError::config("hidden_size", "must be positive"));
        }
        if self.batch_size == 0 {
            return Err(SessionError::config("batch_size", "must be positive"));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(SessionError::config(
                "learning_rate",
                format!("must be positive and finite, got {}", self.learning_rate),
            ));
        }
        if !self.weight_decay.is_finite() || self.weight_decay < 0.0 {
            return Err(SessionError::config(
                "weight_decay",
                format!("must be non-negative, got {}", self.weight_decay),
            ));
        }
        if !self.lr_decay_factor.is_finite() || self.lr_decay_factor <= 0.0 {
            return Err(SessionError::config(
                "lr_decay_factor",
                format!("must be positive, got {}", self.lr_decay_factor),
            ));
        }
        if self.lr_decay_every_n_epochs == 0 {
            return Err(SessionError::config(
                "lr_decay_every_n_epochs",
                "must be at least one epoch",
            ));
        }
        if self.top_k == 0 {
            return Err(SessionError::config("top_k", "must be positive"));
        }
        Ok(())
    }
}
