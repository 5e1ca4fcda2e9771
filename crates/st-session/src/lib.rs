// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Session-based next-item recommendation.
//!
//! A session's item sequence becomes a small directed graph ([`data`]); item
//! vectors are refined by gated propagation along its edges
//! ([`propagation`]); the raw and refined sequences are fused by a dual
//! attention readout ([`readout`]) and scored against the item table
//! ([`scoring`]). [`trainer::SessionTrainer`] runs the train/evaluate epoch
//! and reports Hit@K and MRR@K.

pub mod batch;
pub mod config;
pub mod data;
pub mod error;
pub mod metrics;
pub mod model;
pub mod propagation;
pub mod readout;
pub mod scoring;
pub mod trainer;

pub use batch::{BatchSource, SessionBatch, SessionSample};
pub use config::SessionGraphConfig;
pub use data::SessionData;
pub use error::{SessionError, SessionResult};
pub use metrics::{top_k_indices, RankingMetrics};
pub use model::{BatchTrace, SessionGraph};
pub use propagation::{GatedGraphPropagation, PropagationTrace};
pub use readout::{last_position, DualAttentionReadout, ReadoutTrace};
pub use trainer::{EpochReport, SessionTrainer, TrainSummary};
