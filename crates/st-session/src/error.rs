// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use st_tensor::TensorError;
use thiserror::Error;

/// Errors surfaced while validating batches or driving the recommender.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Tensor(#[from] TensorError),
    /// Sessions must contain at least one real position.
    #[error("session {index} has no unmasked positions")]
    EmptySession { index: usize },
    /// Masks must be 0/1 with every 1 ahead of every 0.
    #[error("session {index} mask is not a 0/1 prefix (bad value at position {position})")]
    NonContiguousMask { index: usize, position: usize },
    #[error("session {index} alias {alias} at position {position} exceeds {len} unique items")]
    AliasOutOfRange {
        index: usize,
        position: usize,
        alias: usize,
        len: usize,
    },
    /// Targets are 1-indexed item ids in `1..n_node`.
    #[error("session {index} target {target} outside 1..{n_node}")]
    TargetOutOfRange {
        index: usize,
        target: usize,
        n_node: usize,
    },
    #[error("session {index} item {item} outside 0..{n_node}")]
    ItemOutOfRange {
        index: usize,
        item: usize,
        n_node: usize,
    },
    /// Item 0 is reserved for padding and may not appear inside a sequence.
    #[error("sequence {index} uses the padding id at position {position}")]
    PaddingItem { index: usize, position: usize },
    #[error("session {index} {what} has shape {got:?}, expected {expected:?}")]
    BatchShape {
        index: usize,
        what: &'static str,
        expected: (usize, usize),
        got: (usize, usize),
    },
    #[error("invalid configuration `{field}`: {reason}")]
    InvalidConfig {
        field: &'static str,
        reason: String,
    },
    #[error("failed to parse configuration: {0}")]
    ConfigFormat(#[from] serde_json::Error),
    #[error("data source produced no sessions")]
    EmptyDataset,
}

impl SessionError {
    pub(crate) fn config(field: &'static str, reason: impl Into<String>) -> Self {
        SessionError::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }
}

/// Convenient result alias for session helpers.
pub type SessionResult<T> = Result<T, SessionError>;
