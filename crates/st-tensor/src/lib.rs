// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Dense `f32` tensors for the session recommender stack.
//!
//! Tensors are plain row-major matrices; batched data is expressed as one
//! tensor per session. Matrix products dispatch through the process-wide
//! [`backend::ComputeBackend`], which is selected once and shared by every
//! operation.

pub mod backend;
pub mod error;
pub mod tensor;

pub use backend::{BackendRequest, ComputeBackend};
pub use error::{PureResult, TensorError};
pub use tensor::Tensor;
