// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Host compute backend selection.
//!
//! The backend is picked once per process, before any training loop runs,
//! and every tensor operation consults the same choice. Multi-core execution
//! plays the accelerator role; a single sequential host thread is the
//! fallback.

pub mod cpu_dense;

use std::fmt;
use std::sync::OnceLock;

use tracing::{debug, warn};

const ENV_BACKEND: &str = "SPIRAL_BACKEND";

/// Compute strategy applied uniformly to every tensor kernel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComputeBackend {
    /// Single-threaded host execution.
    Sequential,
    /// Row-parallel host execution across the rayon pool.
    Parallel { threads: usize },
}

/// Backend preference read from `SPIRAL_BACKEND`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BackendRequest {
    /// Use the parallel backend whenever more than one worker exists.
    #[default]
    Auto,
    Sequential,
    Parallel,
}

impl BackendRequest {
    /// Parses a request string. Unknown values yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Some(Self::Auto),
            "cpu" | "seq" | "sequential" => Some(Self::Sequential),
            "par" | "parallel" | "rayon" => Some(Self::Parallel),
            _ => None,
        }
    }
}

impl ComputeBackend {
    /// Resolves a request against the available worker count. Locked reduction
    /// order always resolves to the sequential backend.
    pub fn resolve(request: BackendRequest, threads: usize, lock_reduction: bool) -> Self {
        if lock_reduction {
            return Self::Sequential;
        }
        match request {
            BackendRequest::Sequential => Self::Sequential,
            BackendRequest::Auto | BackendRequest::Parallel if threads > 1 => {
                Self::Parallel { threads }
            }
            BackendRequest::Auto | BackendRequest::Parallel => Self::Sequential,
        }
    }

    /// Inspects the environment, the rayon pool and the determinism config.
    pub fn detect() -> Self {
        let request = match std::env::var(ENV_BACKEND) {
            Ok(raw) => BackendRequest::parse(&raw).unwrap_or_else(|| {
                warn!(value = %raw, "unrecognised SPIRAL_BACKEND value; falling back to auto");
                BackendRequest::Auto
            }),
            Err(_) => BackendRequest::Auto,
        };
        let threads = rayon::current_num_threads();
        let locked = spiral_config::determinism::lock_reduction_order();
        let backend = Self::resolve(request, threads, locked);
        if request == BackendRequest::Parallel && !backend.is_parallel() {
            warn!(threads, locked, "parallel backend unavailable; using sequential host compute");
        }
        backend
    }

    /// Returns `true` for the multi-core backend.
    pub fn is_parallel(&self) -> bool {
        matches!(self, Self::Parallel { .. })
    }

    /// Short label used in logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Parallel { .. } => "parallel",
        }
    }

    pub(crate) fn matmul_accumulate(
        &self,
        dst: &mut [f32],
        lhs: &[f32],
        rhs: &[f32],
        rows: usize,
        inner: usize,
        cols: usize,
    ) {
        match self {
            Self::Sequential => cpu_dense::matmul_sequential(dst, lhs, rhs, rows, inner, cols),
            Self::Parallel { .. } => cpu_dense::matmul_parallel(dst, lhs, rhs, rows, inner, cols),
        }
    }
}

impl fmt::Display for ComputeBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sequential => write!(f, "sequential"),
            Self::Parallel { threads } => write!(f, "parallel({threads} threads)"),
        }
    }
}

static ACTIVE: OnceLock<ComputeBackend> = OnceLock::new();

/// Returns the process backend, detecting it on first use.
pub fn active() -> ComputeBackend {
    *ACTIVE.get_or_init(|| {
        let backend = ComputeBackend::detect();
        debug!(%backend, "selected compute backend");
        backend
    })
}

/// Pins the process backend before first use. Returns the backend that is
/// actually active, which is the earlier choice if one was already made.
pub fn install(backend: ComputeBackend) -> ComputeBackend {
    *ACTIVE.get_or_init(|| backend)
}
