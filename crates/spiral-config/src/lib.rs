//! Process-wide knobs shared by the SpiralTorch session crates.
//!
//! `determinism` decides how random streams are seeded and whether reductions
//! must keep a fixed order, `tracing` installs the global subscriber used by
//! the training drivers.

pub mod determinism;
pub mod tracing;

pub use determinism::{rng_for, DeterminismConfig};
pub use tracing::{ensure_tracing, init_tracing, InitError};
