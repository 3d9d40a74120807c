//! # specanom parallel
//!
//! Execution plumbing shared by the pipeline stages.
//!
//! This crate provides:
//! - `ProcessingMode`: sequential or Rayon-backed fan-out over chunk indices
//! - `CancellationToken`: cooperative cancellation polled at stage checkpoints
//! - `ProgressCounter`: lock-free additive progress shared by workers

pub mod cancel;
pub mod progress;
pub mod strategy;

pub use cancel::{CancellationToken, Cancelled};
pub use progress::ProgressCounter;
pub use strategy::{ParallelStrategy, ProcessingMode};
