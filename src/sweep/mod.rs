//! Parameter sweep over model volatility, threshold and rate.

pub mod optimizer;

pub use optimizer::{ParameterGrid, ParameterSet, ParameterSweep, SweepOutcome};
