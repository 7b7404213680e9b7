//! Backtesting engine for delta-hedged option mispricing.
//!
//! This module provides:
//! - Position and hedge bookkeeping (ledger)
//! - The per-timestamp replay loop (engine)

pub mod engine;
pub mod ledger;

pub use engine::{BacktestEngine, BacktestError, BacktestResult, StepRecord};
pub use ledger::{Ledger, OptionFill, Position, StockFill, StockPosition};
