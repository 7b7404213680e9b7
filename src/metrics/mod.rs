//! Performance metrics module.
//!
//! Reconciles the ledger into a final PnL report:
//! - Realized cashflow from option and hedge trades
//! - Mark-to-model value of open options
//! - Mark-to-market value of stock hedges

pub mod pnl;

pub use pnl::{reconcile, PnlReport, PositionSnapshot, StockSnapshot};
