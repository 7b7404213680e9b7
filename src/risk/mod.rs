//! Risk module.
//!
//! Provides portfolio delta aggregation and the hedge sizing rule.

pub mod hedge;

pub use hedge::{HedgeRounding, PortfolioDelta};
