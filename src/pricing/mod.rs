//! Option pricing.
//!
//! Provides the closed-form Black-Scholes model used to value every quote and
//! position, behind the [`PricingModel`] trait.

pub mod black_scholes;
pub mod model;

pub use black_scholes::BlackScholes;
pub use model::{FairValue, ModelParams, PricingError, PricingModel};
