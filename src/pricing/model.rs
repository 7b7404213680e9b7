//! Pricing model interface and parameter validation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::{OptionType, Quote};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PricingError {
    #[error("Invalid parameter {name}: {value}")]
    InvalidParameter { name: &'static str, value: f64 },
}

impl PricingError {
    /// Check per-quote pricing inputs: S > 0, K > 0, T >= 0, all finite.
    pub fn check_inputs(spot: f64, strike: f64, time: f64) -> Result<(), PricingError> {
        if !spot.is_finite() || spot <= 0.0 {
            return Err(PricingError::InvalidParameter {
                name: "spot",
                value: spot,
            });
        }
        if !strike.is_finite() || strike <= 0.0 {
            return Err(PricingError::InvalidParameter {
                name: "strike",
                value: strike,
            });
        }
        if !time.is_finite() || time < 0.0 {
            return Err(PricingError::InvalidParameter {
                name: "time_to_expiry",
                value: time,
            });
        }
        Ok(())
    }
}

/// Market parameters held fixed for a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    /// Annual risk-free rate
    pub rate: f64,
    /// Annual volatility of the underlying
    pub volatility: f64,
}

impl ModelParams {
    pub fn new(rate: f64, volatility: f64) -> Self {
        Self { rate, volatility }
    }

    pub fn validate(&self) -> Result<(), PricingError> {
        if !self.volatility.is_finite() || self.volatility <= 0.0 {
            return Err(PricingError::InvalidParameter {
                name: "volatility",
                value: self.volatility,
            });
        }
        if !self.rate.is_finite() {
            return Err(PricingError::InvalidParameter {
                name: "risk_free_rate",
                value: self.rate,
            });
        }
        Ok(())
    }
}

/// Theoretical price and delta of one option.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FairValue {
    pub price: f64,
    pub delta: f64,
}

/// A pure option valuation model.
///
/// Implementations must be referentially transparent: the engine prices the
/// same contract many times and relies on identical answers.
pub trait PricingModel {
    fn fair_value(
        &self,
        spot: f64,
        strike: f64,
        time: f64,
        option_type: OptionType,
    ) -> Result<FairValue, PricingError>;

    /// Value a quote with its own spot, strike and time to expiry.
    fn value_quote(&self, quote: &Quote) -> Result<FairValue, PricingError> {
        self.fair_value(
            quote.spot_f64(),
            quote.strike_f64(),
            quote.time_to_expiry,
            quote.contract.option_type,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_inputs() {
        assert!(PricingError::check_inputs(100.0, 100.0, 0.0).is_ok());
        assert!(PricingError::check_inputs(f64::NAN, 100.0, 0.5).is_err());
        assert!(PricingError::check_inputs(100.0, 0.0, 0.5).is_err());
        assert!(PricingError::check_inputs(100.0, 100.0, f64::INFINITY).is_err());
    }

    #[test]
    fn test_params_validation() {
        assert!(ModelParams::new(0.01, 0.2).validate().is_ok());
        assert!(ModelParams::new(0.0, -0.2).validate().is_err());
        assert!(ModelParams::new(f64::NAN, 0.2).validate().is_err());
    }

    #[test]
    fn test_error_message_names_parameter() {
        let err = ModelParams::new(0.01, 0.0).validate().unwrap_err();
        assert_eq!(err.to_string(), "Invalid parameter volatility: 0");
    }
}
