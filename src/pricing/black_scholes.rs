//! Black-Scholes fair value and delta for European options.
//!
//! Prices are computed without a dividend yield. At expiry (or when `σ√T`
//! underflows to zero) the model returns intrinsic value and a step delta
//! instead of evaluating `d1`.

use statrs::distribution::{ContinuousCDF, Normal};

use crate::data::OptionType;

use super::model::{FairValue, ModelParams, PricingError, PricingModel};

/// Black-Scholes calculator for option fair value and delta.
#[derive(Debug, Clone)]
pub struct BlackScholes {
    params: ModelParams,
    normal: Normal,
}

impl BlackScholes {
    /// Create a calculator, rejecting a non-positive or non-finite volatility.
    pub fn new(params: ModelParams) -> Result<Self, PricingError> {
        params.validate()?;
        Ok(Self {
            params,
            normal: Normal::standard(),
        })
    }

    pub fn params(&self) -> &ModelParams {
        &self.params
    }

    /// Calculate d1 parameter.
    fn d1(&self, spot: f64, strike: f64, time: f64) -> f64 {
        let vol = self.params.volatility;
        let numerator = (spot / strike).ln() + (self.params.rate + 0.5 * vol * vol) * time;
        numerator / (vol * time.sqrt())
    }

    /// Standard normal CDF.
    fn norm_cdf(&self, x: f64) -> f64 {
        self.normal.cdf(x)
    }

    /// Value and delta at expiry.
    pub fn intrinsic(spot: f64, strike: f64, option_type: OptionType) -> FairValue {
        match option_type {
            OptionType::Call => FairValue {
                price: (spot - strike).max(0.0),
                delta: if spot > strike { 1.0 } else { 0.0 },
            },
            OptionType::Put => FairValue {
                price: (strike - spot).max(0.0),
                delta: if spot < strike { -1.0 } else { 0.0 },
            },
        }
    }

    /// Calculate call option price.
    pub fn call_price(&self, spot: f64, strike: f64, time: f64) -> Result<f64, PricingError> {
        Ok(self.fair_value(spot, strike, time, OptionType::Call)?.price)
    }

    /// Calculate put option price.
    pub fn put_price(&self, spot: f64, strike: f64, time: f64) -> Result<f64, PricingError> {
        Ok(self.fair_value(spot, strike, time, OptionType::Put)?.price)
    }
}

impl PricingModel for BlackScholes {
    fn fair_value(
        &self,
        spot: f64,
        strike: f64,
        time: f64,
        option_type: OptionType,
    ) -> Result<FairValue, PricingError> {
        PricingError::check_inputs(spot, strike, time)?;

        let vol_sqrt_t = self.params.volatility * time.sqrt();
        if time == 0.0 || vol_sqrt_t == 0.0 {
            return Ok(Self::intrinsic(spot, strike, option_type));
        }

        let d1 = self.d1(spot, strike, time);
        let d2 = d1 - vol_sqrt_t;
        let discount = (-self.params.rate * time).exp();

        let value = match option_type {
            OptionType::Call => FairValue {
                price: spot * self.norm_cdf(d1) - strike * discount * self.norm_cdf(d2),
                delta: self.norm_cdf(d1),
            },
            OptionType::Put => FairValue {
                price: strike * discount * self.norm_cdf(-d2) - spot * self.norm_cdf(-d1),
                delta: self.norm_cdf(d1) - 1.0,
            },
        };

        Ok(value)
    }
}
