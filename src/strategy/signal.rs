//! Mispricing detection against a model bid/ask band.
//!
//! The band is `fair * (1 - threshold)` to `fair * (1 + threshold)`. A market
//! bid above the band is sold into, a market ask below it is bought. Quotes
//! touching the band exactly do not trade.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::data::Quote;

/// Trade decision for a single quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    /// Buy one contract at the quoted ask.
    Buy,
    /// Sell one contract at the quoted bid.
    Sell,
    /// No edge.
    NoTrade,
}

impl Signal {
    /// Whether this signal asks for a fill.
    pub fn is_trade(&self) -> bool {
        !matches!(self, Signal::NoTrade)
    }

    /// Signed contract quantity for this signal.
    pub fn quantity(&self) -> i64 {
        match self {
            Signal::Buy => 1,
            Signal::Sell => -1,
            Signal::NoTrade => 0,
        }
    }
}

/// Model-implied bid and ask around a fair price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelBand {
    pub bid: Decimal,
    pub ask: Decimal,
}

/// Compares quoted prices against the model band.
#[derive(Debug, Clone)]
pub struct MispricingDetector {
    /// Required fractional edge (e.g., 0.02 = 2%).
    threshold: f64,
    /// Round the fair price to this many decimals before building the band.
    price_decimals: Option<u32>,
}

impl MispricingDetector {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            price_decimals: None,
        }
    }

    pub fn with_price_decimals(mut self, decimals: Option<u32>) -> Self {
        self.price_decimals = decimals;
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Build the model band for a fair price.
    ///
    /// The band is computed in `Decimal` so an edge landing exactly on a
    /// quoted price compares equal. Returns `None` if the fair price or
    /// threshold is not representable.
    pub fn model_band(&self, fair_price: f64) -> Option<ModelBand> {
        let mut fair = Decimal::try_from(fair_price).ok()?;
        if let Some(decimals) = self.price_decimals {
            fair = fair.round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero);
        }
        let threshold = Decimal::try_from(self.threshold).ok()?;

        Some(ModelBand {
            bid: fair.checked_mul(Decimal::ONE - threshold)?,
            ask: fair.checked_mul(Decimal::ONE + threshold)?,
        })
    }

    /// Decide whether a quote is mispriced relative to `fair_price`.
    pub fn evaluate(&self, quote: &Quote, fair_price: f64) -> Signal {
        let Some((bid, ask)) = quote.two_sided() else {
            return Signal::NoTrade;
        };
        self.evaluate_prices(bid, ask, fair_price)
    }

    /// Decide on raw bid/ask prices.
    pub fn evaluate_prices(&self, bid: Decimal, ask: Decimal, fair_price: f64) -> Signal {
        let Some(band) = self.model_band(fair_price) else {
            return Signal::NoTrade;
        };

        if bid > band.ask {
            Signal::Sell
        } else if ask < band.bid {
            Signal::Buy
        } else {
            Signal::NoTrade
        }
    }
}

/// Evaluate a quote against a fair price with the given threshold.
pub fn evaluate(quote: &Quote, fair_price: f64, threshold: f64) -> Signal {
    MispricingDetector::new(threshold).evaluate(quote, fair_price)
}
