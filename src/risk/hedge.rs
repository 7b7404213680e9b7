//! Portfolio delta aggregation and whole-share hedge sizing.
//!
//! Delta per underlying:
//! - Options: sum(quantity * model delta)
//! - Stock: share quantity (delta 1 per share)
//!
//! The hedge target is the negated option delta rounded to whole shares.

use serde::{Deserialize, Serialize};

/// How a fractional option delta is turned into a whole-share hedge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HedgeRounding {
    /// Round half away from zero. Leaves at most 0.5 delta unhedged.
    #[default]
    Nearest,
    /// Truncate toward zero. Leaves up to 1 delta unhedged.
    TowardZero,
}

impl HedgeRounding {
    pub fn round(&self, delta: f64) -> i64 {
        let rounded = match self {
            HedgeRounding::Nearest => delta.round(),
            HedgeRounding::TowardZero => delta.trunc(),
        };
        rounded as i64
    }

    /// Stock quantity that neutralises `option_delta`.
    pub fn hedge_target(&self, option_delta: f64) -> i64 {
        -self.round(option_delta)
    }
}

/// Aggregated delta for one underlying.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioDelta {
    /// Net option delta in shares.
    pub option_delta: f64,
    /// Shares held as the hedge.
    pub stock_quantity: i64,
    /// Number of option positions with nonzero quantity.
    pub position_count: usize,
}

impl PortfolioDelta {
    /// Add one option position's contribution.
    pub fn add_position(&mut self, quantity: i64, delta: f64) {
        if quantity == 0 {
            return;
        }
        self.option_delta += quantity as f64 * delta;
        self.position_count += 1;
    }

    /// Option delta plus stock delta.
    pub fn net(&self) -> f64 {
        self.option_delta + self.stock_quantity as f64
    }

    /// Whether the stock leg already neutralises the options within half a share.
    pub fn is_neutral(&self) -> bool {
        self.net().abs() <= 0.5
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearest_rounds_half_away_from_zero() {
        let rounding = HedgeRounding::Nearest;
        assert_eq!(rounding.round(42.7), 43);
        assert_eq!(rounding.round(42.5), 43);
        assert_eq!(rounding.round(-42.5), -43);
        assert_eq!(rounding.round(0.4), 0);
        assert_eq!(rounding.hedge_target(0.6), -1);
        assert_eq!(rounding.hedge_target(-2.5), 3);
    }

    #[test]
    fn test_toward_zero_truncates() {
        let rounding = HedgeRounding::TowardZero;
        assert_eq!(rounding.round(42.7), 42);
        assert_eq!(rounding.round(-42.7), -42);
        assert_eq!(rounding.hedge_target(0.6), 0);
    }

    #[test]
    fn test_default_is_nearest() {
        assert_eq!(HedgeRounding::default(), HedgeRounding::Nearest);
    }

    #[test]
    fn test_portfolio_delta_aggregation() {
        let mut delta = PortfolioDelta::default();
        delta.add_position(2, 0.5);
        delta.add_position(-1, -0.25);
        delta.add_position(0, 0.9);

        assert_eq!(delta.option_delta, 1.25);
        assert_eq!(delta.position_count, 2);

        delta.stock_quantity = HedgeRounding::Nearest.hedge_target(delta.option_delta);
        assert_eq!(delta.stock_quantity, -1);
        assert_eq!(delta.net(), 0.25);
        assert!(delta.is_neutral());
    }
}
