//! Position and hedge ledger.
//!
//! Tracks:
//! - Option positions per contract (signed quantity, running cost basis)
//! - One stock hedge position per underlying
//! - Last seen quote per contract and last seen spot per underlying
//! - Realized cashflow (negative = paid, positive = received)
//!
//! Ordered maps keep iteration deterministic so delta and valuation sums are
//! bit-identical between runs.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::{Contract, Quote};
use crate::pricing::{BlackScholes, PricingError, PricingModel};
use crate::risk::{HedgeRounding, PortfolioDelta};
use crate::strategy::Signal;

/// Option position in a single contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Contract held.
    pub contract: Contract,
    /// Number of contracts (positive = long, negative = short).
    pub quantity: i64,
    /// Net cash paid into the contract (negative when net premium received).
    pub cost_basis: Decimal,
    /// Number of fills applied.
    pub trade_count: usize,
}

impl Position {
    pub fn new(contract: Contract) -> Self {
        Self {
            contract,
            quantity: 0,
            cost_basis: Decimal::ZERO,
            trade_count: 0,
        }
    }

    /// Check if position has nonzero quantity.
    pub fn is_open(&self) -> bool {
        self.quantity != 0
    }

    /// Average price per contract of the open quantity.
    pub fn avg_entry_price(&self) -> Option<Decimal> {
        if self.quantity == 0 {
            return None;
        }
        Some(self.cost_basis / Decimal::from(self.quantity))
    }
}

/// Shares of the underlying held as the delta hedge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockPosition {
    pub underlying: String,
    pub quantity: i64,
}

/// Executed option trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionFill {
    pub timestamp: NaiveDateTime,
    pub contract: Contract,
    pub signal: Signal,
    /// Signed contracts traded.
    pub quantity: i64,
    /// Fill price (ask for buys, bid for sells).
    pub price: Decimal,
    /// Cash impact of the fill.
    pub cashflow: Decimal,
}

/// Executed hedge trade in the underlying.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockFill {
    pub timestamp: NaiveDateTime,
    pub underlying: String,
    /// Signed shares traded (target - previous holding).
    pub quantity: i64,
    /// Holding after the trade.
    pub target: i64,
    pub price: Decimal,
    pub cashflow: Decimal,
}

/// Book of option positions, stock hedges and realized cash.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    positions: BTreeMap<Contract, Position>,
    stock: BTreeMap<String, StockPosition>,
    last_quotes: BTreeMap<Contract, Quote>,
    spots: BTreeMap<String, Decimal>,
    realized_cashflow: Decimal,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember a quote as the latest observation for its contract and underlying.
    pub fn record_quote(&mut self, quote: &Quote) {
        self.spots
            .insert(quote.contract.underlying.clone(), quote.spot);
        self.last_quotes
            .insert(quote.contract.clone(), quote.clone());
    }

    /// Apply one contract of `signal` at the quoted price.
    ///
    /// Returns `None` for `NoTrade` or when the side needed for the fill is
    /// missing from the quote.
    pub fn apply_option_trade(&mut self, quote: &Quote, signal: Signal) -> Option<OptionFill> {
        let price = match signal {
            Signal::Buy => quote.ask?,
            Signal::Sell => quote.bid?,
            Signal::NoTrade => return None,
        };
        let quantity = signal.quantity();
        let cashflow = -Decimal::from(quantity) * price;

        let position = self
            .positions
            .entry(quote.contract.clone())
            .or_insert_with(|| Position::new(quote.contract.clone()));
        position.quantity += quantity;
        position.cost_basis -= cashflow;
        position.trade_count += 1;

        self.realized_cashflow += cashflow;

        Some(OptionFill {
            timestamp: quote.timestamp,
            contract: quote.contract.clone(),
            signal,
            quantity,
            price,
            cashflow,
        })
    }

    /// Aggregate option delta and stock holdings per underlying.
    ///
    /// Contracts quoted in `current_quotes` are priced with that quote. A held
    /// contract missing from the current timestamp falls back to its intrinsic
    /// delta at the underlying's last known spot.
    pub fn compute_portfolio_delta<M: PricingModel>(
        &self,
        model: &M,
        current_quotes: &BTreeMap<&Contract, &Quote>,
    ) -> Result<BTreeMap<String, PortfolioDelta>, PricingError> {
        let mut deltas: BTreeMap<String, PortfolioDelta> = BTreeMap::new();

        for (contract, position) in &self.positions {
            if !position.is_open() {
                continue;
            }

            let delta = match current_quotes.get(contract) {
                Some(quote) => model.value_quote(quote)?.delta,
                None => self.fallback_delta(contract)?,
            };

            deltas
                .entry(contract.underlying.clone())
                .or_default()
                .add_position(position.quantity, delta);
        }

        for (underlying, stock) in &self.stock {
            deltas.entry(underlying.clone()).or_default().stock_quantity = stock.quantity;
        }

        Ok(deltas)
    }

    /// Intrinsic delta for a held contract without a current quote.
    fn fallback_delta(&self, contract: &Contract) -> Result<f64, PricingError> {
        let spot = self
            .spots
            .get(&contract.underlying)
            .or_else(|| self.last_quotes.get(contract).map(|q| &q.spot))
            .copied()
            .unwrap_or(Decimal::ZERO);
        let spot: f64 = spot.try_into().unwrap_or(f64::NAN);
        let strike: f64 = contract.strike.try_into().unwrap_or(f64::NAN);
        PricingError::check_inputs(spot, strike, 0.0)?;

        let delta = BlackScholes::intrinsic(spot, strike, contract.option_type).delta;
        debug!("No quote for {}, using intrinsic delta {}", contract, delta);
        Ok(delta)
    }

    /// Move the stock hedge for `underlying` to `-round(option_delta)` shares.
    ///
    /// Trades at the underlying's last known spot. Returns `None` if no spot
    /// has been seen for the underlying.
    pub fn rehedge(
        &mut self,
        underlying: &str,
        option_delta: f64,
        rounding: HedgeRounding,
        timestamp: NaiveDateTime,
    ) -> Option<StockFill> {
        let spot = *self.spots.get(underlying)?;
        let target = rounding.hedge_target(option_delta);
        let current = self.stock_quantity(underlying);
        let quantity = target - current;
        let cashflow = -Decimal::from(quantity) * spot;

        if quantity != 0 || self.stock.contains_key(underlying) {
            let stock = self
                .stock
                .entry(underlying.to_string())
                .or_insert_with(|| StockPosition {
                    underlying: underlying.to_string(),
                    quantity: 0,
                });
            stock.quantity = target;
        }
        self.realized_cashflow += cashflow;

        Some(StockFill {
            timestamp,
            underlying: underlying.to_string(),
            quantity,
            target,
            price: spot,
            cashflow,
        })
    }

    /// Get a position by contract.
    pub fn position(&self, contract: &Contract) -> Option<&Position> {
        self.positions.get(contract)
    }

    /// All option positions ever traded, including flat ones.
    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    /// All stock hedge positions.
    pub fn stock_positions(&self) -> impl Iterator<Item = &StockPosition> {
        self.stock.values()
    }

    /// Shares held for `underlying`.
    pub fn stock_quantity(&self, underlying: &str) -> i64 {
        self.stock.get(underlying).map(|s| s.quantity).unwrap_or(0)
    }

    /// Most recent quote seen for a contract.
    pub fn last_quote(&self, contract: &Contract) -> Option<&Quote> {
        self.last_quotes.get(contract)
    }

    /// Most recent spot seen for an underlying.
    pub fn spot(&self, underlying: &str) -> Option<Decimal> {
        self.spots.get(underlying).copied()
    }

    pub fn realized_cashflow(&self) -> Decimal {
        self.realized_cashflow
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    use crate::pricing::ModelParams;

    fn ts(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn contract(strike: Decimal) -> Contract {
        Contract::call("SPY", strike, NaiveDate::from_ymd_opt(2024, 3, 15).unwrap())
    }

    fn quote(strike: Decimal, spot: Decimal, bid: Decimal, ask: Decimal) -> Quote {
        Quote {
            timestamp: ts(10),
            contract: contract(strike),
            spot,
            bid: Some(bid),
            ask: Some(ask),
            time_to_expiry: 0.25,
        }
    }

    fn model() -> BlackScholes {
        BlackScholes::new(ModelParams::new(0.01, 0.2)).unwrap()
    }

    #[test]
    fn test_option_trades_update_position_and_cash() {
        let mut ledger = Ledger::new();
        let q = quote(dec!(100), dec!(100), dec!(4.80), dec!(5.00));

        let buy = ledger.apply_option_trade(&q, Signal::Buy).unwrap();
        assert_eq!(buy.price, dec!(5.00));
        assert_eq!(buy.cashflow, dec!(-5.00));

        ledger.apply_option_trade(&q, Signal::Buy).unwrap();
        let sell = ledger.apply_option_trade(&q, Signal::Sell).unwrap();
        assert_eq!(sell.price, dec!(4.80));
        assert_eq!(sell.cashflow, dec!(4.80));

        let position = ledger.position(&q.contract).unwrap();
        assert_eq!(position.quantity, 1);
        assert_eq!(position.trade_count, 3);
        assert_eq!(position.cost_basis, dec!(5.20));
        assert_eq!(position.avg_entry_price(), Some(dec!(5.20)));
        assert_eq!(ledger.realized_cashflow(), dec!(-5.20));
    }

    #[test]
    fn test_no_trade_and_missing_side() {
        let mut ledger = Ledger::new();
        let mut q = quote(dec!(100), dec!(100), dec!(4.80), dec!(5.00));
        assert!(ledger.apply_option_trade(&q, Signal::NoTrade).is_none());

        q.ask = None;
        assert!(ledger.apply_option_trade(&q, Signal::Buy).is_none());
        assert!(ledger.position(&q.contract).is_none());
        assert_eq!(ledger.realized_cashflow(), Decimal::ZERO);
    }

    #[test]
    fn test_flat_position_persists() {
        let mut ledger = Ledger::new();
        let q = quote(dec!(100), dec!(100), dec!(4.80), dec!(5.00));
        ledger.apply_option_trade(&q, Signal::Buy);
        ledger.apply_option_trade(&q, Signal::Sell);

        let position = ledger.position(&q.contract).unwrap();
        assert!(!position.is_open());
        assert_eq!(position.avg_entry_price(), None);
        assert_eq!(ledger.positions().count(), 1);
    }

    #[test]
    fn test_rehedge_sets_target_and_books_cash() {
        let mut ledger = Ledger::new();
        let q = quote(dec!(100), dec!(100), dec!(4.80), dec!(5.00));
        ledger.record_quote(&q);

        let fill = ledger
            .rehedge("SPY", 42.7, HedgeRounding::Nearest, ts(10))
            .unwrap();
        assert_eq!(fill.quantity, -43);
        assert_eq!(fill.cashflow, dec!(4300));
        assert_eq!(ledger.stock_quantity("SPY"), -43);

        // Delta falls: buy back part of the hedge
        let fill = ledger
            .rehedge("SPY", 40.2, HedgeRounding::Nearest, ts(11))
            .unwrap();
        assert_eq!(fill.quantity, 3);
        assert_eq!(fill.cashflow, dec!(-300));
        assert_eq!(ledger.stock_quantity("SPY"), -40);
        assert_eq!(ledger.realized_cashflow(), dec!(4000));
    }

    #[test]
    fn test_rehedge_idempotent_within_half_share() {
        let mut ledger = Ledger::new();
        ledger.record_quote(&quote(dec!(100), dec!(100), dec!(4.80), dec!(5.00)));
        ledger.rehedge("SPY", 3.2, HedgeRounding::Nearest, ts(10));
        let cash = ledger.realized_cashflow();

        for delta in [2.6, 3.0, 3.4] {
            let fill = ledger
                .rehedge("SPY", delta, HedgeRounding::Nearest, ts(11))
                .unwrap();
            assert_eq!(fill.quantity, 0);
            assert_eq!(fill.cashflow, Decimal::ZERO);
        }
        assert_eq!(ledger.realized_cashflow(), cash);
        assert_eq!(ledger.stock_quantity("SPY"), -3);
    }

    #[test]
    fn test_rehedge_without_spot() {
        let mut ledger = Ledger::new();
        assert!(ledger
            .rehedge("QQQ", 1.0, HedgeRounding::Nearest, ts(10))
            .is_none());
    }

    #[test]
    fn test_portfolio_delta_uses_current_quotes() {
        let mut ledger = Ledger::new();
        let q = quote(dec!(100), dec!(100), dec!(4.80), dec!(5.00));
        ledger.record_quote(&q);
        ledger.apply_option_trade(&q, Signal::Buy);
        ledger.apply_option_trade(&q, Signal::Buy);

        let mut current = BTreeMap::new();
        current.insert(&q.contract, &q);

        let model = model();
        let deltas = ledger.compute_portfolio_delta(&model, &current).unwrap();
        let expected = 2.0 * model.value_quote(&q).unwrap().delta;
        let spy = &deltas["SPY"];
        assert_eq!(spy.option_delta, expected);
        assert_eq!(spy.position_count, 1);
        assert_eq!(spy.stock_quantity, 0);
    }

    #[test]
    fn test_stale_contract_uses_intrinsic_delta() {
        let mut ledger = Ledger::new();
        let itm = quote(dec!(90), dec!(100), dec!(10.0), dec!(10.5));
        let otm = quote(dec!(110), dec!(100), dec!(0.5), dec!(0.6));
        ledger.record_quote(&itm);
        ledger.record_quote(&otm);
        ledger.apply_option_trade(&itm, Signal::Sell);
        ledger.apply_option_trade(&otm, Signal::Buy);

        // Nothing quoted at the current timestamp
        let current = BTreeMap::new();
        let deltas = ledger.compute_portfolio_delta(&model(), &current).unwrap();
        let spy = &deltas["SPY"];
        // Short ITM call: -1 * 1.0, long OTM call: 1 * 0.0
        assert_eq!(spy.option_delta, -1.0);
        assert_eq!(spy.position_count, 2);
    }
}
