//! End-of-run PnL reconciliation.
//!
//! total = realized cashflow + unrealized value, where unrealized value marks
//! every open option at the model fair price of its final available quote and
//! every stock hedge at the final spot of its underlying.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::backtest::{BacktestError, Ledger};
use crate::data::Contract;
use crate::pricing::PricingModel;

/// Mark of one open option position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub contract: Contract,
    pub quantity: i64,
    pub cost_basis: Decimal,
    /// Model fair price used for the mark.
    pub mark_price: Decimal,
    pub market_value: Decimal,
}

/// Mark of one stock hedge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockSnapshot {
    pub underlying: String,
    pub quantity: i64,
    pub spot: Decimal,
    pub market_value: Decimal,
}

/// Final accounting of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PnlReport {
    /// Net cash from all option and stock trades.
    pub realized_cashflow: Decimal,
    /// Mark-to-model value of open options.
    pub option_value: Decimal,
    /// Mark-to-market value of stock hedges.
    pub stock_value: Decimal,
    /// option_value + stock_value.
    pub unrealized_value: Decimal,
    /// realized_cashflow + unrealized_value.
    pub total_pnl: Decimal,
    pub positions: Vec<PositionSnapshot>,
    pub stock: Vec<StockSnapshot>,
}

impl PnlReport {
    /// Generate summary string.
    pub fn summary(&self) -> String {
        let mut out = format!(
            "PnL Report\n\
             ----------------------------------------\n\
             Realized Cashflow: ${:.2}\n\
             Option Value:      ${:.2}\n\
             Stock Value:       ${:.2}\n\
             Unrealized Value:  ${:.2}\n\
             Total PnL:         ${:.2}\n\
             \n\
             Open Positions: {} options, {} hedges",
            self.realized_cashflow,
            self.option_value,
            self.stock_value,
            self.unrealized_value,
            self.total_pnl,
            self.positions.len(),
            self.stock.len(),
        );

        for position in &self.positions {
            out.push_str(&format!(
                "\n  {:<28} qty {:>5}  mark ${:.2}  value ${:.2}",
                position.contract.to_string(),
                position.quantity,
                position.mark_price,
                position.market_value,
            ));
        }
        for stock in &self.stock {
            out.push_str(&format!(
                "\n  {:<28} qty {:>5}  spot ${:.2}  value ${:.2}",
                stock.underlying, stock.quantity, stock.spot, stock.market_value,
            ));
        }

        out
    }
}

/// Mark the ledger and compute total PnL. Never mutates the ledger.
pub fn reconcile<M: PricingModel>(ledger: &Ledger, model: &M) -> Result<PnlReport, BacktestError> {
    let mut positions = Vec::new();
    let mut option_value = Decimal::ZERO;

    for position in ledger.positions().filter(|p| p.is_open()) {
        let quote = ledger
            .last_quote(&position.contract)
            .ok_or_else(|| BacktestError::MissingQuote {
                contract: position.contract.to_string(),
            })?;
        let fair = model
            .value_quote(quote)
            .map_err(|source| BacktestError::Pricing {
                contract: position.contract.to_string(),
                timestamp: quote.timestamp,
                source,
            })?;
        let mark_price = Decimal::try_from(fair.price).map_err(|_| {
            BacktestError::NonFiniteValuation {
                what: position.contract.to_string(),
                value: fair.price,
            }
        })?;
        let market_value = Decimal::from(position.quantity) * mark_price;
        option_value += market_value;

        positions.push(PositionSnapshot {
            contract: position.contract.clone(),
            quantity: position.quantity,
            cost_basis: position.cost_basis,
            mark_price,
            market_value,
        });
    }

    let mut stock = Vec::new();
    let mut stock_value = Decimal::ZERO;

    for hedge in ledger.stock_positions().filter(|s| s.quantity != 0) {
        let spot = ledger
            .spot(&hedge.underlying)
            .ok_or_else(|| BacktestError::MissingQuote {
                contract: hedge.underlying.clone(),
            })?;
        let market_value = Decimal::from(hedge.quantity) * spot;
        stock_value += market_value;

        stock.push(StockSnapshot {
            underlying: hedge.underlying.clone(),
            quantity: hedge.quantity,
            spot,
            market_value,
        });
    }

    let realized_cashflow = ledger.realized_cashflow();
    let unrealized_value = option_value + stock_value;

    Ok(PnlReport {
        realized_cashflow,
        option_value,
        stock_value,
        unrealized_value,
        total_pnl: realized_cashflow + unrealized_value,
        positions,
        stock,
    })
}
