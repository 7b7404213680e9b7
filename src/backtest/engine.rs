//! Core backtesting engine.
//!
//! Runs the replay loop. For each snapshot, in timestamp order:
//! 1. Record every quote (last quote per contract, last spot per underlying)
//! 2. Price two-sided quotes and evaluate them against the model band
//! 3. Trade one contract per mispriced quote
//! 4. Aggregate option delta per underlying
//! 5. Rehedge each underlying to whole shares
//! 6. Record the step
//!
//! After the last snapshot the ledger is reconciled into a [`PnlReport`].

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{BacktestConfig, ConfigError};
use crate::data::{Contract, Quote, Snapshot};
use crate::metrics::{reconcile, PnlReport};
use crate::pricing::{BlackScholes, PricingError, PricingModel};
use crate::risk::PortfolioDelta;
use crate::strategy::MispricingDetector;

use super::ledger::{Ledger, OptionFill, StockFill};

#[derive(Error, Debug)]
pub enum BacktestError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Pricing failed for {contract} at {timestamp}: {source}")]
    Pricing {
        contract: String,
        timestamp: NaiveDateTime,
        #[source]
        source: PricingError,
    },

    #[error(transparent)]
    Model(#[from] PricingError),

    #[error("Snapshot at {current} does not follow {previous}")]
    OutOfOrder {
        previous: NaiveDateTime,
        current: NaiveDateTime,
    },

    #[error("Valuation of {what} is not representable: {value}")]
    NonFiniteValuation { what: String, value: f64 },

    #[error("No quote available to mark {contract}")]
    MissingQuote { contract: String },
}

/// What happened at one timestamp.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepRecord {
    pub timestamp: NaiveDateTime,
    /// Quotes in the snapshot.
    pub quotes: usize,
    /// Two-sided quotes that were priced.
    pub priced: usize,
    pub option_fills: Vec<OptionFill>,
    /// Nonzero hedge trades.
    pub stock_fills: Vec<StockFill>,
    /// Exposure per underlying after rehedging.
    pub exposures: BTreeMap<String, PortfolioDelta>,
    /// Cumulative realized cashflow after the step.
    pub realized_cashflow: Decimal,
}

/// Result of a completed backtest.
#[derive(Debug, Clone, Serialize)]
pub struct BacktestResult {
    /// Configuration used.
    pub config: BacktestConfig,

    /// First and last snapshot timestamps.
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,

    /// Number of snapshots replayed.
    pub snapshots: usize,

    /// Number of quotes replayed.
    pub quotes: usize,

    /// Option contracts traded.
    pub option_trades: usize,

    /// Nonzero hedge adjustments.
    pub hedge_trades: usize,

    /// Final accounting.
    pub report: PnlReport,

    /// Per-step history.
    pub history: Vec<StepRecord>,
}

impl BacktestResult {
    pub fn total_pnl(&self) -> Decimal {
        self.report.total_pnl
    }

    /// Generate summary string.
    pub fn summary(&self) -> String {
        let range = match (self.start, self.end) {
            (Some(start), Some(end)) => format!("{} to {}", start, end),
            _ => "empty feed".to_string(),
        };
        format!(
            "Backtest Results ({})\n\
             ----------------------------------------\n\
             Volatility: {:.4}  Threshold: {:.4}  Rate: {:.4}\n\
             Snapshots: {}  Quotes: {}\n\
             Option Trades: {}  Hedge Trades: {}\n\
             \n\
             {}",
            range,
            self.config.volatility,
            self.config.threshold,
            self.config.risk_free_rate,
            self.snapshots,
            self.quotes,
            self.option_trades,
            self.hedge_trades,
            self.report.summary(),
        )
    }
}

/// The main backtesting engine.
pub struct BacktestEngine<M: PricingModel = BlackScholes> {
    config: BacktestConfig,
    model: M,
    detector: MispricingDetector,
    ledger: Ledger,
    history: Vec<StepRecord>,
    last_timestamp: Option<NaiveDateTime>,
}

impl BacktestEngine<BlackScholes> {
    /// Create an engine pricing with Black-Scholes at the configured parameters.
    pub fn new(config: BacktestConfig) -> Result<Self, BacktestError> {
        config.validate()?;
        let model = BlackScholes::new(config.model_params()).map_err(ConfigError::from)?;
        Self::with_model(config, model)
    }
}

impl<M: PricingModel> BacktestEngine<M> {
    /// Create an engine with a custom pricing model.
    pub fn with_model(config: BacktestConfig, model: M) -> Result<Self, BacktestError> {
        config.validate()?;
        let detector = config.detector();
        Ok(Self {
            config,
            model,
            detector,
            ledger: Ledger::new(),
            history: Vec::new(),
            last_timestamp: None,
        })
    }

    /// Group a quote feed into snapshots and replay it.
    pub fn run(&mut self, quotes: Vec<Quote>) -> Result<BacktestResult, BacktestError> {
        let snapshots = Snapshot::group(quotes);
        self.run_snapshots(&snapshots)
    }

    /// Replay pre-grouped snapshots (for sweeps, avoids regrouping).
    pub fn run_snapshots(&mut self, snapshots: &[Snapshot]) -> Result<BacktestResult, BacktestError> {
        validate_feed(snapshots)?;
        self.reset();

        let quotes: usize = snapshots.iter().map(Snapshot::len).sum();
        info!(
            "Replaying {} snapshots ({} quotes), vol={}, threshold={}",
            snapshots.len(),
            quotes,
            self.config.volatility,
            self.config.threshold
        );

        for snapshot in snapshots {
            let record = self.step(snapshot)?;
            self.history.push(record);
        }

        let report = reconcile(&self.ledger, &self.model)?;
        let option_trades = self.history.iter().map(|s| s.option_fills.len()).sum();
        let hedge_trades = self.history.iter().map(|s| s.stock_fills.len()).sum();

        info!(
            "Backtest complete: {} option trades, {} hedge trades, total PnL {}",
            option_trades, hedge_trades, report.total_pnl
        );

        Ok(BacktestResult {
            config: self.config.clone(),
            start: snapshots.first().map(|s| s.timestamp),
            end: snapshots.last().map(|s| s.timestamp),
            snapshots: snapshots.len(),
            quotes,
            option_trades,
            hedge_trades,
            report,
            history: self.history.clone(),
        })
    }

    /// Process one snapshot against the current ledger.
    pub fn step(&mut self, snapshot: &Snapshot) -> Result<StepRecord, BacktestError> {
        if let Some(previous) = self.last_timestamp {
            if snapshot.timestamp <= previous {
                return Err(BacktestError::OutOfOrder {
                    previous,
                    current: snapshot.timestamp,
                });
            }
        }
        self.last_timestamp = Some(snapshot.timestamp);

        let mut option_fills = Vec::new();
        let mut priced = 0;

        for quote in &snapshot.quotes {
            self.ledger.record_quote(quote);

            if quote.two_sided().is_none() {
                warn!(
                    "Skipping one-sided quote for {} at {}",
                    quote.contract, quote.timestamp
                );
                continue;
            }

            let fair = self
                .model
                .value_quote(quote)
                .map_err(|source| BacktestError::Pricing {
                    contract: quote.contract.to_string(),
                    timestamp: quote.timestamp,
                    source,
                })?;
            priced += 1;

            let signal = self.detector.evaluate(quote, fair.price);
            if !signal.is_trade() {
                continue;
            }
            if let Some(fill) = self.ledger.apply_option_trade(quote, signal) {
                debug!(
                    "{:?} {} at {} (fair {:.4})",
                    fill.signal, fill.contract, fill.price, fair.price
                );
                option_fills.push(fill);
            }
        }

        // Last quote wins when a contract repeats inside the snapshot
        let current: BTreeMap<&Contract, &Quote> = snapshot
            .quotes
            .iter()
            .map(|q| (&q.contract, q))
            .collect();
        let mut exposures = self.ledger.compute_portfolio_delta(&self.model, &current)?;

        let mut stock_fills = Vec::new();
        for (underlying, exposure) in exposures.iter_mut() {
            let Some(fill) = self.ledger.rehedge(
                underlying,
                exposure.option_delta,
                self.config.hedge_rounding,
                snapshot.timestamp,
            ) else {
                continue;
            };
            exposure.stock_quantity = fill.target;
            if fill.quantity != 0 {
                debug!(
                    "Hedge {} {:+} shares at {} (delta {:.4}, holding {})",
                    underlying, fill.quantity, fill.price, exposure.option_delta, fill.target
                );
                stock_fills.push(fill);
            }
        }

        let record = StepRecord {
            timestamp: snapshot.timestamp,
            quotes: snapshot.len(),
            priced,
            option_fills,
            stock_fills,
            exposures,
            realized_cashflow: self.ledger.realized_cashflow(),
        };

        debug!(
            "{}: {} quotes, {} priced, {} option fills, {} hedge fills, cash {}",
            record.timestamp,
            record.quotes,
            record.priced,
            record.option_fills.len(),
            record.stock_fills.len(),
            record.realized_cashflow
        );

        Ok(record)
    }

    /// Clear all state from a previous run.
    pub fn reset(&mut self) {
        self.ledger = Ledger::new();
        self.history.clear();
        self.last_timestamp = None;
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn history(&self) -> &[StepRecord] {
        &self.history
    }
}

/// Check ordering and pricing inputs of the whole feed before replaying it.
fn validate_feed(snapshots: &[Snapshot]) -> Result<(), BacktestError> {
    for pair in snapshots.windows(2) {
        if pair[1].timestamp <= pair[0].timestamp {
            return Err(BacktestError::OutOfOrder {
                previous: pair[0].timestamp,
                current: pair[1].timestamp,
            });
        }
    }

    for quote in snapshots.iter().flat_map(|s| &s.quotes) {
        PricingError::check_inputs(quote.spot_f64(), quote.strike_f64(), quote.time_to_expiry)
            .map_err(|source| BacktestError::Pricing {
                contract: quote.contract.to_string(),
                timestamp: quote.timestamp,
                source,
            })?;
    }

    Ok(())
}
