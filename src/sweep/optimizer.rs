//! Parameter sweep.
//!
//! Grid search over volatility, threshold and risk-free rate. Every
//! combination is replayed on its own engine; combinations run in parallel.

use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::backtest::{BacktestEngine, BacktestError};
use crate::config::BacktestConfig;
use crate::data::Snapshot;

/// Parameter values to sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterGrid {
    /// Model volatilities.
    pub volatility: Vec<f64>,
    /// Mispricing thresholds.
    pub threshold: Vec<f64>,
    /// Risk-free rates. Empty keeps the base config's rate.
    #[serde(default)]
    pub risk_free_rate: Vec<f64>,
}

impl Default for ParameterGrid {
    fn default() -> Self {
        Self {
            volatility: vec![0.15, 0.20, 0.25, 0.30],
            threshold: vec![0.01, 0.02, 0.05],
            risk_free_rate: Vec::new(),
        }
    }
}

impl ParameterGrid {
    /// Calculate total number of parameter combinations.
    pub fn total_combinations(&self) -> usize {
        self.volatility.len() * self.threshold.len() * self.risk_free_rate.len().max(1)
    }

    /// Generate all parameter combinations.
    pub fn combinations(&self, base_rate: f64) -> Vec<ParameterSet> {
        let rates = if self.risk_free_rate.is_empty() {
            vec![base_rate]
        } else {
            self.risk_free_rate.clone()
        };

        let mut combos = Vec::with_capacity(self.total_combinations());
        for &volatility in &self.volatility {
            for &threshold in &self.threshold {
                for &risk_free_rate in &rates {
                    combos.push(ParameterSet {
                        volatility,
                        threshold,
                        risk_free_rate,
                    });
                }
            }
        }
        combos
    }
}

/// A single parameter set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    pub volatility: f64,
    pub threshold: f64,
    pub risk_free_rate: f64,
}

impl ParameterSet {
    /// Apply this parameter set to a backtest config.
    pub fn apply_to_config(&self, config: &mut BacktestConfig) {
        config.volatility = self.volatility;
        config.threshold = self.threshold;
        config.risk_free_rate = self.risk_free_rate;
    }

    /// Create a unique key for this parameter set.
    pub fn key(&self) -> String {
        format!(
            "vol{:.4}_thr{:.4}_r{:.4}",
            self.volatility, self.threshold, self.risk_free_rate
        )
    }
}

/// Outcome of one parameter set.
#[derive(Debug, Clone, Serialize)]
pub struct SweepOutcome {
    pub params: ParameterSet,
    pub key: String,
    pub total_pnl: Decimal,
    pub realized_cashflow: Decimal,
    pub unrealized_value: Decimal,
    pub option_trades: usize,
    pub hedge_trades: usize,
}

/// Runs a parameter grid against one dataset.
pub struct ParameterSweep {
    base_config: BacktestConfig,
    grid: ParameterGrid,
}

impl ParameterSweep {
    pub fn new(base_config: BacktestConfig, grid: ParameterGrid) -> Self {
        Self { base_config, grid }
    }

    pub fn grid(&self) -> &ParameterGrid {
        &self.grid
    }

    /// Run every combination. Outcomes are sorted by total PnL, best first.
    pub fn run(&self, snapshots: &[Snapshot]) -> Result<Vec<SweepOutcome>, BacktestError> {
        self.run_with_progress(snapshots, |_, _| {})
    }

    /// Run every combination, calling `progress(done, total)` as each finishes.
    pub fn run_with_progress<F>(
        &self,
        snapshots: &[Snapshot],
        progress: F,
    ) -> Result<Vec<SweepOutcome>, BacktestError>
    where
        F: Fn(usize, usize) + Sync,
    {
        let combos = self.grid.combinations(self.base_config.risk_free_rate);

        // Reject the whole sweep before any replay if one combination is invalid
        let configs = combos
            .into_iter()
            .map(|params| -> Result<_, BacktestError> {
                let mut config = self.base_config.clone();
                params.apply_to_config(&mut config);
                config.validate()?;
                Ok((params, config))
            })
            .collect::<Result<Vec<_>, BacktestError>>()?;

        let total = configs.len();
        info!(
            "Sweeping {} parameter combinations over {} snapshots",
            total,
            snapshots.len()
        );

        let done = AtomicUsize::new(0);
        let mut outcomes = configs
            .into_par_iter()
            .map(|(params, config)| -> Result<_, BacktestError> {
                let mut engine = BacktestEngine::new(config)?;
                let result = engine.run_snapshots(snapshots)?;

                let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
                progress(finished, total);
                if finished % (total / 10).max(1) == 0 || finished == total {
                    info!(
                        "  {:.0}% ({}/{} combinations)",
                        finished as f64 / total as f64 * 100.0,
                        finished,
                        total
                    );
                }

                Ok(SweepOutcome {
                    key: params.key(),
                    params,
                    total_pnl: result.report.total_pnl,
                    realized_cashflow: result.report.realized_cashflow,
                    unrealized_value: result.report.unrealized_value,
                    option_trades: result.option_trades,
                    hedge_trades: result.hedge_trades,
                })
            })
            .collect::<Result<Vec<_>, BacktestError>>()?;

        outcomes.sort_by(|a, b| b.total_pnl.cmp(&a.total_pnl).then_with(|| a.key.cmp(&b.key)));

        if let Some(best) = outcomes.first() {
            info!("Best parameters: {} (total PnL {})", best.key, best.total_pnl);
        }

        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    use crate::config::ConfigError;
    use crate::data::{Contract, Quote};

    fn snapshots() -> Vec<Snapshot> {
        let expiry = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let quotes = (10..14)
            .flat_map(|hour| {
                let timestamp = day.and_hms_opt(hour, 0, 0).unwrap();
                let spot = Decimal::from(96 + hour);
                [dec!(100), dec!(105)].into_iter().map(move |strike| Quote {
                    timestamp,
                    contract: Contract::call("SPY", strike, expiry),
                    spot,
                    bid: Some(dec!(3.00)),
                    ask: Some(dec!(3.20)),
                    time_to_expiry: Quote::years_to_expiry(timestamp, expiry),
                })
            })
            .collect::<Vec<_>>();
        Snapshot::group(quotes)
    }

    #[test]
    fn test_parameter_grid_combinations() {
        let grid = ParameterGrid {
            volatility: vec![0.1, 0.2],
            threshold: vec![0.01, 0.02, 0.05],
            risk_free_rate: Vec::new(),
        };
        assert_eq!(grid.total_combinations(), 6);

        let combos = grid.combinations(0.03);
        assert_eq!(combos.len(), 6);
        assert!(combos.iter().all(|p| p.risk_free_rate == 0.03));

        let grid = ParameterGrid {
            risk_free_rate: vec![0.0, 0.05],
            ..grid
        };
        assert_eq!(grid.combinations(0.03).len(), 12);
    }

    #[test]
    fn test_parameter_set_key() {
        let params = ParameterSet {
            volatility: 0.2,
            threshold: 0.02,
            risk_free_rate: 0.01,
        };
        assert_eq!(params.key(), "vol0.2000_thr0.0200_r0.0100");
    }

    #[test]
    fn test_parameter_set_apply() {
        let mut config = BacktestConfig::new(0.2, 0.02);
        ParameterSet {
            volatility: 0.35,
            threshold: 0.1,
            risk_free_rate: 0.04,
        }
        .apply_to_config(&mut config);
        assert_eq!(config.volatility, 0.35);
        assert_eq!(config.threshold, 0.1);
        assert_eq!(config.risk_free_rate, 0.04);
    }

    #[test]
    fn test_sweep_sorted_and_matches_single_runs() {
        let data = snapshots();
        let grid = ParameterGrid {
            volatility: vec![0.1, 0.3, 0.5],
            threshold: vec![0.02, 0.2],
            risk_free_rate: Vec::new(),
        };
        let base = BacktestConfig::new(0.2, 0.02);
        let outcomes = ParameterSweep::new(base.clone(), grid).run(&data).unwrap();

        assert_eq!(outcomes.len(), 6);
        for pair in outcomes.windows(2) {
            assert!(
                pair[0].total_pnl > pair[1].total_pnl
                    || (pair[0].total_pnl == pair[1].total_pnl && pair[0].key < pair[1].key)
            );
        }

        for outcome in &outcomes {
            let mut config = base.clone();
            outcome.params.apply_to_config(&mut config);
            let single = BacktestEngine::new(config).unwrap().run_snapshots(&data).unwrap();
            assert_eq!(single.report.total_pnl, outcome.total_pnl);
            assert_eq!(single.option_trades, outcome.option_trades);
        }
    }

    #[test]
    fn test_sweep_reports_progress() {
        let done = AtomicUsize::new(0);
        let sweep = ParameterSweep::new(BacktestConfig::new(0.2, 0.02), ParameterGrid::default());
        let outcomes = sweep
            .run_with_progress(&snapshots(), |_, total| {
                assert_eq!(total, 12);
                done.fetch_add(1, Ordering::Relaxed);
            })
            .unwrap();
        assert_eq!(outcomes.len(), 12);
        assert_eq!(done.load(Ordering::Relaxed), 12);
    }

    #[test]
    fn test_invalid_combination_fails_sweep() {
        let grid = ParameterGrid {
            volatility: vec![0.2, -0.1],
            threshold: vec![0.02],
            risk_free_rate: Vec::new(),
        };
        let err = ParameterSweep::new(BacktestConfig::new(0.2, 0.02), grid)
            .run(&snapshots())
            .unwrap_err();
        assert!(matches!(err, BacktestError::Config(ConfigError::Pricing(_))));
    }
}
