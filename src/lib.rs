pub mod backtest;
pub mod config;
pub mod data;
pub mod metrics;
pub mod pricing;
pub mod risk;
pub mod strategy;
pub mod sweep;

// Re-export commonly used types
pub use data::{Contract, OptionType, Quote, QuoteLoader, Snapshot};
pub use pricing::{BlackScholes, FairValue, ModelParams, PricingError, PricingModel};
pub use strategy::{MispricingDetector, Signal};
pub use risk::{HedgeRounding, PortfolioDelta};
pub use backtest::{BacktestEngine, BacktestError, BacktestResult, Ledger, StepRecord};
pub use config::{BacktestConfig, ConfigError};
pub use metrics::{reconcile, PnlReport};
pub use sweep::{ParameterGrid, ParameterSweep, SweepOutcome};
