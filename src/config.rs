//! Run configuration.
//!
//! Loaded from TOML:
//!
//! ```toml
//! risk_free_rate = 0.01
//! volatility = 0.2
//! threshold = 0.02
//! hedge_rounding = "nearest"
//! model_price_decimals = 2
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pricing::{ModelParams, PricingError};
use crate::risk::HedgeRounding;
use crate::strategy::MispricingDetector;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid threshold {0}: must be in (0, 1)")]
    InvalidThreshold(f64),

    #[error(transparent)]
    Pricing(#[from] PricingError),
}

fn default_risk_free_rate() -> f64 {
    0.01
}

/// Parameters fixed for one backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BacktestConfig {
    /// Annual risk-free rate.
    #[serde(default = "default_risk_free_rate")]
    pub risk_free_rate: f64,

    /// Annual volatility used by the pricing model.
    pub volatility: f64,

    /// Fractional edge required to trade (e.g., 0.02 = 2%).
    pub threshold: f64,

    /// Whole-share rounding of the hedge target.
    #[serde(default)]
    pub hedge_rounding: HedgeRounding,

    /// Round the fair price before building the model band.
    #[serde(default)]
    pub model_price_decimals: Option<u32>,
}

impl BacktestConfig {
    pub fn new(volatility: f64, threshold: f64) -> Self {
        Self {
            risk_free_rate: default_risk_free_rate(),
            volatility,
            threshold,
            hedge_rounding: HedgeRounding::default(),
            model_price_decimals: None,
        }
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: BacktestConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.model_params().validate()?;
        if !self.threshold.is_finite() || self.threshold <= 0.0 || self.threshold >= 1.0 {
            return Err(ConfigError::InvalidThreshold(self.threshold));
        }
        Ok(())
    }

    pub fn model_params(&self) -> ModelParams {
        ModelParams::new(self.risk_free_rate, self.volatility)
    }

    pub fn detector(&self) -> MispricingDetector {
        MispricingDetector::new(self.threshold).with_price_decimals(self.model_price_decimals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_full_config() {
        let config = BacktestConfig::from_toml_str(
            r#"
            risk_free_rate = 0.03
            volatility = 0.25
            threshold = 0.05
            hedge_rounding = "toward_zero"
            model_price_decimals = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.risk_free_rate, 0.03);
        assert_eq!(config.volatility, 0.25);
        assert_eq!(config.threshold, 0.05);
        assert_eq!(config.hedge_rounding, HedgeRounding::TowardZero);
        assert_eq!(config.model_price_decimals, Some(2));
    }

    #[test]
    fn test_defaults() {
        let config = BacktestConfig::from_toml_str("volatility = 0.2\nthreshold = 0.02\n").unwrap();
        assert_eq!(config, BacktestConfig::new(0.2, 0.02));
        assert_eq!(config.risk_free_rate, 0.01);
        assert_eq!(config.hedge_rounding, HedgeRounding::Nearest);
        assert_eq!(config.model_price_decimals, None);
    }

    #[test]
    fn test_missing_required_field() {
        let err = BacktestConfig::from_toml_str("threshold = 0.02\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err =
            BacktestConfig::from_toml_str("volatility = 0.2\nthreshold = 0.02\nvol = 0.3\n")
                .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_invalid_values() {
        let err = BacktestConfig::from_toml_str("volatility = 0.0\nthreshold = 0.02\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Pricing(PricingError::InvalidParameter { name: "volatility", .. })
        ));

        for threshold in ["0.0", "1.0", "-0.1", "nan"] {
            let doc = format!("volatility = 0.2\nthreshold = {}\n", threshold);
            let err = BacktestConfig::from_toml_str(&doc).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidThreshold(_)));
        }
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "volatility = 0.3").unwrap();
        writeln!(file, "threshold = 0.1").unwrap();

        let config = BacktestConfig::load(file.path()).unwrap();
        assert_eq!(config.volatility, 0.3);

        let err = BacktestConfig::load("/nonexistent/config.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_detector_uses_config() {
        let mut config = BacktestConfig::new(0.2, 0.5);
        config.model_price_decimals = Some(2);
        let band = config.detector().model_band(10.004).unwrap();
        assert_eq!(band.bid, rust_decimal_macros::dec!(5));
    }
}
