//! CSV quote loader.
//!
//! Reads a long-format quote file (one row per option quote) into typed
//! [`Quote`] records. The file must contain the following header:
//! - timestamp, underlying, strike, expiry, option_type, spot, bid, ask
//! - time_to_expiry (optional; derived from expiry when absent or empty)
//!
//! Empty or `NaN` bid/ask cells are loaded as missing sides rather than
//! rejected, so the engine can skip those records.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use super::types::{Contract, OptionType, Quote};

/// Expected columns in the quote file.
pub const EXPECTED_COLUMNS: &[&str] = &[
    "timestamp",
    "underlying",
    "strike",
    "expiry",
    "option_type",
    "spot",
    "bid",
    "ask",
];

const TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Invalid data at row {row}: {message}")]
    InvalidData { row: usize, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One CSV row before validation.
#[derive(Debug, Deserialize)]
struct RawQuoteRecord {
    timestamp: String,
    underlying: String,
    strike: String,
    expiry: String,
    option_type: String,
    spot: String,
    bid: Option<String>,
    ask: Option<String>,
    #[serde(default)]
    time_to_expiry: Option<String>,
}

impl RawQuoteRecord {
    fn into_quote(self, row: usize) -> Result<Quote, LoaderError> {
        let invalid = |message: String| LoaderError::InvalidData { row, message };

        let timestamp = parse_timestamp(&self.timestamp)
            .ok_or_else(|| invalid(format!("bad timestamp '{}'", self.timestamp)))?;
        let expiry = NaiveDate::parse_from_str(self.expiry.trim(), "%Y-%m-%d")
            .map_err(|e| invalid(format!("bad expiry '{}': {}", self.expiry, e)))?;
        let option_type = OptionType::from_str(&self.option_type)
            .ok_or_else(|| invalid(format!("bad option type '{}'", self.option_type)))?;
        let strike = parse_decimal(&self.strike)
            .ok_or_else(|| invalid(format!("bad strike '{}'", self.strike)))?;
        let spot = parse_decimal(&self.spot)
            .ok_or_else(|| invalid(format!("bad spot '{}'", self.spot)))?;

        let bid = parse_side(self.bid.as_deref()).map_err(|v| invalid(format!("bad bid '{}'", v)))?;
        let ask = parse_side(self.ask.as_deref()).map_err(|v| invalid(format!("bad ask '{}'", v)))?;

        let time_to_expiry = match self.time_to_expiry.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => raw
                .parse::<f64>()
                .map_err(|e| invalid(format!("bad time_to_expiry '{}': {}", raw, e)))?,
            _ => Quote::years_to_expiry(timestamp, expiry),
        };

        let underlying = self.underlying.trim();
        if underlying.is_empty() {
            return Err(invalid("empty underlying".to_string()));
        }

        Ok(Quote {
            timestamp,
            contract: Contract::new(underlying, strike, expiry, option_type),
            spot,
            bid,
            ask,
            time_to_expiry,
        })
    }
}

fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(chrono::NaiveTime::MIN))
        })
}

fn parse_decimal(raw: &str) -> Option<Decimal> {
    let raw = raw.trim();
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .ok()
}

/// Parse a bid/ask cell. Empty and NaN cells are a missing side.
fn parse_side(raw: Option<&str>) -> Result<Option<Decimal>, String> {
    match raw.map(str::trim) {
        None => Ok(None),
        Some(s) if s.is_empty() || s.eq_ignore_ascii_case("nan") => Ok(None),
        Some(s) => parse_decimal(s).map(Some).ok_or_else(|| s.to_string()),
    }
}

/// CSV loader for option quote files.
pub struct QuoteLoader {
    path: String,
}

impl QuoteLoader {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
        }
    }

    /// Load every quote from the configured file.
    pub fn load(&self) -> Result<Vec<Quote>, LoaderError> {
        if !Path::new(&self.path).exists() {
            return Err(LoaderError::FileNotFound(self.path.clone()));
        }
        let file = File::open(&self.path)?;
        let quotes = Self::from_reader(file)?;
        info!("Loaded {} quotes from {}", quotes.len(), self.path);
        Ok(quotes)
    }

    /// Parse quotes from any reader with a header row.
    pub fn from_reader<R: Read>(reader: R) -> Result<Vec<Quote>, LoaderError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(false)
            .from_reader(reader);

        let headers = csv_reader.headers()?.clone();
        for column in EXPECTED_COLUMNS {
            if !headers.iter().any(|h| h == *column) {
                return Err(LoaderError::MissingColumn((*column).to_string()));
            }
        }

        let mut quotes = Vec::new();
        for (idx, record) in csv_reader.deserialize::<RawQuoteRecord>().enumerate() {
            // Row 1 is the header
            let row = idx + 2;
            quotes.push(record?.into_quote(row)?);
        }

        Ok(quotes)
    }
}
