//! Core data types for the arbitrage backtest.
//!
//! Quotes arrive already typed and validated by the loader; the engine never
//! sees raw rows. Prices are kept as `Decimal` so cash accounting is exact,
//! while model inputs are converted to `f64` at the pricing boundary.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

const SECONDS_PER_YEAR: f64 = 365.0 * 24.0 * 60.0 * 60.0;

/// Option type (call or put).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Call,
    Put,
}

impl OptionType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "C" | "CALL" => Some(Self::Call),
            "P" | "PUT" => Some(Self::Put),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Call => "C",
            Self::Put => "P",
        }
    }
}

/// Identity of a listed option. Used as the ledger key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Contract {
    /// Underlying symbol (e.g., "SPY")
    pub underlying: String,

    /// Option expiration date
    pub expiry: NaiveDate,

    /// Strike price
    pub strike: Decimal,

    /// Option type (call or put)
    pub option_type: OptionType,
}

impl Contract {
    pub fn new(underlying: &str, strike: Decimal, expiry: NaiveDate, option_type: OptionType) -> Self {
        Self {
            underlying: underlying.to_string(),
            expiry,
            strike,
            option_type,
        }
    }

    pub fn call(underlying: &str, strike: Decimal, expiry: NaiveDate) -> Self {
        Self::new(underlying, strike, expiry, OptionType::Call)
    }

    pub fn put(underlying: &str, strike: Decimal, expiry: NaiveDate) -> Self {
        Self::new(underlying, strike, expiry, OptionType::Put)
    }
}

impl fmt::Display for Contract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}{}",
            self.underlying,
            self.expiry,
            self.option_type.as_str(),
            self.strike
        )
    }
}

/// A single option quote at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// Observation time
    pub timestamp: NaiveDateTime,

    /// Quoted contract
    pub contract: Contract,

    /// Underlying price at quote time
    pub spot: Decimal,

    /// Bid price, `None` when the feed had no usable bid
    pub bid: Option<Decimal>,

    /// Ask price, `None` when the feed had no usable ask
    pub ask: Option<Decimal>,

    /// Time to expiry in years
    pub time_to_expiry: f64,
}

impl Quote {
    /// Both sides of the market, if present.
    pub fn two_sided(&self) -> Option<(Decimal, Decimal)> {
        match (self.bid, self.ask) {
            (Some(bid), Some(ask)) => Some((bid, ask)),
            _ => None,
        }
    }

    pub fn spot_f64(&self) -> f64 {
        self.spot.try_into().unwrap_or(f64::NAN)
    }

    pub fn strike_f64(&self) -> f64 {
        self.contract.strike.try_into().unwrap_or(f64::NAN)
    }

    /// Years from `timestamp` to midnight of `expiry`, clamped at zero.
    pub fn years_to_expiry(timestamp: NaiveDateTime, expiry: NaiveDate) -> f64 {
        let expiry_start = expiry.and_time(chrono::NaiveTime::MIN);
        let seconds = (expiry_start - timestamp).num_seconds() as f64;
        (seconds / SECONDS_PER_YEAR).max(0.0)
    }
}

/// All quotes sharing one timestamp, in feed order.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub timestamp: NaiveDateTime,
    pub quotes: Vec<Quote>,
}

impl Snapshot {
    pub fn new(timestamp: NaiveDateTime) -> Self {
        Self {
            timestamp,
            quotes: Vec::new(),
        }
    }

    /// Group a time-ordered quote stream into snapshots.
    ///
    /// Consecutive quotes with equal timestamps form one snapshot; feed order is
    /// preserved inside it. Ordering across snapshots is checked by the engine.
    pub fn group(quotes: impl IntoIterator<Item = Quote>) -> Vec<Snapshot> {
        let mut snapshots: Vec<Snapshot> = Vec::new();

        for quote in quotes {
            match snapshots.last_mut() {
                Some(current) if current.timestamp == quote.timestamp => current.quotes.push(quote),
                _ => {
                    let mut snapshot = Snapshot::new(quote.timestamp);
                    snapshot.quotes.push(quote);
                    snapshots.push(snapshot);
                }
            }
        }

        snapshots
    }

    /// Total number of quotes in this snapshot.
    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }
}
