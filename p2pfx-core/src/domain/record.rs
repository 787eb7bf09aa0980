//! Normalized quotes and the canonical rows persisted for each source.
//!
//! A *quote* is what the normalizer emits: fully typed, but without run or
//! calendar columns. A *record* is what the shaper emits and the store
//! persists: the quote plus its run tag and derived calendar columns.

use super::calendar::{CalendarFields, ClockFields};
use super::ids::RunIndex;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Advertisement side on the P2P venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Error)]
#[error("unknown side '{0}' (expected BUY or SELL)")]
pub struct SideError(pub String);

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = SideError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(Side::Buy),
            "SELL" => Ok(Side::Sell),
            _ => Err(SideError(s.to_string())),
        }
    }
}

/// One normalized P2P advertisement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct P2pQuote {
    /// `None` when the scrape timestamp could not be parsed.
    pub observed_at: Option<DateTime<Utc>>,
    pub currency: String,
    pub side: Side,
    pub asset: Option<String>,
    pub price: f64,
    pub min_amount: Option<f64>,
    pub max_amount: Option<f64>,
    pub merchant_id: Option<String>,
    pub merchant_name: Option<String>,
    pub finish_rate: Option<f64>,
    pub positive_rate: Option<f64>,
    pub payment_methods: Option<String>,
}

/// Canonical P2P row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct P2pRecord {
    pub run_index: RunIndex,
    pub observed_at: Option<DateTime<Utc>>,
    pub clock: ClockFields,
    pub calendar: CalendarFields,
    pub currency: String,
    pub side: Side,
    pub asset: Option<String>,
    pub price: f64,
    pub min_amount: Option<f64>,
    pub max_amount: Option<f64>,
    pub merchant_id: Option<String>,
    pub merchant_name: Option<String>,
    pub finish_rate: Option<f64>,
    pub positive_rate: Option<f64>,
    pub payment_methods: Option<String>,
}

/// One normalized official rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfficialQuote {
    pub currency: String,
    pub rate: f64,
}

/// Canonical central-bank row. Keyed by `calendar.date`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfficialRate {
    pub run_index: RunIndex,
    pub calendar: CalendarFields,
    pub currency: String,
    pub official_exchange_rate: f64,
}
