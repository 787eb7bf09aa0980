//! Field normalizer: loosely typed raw records in, typed quotes out.
//!
//! Amount-like fields arrive in many shapes (plain numbers, strings with
//! thousands separators, `{"amount": ..}` wrappers, one-element lists).
//! They all collapse to `Option<f64>`: either a finite number or `None`,
//! never a silent zero. A record is discarded only when its mandatory
//! numeric field (price / rate) is unusable.

use super::provider::{RawBatch, RawRecord};
use crate::domain::{OfficialQuote, P2pQuote, Side};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use thiserror::Error;

/// How a source formats decimal numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberLocale {
    /// `1,200.50`: comma groups thousands.
    DecimalPoint,
    /// `1.200,50`: comma marks decimals. A string with no comma is read as
    /// dot-decimal.
    DecimalComma,
}

const MISSING_TOKENS: [&str; 8] = ["", "none", "null", "nan", "n/a", "-", "{}", "[]"];

/// Parse a locale-formatted number. Returns `None` for missing tokens,
/// garbage, and non-finite results.
pub fn parse_number_str(raw: &str, locale: NumberLocale) -> Option<f64> {
    let trimmed = raw.trim();
    if MISSING_TOKENS.contains(&trimmed.to_ascii_lowercase().as_str()) {
        return None;
    }

    let compact: String = trimmed.chars().filter(|c| !c.is_whitespace()).collect();
    let cleaned = match locale {
        NumberLocale::DecimalPoint => compact.replace(',', ""),
        NumberLocale::DecimalComma if compact.contains(',') => {
            compact.replace('.', "").replace(',', ".")
        }
        NumberLocale::DecimalComma => compact,
    };

    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Collapse any amount-like JSON shape to a finite number or `None`.
pub fn parse_amount(value: &Value, locale: NumberLocale) -> Option<f64> {
    match value {
        Value::Null | Value::Bool(_) => None,
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => parse_number_str(s, locale),
        Value::Object(map) => match map.get("amount") {
            Some(inner) => parse_amount(inner, locale),
            None if map.len() == 1 => map.values().next().and_then(|v| parse_amount(v, locale)),
            None => None,
        },
        Value::Array(items) => items.first().and_then(|v| parse_amount(v, locale)),
    }
}

/// Tolerant timestamp parser; sub-second precision is dropped.
///
/// Accepts RFC 3339, naive `YYYY-MM-DD[ T]HH:MM[:SS[.fff]]` (taken as UTC),
/// a bare date (midnight UTC) and epoch seconds or milliseconds.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    let parsed = if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        Some(dt.with_timezone(&Utc))
    } else if let Some(naive) = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ]
    .iter()
    .find_map(|fmt| NaiveDateTime::parse_from_str(s.trim_end_matches('Z'), fmt).ok())
    {
        Some(Utc.from_utc_datetime(&naive))
    } else if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        date.and_hms_opt(0, 0, 0).map(|n| Utc.from_utc_datetime(&n))
    } else if s.bytes().all(|b| b.is_ascii_digit()) {
        let n: i64 = s.parse().ok()?;
        if s.len() >= 13 {
            DateTime::from_timestamp_millis(n)
        } else {
            DateTime::from_timestamp(n, 0)
        }
    } else {
        None
    };

    parsed.and_then(|dt| dt.with_nanosecond(0))
}

/// Why a raw record produced no quote.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Discard {
    #[error("payload has no '{0}' object")]
    MissingSection(&'static str),
    #[error("mandatory numeric field '{field}' is unusable: {raw}")]
    InvalidNumber { field: &'static str, raw: String },
    #[error("cannot determine side")]
    MissingSide,
    #[error("currency '{0}' is not a plain currency code")]
    InvalidCurrency(String),
    #[error("cannot determine currency")]
    MissingCurrency,
}

/// Trimmed text, `None` when empty or absent. Numbers are rendered as text
/// since some identifiers arrive numeric.
fn opt_text(value: Option<&Value>) -> Option<String> {
    let text = match value? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn opt_upper(value: Option<&Value>) -> Option<String> {
    opt_text(value).map(|s| s.to_uppercase())
}

fn payment_methods(adv: &Value) -> Option<String> {
    let methods: Vec<String> = adv
        .get("tradeMethods")
        .and_then(Value::as_array)?
        .iter()
        .filter_map(|m| opt_text(m.get("identifier")))
        .collect();
    if methods.is_empty() {
        None
    } else {
        Some(methods.join(","))
    }
}

/// Currency codes name partition files, so only 2 to 10 ASCII letters or
/// digits are accepted.
pub fn is_currency_code(code: &str) -> bool {
    (2..=10).contains(&code.len())
        && code.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
}

/// Normalize one P2P advertisement.
pub fn normalize_p2p(record: &RawRecord) -> Result<P2pQuote, Discard> {
    let payload = &record.payload;
    let adv = payload
        .get("adv")
        .filter(|v| v.is_object())
        .ok_or(Discard::MissingSection("adv"))?;
    let advertiser = payload
        .get("advertiser")
        .filter(|v| v.is_object())
        .ok_or(Discard::MissingSection("advertiser"))?;

    let raw_price = adv.get("price").unwrap_or(&Value::Null);
    let price = parse_amount(raw_price, NumberLocale::DecimalPoint).ok_or_else(|| {
        Discard::InvalidNumber {
            field: "price",
            raw: raw_price.to_string(),
        }
    })?;

    let side = match record.origin.side {
        Some(side) => side,
        None => opt_text(adv.get("tradeType"))
            .and_then(|s| s.parse::<Side>().ok())
            .ok_or(Discard::MissingSide)?,
    };

    let currency = opt_upper(adv.get("fiatUnit"))
        .or_else(|| record.origin.market.as_ref().map(|m| m.trim().to_uppercase()))
        .filter(|c| !c.is_empty())
        .ok_or(Discard::MissingCurrency)?;
    if !is_currency_code(&currency) {
        return Err(Discard::InvalidCurrency(currency));
    }

    let amount = |v: Option<&Value>| v.and_then(|v| parse_amount(v, NumberLocale::DecimalPoint));

    Ok(P2pQuote {
        observed_at: record.observed_at.as_deref().and_then(parse_timestamp),
        currency,
        side,
        asset: opt_upper(adv.get("asset")),
        price,
        min_amount: amount(adv.get("minSingleTransAmount")),
        max_amount: amount(adv.get("maxSingleTransAmount")),
        merchant_id: opt_text(advertiser.get("userNo")),
        merchant_name: opt_text(advertiser.get("nickName")),
        finish_rate: amount(advertiser.get("monthFinishRate")),
        positive_rate: amount(advertiser.get("positiveRate")),
        payment_methods: payment_methods(adv),
    })
}

/// Quotes that survived normalization plus how many records were dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized<T> {
    pub quotes: Vec<T>,
    pub discarded: usize,
}

impl<T> Default for Normalized<T> {
    fn default() -> Self {
        Self {
            quotes: Vec::new(),
            discarded: 0,
        }
    }
}

pub fn normalize_p2p_batch(batch: &RawBatch) -> Normalized<P2pQuote> {
    let mut out = Normalized {
        quotes: Vec::with_capacity(batch.len()),
        discarded: 0,
    };
    for record in &batch.records {
        match normalize_p2p(record) {
            Ok(quote) => out.quotes.push(quote),
            Err(reason) => {
                tracing::debug!(%reason, market = ?record.origin.market, "discarding record");
                out.discarded += 1;
            }
        }
    }
    if out.discarded > 0 {
        tracing::warn!(discarded = out.discarded, kept = out.quotes.len(), "P2P records discarded during normalization");
    }
    out
}

/// Which table rows become official rates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfficialRules {
    /// Foreign currencies read from the foreign-currency column.
    pub currencies: Vec<String>,
    /// Currency emitted for the base row.
    pub base_currency: String,
    /// Row whose bolivianos column gives the base currency rate.
    pub base_row: String,
}

impl Default for OfficialRules {
    fn default() -> Self {
        Self {
            currencies: ["EUR", "GBP", "CNY", "JPY", "MXN", "ARS"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            base_currency: "BOB".into(),
            base_row: "USD.VENTA".into(),
        }
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Pick, parse and round the configured rates from raw table rows.
///
/// The first row per currency wins. Output is sorted by currency.
pub fn extract_official_rates(batch: &RawBatch, rules: &OfficialRules) -> Normalized<OfficialQuote> {
    let wanted: HashSet<String> = rules.currencies.iter().map(|c| c.trim().to_uppercase()).collect();
    let base_row = rules.base_row.trim().to_uppercase();
    let mut seen = HashSet::new();
    let mut out = Normalized::default();

    for record in &batch.records {
        let Some(code) = opt_upper(record.payload.get("currency")) else {
            continue;
        };

        let (currency, column) = if code == base_row {
            (rules.base_currency.trim().to_uppercase(), "tipo_cambio_bs")
        } else if wanted.contains(&code) {
            (code, "tipo_cambio_me")
        } else {
            continue;
        };

        if seen.contains(&currency) {
            tracing::debug!(%currency, "duplicate official row ignored");
            continue;
        }

        let raw = record.payload.get(column).unwrap_or(&Value::Null);
        match parse_amount(raw, NumberLocale::DecimalComma) {
            Some(rate) => {
                seen.insert(currency.clone());
                out.quotes.push(OfficialQuote {
                    currency,
                    rate: round2(rate),
                });
            }
            None => {
                tracing::warn!(%currency, raw = %raw, "unparseable official rate; row discarded");
                out.discarded += 1;
            }
        }
    }

    let base = rules.base_currency.trim().to_uppercase();
    if !batch.is_empty() && !seen.contains(&base) {
        tracing::warn!(row = %base_row, currency = %base, "base row missing; base currency not emitted");
    }

    out.quotes.sort_by(|a, b| a.currency.cmp(&b.currency));
    out
}
