//! Source traits and structured fetch errors.
//!
//! `MarketSource` (paged, per sub-market) and `TableSource` (single bulk
//! table plus a cheap as-of probe) abstract over the upstream endpoints so
//! pipelines can be driven by in-memory mocks in tests. Adapters only do
//! network I/O; they never touch storage.

use crate::domain::Side;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Where a raw record came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchOrigin {
    pub side: Option<Side>,
    pub market: Option<String>,
    pub page: Option<u32>,
}

/// One loosely typed observation, exactly as the source returned it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub origin: FetchOrigin,
    /// Capture timestamp as text; parsed tolerantly by the normalizer.
    pub observed_at: Option<String>,
    pub payload: serde_json::Value,
}

/// Raw records from one or more fetch calls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawBatch {
    pub records: Vec<RawRecord>,
}

impl RawBatch {
    pub fn new(records: Vec<RawRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn extend(&mut self, other: RawBatch) {
        self.records.extend(other.records);
    }
}

/// One paged request against a sub-market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRequest {
    pub side: Side,
    pub fiat: String,
    pub page: u32,
}

impl FetchRequest {
    pub fn origin(&self) -> FetchOrigin {
        FetchOrigin {
            side: Some(self.side),
            market: Some(self.fiat.clone()),
            page: Some(self.page),
        }
    }
}

/// Capture timestamp in the format every adapter stamps on raw records.
pub fn stamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Structured error types for fetch operations.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("hard stop: provider has blocked requests (circuit breaker open)")]
    CircuitBreakerTripped,

    #[error("HTTP client setup failed: {0}")]
    ClientSetup(String),

    #[error("gave up after {attempts} attempt(s): {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<FetchError>,
    },
}

impl FetchError {
    /// Default retry predicate: transient transport and HTTP failures.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetchError::NetworkUnreachable(_)
                | FetchError::HttpStatus { .. }
                | FetchError::RateLimited { .. }
        )
    }
}

/// Paged multi-market source (the P2P advertisement search).
pub trait MarketSource: Send + Sync {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Fetch one (side, fiat, page) slice. An empty or malformed body is an
    /// empty batch, not an error.
    fn fetch(&self, request: &FetchRequest) -> Result<RawBatch, FetchError>;

    /// False once the source has refused further requests.
    fn is_available(&self) -> bool {
        true
    }
}

/// Single-table source with a self-reported as-of date (the central bank).
pub trait TableSource: Send + Sync {
    fn name(&self) -> &str;

    /// Cheap lookup of the date the source says its data is for. `None` when
    /// the date cannot be determined, including network failure.
    fn probe_as_of_date(&self) -> Option<NaiveDate>;

    /// Fetch the full rate table.
    fn fetch_table_rows(&self) -> Result<RawBatch, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(FetchError::NetworkUnreachable("reset".into()).is_retryable());
        assert!(FetchError::HttpStatus { status: 502, url: "u".into() }.is_retryable());
        assert!(!FetchError::CircuitBreakerTripped.is_retryable());
        assert!(!FetchError::ClientSetup("tls".into()).is_retryable());
    }

    #[test]
    fn request_origin_carries_all_coordinates() {
        let req = FetchRequest {
            side: Side::Buy,
            fiat: "ARS".into(),
            page: 2,
        };
        let origin = req.origin();
        assert_eq!(origin.side, Some(Side::Buy));
        assert_eq!(origin.market.as_deref(), Some("ARS"));
        assert_eq!(origin.page, Some(2));
    }
}
