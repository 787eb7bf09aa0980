//! Binance P2P advertisement search adapter.
//!
//! One call fetches one (side, fiat, page) slice. The response is kept
//! loosely typed: each advertisement becomes a `RawRecord` whose payload is
//! the untouched `{adv, advertiser}` object. Interpretation happens in the
//! normalizer.

use super::http::HttpTransport;
use super::provider::{stamp, FetchError, FetchRequest, MarketSource, RawBatch, RawRecord};
use super::retry::RetryPolicy;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

pub const DEFAULT_ENDPOINT: &str = "https://p2p.binance.com/bapi/c2c/v2/friendly/c2c/adv/search";

pub struct BinanceP2pProvider {
    transport: HttpTransport,
    policy: RetryPolicy,
    endpoint: String,
    asset: String,
    rows: u32,
}

impl BinanceP2pProvider {
    pub fn new(transport: HttpTransport, policy: RetryPolicy) -> Self {
        Self {
            transport,
            policy,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            asset: "USDT".to_string(),
            rows: 20,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_asset(mut self, asset: impl Into<String>) -> Self {
        self.asset = asset.into();
        self
    }

    pub fn with_rows(mut self, rows: u32) -> Self {
        self.rows = rows;
        self
    }

    fn search_body(&self, request: &FetchRequest) -> Value {
        json!({
            "page": request.page,
            "rows": self.rows,
            "asset": self.asset.to_uppercase(),
            "tradeType": request.side.as_str(),
            "fiat": request.fiat.to_uppercase(),
        })
    }
}

/// Turn a search response body into raw records.
///
/// A body that is not JSON, or whose `data` member is missing or not an
/// array, yields an empty batch. Entries without both `adv` and
/// `advertiser` objects are dropped here.
pub fn parse_search_response(
    body: &str,
    request: &FetchRequest,
    fetched_at: DateTime<Utc>,
) -> RawBatch {
    let parsed: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(fiat = %request.fiat, side = %request.side, page = request.page, error = %e, "malformed search response; treating as empty");
            return RawBatch::default();
        }
    };

    let Some(entries) = parsed.get("data").and_then(Value::as_array) else {
        return RawBatch::default();
    };

    let observed_at = stamp(fetched_at);
    let records = entries
        .iter()
        .filter(|item| {
            item.get("adv").is_some_and(Value::is_object)
                && item.get("advertiser").is_some_and(Value::is_object)
        })
        .map(|item| RawRecord {
            origin: request.origin(),
            observed_at: Some(observed_at.clone()),
            payload: item.clone(),
        })
        .collect();

    RawBatch::new(records)
}

impl MarketSource for BinanceP2pProvider {
    fn name(&self) -> &str {
        "Binance P2P"
    }

    fn fetch(&self, request: &FetchRequest) -> Result<RawBatch, FetchError> {
        let body = self.search_body(request);
        let label = format!("p2p {} {} page {}", request.side, request.fiat, request.page);

        let text = self
            .policy
            .run(&label, |_| self.transport.post_json(&self.endpoint, &body))?;

        let batch = parse_search_response(&text, request, Utc::now());
        tracing::debug!(%label, records = batch.len(), "fetched");
        Ok(batch)
    }

    fn is_available(&self) -> bool {
        self.transport.breaker().is_allowed()
    }
}
