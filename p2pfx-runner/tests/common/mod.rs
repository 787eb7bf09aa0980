//! In-memory sources and fixtures shared by the sync tests.
#![allow(dead_code)]

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use p2pfx_core::data::{
    FetchError, FetchOrigin, FetchRequest, MarketSource, RawBatch, RawRecord, RetryPolicy,
    TableSource,
};
use p2pfx_runner::SyncConfig;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 5, 14, 30, 0).unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Config rooted at `root`, no inter-call delay, one page per market.
pub fn config(root: &Path, fiats: &[&str]) -> SyncConfig {
    let mut config = SyncConfig::default();
    config.data_root = root.to_path_buf();
    config.p2p.fiats = fiats.iter().map(|s| s.to_string()).collect();
    config.p2p.sides = vec![p2pfx_core::domain::Side::Buy];
    config.p2p.pages = 1;
    config.p2p.request_delay_ms = 0;
    config
}

// ── P2P ──────────────────────────────────────────────────────────────

pub fn advert(fiat: &str, price: &str, merchant: &str) -> serde_json::Value {
    json!({
        "adv": {
            "price": price,
            "asset": "USDT",
            "fiatUnit": fiat,
            "minSingleTransAmount": "100.00",
            "maxSingleTransAmount": "5,000.00",
            "tradeMethods": [{"identifier": "BANK"}]
        },
        "advertiser": {
            "userNo": merchant,
            "nickName": format!("nick-{merchant}"),
            "monthFinishRate": 0.98,
            "positiveRate": 0.99
        }
    })
}

/// Fixed responses per fiat. Fiats in `failing` exhaust a 3-attempt retry
/// policy on every call.
pub struct MockMarket {
    pages: HashMap<String, Vec<serde_json::Value>>,
    failing: HashSet<String>,
    policy: RetryPolicy,
    pub calls: AtomicUsize,
    pub attempts: Mutex<HashMap<String, u32>>,
    pub panic_on_fetch: bool,
}

impl MockMarket {
    pub fn new() -> Self {
        Self {
            pages: HashMap::new(),
            failing: HashSet::new(),
            policy: RetryPolicy::immediate(3),
            calls: AtomicUsize::new(0),
            attempts: Mutex::new(HashMap::new()),
            panic_on_fetch: false,
        }
    }

    pub fn with_market(mut self, fiat: &str, adverts: Vec<serde_json::Value>) -> Self {
        self.pages.insert(fiat.to_string(), adverts);
        self
    }

    pub fn failing(mut self, fiat: &str) -> Self {
        self.failing.insert(fiat.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl MarketSource for MockMarket {
    fn name(&self) -> &str {
        "mock market"
    }

    fn fetch(&self, request: &FetchRequest) -> Result<RawBatch, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.panic_on_fetch {
            panic!("mock market exploded");
        }

        let failing = self.failing.contains(&request.fiat);
        self.policy.run(&request.fiat, |attempt| {
            *self
                .attempts
                .lock()
                .unwrap()
                .entry(request.fiat.clone())
                .or_default() = attempt;
            if failing {
                return Err(FetchError::NetworkUnreachable("connection reset".into()));
            }
            let records = self
                .pages
                .get(&request.fiat)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .map(|payload| RawRecord {
                    origin: request.origin(),
                    observed_at: Some("2024-03-05T14:29:10Z".into()),
                    payload,
                })
                .collect();
            Ok(RawBatch::new(records))
        })
    }
}

// ── Official ─────────────────────────────────────────────────────────

pub fn table_row(currency: &str, bs: &str, me: &str) -> RawRecord {
    RawRecord {
        origin: FetchOrigin {
            side: None,
            market: None,
            page: None,
        },
        observed_at: Some("2024-03-05T14:29:10Z".into()),
        payload: json!({
            "pais": "-",
            "unidad_monetaria": "-",
            "currency": currency,
            "tipo_cambio_bs": bs,
            "tipo_cambio_me": me,
        }),
    }
}

pub fn rate_table(eur: &str) -> RawBatch {
    RawBatch::new(vec![
        table_row("USD.VENTA", "6,96", "1,00000"),
        table_row("EUR", "7,55", eur),
        table_row("GBP", "8,80", "1,26500"),
    ])
}

pub struct MockTable {
    pub as_of: Option<NaiveDate>,
    pub rows: Mutex<RawBatch>,
    pub fail: bool,
    pub probes: AtomicUsize,
    pub fetches: AtomicUsize,
}

impl MockTable {
    pub fn new(as_of: Option<NaiveDate>, rows: RawBatch) -> Self {
        Self {
            as_of,
            rows: Mutex::new(rows),
            fail: false,
            probes: AtomicUsize::new(0),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl TableSource for MockTable {
    fn name(&self) -> &str {
        "mock table"
    }

    fn probe_as_of_date(&self) -> Option<NaiveDate> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.as_of
    }

    fn fetch_table_rows(&self) -> Result<RawBatch, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(FetchError::RetriesExhausted {
                attempts: 3,
                last: Box::new(FetchError::HttpStatus {
                    status: 503,
                    url: "mock".into(),
                }),
            });
        }
        Ok(self.rows.lock().unwrap().clone())
    }
}
