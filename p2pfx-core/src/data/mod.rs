//! Fetching, normalizing, shaping and persisting market data

pub mod bcb;
pub mod binance;
pub mod circuit_breaker;
pub mod frame;
pub mod http;
pub mod metadata;
pub mod normalize;
pub mod provider;
pub mod retry;
pub mod schema;
pub mod shape;
pub mod store;

pub use bcb::CentralBankProvider;
pub use binance::BinanceP2pProvider;
pub use circuit_breaker::CircuitBreaker;
pub use frame::CanonicalRow;
pub use http::{HttpSettings, HttpTransport};
pub use metadata::{MetadataLoad, MetadataStore, RunMetadata};
pub use normalize::{
    extract_official_rates, is_currency_code, normalize_p2p, normalize_p2p_batch, Discard, Normalized, NumberLocale,
    OfficialRules,
};
pub use provider::{
    FetchError, FetchOrigin, FetchRequest, MarketSource, RawBatch, RawRecord, TableSource,
};
pub use retry::{Backoff, RetryPolicy};
pub use schema::{SchemaError, SCHEMA_VERSION};
pub use shape::{shape_official, shape_p2p};
pub use store::{
    LoadOutcome, MergeStats, ParquetDataset, Prior, RawCaptureDir, StoreError,
};
