//! Sync configuration loaded from TOML.
//!
//! Every section has defaults, so an empty file (or no file at all) yields a
//! working configuration that targets the live endpoints:
//!
//! ```toml
//! data_root = "data"
//!
//! [http]
//! timeout_secs = 10
//!
//! [retry]
//! max_attempts = 3
//! delay_ms = 2000
//! backoff = "fixed"
//!
//! [p2p]
//! fiats = ["USD", "BOB"]
//! pages = 2
//!
//! [official]
//! currencies = ["EUR", "ARS"]
//! ```

use p2pfx_core::data::{bcb, binance, Backoff, HttpSettings, OfficialRules, RetryPolicy};
use p2pfx_core::domain::Side;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Root under which each source gets its own directory.
    pub data_root: PathBuf,
    pub http: HttpSettings,
    pub retry: RetrySettings,
    pub p2p: P2pSettings,
    pub official: OfficialSettings,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("data"),
            http: HttpSettings::default(),
            retry: RetrySettings::default(),
            p2p: P2pSettings::default(),
            official: OfficialSettings::default(),
        }
    }
}

impl SyncConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: SyncConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.data_root.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("data_root must not be empty".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be at least 1".into()));
        }
        if self.http.timeout_secs == 0 {
            return Err(ConfigError::Invalid("http.timeout_secs must be at least 1".into()));
        }
        if self.retry.backoff == BackoffKind::Exponential && self.retry.factor < 1.0 {
            return Err(ConfigError::Invalid("retry.factor must be >= 1.0".into()));
        }
        if self.p2p.enabled {
            if self.p2p.fiats.iter().all(|f| f.trim().is_empty()) {
                return Err(ConfigError::Invalid("p2p.fiats must not be empty".into()));
            }
            if self.p2p.sides.is_empty() {
                return Err(ConfigError::Invalid("p2p.sides must not be empty".into()));
            }
            if self.p2p.pages == 0 {
                return Err(ConfigError::Invalid("p2p.pages must be at least 1".into()));
            }
            if self.p2p.rows == 0 {
                return Err(ConfigError::Invalid("p2p.rows must be at least 1".into()));
            }
        }
        if self.official.enabled && self.official.base_currency.trim().is_empty() {
            return Err(ConfigError::Invalid("official.base_currency must not be empty".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    Fixed,
    Exponential,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    /// Fixed delay, or the first delay of an exponential schedule.
    pub delay_ms: u64,
    pub backoff: BackoffKind,
    pub factor: f64,
    pub max_delay_ms: u64,
    pub jitter: bool,
    /// Longest server-requested `Retry-After` wait honored after a 429.
    pub max_retry_after_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 2_000,
            backoff: BackoffKind::Fixed,
            factor: 2.0,
            max_delay_ms: 30_000,
            jitter: false,
            max_retry_after_secs: 60,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        let backoff = match self.backoff {
            BackoffKind::Fixed => Backoff::Fixed {
                delay_ms: self.delay_ms,
            },
            BackoffKind::Exponential => Backoff::Exponential {
                base_ms: self.delay_ms,
                factor: self.factor,
                max_ms: self.max_delay_ms,
            },
        };
        RetryPolicy::new(self.max_attempts, backoff)
            .with_jitter(self.jitter)
            .with_retry_after_cap(Duration::from_secs(self.max_retry_after_secs))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct P2pSettings {
    pub enabled: bool,
    pub endpoint: String,
    pub asset: String,
    pub fiats: Vec<String>,
    pub sides: Vec<Side>,
    /// Pages fetched per (side, fiat).
    pub pages: u32,
    pub rows: u32,
    /// Pause between consecutive search calls.
    pub request_delay_ms: u64,
}

impl Default for P2pSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: binance::DEFAULT_ENDPOINT.to_string(),
            asset: "USDT".into(),
            fiats: ["USD", "EUR", "GBP", "JPY", "CNY", "MXN", "ARS", "BOB"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            sides: vec![Side::Buy, Side::Sell],
            pages: 2,
            rows: 20,
            request_delay_ms: 500,
        }
    }
}

impl P2pSettings {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfficialSettings {
    pub enabled: bool,
    pub url: String,
    pub currencies: Vec<String>,
    pub base_currency: String,
    pub base_row: String,
}

impl Default for OfficialSettings {
    fn default() -> Self {
        let rules = OfficialRules::default();
        Self {
            enabled: true,
            url: bcb::DEFAULT_URL.to_string(),
            currencies: rules.currencies,
            base_currency: rules.base_currency,
            base_row: rules.base_row,
        }
    }
}

impl OfficialSettings {
    pub fn rules(&self) -> OfficialRules {
        OfficialRules {
            currencies: self.currencies.clone(),
            base_currency: self.base_currency.clone(),
            base_row: self.base_row.clone(),
        }
    }
}
