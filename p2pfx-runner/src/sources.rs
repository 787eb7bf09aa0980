//! Live adapters built from configuration.

use crate::config::SyncConfig;
use crate::runner::SourceSet;
use p2pfx_core::data::{BinanceP2pProvider, CentralBankProvider, FetchError, HttpTransport};
use p2pfx_core::domain::SourceId;
use std::sync::Arc;

/// Build adapters for each selected and enabled source. Every source gets
/// its own circuit breaker.
pub fn live_sources(config: &SyncConfig, selected: &[SourceId]) -> Result<SourceSet, FetchError> {
    let mut set = SourceSet::default();

    for &source in selected {
        let transport = || HttpTransport::new(&config.http, Arc::new(config.http.breaker()));
        match source {
            SourceId::P2p if config.p2p.enabled => {
                let provider = BinanceP2pProvider::new(transport()?, config.retry.policy())
                    .with_endpoint(config.p2p.endpoint.clone())
                    .with_asset(config.p2p.asset.clone())
                    .with_rows(config.p2p.rows);
                set.p2p = Some(Box::new(provider));
            }
            SourceId::Official if config.official.enabled => {
                let provider = CentralBankProvider::new(transport()?, config.retry.policy())
                    .with_url(config.official.url.clone());
                set.official = Some(Box::new(provider));
            }
            _ => tracing::info!(%source, "source disabled in config"),
        }
    }

    Ok(set)
}
