//! Runs the selected source pipelines for one sync.
//!
//! The two sources share nothing but the data root, so they run on two
//! rayon workers. A panic in one pipeline is caught and reported as that
//! source's failure; the other still completes.

use crate::config::SyncConfig;
use crate::layout::StorageLayout;
use crate::pipeline::{CycleOutcome, OfficialPipeline, P2pPipeline, SyncError};
use crate::report::{RunReport, SourceReport};
use chrono::{DateTime, Utc};
use p2pfx_core::data::{MarketSource, TableSource};
use p2pfx_core::domain::SourceId;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

/// The adapters a sync runs against. `None` leaves that source out.
#[derive(Default)]
pub struct SourceSet {
    pub p2p: Option<Box<dyn MarketSource>>,
    pub official: Option<Box<dyn TableSource>>,
}

impl SourceSet {
    pub fn is_empty(&self) -> bool {
        self.p2p.is_none() && self.official.is_none()
    }
}

pub fn run_sync(config: &SyncConfig, sources: &SourceSet) -> RunReport {
    run_sync_at(config, sources, Utc::now())
}

/// Run every source in `sources` with `now` as the shared run start.
pub fn run_sync_at(config: &SyncConfig, sources: &SourceSet, now: DateTime<Utc>) -> RunReport {
    let layout = StorageLayout::new(&config.data_root);

    let (p2p, official) = rayon::join(
        || {
            sources.p2p.as_deref().map(|source| {
                guarded(SourceId::P2p, || {
                    P2pPipeline::new(source, &config.p2p, layout.source(SourceId::P2p)).run_at(now)
                })
            })
        },
        || {
            sources.official.as_deref().map(|source| {
                guarded(SourceId::Official, || {
                    OfficialPipeline::new(source, &config.official, layout.source(SourceId::Official))
                        .run_at(now)
                })
            })
        },
    );

    RunReport {
        started_at: now,
        sources: [p2p, official].into_iter().flatten().collect(),
    }
}

fn guarded<F>(source: SourceId, cycle: F) -> SourceReport
where
    F: FnOnce() -> Result<CycleOutcome, SyncError>,
{
    let started = Instant::now();
    let result = catch_unwind(AssertUnwindSafe(cycle)).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Err(SyncError::Panicked(message))
    });

    if let Err(e) = &result {
        tracing::error!(%source, kind = ?e.kind(), error = %e, "source cycle failed");
    }

    SourceReport {
        source,
        outcome: result.into(),
        elapsed_ms: started.elapsed().as_millis() as u64,
    }
}
