//! Per-source sync cycles.
//!
//! Both pipelines follow the same control flow:
//! gate → fetch → raw capture → normalize → shape → merge → commit.
//! Writes happen in a fixed order (master, partitions, current snapshot,
//! metadata) so a failure part-way never advances the processed date.

pub mod official;
pub mod p2p;

use chrono::{DateTime, NaiveDate, Utc};
use p2pfx_core::data::{FetchError, MergeStats, Prior, RawBatch, RawCaptureDir, StoreError};
use p2pfx_core::domain::{RunIndex, SourceId};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

pub use official::OfficialPipeline;
pub use p2p::P2pPipeline;

/// Coarse classification used in reports and exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Network,
    Persistence,
    Configuration,
    Internal,
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("storage directory unusable at {}: {source}", path.display())]
    Layout {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("metadata store unreadable: {0}")]
    Metadata(#[source] StoreError),

    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("every sub-market failed ({failed} of {total})")]
    AllMarketsFailed { failed: usize, total: usize },

    #[error("write failed: {0}")]
    Persistence(#[from] StoreError),

    #[error("pipeline panicked: {0}")]
    Panicked(String),
}

impl SyncError {
    pub fn kind(&self) -> FailureKind {
        match self {
            SyncError::Layout { .. } | SyncError::Metadata(_) => FailureKind::Configuration,
            SyncError::Fetch(_) | SyncError::AllMarketsFailed { .. } => FailureKind::Network,
            SyncError::Persistence(_) => FailureKind::Persistence,
            SyncError::Panicked(_) => FailureKind::Internal,
        }
    }
}

/// What one source cycle did when it did not fail.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// The source's as-of date was already processed.
    Skipped { as_of: NaiveDate },
    /// The cycle ran but nothing survived fetch and normalization.
    NoData { run_index: RunIndex, failed_markets: Vec<String> },
    Completed(CycleSummary),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleSummary {
    pub source: SourceId,
    pub run_index: RunIndex,
    pub effective_date: NaiveDate,
    pub raw_records: usize,
    pub discarded: usize,
    /// Canonical rows written to the current snapshot.
    pub records: usize,
    pub master_rows: usize,
    /// Rows the master lost to key replacement.
    pub replaced_rows: usize,
    pub master_was_corrupt: bool,
    /// Sub-markets that were aborted; their siblings still contributed.
    pub failed_markets: Vec<String>,
    pub raw_capture: Option<PathBuf>,
}

impl CycleSummary {
    fn from_master(
        source: SourceId,
        run_index: RunIndex,
        effective_date: NaiveDate,
        master: &MergeStats,
    ) -> Self {
        Self {
            source,
            run_index,
            effective_date,
            raw_records: 0,
            discarded: 0,
            records: 0,
            master_rows: master.total_rows,
            replaced_rows: master.removed_rows,
            master_was_corrupt: master.prior == Prior::Corrupt,
            failed_markets: Vec::new(),
            raw_capture: None,
        }
    }
}

/// Write the raw capture. A failure here is logged and the cycle continues.
fn capture_raw(
    dir: &RawCaptureDir,
    run_index: RunIndex,
    run_at: DateTime<Utc>,
    effective_date: NaiveDate,
    batch: &RawBatch,
) -> Option<PathBuf> {
    match dir.write(run_index, run_at, effective_date, batch) {
        Ok(path) => {
            tracing::debug!(path = %path.display(), records = batch.len(), "raw capture written");
            Some(path)
        }
        Err(e) => {
            tracing::warn!(error = %e, "raw capture failed; continuing without it");
            None
        }
    }
}
