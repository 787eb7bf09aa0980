//! Read-only view of what is on disk for a source.
//!
//! Unlike a sync, nothing here quarantines or rewrites files: an unreadable
//! master is reported as such and left in place.

use crate::layout::StorageLayout;
use chrono::NaiveDate;
use p2pfx_core::data::{
    CanonicalRow, MetadataLoad, MetadataStore, ParquetDataset, RawCaptureDir, StoreError,
};
use p2pfx_core::domain::{OfficialRate, P2pRecord, RunIndex, SourceId};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub enum MetadataState {
    Absent,
    Loaded {
        run_index: RunIndex,
        last_processed: Option<NaiveDate>,
    },
    Corrupt(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum MasterState {
    Missing,
    Rows { rows: usize, first: Option<NaiveDate>, last: Option<NaiveDate> },
    Unreadable(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceStatus {
    pub source: SourceId,
    pub metadata: MetadataState,
    pub master: MasterState,
    pub raw_captures: usize,
    /// History partition files (P2P only; zero otherwise).
    pub history_partitions: usize,
    pub daily_partitions: usize,
}

pub fn source_status(layout: &StorageLayout, source: SourceId) -> Result<SourceStatus, StoreError> {
    let paths = layout.source(source);

    let metadata = match MetadataStore::new(&paths.metadata).load()? {
        MetadataLoad::Absent => MetadataState::Absent,
        MetadataLoad::Loaded(meta) => MetadataState::Loaded {
            run_index: meta.run_index,
            last_processed: meta.last_processed_source_date,
        },
        MetadataLoad::Corrupt { reason } => MetadataState::Corrupt(reason),
    };

    let master = match source {
        SourceId::P2p => master_state::<P2pRecord>(&paths.master),
        SourceId::Official => master_state::<OfficialRate>(&paths.master),
    };

    Ok(SourceStatus {
        source,
        metadata,
        master,
        raw_captures: RawCaptureDir::new(&paths.raw_dir).list()?.len(),
        history_partitions: count_parquet(&paths.history_dir)?,
        daily_partitions: count_parquet(&paths.daily_dir)?,
    })
}

fn master_state<R: CanonicalRow>(path: &Path) -> MasterState {
    let dataset = ParquetDataset::<R>::new(path);
    if !dataset.exists() {
        return MasterState::Missing;
    }
    match dataset.read() {
        Ok(rows) => MasterState::Rows {
            rows: rows.len(),
            first: rows.iter().map(CanonicalRow::date).min(),
            last: rows.iter().map(CanonicalRow::date).max(),
        },
        Err(e) => MasterState::Unreadable(e.to_string()),
    }
}

fn count_parquet(dir: &Path) -> Result<usize, StoreError> {
    match fs::read_dir(dir) {
        Ok(entries) => Ok(entries
            .filter_map(Result::ok)
            .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some("parquet"))
            .count()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(StoreError::Io {
            path: dir.to_path_buf(),
            source: e,
        }),
    }
}
