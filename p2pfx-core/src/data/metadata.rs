//! Per-source run bookkeeping: the run counter and the last processed date.
//!
//! The two fields advance at different times. The run counter is bumped and
//! persisted as soon as a cycle passes the freshness gate, so a crash burns
//! an index. The date only moves after a fully successful merge.

use super::store::{write_json_atomic, StoreError};
use crate::domain::RunIndex;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetadata {
    #[serde(default, alias = "last_date")]
    pub last_processed_source_date: Option<NaiveDate>,
    /// Index of the most recent run that passed the gate (0 = none yet).
    #[serde(default)]
    pub run_index: RunIndex,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetadataLoad {
    /// No metadata file: the source has never run.
    Absent,
    Loaded(RunMetadata),
    /// The file exists but cannot be parsed.
    Corrupt { reason: String },
}

impl MetadataLoad {
    /// Defaults for `Absent` and `Corrupt`.
    pub fn into_metadata(self) -> RunMetadata {
        match self {
            MetadataLoad::Loaded(meta) => meta,
            MetadataLoad::Absent | MetadataLoad::Corrupt { .. } => RunMetadata::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetadataStore {
    path: PathBuf,
}

impl MetadataStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the metadata file. Only an I/O failure other than not-found is an
    /// error; unparseable content is reported as `Corrupt`.
    pub fn load(&self) -> Result<MetadataLoad, StoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(MetadataLoad::Absent),
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };

        match serde_json::from_slice::<RunMetadata>(&bytes) {
            Ok(meta) => Ok(MetadataLoad::Loaded(meta)),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "metadata unreadable; falling back to defaults");
                Ok(MetadataLoad::Corrupt {
                    reason: e.to_string(),
                })
            }
        }
    }

    pub fn save(&self, meta: &RunMetadata) -> Result<(), StoreError> {
        write_json_atomic(&self.path, meta)
    }

    /// Increment and persist the run counter. Returns the updated metadata.
    pub fn next_run_index(&self, mut meta: RunMetadata) -> Result<RunMetadata, StoreError> {
        meta.run_index = meta.run_index.next();
        self.save(&meta)?;
        Ok(meta)
    }

    /// Persist `date` as the last processed source date.
    pub fn record_processed_date(
        &self,
        mut meta: RunMetadata,
        date: NaiveDate,
    ) -> Result<RunMetadata, StoreError> {
        meta.last_processed_source_date = Some(date);
        self.save(&meta)?;
        Ok(meta)
    }
}
