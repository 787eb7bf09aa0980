//! Parquet dataset files and the raw-capture directory.
//!
//! Layout is decided by the caller; this module only knows single files:
//! - `ParquetDataset<R>`: one Parquet file of canonical rows. Supports
//!   overwrite (current snapshot), replace-by-key upsert (master) and
//!   append-with-full-row-dedup (history/daily partitions).
//! - `RawCaptureDir`: one immutable JSON file per run.
//!
//! Features:
//! - Atomic writes (write to .tmp, rename into place)
//! - Schema validation on load
//! - Quarantine for corrupt files (`{filename}.quarantined-{timestamp}`);
//!   a corrupt file is then treated as empty so the cycle can proceed

use super::frame::CanonicalRow;
use super::provider::RawBatch;
use super::schema::SchemaError;
use crate::domain::RunIndex;
use chrono::{DateTime, NaiveDate, Utc};
use polars::prelude::*;
use std::collections::HashSet;
use std::fs;
use std::io::{ErrorKind, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parquet error: {0}")]
    Parquet(String),

    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("invalid stored data: {0}")]
    Invalid(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// What a tolerant load found on disk.
#[derive(Debug)]
pub enum LoadOutcome<R> {
    Missing,
    Loaded(Vec<R>),
    /// Unreadable file, moved aside. Callers treat it as empty.
    Corrupt {
        reason: String,
        quarantined: Option<PathBuf>,
    },
}

impl<R> LoadOutcome<R> {
    pub fn into_rows(self) -> Vec<R> {
        match self {
            LoadOutcome::Loaded(rows) => rows,
            LoadOutcome::Missing | LoadOutcome::Corrupt { .. } => Vec::new(),
        }
    }

    fn prior(&self) -> Prior {
        match self {
            LoadOutcome::Missing => Prior::Missing,
            LoadOutcome::Loaded(_) => Prior::Existing,
            LoadOutcome::Corrupt { .. } => Prior::Corrupt,
        }
    }
}

/// State of a dataset file before a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prior {
    Existing,
    Missing,
    Corrupt,
}

/// Row accounting for one merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeStats {
    pub prior: Prior,
    pub previous_rows: usize,
    /// Existing rows dropped (replaced keys or duplicate rows).
    pub removed_rows: usize,
    pub total_rows: usize,
}

/// One Parquet file of canonical rows.
pub struct ParquetDataset<R> {
    path: PathBuf,
    _row: PhantomData<fn() -> R>,
}

impl<R: CanonicalRow> ParquetDataset<R> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _row: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Strict load: missing or corrupt files are errors.
    pub fn read(&self) -> Result<Vec<R>, StoreError> {
        let file = fs::File::open(&self.path).map_err(|e| StoreError::io(&self.path, e))?;
        let df = ParquetReader::new(file)
            .finish()
            .map_err(|e| StoreError::Parquet(format!("read {}: {e}", self.path.display())))?;
        R::from_frame(&df)
    }

    /// Highest run index stored in the file. Missing or unreadable files give
    /// `None` and are left in place.
    pub fn max_run_index(&self) -> Option<RunIndex> {
        if !self.path.exists() {
            return None;
        }
        match self.read() {
            Ok(rows) => rows.iter().map(CanonicalRow::run_index).max(),
            Err(e) => {
                tracing::debug!(path = %self.path.display(), error = %e, "cannot read run indices");
                None
            }
        }
    }

    /// Tolerant load: a missing file is empty, a corrupt file is quarantined
    /// and reported as empty.
    pub fn load(&self) -> LoadOutcome<R> {
        if !self.path.exists() {
            return LoadOutcome::Missing;
        }

        match self.read() {
            Ok(rows) => LoadOutcome::Loaded(rows),
            Err(e) => {
                let quarantined = self.quarantine();
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    quarantined = ?quarantined,
                    "corrupt dataset file, continuing as if empty"
                );
                LoadOutcome::Corrupt {
                    reason: e.to_string(),
                    quarantined,
                }
            }
        }
    }

    /// Replace the whole file with `rows`.
    pub fn overwrite(&self, rows: &[R]) -> Result<(), StoreError> {
        let mut df = R::to_frame(rows)?;
        write_parquet_atomic(&mut df, &self.path)
    }

    /// Drop every existing row whose natural key appears in `batch`, then
    /// append `batch`. Re-running with the same batch is a no-op.
    pub fn upsert_by_key(&self, batch: &[R]) -> Result<MergeStats, StoreError> {
        let loaded = self.load();
        let prior = loaded.prior();
        let existing = loaded.into_rows();
        let previous_rows = existing.len();

        let (merged, removed_rows) = merge_by_key(existing, batch);
        self.overwrite(&merged)?;

        Ok(MergeStats {
            prior,
            previous_rows,
            removed_rows,
            total_rows: merged.len(),
        })
    }

    /// Append `batch` and drop exact duplicate rows (first occurrence wins).
    pub fn append_dedup(&self, batch: &[R]) -> Result<MergeStats, StoreError> {
        let loaded = self.load();
        let prior = loaded.prior();
        let mut rows = loaded.into_rows();
        let previous_rows = rows.len();

        rows.extend_from_slice(batch);
        let appended = rows.len();
        let merged = dedup_rows(rows);
        let removed_rows = appended - merged.len();
        self.overwrite(&merged)?;

        Ok(MergeStats {
            prior,
            previous_rows,
            removed_rows,
            total_rows: merged.len(),
        })
    }

    fn quarantine(&self) -> Option<PathBuf> {
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3f");
        let file_name = self.path.file_name()?.to_string_lossy().to_string();
        let target = self
            .path
            .with_file_name(format!("{file_name}.quarantined-{stamp}"));
        fs::rename(&self.path, &target).ok()?;
        Some(target)
    }
}

/// Replace-by-key merge. Returns the merged rows and how many existing rows
/// were dropped.
pub fn merge_by_key<R: CanonicalRow>(existing: Vec<R>, batch: &[R]) -> (Vec<R>, usize) {
    let keys: HashSet<R::Key> = batch.iter().map(CanonicalRow::natural_key).collect();
    let before = existing.len();
    let mut merged: Vec<R> = existing
        .into_iter()
        .filter(|row| !keys.contains(&row.natural_key()))
        .collect();
    let removed = before - merged.len();
    merged.extend_from_slice(batch);
    (merged, removed)
}

/// Stable full-row deduplication.
pub fn dedup_rows<R: CanonicalRow>(rows: Vec<R>) -> Vec<R> {
    let mut seen = HashSet::with_capacity(rows.len());
    rows.into_iter()
        .filter(|row| seen.insert(row.fingerprint()))
        .collect()
}

/// Write a DataFrame to `{path}.tmp` and rename it over `path`.
fn write_parquet_atomic(df: &mut DataFrame, path: &Path) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }

    let tmp_path = tmp_path_for(path);
    let file = fs::File::create(&tmp_path).map_err(|e| StoreError::io(&tmp_path, e))?;
    ParquetWriter::new(file).finish(df).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        StoreError::Parquet(format!("write {}: {e}", path.display()))
    })?;

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        StoreError::io(path, e)
    })
}

pub(crate) fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Serialize `value` as pretty JSON to `path` atomically.
pub(crate) fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }
    let json = serde_json::to_vec_pretty(value)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    let tmp_path = tmp_path_for(path);
    fs::write(&tmp_path, json).map_err(|e| StoreError::io(&tmp_path, e))?;
    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        StoreError::io(path, e)
    })
}

// ── Raw capture ─────────────────────────────────────────────────────

/// Append-only directory of raw captures, one file per run.
pub struct RawCaptureDir {
    dir: PathBuf,
}

impl RawCaptureDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `run_{NNNN}_{YYYY-MM-DDTHH-MM-SSZ}_{YYYY-MM-DD}.json`
    pub fn file_name(run_index: RunIndex, run_at: DateTime<Utc>, effective_date: NaiveDate) -> String {
        format!(
            "run_{run_index}_{}_{}.json",
            run_at.format("%Y-%m-%dT%H-%M-%SZ"),
            effective_date.format("%Y-%m-%d")
        )
    }

    /// Write a new capture file. Never overwrites an existing capture.
    pub fn write(
        &self,
        run_index: RunIndex,
        run_at: DateTime<Utc>,
        effective_date: NaiveDate,
        batch: &RawBatch,
    ) -> Result<PathBuf, StoreError> {
        fs::create_dir_all(&self.dir).map_err(|e| StoreError::io(&self.dir, e))?;
        let path = self
            .dir
            .join(Self::file_name(run_index, run_at, effective_date));

        let json = serde_json::to_vec(batch).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| StoreError::io(&path, e))?;
        file.write_all(&json).map_err(|e| StoreError::io(&path, e))?;
        file.sync_all().map_err(|e| StoreError::io(&path, e))?;
        Ok(path)
    }

    /// Capture files, oldest first by name.
    pub fn list(&self) -> Result<Vec<PathBuf>, StoreError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&self.dir, e)),
        };

        let mut files: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
            .collect();
        files.sort();
        Ok(files)
    }
}
