//! On-disk layout of every artifact, per source.
//!
//! ```text
//! {data_root}/{binance|bcb}/
//!   raw/run_{NNNN}_{YYYY-MM-DDTHH-MM-SSZ}_{date}.json
//!   processed/current.parquet
//!   processed/master.parquet
//!   processed/metadata.json
//!   processed/history/{currency}.parquet   (P2P)
//!   processed/daily/{YYYY-MM-DD}.parquet   (P2P)
//! ```

use chrono::NaiveDate;
use p2pfx_core::data::is_currency_code;
use p2pfx_core::domain::SourceId;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn source(&self, source: SourceId) -> SourcePaths {
        SourcePaths::new(self.root.join(source.dir_name()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePaths {
    pub root: PathBuf,
    pub raw_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub current: PathBuf,
    pub master: PathBuf,
    pub metadata: PathBuf,
    pub history_dir: PathBuf,
    pub daily_dir: PathBuf,
}

impl SourcePaths {
    fn new(root: PathBuf) -> Self {
        let processed_dir = root.join("processed");
        Self {
            raw_dir: root.join("raw"),
            current: processed_dir.join("current.parquet"),
            master: processed_dir.join("master.parquet"),
            metadata: processed_dir.join("metadata.json"),
            history_dir: processed_dir.join("history"),
            daily_dir: processed_dir.join("daily"),
            processed_dir,
            root,
        }
    }

    /// Create every directory a cycle writes into.
    pub fn ensure(&self) -> io::Result<()> {
        for dir in [&self.raw_dir, &self.processed_dir, &self.history_dir, &self.daily_dir] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Per-currency history file. Anything but a plain currency code is
    /// refused so the path cannot leave `history_dir`.
    pub fn history_partition(&self, currency: &str) -> io::Result<PathBuf> {
        if !is_currency_code(currency) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("'{currency}' is not a valid history partition name"),
            ));
        }
        Ok(self.history_dir.join(format!("{currency}.parquet")))
    }

    pub fn daily_partition(&self, date: NaiveDate) -> PathBuf {
        self.daily_dir
            .join(format!("{}.parquet", date.format("%Y-%m-%d")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sources_get_disjoint_roots() {
        let layout = StorageLayout::new("/data");
        let p2p = layout.source(SourceId::P2p);
        let official = layout.source(SourceId::Official);
        assert_eq!(p2p.master, PathBuf::from("/data/binance/processed/master.parquet"));
        assert_eq!(official.metadata, PathBuf::from("/data/bcb/processed/metadata.json"));
        assert_ne!(p2p.root, official.root);
    }

    #[test]
    fn partition_paths() {
        let paths = StorageLayout::new("/data").source(SourceId::P2p);
        assert_eq!(
            paths.history_partition("ARS").unwrap(),
            PathBuf::from("/data/binance/processed/history/ARS.parquet")
        );
        assert_eq!(
            paths.daily_partition(NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()),
            PathBuf::from("/data/binance/processed/daily/2024-03-05.parquet")
        );
    }

    #[test]
    fn history_partition_stays_inside_history_dir() {
        let paths = StorageLayout::new("/data").source(SourceId::P2p);
        for bad in ["../../x", "BOB/ARS", "..", "", "bob"] {
            let err = paths.history_partition(bad).unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::InvalidInput, "{bad}");
        }
    }

    #[test]
    fn ensure_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let paths = StorageLayout::new(dir.path()).source(SourceId::Official);
        paths.ensure().unwrap();
        assert!(paths.raw_dir.is_dir());
        assert!(paths.daily_dir.is_dir());
    }

    #[test]
    fn ensure_fails_when_root_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocked");
        fs::write(&blocker, b"").unwrap();
        let paths = StorageLayout::new(&blocker).source(SourceId::P2p);
        assert!(paths.ensure().is_err());
    }
}
