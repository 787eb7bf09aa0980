//! Central-bank rate cycle.
//!
//! The page reports the date its table applies to. When that date was
//! already processed the cycle ends before fetching the table. The master
//! is keyed by date, so a re-published table for the same date replaces the
//! previous rows for it.

use super::{capture_raw, CycleOutcome, CycleSummary, SyncError};
use crate::config::OfficialSettings;
use crate::gate::{FreshnessGate, GateDecision};
use crate::layout::SourcePaths;
use chrono::{DateTime, Utc};
use p2pfx_core::data::{
    extract_official_rates, shape_official, MetadataStore, ParquetDataset, RawCaptureDir,
    TableSource,
};
use p2pfx_core::domain::{OfficialRate, SourceId};

pub struct OfficialPipeline<'a> {
    source: &'a dyn TableSource,
    settings: &'a OfficialSettings,
    paths: SourcePaths,
}

impl<'a> OfficialPipeline<'a> {
    pub fn new(source: &'a dyn TableSource, settings: &'a OfficialSettings, paths: SourcePaths) -> Self {
        Self {
            source,
            settings,
            paths,
        }
    }

    pub fn run(&self) -> Result<CycleOutcome, SyncError> {
        self.run_at(Utc::now())
    }

    pub fn run_at(&self, now: DateTime<Utc>) -> Result<CycleOutcome, SyncError> {
        self.paths.ensure().map_err(|source| SyncError::Layout {
            path: self.paths.root.clone(),
            source,
        })?;

        let as_of = self.source.probe_as_of_date();
        if as_of.is_none() {
            tracing::warn!(source = self.source.name(), "as-of date unknown; using today's date");
        }

        let store = MetadataStore::new(&self.paths.metadata);
        let master = ParquetDataset::<OfficialRate>::new(&self.paths.master);
        let pending = match FreshnessGate::new(&store)
            .with_recovery_floor(|| master.max_run_index())
            .check(as_of, now.date_naive())
            .map_err(SyncError::Metadata)?
        {
            GateDecision::Skip { as_of, .. } => return Ok(CycleOutcome::Skipped { as_of }),
            GateDecision::Proceed(pending) => pending,
        };
        let run_index = pending.run_index();
        let effective_date = pending.effective_date();
        tracing::info!(source = self.source.name(), run = %run_index, date = %effective_date, "official cycle started");

        let batch = self.source.fetch_table_rows()?;
        if batch.is_empty() {
            tracing::warn!("official page carried no rate table");
            return Ok(CycleOutcome::NoData {
                run_index,
                failed_markets: Vec::new(),
            });
        }

        let raw_capture = capture_raw(
            &RawCaptureDir::new(&self.paths.raw_dir),
            run_index,
            now,
            effective_date,
            &batch,
        );

        let normalized = extract_official_rates(&batch, &self.settings.rules());
        let rows = shape_official(normalized.quotes, run_index, effective_date);
        if rows.is_empty() {
            tracing::warn!("no configured currency found in the rate table");
            return Ok(CycleOutcome::NoData {
                run_index,
                failed_markets: Vec::new(),
            });
        }

        let master = master.upsert_by_key(&rows)?;
        ParquetDataset::<OfficialRate>::new(&self.paths.current).overwrite(&rows)?;
        pending.commit()?;

        let mut summary = CycleSummary::from_master(SourceId::Official, run_index, effective_date, &master);
        summary.raw_records = batch.len();
        summary.discarded = normalized.discarded;
        summary.records = rows.len();
        summary.raw_capture = raw_capture;

        tracing::info!(
            run = %run_index,
            date = %effective_date,
            records = summary.records,
            master_rows = summary.master_rows,
            "official cycle completed"
        );
        Ok(CycleOutcome::Completed(summary))
    }
}
