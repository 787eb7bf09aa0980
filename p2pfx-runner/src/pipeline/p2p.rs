//! P2P advertisement cycle.
//!
//! The venue has no as-of probe, so the gate always proceeds. Fan-out is one
//! sub-market per (side, fiat), each paged sequentially with a pause between
//! calls. A sub-market that exhausts its retries is aborted; rows it already
//! returned are kept and its siblings continue.

use super::{capture_raw, CycleOutcome, CycleSummary, SyncError};
use crate::config::P2pSettings;
use crate::gate::{FreshnessGate, GateDecision};
use crate::layout::SourcePaths;
use chrono::{DateTime, NaiveDate, Utc};
use p2pfx_core::data::{
    normalize_p2p_batch, shape_p2p, FetchRequest, MarketSource, MetadataStore, ParquetDataset,
    RawBatch, RawCaptureDir,
};
use p2pfx_core::domain::{P2pRecord, SourceId};
use std::collections::BTreeMap;

pub struct P2pPipeline<'a> {
    source: &'a dyn MarketSource,
    settings: &'a P2pSettings,
    paths: SourcePaths,
}

/// Raw rows from every sub-market plus the ones that gave up.
struct FanOut {
    batch: RawBatch,
    failed: Vec<String>,
    total: usize,
}

impl<'a> P2pPipeline<'a> {
    pub fn new(source: &'a dyn MarketSource, settings: &'a P2pSettings, paths: SourcePaths) -> Self {
        Self {
            source,
            settings,
            paths,
        }
    }

    pub fn run(&self) -> Result<CycleOutcome, SyncError> {
        self.run_at(Utc::now())
    }

    /// One cycle with `now` as the run start.
    pub fn run_at(&self, now: DateTime<Utc>) -> Result<CycleOutcome, SyncError> {
        self.paths.ensure().map_err(|source| SyncError::Layout {
            path: self.paths.root.clone(),
            source,
        })?;

        let store = MetadataStore::new(&self.paths.metadata);
        let master = ParquetDataset::<P2pRecord>::new(&self.paths.master);
        let pending = match FreshnessGate::new(&store)
            .with_recovery_floor(|| master.max_run_index())
            .check(None, now.date_naive())
            .map_err(SyncError::Metadata)?
        {
            GateDecision::Skip { as_of, .. } => return Ok(CycleOutcome::Skipped { as_of }),
            GateDecision::Proceed(pending) => pending,
        };
        let run_index = pending.run_index();
        let effective_date = pending.effective_date();
        tracing::info!(source = self.source.name(), run = %run_index, "P2P cycle started");

        let fan_out = self.fetch_all();
        if fan_out.batch.is_empty() {
            if fan_out.total > 0 && fan_out.failed.len() == fan_out.total {
                return Err(SyncError::AllMarketsFailed {
                    failed: fan_out.failed.len(),
                    total: fan_out.total,
                });
            }
            tracing::warn!("P2P search returned no advertisements");
            return Ok(CycleOutcome::NoData {
                run_index,
                failed_markets: fan_out.failed,
            });
        }

        let raw_capture = capture_raw(
            &RawCaptureDir::new(&self.paths.raw_dir),
            run_index,
            now,
            effective_date,
            &fan_out.batch,
        );

        let normalized = normalize_p2p_batch(&fan_out.batch);
        let rows = shape_p2p(normalized.quotes, run_index, now);
        if rows.is_empty() {
            tracing::warn!(discarded = normalized.discarded, "no P2P rows survived normalization");
            return Ok(CycleOutcome::NoData {
                run_index,
                failed_markets: fan_out.failed,
            });
        }

        let master = master.upsert_by_key(&rows)?;
        self.write_partitions(&rows)?;
        ParquetDataset::<P2pRecord>::new(&self.paths.current).overwrite(&rows)?;
        pending.commit()?;

        let mut summary = CycleSummary::from_master(SourceId::P2p, run_index, effective_date, &master);
        summary.raw_records = fan_out.batch.len();
        summary.discarded = normalized.discarded;
        summary.records = rows.len();
        summary.failed_markets = fan_out.failed;
        summary.raw_capture = raw_capture;

        tracing::info!(
            run = %run_index,
            records = summary.records,
            master_rows = summary.master_rows,
            failed_markets = summary.failed_markets.len(),
            "P2P cycle completed"
        );
        Ok(CycleOutcome::Completed(summary))
    }

    fn fetch_all(&self) -> FanOut {
        let delay = self.settings.request_delay();
        let mut out = FanOut {
            batch: RawBatch::default(),
            failed: Vec::new(),
            total: 0,
        };
        let mut first_call = true;

        for fiat in self.settings.fiats.iter().map(|f| f.trim().to_uppercase()) {
            if fiat.is_empty() {
                continue;
            }
            for &side in &self.settings.sides {
                out.total += 1;
                let market = format!("{side} {fiat}");

                if !self.source.is_available() {
                    tracing::warn!(%market, "source unavailable; sub-market skipped");
                    out.failed.push(market);
                    continue;
                }

                for page in 1..=self.settings.pages {
                    if !first_call && !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                    first_call = false;

                    let request = FetchRequest {
                        side,
                        fiat: fiat.clone(),
                        page,
                    };
                    match self.source.fetch(&request) {
                        Ok(batch) if batch.is_empty() => break,
                        Ok(batch) => out.batch.extend(batch),
                        Err(e) => {
                            tracing::warn!(%market, page, error = %e, "sub-market aborted");
                            out.failed.push(market);
                            break;
                        }
                    }
                }
            }
        }

        out
    }

    /// Per-currency history and per-day partitions, deduplicated by full row.
    fn write_partitions(&self, rows: &[P2pRecord]) -> Result<(), SyncError> {
        let mut by_currency: BTreeMap<&str, Vec<P2pRecord>> = BTreeMap::new();
        let mut by_day: BTreeMap<NaiveDate, Vec<P2pRecord>> = BTreeMap::new();
        for row in rows {
            by_currency.entry(&row.currency).or_default().push(row.clone());
            by_day.entry(row.calendar.date).or_default().push(row.clone());
        }

        for (currency, part) in &by_currency {
            let path = self
                .paths
                .history_partition(currency)
                .map_err(|source| SyncError::Layout {
                    path: self.paths.history_dir.clone(),
                    source,
                })?;
            ParquetDataset::<P2pRecord>::new(path).append_dedup(part)?;
        }
        for (date, part) in &by_day {
            ParquetDataset::<P2pRecord>::new(self.paths.daily_partition(*date)).append_dedup(part)?;
        }
        Ok(())
    }
}
