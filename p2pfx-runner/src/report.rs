//! Per-run report: one outcome per source.

use crate::pipeline::{CycleOutcome, CycleSummary, FailureKind, SyncError};
use chrono::{DateTime, NaiveDate, Utc};
use p2pfx_core::domain::{RunIndex, SourceId};
use serde::Serialize;
use std::fmt::Write as _;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceOutcome {
    Skipped {
        as_of: NaiveDate,
    },
    NoData {
        run_index: RunIndex,
        failed_markets: Vec<String>,
    },
    Completed(CycleSummary),
    Failed {
        kind: FailureKind,
        reason: String,
    },
}

impl SourceOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, SourceOutcome::Failed { .. })
    }

    pub fn records(&self) -> usize {
        match self {
            SourceOutcome::Completed(summary) => summary.records,
            _ => 0,
        }
    }
}

impl From<Result<CycleOutcome, SyncError>> for SourceOutcome {
    fn from(result: Result<CycleOutcome, SyncError>) -> Self {
        match result {
            Ok(CycleOutcome::Skipped { as_of }) => SourceOutcome::Skipped { as_of },
            Ok(CycleOutcome::NoData {
                run_index,
                failed_markets,
            }) => SourceOutcome::NoData {
                run_index,
                failed_markets,
            },
            Ok(CycleOutcome::Completed(summary)) => SourceOutcome::Completed(summary),
            Err(e) => SourceOutcome::Failed {
                kind: e.kind(),
                reason: e.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceReport {
    pub source: SourceId,
    pub outcome: SourceOutcome,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub sources: Vec<SourceReport>,
}

impl RunReport {
    pub fn has_failures(&self) -> bool {
        self.sources.iter().any(|s| s.outcome.is_failure())
    }

    pub fn outcome(&self, source: SourceId) -> Option<&SourceOutcome> {
        self.sources
            .iter()
            .find(|s| s.source == source)
            .map(|s| &s.outcome)
    }

    pub fn total_records(&self) -> usize {
        self.sources.iter().map(|s| s.outcome.records()).sum()
    }

    /// Fixed-width summary table for terminal output.
    pub fn render_table(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{:<10} {:<10} {:>6} {:>8} {:>8}  DETAIL", "SOURCE", "STATUS", "RUN", "RECORDS", "MASTER");
        let _ = writeln!(out, "{}", "-".repeat(64));

        for report in &self.sources {
            let source = report.source.as_str();
            let line = match &report.outcome {
                SourceOutcome::Skipped { as_of } => format!(
                    "{source:<10} {:<10} {:>6} {:>8} {:>8}  already processed {as_of}",
                    "skipped", "-", "-", "-"
                ),
                SourceOutcome::NoData {
                    run_index,
                    failed_markets,
                } => format!(
                    "{source:<10} {:<10} {:>6} {:>8} {:>8}  no data produced{}",
                    "no-data",
                    run_index.to_string(),
                    0,
                    "-",
                    failed_suffix(failed_markets)
                ),
                SourceOutcome::Completed(s) => format!(
                    "{source:<10} {:<10} {:>6} {:>8} {:>8}  {} ({} discarded){}",
                    "ok",
                    s.run_index.to_string(),
                    s.records,
                    s.master_rows,
                    s.effective_date,
                    s.discarded,
                    failed_suffix(&s.failed_markets)
                ),
                SourceOutcome::Failed { kind, reason } => format!(
                    "{source:<10} {:<10} {:>6} {:>8} {:>8}  {kind:?}: {reason}",
                    "FAILED", "-", "-", "-"
                ),
            };
            let _ = writeln!(out, "{line}");
        }
        out
    }
}

fn failed_suffix(failed: &[String]) -> String {
    if failed.is_empty() {
        String::new()
    } else {
        format!("; failed sub-markets: {}", failed.join(", "))
    }
}
