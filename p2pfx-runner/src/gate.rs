//! Freshness gate: decides whether a cycle runs at all.
//!
//! `FreshnessGate::check` is the CHECK state. It either ends the cycle
//! (`GateDecision::Skip`) or hands back a `PendingCommit`, which is the only
//! way to advance the last processed date. The commit consumes itself, so a
//! cycle can record success at most once, and only after the caller has
//! finished its writes.

use chrono::NaiveDate;
use p2pfx_core::data::{MetadataLoad, MetadataStore, RunMetadata, StoreError};
use p2pfx_core::domain::RunIndex;

type RunFloor<'a> = Box<dyn Fn() -> Option<RunIndex> + 'a>;

pub struct FreshnessGate<'a> {
    store: &'a MetadataStore,
    recovery_floor: Option<RunFloor<'a>>,
}

#[derive(Debug)]
pub enum GateDecision {
    /// The source reports the date already processed. Nothing was written.
    Skip { as_of: NaiveDate, meta: RunMetadata },
    Proceed(PendingCommit),
}

/// A cycle that passed the gate. Its run index is already persisted.
#[derive(Debug)]
#[must_use = "dropping a PendingCommit leaves the processed date unchanged"]
pub struct PendingCommit {
    store: MetadataStore,
    meta: RunMetadata,
    as_of: Option<NaiveDate>,
    effective_date: NaiveDate,
}

impl<'a> FreshnessGate<'a> {
    pub fn new(store: &'a MetadataStore) -> Self {
        Self {
            store,
            recovery_floor: None,
        }
    }

    /// Highest run index already persisted elsewhere. Consulted only when
    /// the metadata file is corrupt, so a reset counter never reuses an index.
    pub fn with_recovery_floor<F>(mut self, floor: F) -> Self
    where
        F: Fn() -> Option<RunIndex> + 'a,
    {
        self.recovery_floor = Some(Box::new(floor));
        self
    }

    fn load(&self) -> Result<RunMetadata, StoreError> {
        match self.store.load()? {
            MetadataLoad::Corrupt { .. } => {
                let mut meta = RunMetadata::default();
                if let Some(floor) = self.recovery_floor.as_ref().and_then(|f| f()) {
                    tracing::warn!(run = %floor, "metadata corrupt; run counter resumes after stored rows");
                    meta.run_index = floor;
                }
                Ok(meta)
            }
            other => Ok(other.into_metadata()),
        }
    }

    /// `as_of` is the source's self-reported date (`None` when unknown or
    /// when the source has no probe). `today` stands in for it as the
    /// effective record date when it is unknown.
    pub fn check(&self, as_of: Option<NaiveDate>, today: NaiveDate) -> Result<GateDecision, StoreError> {
        let meta = self.load()?;

        if let Some(date) = as_of {
            if meta.last_processed_source_date == Some(date) {
                tracing::info!(as_of = %date, "source already processed; skipping");
                return Ok(GateDecision::Skip { as_of: date, meta });
            }
        }

        let meta = self.store.next_run_index(meta)?;
        tracing::info!(run = %meta.run_index, as_of = ?as_of, "proceeding");
        Ok(GateDecision::Proceed(PendingCommit {
            store: self.store.clone(),
            meta,
            as_of,
            effective_date: as_of.unwrap_or(today),
        }))
    }
}

impl PendingCommit {
    pub fn run_index(&self) -> RunIndex {
        self.meta.run_index
    }

    pub fn as_of(&self) -> Option<NaiveDate> {
        self.as_of
    }

    /// Date stamped on records and raw captures.
    pub fn effective_date(&self) -> NaiveDate {
        self.effective_date
    }

    /// Record a successful cycle. Only a known as-of date is persisted.
    pub fn commit(self) -> Result<RunMetadata, StoreError> {
        match self.as_of {
            Some(date) => self.store.record_processed_date(self.meta, date),
            None => Ok(self.meta),
        }
    }
}
