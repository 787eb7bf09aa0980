//! p2pfx runner: configuration, freshness gate, source pipelines, reporting.
//!
//! This crate builds on `p2pfx-core` to provide:
//! - TOML sync configuration with per-section defaults
//! - On-disk storage layout per source
//! - The freshness gate and the run counter bookkeeping around it
//! - P2P and official-rate sync cycles
//! - Concurrent execution of both sources with per-source reports
//! - Read-only status and CSV export of the master datasets

pub mod config;
pub mod export;
pub mod gate;
pub mod layout;
pub mod pipeline;
pub mod report;
pub mod runner;
pub mod sources;
pub mod status;

pub use config::{ConfigError, OfficialSettings, P2pSettings, RetrySettings, SyncConfig};
pub use export::export_master_csv;
pub use gate::{FreshnessGate, GateDecision, PendingCommit};
pub use layout::{SourcePaths, StorageLayout};
pub use pipeline::{CycleOutcome, CycleSummary, FailureKind, OfficialPipeline, P2pPipeline, SyncError};
pub use report::{RunReport, SourceOutcome, SourceReport};
pub use runner::{run_sync, run_sync_at, SourceSet};
pub use sources::live_sources;
pub use status::{source_status, MasterState, MetadataState, SourceStatus};
