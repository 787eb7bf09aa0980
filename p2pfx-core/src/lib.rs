//! p2pfx core: domain records, source adapters, normalization and storage.
//!
//! - Domain types (quotes, canonical rows, run identifiers, calendar columns)
//! - Fetch adapters for the P2P venue and the central bank, behind traits
//! - Retry policy and circuit breaker shared by every adapter
//! - Field normalizer and record shaper
//! - Canonical Parquet schema, dataset store and run metadata

pub mod data;
pub mod domain;
pub mod fingerprint;
