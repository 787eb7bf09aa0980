//! End-to-end sync cycles against in-memory sources and a temp data root.

mod common;

use common::*;
use p2pfx_core::data::{CanonicalRow, MetadataStore, ParquetDataset, RawCaptureDir};
use p2pfx_core::domain::{OfficialRate, P2pRecord, RunIndex, SourceId};
use p2pfx_runner::{
    run_sync_at, CycleOutcome, FailureKind, OfficialPipeline, P2pPipeline, SourceOutcome,
    SourceSet, StorageLayout, SyncError,
};
use std::collections::HashSet;
use std::fs;

fn official_master(layout: &StorageLayout) -> Vec<OfficialRate> {
    ParquetDataset::<OfficialRate>::new(layout.source(SourceId::Official).master)
        .read()
        .unwrap()
}

// ── Freshness gate ───────────────────────────────────────────────────

#[test]
fn same_as_of_date_skips_fetch_and_leaves_state_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), &["USD"]);
    let layout = StorageLayout::new(dir.path());
    let source = MockTable::new(Some(date(2024, 3, 5)), rate_table("1,08450"));
    let pipeline = OfficialPipeline::new(&source, &config.official, layout.source(SourceId::Official));

    let first = pipeline.run_at(now()).unwrap();
    assert!(matches!(first, CycleOutcome::Completed(_)));
    assert_eq!(source.fetches(), 1);

    let paths = layout.source(SourceId::Official);
    let meta_before = fs::read(&paths.metadata).unwrap();
    let master_before = fs::read(&paths.master).unwrap();
    let raw_before = RawCaptureDir::new(&paths.raw_dir).list().unwrap();

    let second = pipeline.run_at(now()).unwrap();
    assert_eq!(second, CycleOutcome::Skipped { as_of: date(2024, 3, 5) });
    assert_eq!(source.fetches(), 1, "skip must not fetch the table");
    assert_eq!(fs::read(&paths.metadata).unwrap(), meta_before);
    assert_eq!(fs::read(&paths.master).unwrap(), master_before);
    assert_eq!(RawCaptureDir::new(&paths.raw_dir).list().unwrap(), raw_before);
}

#[test]
fn unknown_as_of_uses_processing_date_and_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), &["USD"]);
    let layout = StorageLayout::new(dir.path());
    let source = MockTable::new(None, rate_table("1,08450"));
    let pipeline = OfficialPipeline::new(&source, &config.official, layout.source(SourceId::Official));

    pipeline.run_at(now()).unwrap();
    let first: Vec<(String, f64)> = official_master(&layout)
        .into_iter()
        .map(|r| (r.currency, r.official_exchange_rate))
        .collect();

    let second = pipeline.run_at(now()).unwrap();
    let CycleOutcome::Completed(summary) = second else {
        panic!("unknown date always proceeds");
    };
    assert_eq!(summary.effective_date, date(2024, 3, 5));
    assert_eq!(summary.replaced_rows, first.len());

    let rows = official_master(&layout);
    let again: Vec<(String, f64)> = rows
        .iter()
        .map(|r| (r.currency.clone(), r.official_exchange_rate))
        .collect();
    assert_eq!(again, first);
    assert!(rows.iter().all(|r| r.calendar.date == date(2024, 3, 5)));

    let meta = MetadataStore::new(layout.source(SourceId::Official).metadata)
        .load()
        .unwrap()
        .into_metadata();
    assert_eq!(meta.last_processed_source_date, None);
    assert_eq!(meta.run_index, RunIndex(2));
}

// ── Master merge ─────────────────────────────────────────────────────

#[test]
fn new_batch_replaces_every_row_under_its_key() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), &["USD"]);
    let layout = StorageLayout::new(dir.path());
    let paths = layout.source(SourceId::Official);

    // Master already holds value A for 2024-01-01 plus another day.
    let a = MockTable::new(Some(date(2024, 1, 1)), rate_table("1,10000"));
    OfficialPipeline::new(&a, &config.official, paths.clone())
        .run_at(now())
        .unwrap();
    let other_day = MockTable::new(Some(date(2024, 1, 2)), rate_table("1,20000"));
    OfficialPipeline::new(&other_day, &config.official, paths.clone())
        .run_at(now())
        .unwrap();

    // The source re-publishes 2024-01-01 with value B.
    MetadataStore::new(&paths.metadata)
        .save(&p2pfx_core::data::RunMetadata {
            last_processed_source_date: Some(date(2024, 1, 2)),
            run_index: RunIndex(2),
        })
        .unwrap();
    let b = MockTable::new(Some(date(2024, 1, 1)), rate_table("1,30000"));
    OfficialPipeline::new(&b, &config.official, paths.clone())
        .run_at(now())
        .unwrap();

    let rows = official_master(&layout);
    let jan1: Vec<&OfficialRate> = rows.iter().filter(|r| r.calendar.date == date(2024, 1, 1)).collect();
    assert_eq!(jan1.len(), 3);
    assert!(jan1.iter().all(|r| r.run_index == RunIndex(3)));
    let eur = jan1.iter().find(|r| r.currency == "EUR").unwrap();
    assert_eq!(eur.official_exchange_rate, 1.3);

    let jan2 = rows.iter().filter(|r| r.calendar.date == date(2024, 1, 2)).count();
    assert_eq!(jan2, 3, "other keys are untouched");
}

#[test]
fn corrupt_master_is_replaced_by_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), &["USD"]);
    let layout = StorageLayout::new(dir.path());
    let paths = layout.source(SourceId::Official);
    paths.ensure().unwrap();
    fs::write(&paths.master, b"not a parquet file").unwrap();

    let source = MockTable::new(Some(date(2024, 3, 5)), rate_table("1,08450"));
    let outcome = OfficialPipeline::new(&source, &config.official, paths.clone())
        .run_at(now())
        .unwrap();

    let CycleOutcome::Completed(summary) = outcome else {
        panic!("corrupt master must not fail the cycle");
    };
    assert!(summary.master_was_corrupt);
    let master = official_master(&layout);
    let current = ParquetDataset::<OfficialRate>::new(&paths.current).read().unwrap();
    assert_eq!(master, current);
    assert_eq!(master.len(), 3);
}

fn assert_no_duplicate_rows(rows: &[P2pRecord]) {
    let unique: HashSet<_> = rows.iter().map(CanonicalRow::fingerprint).collect();
    assert_eq!(unique.len(), rows.len(), "duplicate rows in partition");
}

#[test]
fn repeated_p2p_cycles_keep_partitions_duplicate_free() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), &["USD", "EUR"]);
    let layout = StorageLayout::new(dir.path());
    let paths = layout.source(SourceId::P2p);
    let source = MockMarket::new()
        .with_market("USD", vec![advert("USD", "6.95", "a1"), advert("USD", "6.97", "a2")])
        .with_market("EUR", vec![advert("EUR", "7.40", "b1")]);
    let pipeline = P2pPipeline::new(&source, &config.p2p, paths.clone());

    pipeline.run_at(now()).unwrap();
    pipeline.run_at(now()).unwrap();

    let master_ds = ParquetDataset::<P2pRecord>::new(&paths.master);
    let master = master_ds.read().unwrap();
    assert_eq!(master.len(), 6);
    assert_no_duplicate_rows(&master);
    let keys: HashSet<_> = master.iter().map(CanonicalRow::natural_key).collect();
    assert_eq!(keys.len(), 4, "one key per (date, run, currency)");

    let usd = ParquetDataset::<P2pRecord>::new(paths.history_partition("USD").unwrap());
    let eur = ParquetDataset::<P2pRecord>::new(paths.history_partition("EUR").unwrap());
    let daily = ParquetDataset::<P2pRecord>::new(paths.daily_partition(date(2024, 3, 5)));
    let usd_rows = usd.read().unwrap();
    assert_eq!(usd_rows.len(), 4);
    assert_eq!(eur.read().unwrap().len(), 2);
    assert_eq!(daily.read().unwrap().len(), 6);
    for part in [&usd, &eur, &daily] {
        assert_no_duplicate_rows(&part.read().unwrap());
    }

    // Re-merging rows of a run already stored changes nothing.
    let run_two: Vec<P2pRecord> = usd_rows
        .into_iter()
        .filter(|r| r.run_index == RunIndex(2))
        .collect();
    let stats = usd.append_dedup(&run_two).unwrap();
    assert_eq!(stats.removed_rows, run_two.len());
    assert_eq!(stats.total_rows, 4);
    let stats = master_ds.upsert_by_key(&master[3..]).unwrap();
    assert_eq!(stats.total_rows, 6);
}

#[test]
fn path_like_currency_never_leaves_data_root() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("data");
    let config = config(&root, &["USD"]);
    let layout = StorageLayout::new(&root);
    let paths = layout.source(SourceId::P2p);
    let source = MockMarket::new().with_market(
        "USD",
        vec![advert("../../../../escaped", "1.0", "x1"), advert("USD", "6.96", "a1")],
    );

    let outcome = P2pPipeline::new(&source, &config.p2p, paths.clone())
        .run_at(now())
        .unwrap();
    let CycleOutcome::Completed(summary) = outcome else {
        panic!("the valid advert should still complete the cycle");
    };
    assert_eq!(summary.records, 1);
    assert_eq!(summary.discarded, 1);

    assert!(!dir.path().join("ESCAPED.parquet").exists());
    let history: Vec<String> = fs::read_dir(&paths.history_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(history, vec!["USD.parquet".to_string()]);
}

#[test]
fn corrupt_metadata_never_reuses_a_stored_run_index() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), &["USD"]);
    let paths = StorageLayout::new(dir.path()).source(SourceId::P2p);
    let source = MockMarket::new().with_market("USD", vec![advert("USD", "6.96", "a1")]);
    let pipeline = P2pPipeline::new(&source, &config.p2p, paths.clone());

    pipeline.run_at(now()).unwrap();
    pipeline.run_at(now()).unwrap();
    fs::write(&paths.metadata, b"{ truncated").unwrap();

    let CycleOutcome::Completed(summary) = pipeline.run_at(now()).unwrap() else {
        panic!("corrupt metadata must not fail the cycle");
    };
    assert_eq!(summary.run_index, RunIndex(3));

    let master = ParquetDataset::<P2pRecord>::new(&paths.master).read().unwrap();
    let runs: Vec<RunIndex> = master.iter().map(|r| r.run_index).collect();
    assert_eq!(runs, vec![RunIndex(1), RunIndex(2), RunIndex(3)]);
}

// ── Failure containment ──────────────────────────────────────────────

#[test]
fn failing_sub_market_is_contained() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), &["USD", "EUR", "ARS"]);
    let layout = StorageLayout::new(dir.path());
    let source = MockMarket::new()
        .with_market("USD", vec![advert("USD", "1.001", "a1"), advert("USD", "1.002", "a2")])
        .with_market("EUR", vec![advert("EUR", "0.93", "b1")])
        .failing("ARS");

    let outcome = P2pPipeline::new(&source, &config.p2p, layout.source(SourceId::P2p))
        .run_at(now())
        .unwrap();

    let CycleOutcome::Completed(summary) = outcome else {
        panic!("sibling markets should still complete the cycle");
    };
    assert_eq!(summary.records, 3);
    assert_eq!(summary.failed_markets, vec!["BUY ARS".to_string()]);
    assert_eq!(source.attempts.lock().unwrap()["ARS"], 3);

    let paths = layout.source(SourceId::P2p);
    let master = ParquetDataset::<P2pRecord>::new(&paths.master).read().unwrap();
    let mut currencies: Vec<&str> = master.iter().map(|r| r.currency.as_str()).collect();
    currencies.dedup();
    assert_eq!(currencies, vec!["USD", "EUR"]);
    assert!(paths.history_partition("USD").unwrap().exists());
    assert!(!paths.history_partition("ARS").unwrap().exists());
    assert!(paths.daily_partition(date(2024, 3, 5)).exists());
}

#[test]
fn every_market_failing_fails_the_source() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), &["USD", "EUR"]);
    let layout = StorageLayout::new(dir.path());
    let source = MockMarket::new().failing("USD").failing("EUR");

    let err = P2pPipeline::new(&source, &config.p2p, layout.source(SourceId::P2p))
        .run_at(now())
        .unwrap_err();
    assert!(matches!(err, SyncError::AllMarketsFailed { failed: 2, total: 2 }));
    assert_eq!(err.kind(), FailureKind::Network);
    assert!(!layout.source(SourceId::P2p).master.exists());
}

#[test]
fn empty_fetch_reports_no_data_not_skip() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), &["USD"]);
    let layout = StorageLayout::new(dir.path());
    let source = MockMarket::new().with_market("USD", vec![]);

    let outcome = P2pPipeline::new(&source, &config.p2p, layout.source(SourceId::P2p))
        .run_at(now())
        .unwrap();
    assert!(matches!(outcome, CycleOutcome::NoData { .. }));
    assert!(!layout.source(SourceId::P2p).master.exists());
}

#[test]
fn fetch_failure_does_not_advance_processed_date() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), &["USD"]);
    let layout = StorageLayout::new(dir.path());
    let mut source = MockTable::new(Some(date(2024, 3, 5)), rate_table("1,08450"));
    source.fail = true;

    let err = OfficialPipeline::new(&source, &config.official, layout.source(SourceId::Official))
        .run_at(now())
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::Network);

    let meta = MetadataStore::new(layout.source(SourceId::Official).metadata)
        .load()
        .unwrap()
        .into_metadata();
    assert_eq!(meta.last_processed_source_date, None);
    assert_eq!(meta.run_index, RunIndex(1), "the run index is burnt");

    // The next attempt is not skipped.
    source.fail = false;
    let outcome = OfficialPipeline::new(&source, &config.official, layout.source(SourceId::Official))
        .run_at(now())
        .unwrap();
    assert!(matches!(outcome, CycleOutcome::Completed(_)));
}

#[test]
fn master_write_failure_is_fatal_and_keeps_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), &["USD"]);
    let layout = StorageLayout::new(dir.path());
    let paths = layout.source(SourceId::Official);
    paths.ensure().unwrap();
    // A non-empty directory at the temp path makes the master write fail.
    fs::create_dir_all(paths.processed_dir.join("master.parquet.tmp").join("blocker")).unwrap();

    let source = MockTable::new(Some(date(2024, 3, 5)), rate_table("1,08450"));
    let err = OfficialPipeline::new(&source, &config.official, paths.clone())
        .run_at(now())
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::Persistence);

    let meta = MetadataStore::new(&paths.metadata).load().unwrap().into_metadata();
    assert_eq!(meta.last_processed_source_date, None);
    assert!(!paths.current.exists());
}

// ── Both sources ─────────────────────────────────────────────────────

#[test]
fn sources_run_independently() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), &["USD"]);
    let mut market = MockMarket::new().with_market("USD", vec![advert("USD", "1.0", "a1")]);
    market.panic_on_fetch = true;

    let sources = SourceSet {
        p2p: Some(Box::new(market)),
        official: Some(Box::new(MockTable::new(Some(date(2024, 3, 5)), rate_table("1,08450")))),
    };
    let report = run_sync_at(&config, &sources, now());

    assert!(report.has_failures());
    match report.outcome(SourceId::P2p) {
        Some(SourceOutcome::Failed { kind, reason }) => {
            assert_eq!(*kind, FailureKind::Internal);
            assert!(reason.contains("mock market exploded"));
        }
        other => panic!("expected P2P failure, got {other:?}"),
    }
    assert!(matches!(
        report.outcome(SourceId::Official),
        Some(SourceOutcome::Completed(_))
    ));
    assert_eq!(report.total_records(), 3);
}

#[test]
fn omitted_source_is_not_reported() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), &["USD"]);
    let sources = SourceSet {
        p2p: Some(Box::new(
            MockMarket::new().with_market("USD", vec![advert("USD", "1.0", "a1")]),
        )),
        official: None,
    };
    let report = run_sync_at(&config, &sources, now());
    assert_eq!(report.sources.len(), 1);
    assert!(!report.has_failures());
    assert!(!layout_has_official(dir.path()));
}

fn layout_has_official(root: &std::path::Path) -> bool {
    StorageLayout::new(root).source(SourceId::Official).root.exists()
}
