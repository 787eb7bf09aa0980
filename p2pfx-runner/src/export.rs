//! CSV export of a source's master dataset.
//!
//! Columns and their order are the canonical schema's, so an export can be
//! loaded by anything that reads the Parquet master.

use std::path::Path;

use anyhow::{Context, Result};
use p2pfx_core::data::schema::column_names;
use p2pfx_core::data::{CanonicalRow, ParquetDataset};
use p2pfx_core::domain::{OfficialRate, P2pRecord, SourceId};

use crate::layout::StorageLayout;

/// Write rows as CSV (header included) to any writer.
pub fn write_rows_csv<R: CanonicalRow, W: std::io::Write>(rows: &[R], writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(column_names(R::columns()))?;
    for row in rows {
        wtr.write_record(row.cells())?;
    }
    wtr.flush()?;
    Ok(())
}

/// Export the master of `source` to `out`. Returns the number of rows.
pub fn export_master_csv(layout: &StorageLayout, source: SourceId, out: &Path) -> Result<usize> {
    let master = layout.source(source).master;
    match source {
        SourceId::P2p => export_dataset::<P2pRecord>(&master, out),
        SourceId::Official => export_dataset::<OfficialRate>(&master, out),
    }
}

fn export_dataset<R: CanonicalRow>(master: &Path, out: &Path) -> Result<usize> {
    let rows = ParquetDataset::<R>::new(master)
        .read()
        .with_context(|| format!("failed to read master {}", master.display()))?;
    let file = std::fs::File::create(out)
        .with_context(|| format!("failed to create {}", out.display()))?;
    write_rows_csv(&rows, file)?;
    Ok(rows.len())
}
