//! Canonical column sets.
//!
//! Downstream consumers (dashboard exports, analytics) rely on these exact
//! names, types and order. Changing any of them is a breaking change to the
//! persisted layout and must bump `SCHEMA_VERSION`.

use polars::prelude::*;

pub const SCHEMA_VERSION: u32 = 1;

/// Physical type of a canonical column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    UInt64,
    Int32,
    Float64,
    String,
}

impl ColumnType {
    pub fn dtype(self) -> DataType {
        match self {
            ColumnType::UInt64 => DataType::UInt64,
            ColumnType::Int32 => DataType::Int32,
            ColumnType::Float64 => DataType::Float64,
            ColumnType::String => DataType::String,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub kind: ColumnType,
}

const fn col(name: &'static str, kind: ColumnType) -> ColumnSpec {
    ColumnSpec { name, kind }
}

/// P2P advertisement rows: master, current snapshot, history and daily partitions.
pub const P2P_COLUMNS: &[ColumnSpec] = &[
    col("run_index", ColumnType::UInt64),
    col("observed_at", ColumnType::String),
    col("scrape_datetime", ColumnType::String),
    col("date", ColumnType::String),
    col("time", ColumnType::String),
    col("year", ColumnType::Int32),
    col("month", ColumnType::Int32),
    col("day", ColumnType::Int32),
    col("year_month", ColumnType::String),
    col("currency", ColumnType::String),
    col("side", ColumnType::String),
    col("asset", ColumnType::String),
    col("price", ColumnType::Float64),
    col("min_amount", ColumnType::Float64),
    col("max_amount", ColumnType::Float64),
    col("merchant_id", ColumnType::String),
    col("merchant_name", ColumnType::String),
    col("finish_rate", ColumnType::Float64),
    col("positive_rate", ColumnType::Float64),
    col("payment_methods", ColumnType::String),
];

/// Official exchange-rate rows: master and current snapshot.
pub const OFFICIAL_COLUMNS: &[ColumnSpec] = &[
    col("run_index", ColumnType::UInt64),
    col("date", ColumnType::String),
    col("year", ColumnType::Int32),
    col("month", ColumnType::Int32),
    col("day", ColumnType::Int32),
    col("year_month", ColumnType::String),
    col("currency", ColumnType::String),
    col("official_exchange_rate", ColumnType::Float64),
];

pub fn column_names(columns: &[ColumnSpec]) -> Vec<&'static str> {
    columns.iter().map(|c| c.name).collect()
}

/// Polars schema for a column set.
pub fn schema(columns: &[ColumnSpec]) -> Schema {
    Schema::from_iter(
        columns
            .iter()
            .map(|c| Field::new(c.name.into(), c.kind.dtype())),
    )
}

/// Validate a DataFrame against a column set: presence, type, then order.
pub fn validate(df: &DataFrame, columns: &[ColumnSpec]) -> Result<(), SchemaError> {
    for spec in columns {
        let column = df
            .column(spec.name)
            .map_err(|_| SchemaError::MissingColumn(spec.name.to_string()))?;
        let expected = spec.kind.dtype();
        if column.dtype() != &expected {
            return Err(SchemaError::TypeMismatch {
                column: spec.name.to_string(),
                expected,
                actual: column.dtype().clone(),
            });
        }
    }

    let actual: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();
    let expected: Vec<String> = columns.iter().map(|c| c.name.to_string()).collect();
    if actual != expected {
        return Err(SchemaError::OrderMismatch { expected, actual });
    }

    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("Type mismatch in column {column}: expected {expected:?}, got {actual:?}")]
    TypeMismatch {
        column: String,
        expected: DataType,
        actual: DataType,
    },

    #[error("Column order mismatch: expected {expected:?}, got {actual:?}")]
    OrderMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },
}
