//! Conversion between canonical rows and Polars DataFrames.
//!
//! `CanonicalRow` is the seam the dataset store is generic over: it knows the
//! row's column set, its natural key for replace-by-key upserts, and its
//! full-row fingerprint for append-and-dedup partitions.

use super::schema::{self, ColumnSpec, OFFICIAL_COLUMNS, P2P_COLUMNS};
use super::store::StoreError;
use crate::domain::{CalendarFields, ClockFields, OfficialRate, P2pRecord, RunIndex, Side};
use crate::fingerprint::RowHasher;
use chrono::{DateTime, NaiveDate, Utc};
use polars::prelude::*;
use std::fmt::Debug;
use std::hash::Hash;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// A row type that can be persisted by `ParquetDataset`.
pub trait CanonicalRow: Clone + Send + Sync + Sized + 'static {
    /// Natural key used by replace-by-key upserts.
    type Key: Clone + Eq + Hash + Ord + Debug;

    fn columns() -> &'static [ColumnSpec];

    fn natural_key(&self) -> Self::Key;

    fn run_index(&self) -> RunIndex;

    /// Calendar date the row belongs to (daily partitioning).
    fn date(&self) -> NaiveDate;

    fn fingerprint(&self) -> blake3::Hash;

    fn to_frame(rows: &[Self]) -> Result<DataFrame, StoreError>;

    fn from_frame(df: &DataFrame) -> Result<Vec<Self>, StoreError>;

    /// Cell values in column order, for text exports.
    fn cells(&self) -> Vec<String>;
}

// ── P2P ─────────────────────────────────────────────────────────────

impl CanonicalRow for P2pRecord {
    type Key = (NaiveDate, RunIndex, String);

    fn columns() -> &'static [ColumnSpec] {
        P2P_COLUMNS
    }

    fn natural_key(&self) -> Self::Key {
        (self.calendar.date, self.run_index, self.currency.clone())
    }

    fn run_index(&self) -> RunIndex {
        self.run_index
    }

    fn date(&self) -> NaiveDate {
        self.calendar.date
    }

    fn fingerprint(&self) -> blake3::Hash {
        let observed_at = self.observed_at.map(format_timestamp);
        let mut h = RowHasher::new();
        h.int(self.run_index.0 as i64)
            .opt_str(observed_at.as_deref())
            .str(&self.clock.scrape_datetime)
            .str(&self.calendar.date_key())
            .str(&self.clock.time)
            .int(self.calendar.year as i64)
            .int(self.calendar.month as i64)
            .int(self.calendar.day as i64)
            .str(&self.calendar.year_month)
            .str(&self.currency)
            .str(self.side.as_str())
            .opt_str(self.asset.as_deref())
            .f64(self.price)
            .opt_f64(self.min_amount)
            .opt_f64(self.max_amount)
            .opt_str(self.merchant_id.as_deref())
            .opt_str(self.merchant_name.as_deref())
            .opt_f64(self.finish_rate)
            .opt_f64(self.positive_rate)
            .opt_str(self.payment_methods.as_deref());
        h.finish()
    }

    fn to_frame(rows: &[Self]) -> Result<DataFrame, StoreError> {
        let run_index: Vec<u64> = rows.iter().map(|r| r.run_index.0).collect();
        let observed_at: Vec<Option<String>> = rows
            .iter()
            .map(|r| r.observed_at.map(format_timestamp))
            .collect();
        let scrape_datetime: Vec<String> =
            rows.iter().map(|r| r.clock.scrape_datetime.clone()).collect();
        let date: Vec<String> = rows.iter().map(|r| r.calendar.date_key()).collect();
        let time: Vec<String> = rows.iter().map(|r| r.clock.time.clone()).collect();
        let year: Vec<i32> = rows.iter().map(|r| r.calendar.year).collect();
        let month: Vec<i32> = rows.iter().map(|r| r.calendar.month as i32).collect();
        let day: Vec<i32> = rows.iter().map(|r| r.calendar.day as i32).collect();
        let year_month: Vec<String> = rows.iter().map(|r| r.calendar.year_month.clone()).collect();
        let currency: Vec<String> = rows.iter().map(|r| r.currency.clone()).collect();
        let side: Vec<String> = rows.iter().map(|r| r.side.as_str().to_string()).collect();
        let asset: Vec<Option<String>> = rows.iter().map(|r| r.asset.clone()).collect();
        let price: Vec<f64> = rows.iter().map(|r| r.price).collect();
        let min_amount: Vec<Option<f64>> = rows.iter().map(|r| r.min_amount).collect();
        let max_amount: Vec<Option<f64>> = rows.iter().map(|r| r.max_amount).collect();
        let merchant_id: Vec<Option<String>> = rows.iter().map(|r| r.merchant_id.clone()).collect();
        let merchant_name: Vec<Option<String>> =
            rows.iter().map(|r| r.merchant_name.clone()).collect();
        let finish_rate: Vec<Option<f64>> = rows.iter().map(|r| r.finish_rate).collect();
        let positive_rate: Vec<Option<f64>> = rows.iter().map(|r| r.positive_rate).collect();
        let payment_methods: Vec<Option<String>> =
            rows.iter().map(|r| r.payment_methods.clone()).collect();

        let df = DataFrame::new(vec![
            Column::new("run_index".into(), run_index),
            Column::new("observed_at".into(), observed_at),
            Column::new("scrape_datetime".into(), scrape_datetime),
            Column::new("date".into(), date),
            Column::new("time".into(), time),
            Column::new("year".into(), year),
            Column::new("month".into(), month),
            Column::new("day".into(), day),
            Column::new("year_month".into(), year_month),
            Column::new("currency".into(), currency),
            Column::new("side".into(), side),
            Column::new("asset".into(), asset),
            Column::new("price".into(), price),
            Column::new("min_amount".into(), min_amount),
            Column::new("max_amount".into(), max_amount),
            Column::new("merchant_id".into(), merchant_id),
            Column::new("merchant_name".into(), merchant_name),
            Column::new("finish_rate".into(), finish_rate),
            Column::new("positive_rate".into(), positive_rate),
            Column::new("payment_methods".into(), payment_methods),
        ])
        .map_err(|e| StoreError::Parquet(format!("dataframe creation: {e}")))?;

        schema::validate(&df, P2P_COLUMNS)?;
        Ok(df)
    }

    fn from_frame(df: &DataFrame) -> Result<Vec<Self>, StoreError> {
        schema::validate(df, P2P_COLUMNS)?;

        let run_index = u64_col(df, "run_index")?;
        let observed_at = str_col(df, "observed_at")?;
        let scrape_datetime = str_col(df, "scrape_datetime")?;
        let date = str_col(df, "date")?;
        let time = str_col(df, "time")?;
        let year = i32_col(df, "year")?;
        let month = i32_col(df, "month")?;
        let day = i32_col(df, "day")?;
        let year_month = str_col(df, "year_month")?;
        let currency = str_col(df, "currency")?;
        let side = str_col(df, "side")?;
        let asset = str_col(df, "asset")?;
        let price = f64_col(df, "price")?;
        let min_amount = f64_col(df, "min_amount")?;
        let max_amount = f64_col(df, "max_amount")?;
        let merchant_id = str_col(df, "merchant_id")?;
        let merchant_name = str_col(df, "merchant_name")?;
        let finish_rate = f64_col(df, "finish_rate")?;
        let positive_rate = f64_col(df, "positive_rate")?;
        let payment_methods = str_col(df, "payment_methods")?;

        let mut rows = Vec::with_capacity(df.height());
        for i in 0..df.height() {
            let observed_at = match observed_at.get(i) {
                Some(s) => Some(parse_timestamp(s, i)?),
                None => None,
            };
            let side = required(side.get(i), "side", i)?;
            let side: Side = side
                .parse()
                .map_err(|e| StoreError::Invalid(format!("row {i}: {e}")))?;

            rows.push(P2pRecord {
                run_index: RunIndex(required(run_index.get(i), "run_index", i)?),
                observed_at,
                clock: ClockFields {
                    scrape_datetime: required(scrape_datetime.get(i), "scrape_datetime", i)?
                        .to_string(),
                    time: required(time.get(i), "time", i)?.to_string(),
                },
                calendar: read_calendar(
                    required(date.get(i), "date", i)?,
                    required(year.get(i), "year", i)?,
                    required(month.get(i), "month", i)?,
                    required(day.get(i), "day", i)?,
                    required(year_month.get(i), "year_month", i)?,
                    i,
                )?,
                currency: required(currency.get(i), "currency", i)?.to_string(),
                side,
                asset: asset.get(i).map(str::to_string),
                price: required(price.get(i), "price", i)?,
                min_amount: min_amount.get(i),
                max_amount: max_amount.get(i),
                merchant_id: merchant_id.get(i).map(str::to_string),
                merchant_name: merchant_name.get(i).map(str::to_string),
                finish_rate: finish_rate.get(i),
                positive_rate: positive_rate.get(i),
                payment_methods: payment_methods.get(i).map(str::to_string),
            });
        }

        Ok(rows)
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.run_index.0.to_string(),
            self.observed_at.map(format_timestamp).unwrap_or_default(),
            self.clock.scrape_datetime.clone(),
            self.calendar.date_key(),
            self.clock.time.clone(),
            self.calendar.year.to_string(),
            self.calendar.month.to_string(),
            self.calendar.day.to_string(),
            self.calendar.year_month.clone(),
            self.currency.clone(),
            self.side.to_string(),
            self.asset.clone().unwrap_or_default(),
            self.price.to_string(),
            opt_cell(self.min_amount),
            opt_cell(self.max_amount),
            self.merchant_id.clone().unwrap_or_default(),
            self.merchant_name.clone().unwrap_or_default(),
            opt_cell(self.finish_rate),
            opt_cell(self.positive_rate),
            self.payment_methods.clone().unwrap_or_default(),
        ]
    }
}

// ── Official rates ──────────────────────────────────────────────────

impl CanonicalRow for OfficialRate {
    type Key = NaiveDate;

    fn columns() -> &'static [ColumnSpec] {
        OFFICIAL_COLUMNS
    }

    fn natural_key(&self) -> Self::Key {
        self.calendar.date
    }

    fn run_index(&self) -> RunIndex {
        self.run_index
    }

    fn date(&self) -> NaiveDate {
        self.calendar.date
    }

    fn fingerprint(&self) -> blake3::Hash {
        let mut h = RowHasher::new();
        h.int(self.run_index.0 as i64)
            .str(&self.calendar.date_key())
            .int(self.calendar.year as i64)
            .int(self.calendar.month as i64)
            .int(self.calendar.day as i64)
            .str(&self.calendar.year_month)
            .str(&self.currency)
            .f64(self.official_exchange_rate);
        h.finish()
    }

    fn to_frame(rows: &[Self]) -> Result<DataFrame, StoreError> {
        let run_index: Vec<u64> = rows.iter().map(|r| r.run_index.0).collect();
        let date: Vec<String> = rows.iter().map(|r| r.calendar.date_key()).collect();
        let year: Vec<i32> = rows.iter().map(|r| r.calendar.year).collect();
        let month: Vec<i32> = rows.iter().map(|r| r.calendar.month as i32).collect();
        let day: Vec<i32> = rows.iter().map(|r| r.calendar.day as i32).collect();
        let year_month: Vec<String> = rows.iter().map(|r| r.calendar.year_month.clone()).collect();
        let currency: Vec<String> = rows.iter().map(|r| r.currency.clone()).collect();
        let rate: Vec<f64> = rows.iter().map(|r| r.official_exchange_rate).collect();

        let df = DataFrame::new(vec![
            Column::new("run_index".into(), run_index),
            Column::new("date".into(), date),
            Column::new("year".into(), year),
            Column::new("month".into(), month),
            Column::new("day".into(), day),
            Column::new("year_month".into(), year_month),
            Column::new("currency".into(), currency),
            Column::new("official_exchange_rate".into(), rate),
        ])
        .map_err(|e| StoreError::Parquet(format!("dataframe creation: {e}")))?;

        schema::validate(&df, OFFICIAL_COLUMNS)?;
        Ok(df)
    }

    fn from_frame(df: &DataFrame) -> Result<Vec<Self>, StoreError> {
        schema::validate(df, OFFICIAL_COLUMNS)?;

        let run_index = u64_col(df, "run_index")?;
        let date = str_col(df, "date")?;
        let year = i32_col(df, "year")?;
        let month = i32_col(df, "month")?;
        let day = i32_col(df, "day")?;
        let year_month = str_col(df, "year_month")?;
        let currency = str_col(df, "currency")?;
        let rate = f64_col(df, "official_exchange_rate")?;

        let mut rows = Vec::with_capacity(df.height());
        for i in 0..df.height() {
            rows.push(OfficialRate {
                run_index: RunIndex(required(run_index.get(i), "run_index", i)?),
                calendar: read_calendar(
                    required(date.get(i), "date", i)?,
                    required(year.get(i), "year", i)?,
                    required(month.get(i), "month", i)?,
                    required(day.get(i), "day", i)?,
                    required(year_month.get(i), "year_month", i)?,
                    i,
                )?,
                currency: required(currency.get(i), "currency", i)?.to_string(),
                official_exchange_rate: required(rate.get(i), "official_exchange_rate", i)?,
            });
        }

        Ok(rows)
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.run_index.0.to_string(),
            self.calendar.date_key(),
            self.calendar.year.to_string(),
            self.calendar.month.to_string(),
            self.calendar.day.to_string(),
            self.calendar.year_month.clone(),
            self.currency.clone(),
            self.official_exchange_rate.to_string(),
        ]
    }
}

// ── Column helpers ──────────────────────────────────────────────────

fn map_polars(e: PolarsError) -> StoreError {
    StoreError::Parquet(format!("column read: {e}"))
}

fn str_col<'a>(df: &'a DataFrame, name: &str) -> Result<&'a StringChunked, StoreError> {
    df.column(name).map_err(map_polars)?.str().map_err(map_polars)
}

fn f64_col<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Float64Chunked, StoreError> {
    df.column(name).map_err(map_polars)?.f64().map_err(map_polars)
}

fn i32_col<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Int32Chunked, StoreError> {
    df.column(name).map_err(map_polars)?.i32().map_err(map_polars)
}

fn u64_col<'a>(df: &'a DataFrame, name: &str) -> Result<&'a UInt64Chunked, StoreError> {
    df.column(name).map_err(map_polars)?.u64().map_err(map_polars)
}

fn required<T>(value: Option<T>, column: &str, row: usize) -> Result<T, StoreError> {
    value.ok_or_else(|| StoreError::Invalid(format!("null {column} at row {row}")))
}

fn read_calendar(
    date: &str,
    year: i32,
    month: i32,
    day: i32,
    year_month: &str,
    row: usize,
) -> Result<CalendarFields, StoreError> {
    let date = NaiveDate::parse_from_str(date, DATE_FORMAT)
        .map_err(|e| StoreError::Invalid(format!("row {row}: bad date '{date}': {e}")))?;
    let month = u32::try_from(month)
        .map_err(|_| StoreError::Invalid(format!("row {row}: negative month")))?;
    let day =
        u32::try_from(day).map_err(|_| StoreError::Invalid(format!("row {row}: negative day")))?;
    Ok(CalendarFields {
        date,
        year,
        month,
        day,
        year_month: year_month.to_string(),
    })
}

fn parse_timestamp(s: &str, row: usize) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StoreError::Invalid(format!("row {row}: bad observed_at '{s}': {e}")))
}

pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn opt_cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}
