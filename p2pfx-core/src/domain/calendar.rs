//! Calendar columns derived from a record's authoritative timestamp.
//!
//! Every derived field is a pure function of one `NaiveDate` (or one UTC
//! instant for the intraday columns), so the columns can never disagree
//! with each other.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// `date`, `year`, `month`, `day`, `year_month`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CalendarFields {
    pub date: NaiveDate,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub year_month: String,
}

impl CalendarFields {
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            date,
            year: date.year(),
            month: date.month(),
            day: date.day(),
            year_month: date.format("%Y-%m").to_string(),
        }
    }

    pub fn from_instant(ts: DateTime<Utc>) -> Self {
        Self::from_date(ts.date_naive())
    }

    /// `YYYY-MM-DD`, the string form used in file names and natural keys.
    pub fn date_key(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }
}

/// Minute-resolution intraday columns: `scrape_datetime` and `time`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClockFields {
    pub scrape_datetime: String,
    pub time: String,
}

impl ClockFields {
    pub fn from_instant(ts: DateTime<Utc>) -> Self {
        Self {
            scrape_datetime: ts.format("%Y-%m-%d %H:%M").to_string(),
            time: ts.format("%H:%M").to_string(),
        }
    }
}
