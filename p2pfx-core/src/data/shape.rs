//! Record shaper: typed quotes in, canonical rows out.
//!
//! Calendar columns come from the quote's own timestamp. The run's start
//! instant is used only for quotes that arrived without one. Exact duplicate
//! rows within the batch are dropped, first occurrence wins.

use super::store::dedup_rows;
use crate::domain::{
    CalendarFields, ClockFields, OfficialQuote, OfficialRate, P2pQuote, P2pRecord, RunIndex,
};
use chrono::{DateTime, NaiveDate, Utc};

pub fn shape_p2p(quotes: Vec<P2pQuote>, run_index: RunIndex, fallback: DateTime<Utc>) -> Vec<P2pRecord> {
    let mut missing_ts = 0usize;
    let rows: Vec<P2pRecord> = quotes
        .into_iter()
        .map(|q| {
            let at = q.observed_at.unwrap_or_else(|| {
                missing_ts += 1;
                fallback
            });
            P2pRecord {
                run_index,
                observed_at: q.observed_at,
                clock: ClockFields::from_instant(at),
                calendar: CalendarFields::from_instant(at),
                currency: q.currency,
                side: q.side,
                asset: q.asset,
                price: q.price,
                min_amount: q.min_amount,
                max_amount: q.max_amount,
                merchant_id: q.merchant_id,
                merchant_name: q.merchant_name,
                finish_rate: q.finish_rate,
                positive_rate: q.positive_rate,
                payment_methods: q.payment_methods,
            }
        })
        .collect();

    if missing_ts > 0 {
        tracing::debug!(missing_ts, "calendar derived from run start for quotes without a timestamp");
    }
    dedup_rows(rows)
}

/// Every official row of a cycle carries the source's as-of `date`.
pub fn shape_official(quotes: Vec<OfficialQuote>, run_index: RunIndex, date: NaiveDate) -> Vec<OfficialRate> {
    let calendar = CalendarFields::from_date(date);
    let rows = quotes
        .into_iter()
        .map(|q| OfficialRate {
            run_index,
            calendar: calendar.clone(),
            currency: q.currency,
            official_exchange_rate: q.rate,
        })
        .collect();
    dedup_rows(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Side;
    use chrono::TimeZone;

    fn quote(observed_at: Option<DateTime<Utc>>, price: f64) -> P2pQuote {
        P2pQuote {
            observed_at,
            currency: "BOB".into(),
            side: Side::Buy,
            asset: Some("USDT".into()),
            price,
            min_amount: None,
            max_amount: Some(500.0),
            merchant_id: Some("m1".into()),
            merchant_name: None,
            finish_rate: None,
            positive_rate: None,
            payment_methods: None,
        }
    }

    #[test]
    fn calendar_comes_from_observed_at() {
        let observed = Utc.with_ymd_and_hms(2024, 2, 29, 23, 58, 1).unwrap();
        let run_start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 1, 0).unwrap();
        let rows = shape_p2p(vec![quote(Some(observed), 9.9)], RunIndex(7), run_start);
        assert_eq!(rows[0].calendar.date_key(), "2024-02-29");
        assert_eq!(rows[0].clock.time, "23:58");
        assert_eq!(rows[0].run_index, RunIndex(7));
    }

    #[test]
    fn fallback_only_when_timestamp_missing() {
        let run_start = Utc.with_ymd_and_hms(2024, 3, 1, 8, 15, 0).unwrap();
        let rows = shape_p2p(vec![quote(None, 9.9)], RunIndex(1), run_start);
        assert_eq!(rows[0].calendar.date_key(), "2024-03-01");
        assert_eq!(rows[0].observed_at, None);
        assert_eq!(rows[0].max_amount, Some(500.0), "business values pass through");
    }

    #[test]
    fn exact_duplicates_removed_in_order() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 8, 15, 0).unwrap();
        let rows = shape_p2p(
            vec![quote(Some(ts), 1.0), quote(Some(ts), 2.0), quote(Some(ts), 1.0)],
            RunIndex(1),
            ts,
        );
        let prices: Vec<f64> = rows.iter().map(|r| r.price).collect();
        assert_eq!(prices, vec![1.0, 2.0]);
    }

    #[test]
    fn official_rows_share_the_as_of_date() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        let quotes = vec![
            OfficialQuote { currency: "BOB".into(), rate: 6.96 },
            OfficialQuote { currency: "EUR".into(), rate: 1.08 },
        ];
        let rows = shape_official(quotes, RunIndex(3), date);
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.calendar.date == date && r.calendar.year_month == "2024-03"));
    }
}
