//! Banco Central de Bolivia "último" page adapter.
//!
//! The page states its as-of date in Spanish prose ("5 de marzo de 2024")
//! and publishes the rates as an HTML table with five columns. Parsing is
//! deliberately shallow: regexes over the markup, no DOM.

use super::http::HttpTransport;
use super::provider::{stamp, FetchError, FetchOrigin, RawBatch, RawRecord, TableSource};
use super::retry::RetryPolicy;
use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

pub const DEFAULT_URL: &str = "https://www.bcb.gob.bo/librerias/indicadores/otras/ultimo.php";

/// Payload keys of one table row, in column order.
pub const TABLE_KEYS: [&str; 5] = [
    "pais",
    "unidad_monetaria",
    "currency",
    "tipo_cambio_bs",
    "tipo_cambio_me",
];

pub struct CentralBankProvider {
    transport: HttpTransport,
    policy: RetryPolicy,
    url: String,
}

impl CentralBankProvider {
    pub fn new(transport: HttpTransport, policy: RetryPolicy) -> Self {
        Self {
            transport,
            policy,
            url: DEFAULT_URL.to_string(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    fn fetch_page(&self) -> Result<String, FetchError> {
        let headers = [
            ("Accept-Language", "es-ES,es;q=0.9"),
            ("Referer", "https://www.bcb.gob.bo/"),
        ];
        self.policy
            .run("official page", |_| self.transport.get_text(&self.url, &headers))
    }
}

impl TableSource for CentralBankProvider {
    fn name(&self) -> &str {
        "BCB official rates"
    }

    fn probe_as_of_date(&self) -> Option<NaiveDate> {
        match self.fetch_page() {
            Ok(html) => {
                let date = parse_as_of_date(&html);
                if date.is_none() {
                    tracing::warn!("official page carries no recognizable as-of date");
                }
                date
            }
            Err(e) => {
                tracing::warn!(error = %e, "as-of probe failed");
                None
            }
        }
    }

    fn fetch_table_rows(&self) -> Result<RawBatch, FetchError> {
        let html = self.fetch_page()?;
        let batch = parse_rate_table(&html, Utc::now());
        tracing::debug!(rows = batch.len(), "fetched official rate table");
        Ok(batch)
    }
}

fn date_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(\d{1,2})\s+de\s+([A-Za-zÁÉÍÓÚáéíóú]+)\s+(?:de\s+)?(\d{4})")
            .unwrap_or_else(|e| panic!("invalid date regex: {e}"))
    })
}

fn spanish_month(name: &str) -> Option<u32> {
    let month = match name.to_lowercase().as_str() {
        "enero" => 1,
        "febrero" => 2,
        "marzo" => 3,
        "abril" => 4,
        "mayo" => 5,
        "junio" => 6,
        "julio" => 7,
        "agosto" => 8,
        "septiembre" | "setiembre" => 9,
        "octubre" => 10,
        "noviembre" => 11,
        "diciembre" => 12,
        _ => return None,
    };
    Some(month)
}

/// First valid Spanish long-form date on the page.
pub fn parse_as_of_date(html: &str) -> Option<NaiveDate> {
    date_regex().captures_iter(html).find_map(|caps| {
        let day: u32 = caps[1].parse().ok()?;
        let month = spanish_month(&caps[2])?;
        let year: i32 = caps[3].parse().ok()?;
        NaiveDate::from_ymd_opt(year, month, day)
    })
}

struct TableRegexes {
    table: Regex,
    row: Regex,
    cell: Regex,
    tag: Regex,
}

fn table_regexes() -> &'static TableRegexes {
    static RE: OnceLock<TableRegexes> = OnceLock::new();
    RE.get_or_init(|| {
        let build = |p: &str| Regex::new(p).unwrap_or_else(|e| panic!("invalid regex {p}: {e}"));
        TableRegexes {
            table: build(r"(?is)<table\b[^>]*>(.*?)</table>"),
            row: build(r"(?is)<tr\b[^>]*>(.*?)</tr>"),
            cell: build(r"(?is)<(td|th)\b[^>]*>(.*?)</(?:td|th)>"),
            tag: build(r"(?s)<[^>]*>"),
        }
    })
}

fn cell_text(re: &TableRegexes, raw: &str) -> String {
    let stripped = re.tag.replace_all(raw, "");
    let decoded = stripped
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&aacute;", "á")
        .replace("&eacute;", "é")
        .replace("&iacute;", "í")
        .replace("&oacute;", "ó")
        .replace("&uacute;", "ú")
        .replace("&ntilde;", "ñ")
        .replace("&Aacute;", "Á")
        .replace("&Eacute;", "É")
        .replace("&Iacute;", "Í")
        .replace("&Oacute;", "Ó")
        .replace("&Uacute;", "Ú")
        .replace("&Ntilde;", "Ñ");
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Data rows (`<td>` only) of a table that have exactly five cells.
fn five_cell_rows(re: &TableRegexes, table: &str) -> Vec<Vec<String>> {
    re.row
        .captures_iter(table)
        .filter_map(|row| {
            let cells: Vec<_> = re.cell.captures_iter(&row[1]).collect();
            if cells.len() != TABLE_KEYS.len()
                || cells.iter().any(|c| c[1].eq_ignore_ascii_case("th"))
            {
                return None;
            }
            Some(cells.iter().map(|c| cell_text(re, &c[2])).collect())
        })
        .collect()
}

/// Extract the rate table as raw records keyed by [`TABLE_KEYS`].
///
/// Uses the first table on the page that has five-cell data rows. A page
/// without one yields an empty batch.
pub fn parse_rate_table(html: &str, fetched_at: DateTime<Utc>) -> RawBatch {
    let re = table_regexes();
    let Some(rows) = re
        .table
        .captures_iter(html)
        .map(|t| five_cell_rows(re, &t[1]))
        .find(|rows| !rows.is_empty())
    else {
        return RawBatch::default();
    };

    let observed_at = stamp(fetched_at);
    let records = rows
        .into_iter()
        .map(|cells| {
            let payload: Map<String, Value> = TABLE_KEYS
                .iter()
                .zip(cells)
                .map(|(k, v)| (k.to_string(), Value::String(v)))
                .collect();
            RawRecord {
                origin: FetchOrigin {
                    side: None,
                    market: None,
                    page: None,
                },
                observed_at: Some(observed_at.clone()),
                payload: Value::Object(payload),
            }
        })
        .collect();
    RawBatch::new(records)
}
