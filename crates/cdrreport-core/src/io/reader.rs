//! CDR file decoding
//!
//! Turns delimited text into typed [`CallRecord`]s. Malformed dates fail the
//! whole load; malformed numeric cells are dropped to `None`.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use csv::{ReaderBuilder, Trim};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::models::{CallRecord, Level};

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d/%m/%Y", "%d-%m-%Y"];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

/// One CSV row before coercion. Absent columns deserialize to `None`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawRecord {
    #[serde(rename = "Date")]
    date: Option<String>,
    #[serde(rename = "Location")]
    location: Option<String>,
    #[serde(rename = "Level")]
    level: Option<String>,
    #[serde(rename = "FRL")]
    frl: Option<String>,
    #[serde(rename = "Hour")]
    hour: Option<String>,
    #[serde(rename = "QueDuration")]
    que_duration: Option<String>,
    #[serde(rename = "TotalDuration")]
    total_duration: Option<String>,
    #[serde(rename = "TotalTimeAtAgent")]
    total_time_at_agent: Option<String>,
    #[serde(rename = "IVRDuration")]
    ivr_duration: Option<String>,
    #[serde(rename = "AgentBillingCategory")]
    agent_billing_category: Option<String>,
    #[serde(rename = "IvrBillingCategory")]
    ivr_billing_category: Option<String>,
}

impl RawRecord {
    fn into_record(self, row: usize) -> Result<CallRecord> {
        let date_text = self.date.unwrap_or_default();
        let date = parse_date(&date_text).ok_or(Error::DateParse {
            row,
            value: date_text,
        })?;

        Ok(CallRecord {
            date,
            location: self.location.unwrap_or_default(),
            level: Level::from_raw(self.level.as_deref()),
            frl: parse_code(row, "FRL", self.frl.as_deref()),
            hour: parse_code(row, "Hour", self.hour.as_deref())
                .and_then(|h| u8::try_from(h).ok())
                .filter(|h| *h < 24),
            que_duration: parse_number(row, "QueDuration", self.que_duration.as_deref()),
            total_duration: parse_number(row, "TotalDuration", self.total_duration.as_deref()),
            total_time_at_agent: parse_number(
                row,
                "TotalTimeAtAgent",
                self.total_time_at_agent.as_deref(),
            ),
            ivr_duration: parse_number(row, "IVRDuration", self.ivr_duration.as_deref()),
            agent_billing_category: non_blank(self.agent_billing_category),
            ivr_billing_category: non_blank(self.ivr_billing_category),
        })
    }
}

/// Load a CDR file, choosing the decoder from the file extension.
pub fn load_records(path: &Path) -> Result<Vec<CallRecord>> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("csv") => {
            let file = File::open(path)?;
            let records = read_records(file)?;
            info!(path = %path.display(), records = records.len(), "Loaded CDR file");
            Ok(records)
        }
        Some("xlsx" | "xls") => Err(Error::unsupported_format(format!(
            "spreadsheet input is not supported, export {} as CSV",
            path.display()
        ))),
        _ => Err(Error::unsupported_format(format!(
            "cannot decode {}, expected a .csv file",
            path.display()
        ))),
    }
}

/// Decode CSV text with a header row.
pub fn read_records<R: Read>(reader: R) -> Result<Vec<CallRecord>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);

    if !rdr.headers()?.iter().any(|h| h == "Date") {
        return Err(Error::DateParse {
            row: 1,
            value: "no Date column".to_string(),
        });
    }

    let mut records = Vec::new();
    for (idx, result) in rdr.deserialize::<RawRecord>().enumerate() {
        // Header is line 1
        let row = idx + 2;
        let raw = result?;
        records.push(raw.into_record(row)?);
    }

    Ok(records)
}

/// Parse a date or datetime cell, discarding any time of day.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
                .map(|dt| dt.date())
        })
}

fn parse_number(row: usize, column: &str, value: Option<&str>) -> Option<f64> {
    let value = value?.trim();
    if value.is_empty() {
        return None;
    }
    match value.parse::<f64>() {
        Ok(v) if v.is_finite() => Some(v),
        _ => {
            debug!(row, column, value, "Skipping unparseable numeric cell");
            None
        }
    }
}

/// Integer codes may be written as `2` or `2.0`
fn parse_code(row: usize, column: &str, value: Option<&str>) -> Option<i32> {
    let number = parse_number(row, column, value)?;
    if number.fract() == 0.0 && number >= f64::from(i32::MIN) && number <= f64::from(i32::MAX) {
        Some(number as i32)
    } else {
        debug!(row, column, number, "Skipping non-integer code");
        None
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
