//! Report export as delimited text

use std::fs::File;
use std::io::Write;
use std::path::Path;

use chrono::NaiveDate;
use csv::WriterBuilder;
use serde::Serialize;
use tracing::info;

use crate::error::{Error, Result};
use crate::models::{KpiHeadline, ReportProfile, ReportTable, SummaryRow};

/// Default export file name for a profile, stamped with `date`
pub fn default_file_name(profile: ReportProfile, date: NaiveDate) -> String {
    let stamp = date.format("%Y%m%d");
    match profile {
        ReportProfile::Kpi => format!("Dashboard_report_MRM_{stamp}.csv"),
        ReportProfile::Billing => format!("Billing_Report_MRM_{stamp}.csv"),
    }
}

/// Header row: key columns first, then metric columns in catalog order
pub fn header(table: &ReportTable) -> Vec<String> {
    table
        .profile
        .key_columns()
        .iter()
        .map(ToString::to_string)
        .chain(table.metric_columns.iter().cloned())
        .collect()
}

/// Cells of one row in header order
pub fn row_cells(table: &ReportTable, row: &SummaryRow) -> Vec<String> {
    let mut cells = row.key.cells(table.profile.has_location());
    cells.extend(
        table
            .metric_columns
            .iter()
            .map(|name| row.get(name).map(|v| v.to_string()).unwrap_or_default()),
    );
    cells
}

/// Write every row (grand total last) to `writer`
pub fn write_report<W: Write>(table: &ReportTable, writer: W, delimiter: char) -> Result<()> {
    let mut wtr = WriterBuilder::new()
        .delimiter(delimiter_byte(delimiter)?)
        .from_writer(writer);

    wtr.write_record(header(table))?;
    for row in table.all_rows() {
        wtr.write_record(row_cells(table, row))?;
    }
    wtr.flush()?;

    Ok(())
}

/// Write the report to a file, creating or truncating it
pub fn write_report_to_path(table: &ReportTable, path: &Path, delimiter: char) -> Result<()> {
    let file = File::create(path)?;
    write_report(table, file, delimiter)?;
    info!(
        path = %path.display(),
        profile = %table.profile,
        rows = table.len(),
        "Report written"
    );
    Ok(())
}

/// Report rendered as one JSON document
#[derive(Debug, Serialize)]
pub struct JsonReport {
    /// KPI headline, absent for billing
    pub headline: Option<KpiHeadline>,
    /// Header row
    pub columns: Vec<String>,
    /// Cells per row in header order, grand total last
    pub rows: Vec<Vec<String>>,
    /// Fields empty in every record
    pub missing_fields: Vec<String>,
}

impl From<&ReportTable> for JsonReport {
    fn from(table: &ReportTable) -> Self {
        Self {
            headline: table.kpi_headline(),
            columns: header(table),
            rows: table.all_rows().map(|row| row_cells(table, row)).collect(),
            missing_fields: table.missing_fields.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Write the report as pretty-printed JSON
pub fn write_json<W: Write>(table: &ReportTable, writer: W) -> Result<()> {
    serde_json::to_writer_pretty(writer, &JsonReport::from(table))?;
    Ok(())
}

fn delimiter_byte(delimiter: char) -> Result<u8> {
    u8::try_from(delimiter)
        .ok()
        .filter(u8::is_ascii)
        .ok_or_else(|| Error::validation(format!("delimiter {delimiter:?} is not a single ASCII character")))
}
