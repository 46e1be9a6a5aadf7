//! Report table data models

use std::fmt;

use serde::{Deserialize, Serialize};

use super::record::Field;
use super::row::{round2, MetricValue, SummaryRow};

/// Which report a table holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportProfile {
    /// Operational KPI report, grouped by date and location
    Kpi,
    /// Billing report, grouped by date
    Billing,
}

impl ReportProfile {
    /// Leading key column headers
    pub fn key_columns(self) -> &'static [&'static str] {
        match self {
            Self::Kpi => &["Date", "Location"],
            Self::Billing => &["Date"],
        }
    }

    /// Whether rows carry a location key column
    pub fn has_location(self) -> bool {
        matches!(self, Self::Kpi)
    }
}

impl fmt::Display for ReportProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Kpi => f.write_str("kpi"),
            Self::Billing => f.write_str("billing"),
        }
    }
}

/// A finished report: group rows plus an optional grand-total row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportTable {
    /// Report profile
    pub profile: ReportProfile,

    /// Metric column names, in catalog order
    pub metric_columns: Vec<String>,

    /// One row per group, in emission order
    pub rows: Vec<SummaryRow>,

    /// Column sums across `rows` (KPI only)
    pub grand_total: Option<SummaryRow>,

    /// Fields the catalog reads that were absent on every record in scope
    pub missing_fields: Vec<Field>,
}

impl ReportTable {
    /// Group rows only. Any statistic computed across rows (means in
    /// particular) must use this view, never [`ReportTable::all_rows`].
    pub fn rows_excluding_summary(&self) -> &[SummaryRow] {
        debug_assert!(self.rows.iter().all(|r| !r.is_grand_total()));
        &self.rows
    }

    /// Group rows followed by the grand-total row, in export order
    pub fn all_rows(&self) -> impl Iterator<Item = &SummaryRow> {
        self.rows.iter().chain(self.grand_total.iter())
    }

    /// Number of group rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no group rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Sum of a column across group rows
    pub fn column_sum(&self, name: &str) -> MetricValue {
        self.rows_excluding_summary()
            .iter()
            .filter_map(|r| r.get(name))
            .fold(MetricValue::default(), |acc, v| acc + v)
    }

    /// Mean of a column across group rows, rounded to two decimals
    pub fn column_mean(&self, name: &str) -> Option<f64> {
        let values: Vec<f64> = self
            .rows_excluding_summary()
            .iter()
            .filter_map(|r| r.get(name))
            .map(MetricValue::as_f64)
            .collect();
        if values.is_empty() {
            return None;
        }
        Some(round2(values.iter().sum::<f64>() / values.len() as f64))
    }

    /// Headline figures for a KPI report
    pub fn kpi_headline(&self) -> Option<KpiHeadline> {
        if self.profile != ReportProfile::Kpi || self.is_empty() {
            return None;
        }

        Some(KpiHeadline {
            ivrs_offered: self.column_sum("total_calls").as_f64() as i64,
            ivrs_disposed: self.column_sum("ivrs_disposed").as_f64() as i64,
            agent_offered: self.column_sum("agent_off").as_f64() as i64,
            // Mean of the per-group means, not re-derived from records
            overall_aht: self.column_mean("overall_aht").unwrap_or(0.0),
        })
    }
}

/// Headline figures shown above a KPI report
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KpiHeadline {
    /// Total calls offered to the IVR
    pub ivrs_offered: i64,
    /// Calls disposed inside the IVR
    pub ivrs_disposed: i64,
    /// Calls offered to agents
    pub agent_offered: i64,
    /// Mean of per-group overall AHT
    pub overall_aht: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::row::{GroupKey, Metric, RowKey};
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn row(day: u32, total_calls: i64, aht: f64) -> SummaryRow {
        SummaryRow {
            key: RowKey::Group(GroupKey {
                date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
                location: Some("Kerala".to_string()),
            }),
            metrics: vec![
                Metric {
                    name: "total_calls".to_string(),
                    value: MetricValue::Integer(total_calls),
                },
                Metric {
                    name: "overall_aht".to_string(),
                    value: MetricValue::Decimal(aht),
                },
            ],
        }
    }

    fn table() -> ReportTable {
        let rows = vec![row(1, 4, 100.0), row(2, 6, 50.0)];
        let grand_total = SummaryRow {
            key: RowKey::GrandTotal,
            metrics: vec![
                Metric {
                    name: "total_calls".to_string(),
                    value: MetricValue::Integer(10),
                },
                Metric {
                    name: "overall_aht".to_string(),
                    value: MetricValue::Decimal(150.0),
                },
            ],
        };
        ReportTable {
            profile: ReportProfile::Kpi,
            metric_columns: vec!["total_calls".to_string(), "overall_aht".to_string()],
            rows,
            grand_total: Some(grand_total),
            missing_fields: vec![],
        }
    }

    #[test]
    fn test_mean_excludes_grand_total() {
        let table = table();
        // Including the grand total would give (100 + 50 + 150) / 3 = 100
        assert_eq!(table.column_mean("overall_aht"), Some(75.0));
    }

    #[test]
    fn test_all_rows_ends_with_grand_total() {
        let table = table();
        let rows: Vec<_> = table.all_rows().collect();
        assert_eq!(rows.len(), 3);
        assert!(rows[2].is_grand_total());
        assert_eq!(table.rows_excluding_summary().len(), 2);
    }

    #[test]
    fn test_kpi_headline() {
        let headline = table().kpi_headline().unwrap();
        assert_eq!(headline.ivrs_offered, 10);
        assert_eq!(headline.ivrs_disposed, 0);
        assert_eq!(headline.overall_aht, 75.0);
    }

    #[test]
    fn test_billing_has_no_headline() {
        let mut table = table();
        table.profile = ReportProfile::Billing;
        assert!(table.kpi_headline().is_none());
    }
}
