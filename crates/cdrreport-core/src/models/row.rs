//! Summary row data models

use std::fmt;
use std::ops::Add;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Date label written into the grand-total row
pub const GRAND_TOTAL_LABEL: &str = "Grand Total";
/// Location label written into the grand-total row
pub const ALL_LOCATIONS_LABEL: &str = "All Locations";

/// Round to two decimal places, exact halves to even (`0.125` -> `0.12`)
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}

/// A single computed metric value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    /// Count of matching records
    Integer(i64),
    /// Mean, duration sum or ratio, rounded to two decimals
    Decimal(f64),
}

impl MetricValue {
    /// Numeric value as `f64`
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Integer(v) => v as f64,
            Self::Decimal(v) => v,
        }
    }

    /// Whether the value is zero
    pub fn is_zero(self) -> bool {
        match self {
            Self::Integer(v) => v == 0,
            Self::Decimal(v) => v == 0.0,
        }
    }
}

impl Default for MetricValue {
    fn default() -> Self {
        Self::Integer(0)
    }
}

impl Add for MetricValue {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        match (self, rhs) {
            (Self::Integer(a), Self::Integer(b)) => Self::Integer(a + b),
            (a, b) => Self::Decimal(round2(a.as_f64() + b.as_f64())),
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{v}"),
            Self::Decimal(v) => write!(f, "{v}"),
        }
    }
}

/// Grouping key of one summary row
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupKey {
    /// Call date
    pub date: NaiveDate,
    /// Region, when the profile groups by location
    pub location: Option<String>,
}

/// Key columns of a row: a real group or the synthetic grand total
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowKey {
    /// A group of records sharing a key
    Group(GroupKey),
    /// Column sums across every group row
    GrandTotal,
}

impl RowKey {
    /// Render the key as leading table cells
    pub fn cells(&self, with_location: bool) -> Vec<String> {
        match self {
            Self::Group(key) => {
                let mut cells = vec![key.date.to_string()];
                if with_location {
                    cells.push(key.location.clone().unwrap_or_default());
                }
                cells
            }
            Self::GrandTotal => {
                let mut cells = vec![GRAND_TOTAL_LABEL.to_string()];
                if with_location {
                    cells.push(ALL_LOCATIONS_LABEL.to_string());
                }
                cells
            }
        }
    }
}

/// A named metric column value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    /// Column name
    pub name: String,
    /// Computed value
    pub value: MetricValue,
}

/// One row of a report: key columns plus metric columns in catalog order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    /// Grouping key or grand-total sentinel
    pub key: RowKey,
    /// Metric columns
    pub metrics: Vec<Metric>,
}

impl SummaryRow {
    /// Look up a metric by column name
    pub fn get(&self, name: &str) -> Option<MetricValue> {
        self.metrics
            .iter()
            .find(|m| m.name == name)
            .map(|m| m.value)
    }

    /// Whether this is the synthetic grand-total row
    pub fn is_grand_total(&self) -> bool {
        matches!(self.key, RowKey::GrandTotal)
    }

    /// Group key, `None` for the grand-total row
    pub fn group_key(&self) -> Option<&GroupKey> {
        match &self.key {
            RowKey::Group(key) => Some(key),
            RowKey::GrandTotal => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_add_keeps_integers() {
        assert_eq!(
            MetricValue::Integer(2) + MetricValue::Integer(3),
            MetricValue::Integer(5)
        );
    }

    #[test]
    fn test_add_decimal_is_rounded() {
        let sum = MetricValue::Decimal(0.1) + MetricValue::Decimal(0.2);
        assert_eq!(sum, MetricValue::Decimal(0.3));

        let mixed = MetricValue::Integer(1) + MetricValue::Decimal(2.5);
        assert_eq!(mixed, MetricValue::Decimal(3.5));
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(66.666_666), 66.67);
        assert_eq!(round2(12.0), 12.0);
        assert_eq!(round2(-1.234), -1.23);
        assert_eq!(round2(0.125), 0.12);
        assert_eq!(round2(0.375), 0.38);
        assert_eq!(round2(-0.125), -0.12);
    }

    #[test]
    fn test_key_cells() {
        let key = RowKey::Group(GroupKey {
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            location: Some("Kerala".to_string()),
        });
        assert_eq!(key.cells(true), vec!["2024-01-01", "Kerala"]);
        assert_eq!(key.cells(false), vec!["2024-01-01"]);
        assert_eq!(
            RowKey::GrandTotal.cells(true),
            vec![GRAND_TOTAL_LABEL, ALL_LOCATIONS_LABEL]
        );
    }
}
