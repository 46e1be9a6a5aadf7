//! Aggregation engine - groups records and evaluates a metric catalog per group
//!
//! Records are filtered to a date range, partitioned by a grouping key, and
//! each group is evaluated against a [`MetricCatalog`]. Groups are emitted in
//! ascending key order (date, then location). The KPI profile appends a
//! grand-total row holding column sums.

mod progress;

pub use progress::{
    format_eta, CancelFlag, NoProgress, ProgressEstimate, ProgressEvent, ProgressSink,
    ProgressTracker,
};

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use chrono::NaiveDate;
use parking_lot::Mutex;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::catalog::MetricCatalog;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::models::{
    CallRecord, Field, GroupKey, Metric, MetricValue, ReportProfile, ReportTable, RowKey,
    SummaryRow,
};

/// Inclusive calendar date range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// First date kept
    pub from: NaiveDate,
    /// Last date kept
    pub to: NaiveDate,
}

impl DateRange {
    /// Create a range, rejecting `from > to`
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self> {
        if from > to {
            return Err(Error::validation(format!(
                "date range start {from} is after its end {to}"
            )));
        }
        Ok(Self { from, to })
    }

    /// Smallest range covering every record, `None` for an empty batch
    pub fn covering(records: &[CallRecord]) -> Option<Self> {
        let from = records.iter().map(|r| r.date).min()?;
        let to = records.iter().map(|r| r.date).max()?;
        Some(Self { from, to })
    }

    /// Whether `date` falls inside the range (both ends inclusive)
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }
}

/// Columns records are grouped by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupingKey {
    /// One group per date
    Date,
    /// One group per (date, location)
    DateLocation,
}

impl GroupingKey {
    /// Key of a record under this grouping
    pub fn key_of(self, record: &CallRecord) -> GroupKey {
        GroupKey {
            date: record.date,
            location: match self {
                Self::Date => None,
                Self::DateLocation => Some(record.location.clone()),
            },
        }
    }
}

/// Output of [`AggregationEngine::aggregate`]
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    /// One row per group, ascending key order
    pub rows: Vec<SummaryRow>,
    /// Column sums across `rows`
    pub grand_total: SummaryRow,
    /// Fields the catalog reads that no in-scope record carried
    pub missing_fields: Vec<Field>,
}

/// Orchestrates filtering, grouping, evaluation and grand-total synthesis
#[derive(Debug, Clone, Default)]
pub struct AggregationEngine {
    config: EngineConfig,
    cancel: CancelFlag,
}

impl AggregationEngine {
    /// Create an engine
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            cancel: CancelFlag::new(),
        }
    }

    /// Use an externally owned cancellation flag
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Flag that cancels runs of this engine when raised
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// KPI report: records in `[date_from, date_to]`, grouped by date and
    /// location, with a grand-total row.
    pub fn compute_kpi_report(
        &self,
        records: &[CallRecord],
        date_from: NaiveDate,
        date_to: NaiveDate,
        progress: &mut dyn ProgressSink,
    ) -> Result<ReportTable> {
        // An inverted range selects nothing and surfaces as EmptyRange
        let range = DateRange {
            from: date_from,
            to: date_to,
        };
        let catalog = MetricCatalog::kpi();
        let aggregation = self.aggregate(
            records,
            Some(range),
            GroupingKey::DateLocation,
            &catalog,
            progress,
        )?;

        Ok(ReportTable {
            profile: ReportProfile::Kpi,
            metric_columns: catalog.column_names(),
            rows: aggregation.rows,
            grand_total: Some(aggregation.grand_total),
            missing_fields: aggregation.missing_fields,
        })
    }

    /// Billing report: every record, grouped by date, no grand-total row.
    pub fn compute_billing_report(
        &self,
        records: &[CallRecord],
        progress: &mut dyn ProgressSink,
    ) -> Result<ReportTable> {
        let catalog = MetricCatalog::billing();
        let aggregation = self.aggregate(records, None, GroupingKey::Date, &catalog, progress)?;

        Ok(ReportTable {
            profile: ReportProfile::Billing,
            metric_columns: catalog.column_names(),
            rows: aggregation.rows,
            grand_total: None,
            missing_fields: aggregation.missing_fields,
        })
    }

    /// Filter, group and evaluate `catalog` per group.
    ///
    /// `range = None` keeps every record. An empty filtered set is an error
    /// (`EmptyRange`, or `NoRecords` without a range). On cancellation no rows
    /// and no grand total are returned.
    pub fn aggregate(
        &self,
        records: &[CallRecord],
        range: Option<DateRange>,
        grouping: GroupingKey,
        catalog: &MetricCatalog,
        progress: &mut dyn ProgressSink,
    ) -> Result<Aggregation> {
        let started = Instant::now();

        let in_scope: Vec<&CallRecord> = match range {
            Some(range) => records.iter().filter(|r| range.contains(r.date)).collect(),
            None => records.iter().collect(),
        };

        if in_scope.is_empty() {
            return Err(match range {
                Some(range) => Error::EmptyRange {
                    from: range.from,
                    to: range.to,
                },
                None => Error::NoRecords,
            });
        }

        let missing_fields = missing_fields(&in_scope, catalog);
        for field in &missing_fields {
            warn!(field = %field, profile = %catalog.profile(), "Field absent from every record, treating as null");
        }

        let groups = partition(&in_scope, grouping);

        info!(
            profile = %catalog.profile(),
            records = in_scope.len(),
            groups = groups.len(),
            "Generating report"
        );

        let parallel = self.config.parallel && groups.len() >= self.config.parallel_min_groups;
        let rows = if parallel {
            self.evaluate_parallel(groups, catalog, progress)?
        } else {
            self.evaluate_sequential(groups, catalog, progress)?
        };

        let grand_total = grand_total(&catalog.column_names(), &rows);

        info!(
            profile = %catalog.profile(),
            rows = rows.len(),
            parallel,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Report generation complete"
        );

        Ok(Aggregation {
            rows,
            grand_total,
            missing_fields,
        })
    }

    fn evaluate_sequential(
        &self,
        groups: Vec<(GroupKey, Vec<&CallRecord>)>,
        catalog: &MetricCatalog,
        progress: &mut dyn ProgressSink,
    ) -> Result<Vec<SummaryRow>> {
        let mut tracker = ProgressTracker::new(groups.len());
        let mut rows = Vec::with_capacity(groups.len());

        for (key, members) in groups {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let metrics = catalog.evaluate(&members);
            let event = tracker.advance(group_label(&key));
            debug!(group = %event.group, records = members.len(), "Evaluated group");

            rows.push(SummaryRow {
                key: RowKey::Group(key),
                metrics,
            });

            if progress.on_progress(&event).is_break() {
                info!(completed = event.completed, total = event.total, "Report cancelled");
                return Err(Error::Cancelled);
            }
        }

        Ok(rows)
    }

    /// Evaluate groups on the rayon pool. Results are collected by group
    /// index so row order matches the sequential path.
    fn evaluate_parallel(
        &self,
        groups: Vec<(GroupKey, Vec<&CallRecord>)>,
        catalog: &MetricCatalog,
        progress: &mut dyn ProgressSink,
    ) -> Result<Vec<SummaryRow>> {
        let state = Mutex::new((ProgressTracker::new(groups.len()), progress));
        let stopped = AtomicBool::new(false);

        let slots: Vec<Option<SummaryRow>> = groups
            .into_par_iter()
            .map(|(key, members)| {
                if stopped.load(Ordering::Relaxed) || self.cancel.is_cancelled() {
                    return None;
                }

                let metrics = catalog.evaluate(&members);

                let mut guard = state.lock();
                let (tracker, sink) = &mut *guard;
                let event = tracker.advance(group_label(&key));
                debug!(group = %event.group, records = members.len(), "Evaluated group");
                if sink.on_progress(&event).is_break() {
                    stopped.store(true, Ordering::Relaxed);
                }

                Some(SummaryRow {
                    key: RowKey::Group(key),
                    metrics,
                })
            })
            .collect();

        if stopped.load(Ordering::Relaxed) || self.cancel.is_cancelled() {
            info!("Report cancelled");
            return Err(Error::Cancelled);
        }

        slots
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or(Error::Cancelled)
    }
}

/// KPI report with the default engine and no progress reporting
pub fn compute_kpi_report(
    records: &[CallRecord],
    date_from: NaiveDate,
    date_to: NaiveDate,
) -> Result<ReportTable> {
    AggregationEngine::default().compute_kpi_report(records, date_from, date_to, &mut NoProgress)
}

/// Billing report with the default engine and no progress reporting
pub fn compute_billing_report(records: &[CallRecord]) -> Result<ReportTable> {
    AggregationEngine::default().compute_billing_report(records, &mut NoProgress)
}

/// Sum every metric column across `rows` into one grand-total row
pub fn grand_total(columns: &[String], rows: &[SummaryRow]) -> SummaryRow {
    let mut totals: Vec<Metric> = columns
        .iter()
        .map(|name| Metric {
            name: name.clone(),
            value: MetricValue::default(),
        })
        .collect();

    for row in rows.iter().filter(|r| !r.is_grand_total()) {
        for total in &mut totals {
            if let Some(value) = row.get(&total.name) {
                total.value = total.value + value;
            }
        }
    }

    SummaryRow {
        key: RowKey::GrandTotal,
        metrics: totals,
    }
}

/// Stable partition in ascending key order
fn partition<'a>(
    records: &[&'a CallRecord],
    grouping: GroupingKey,
) -> Vec<(GroupKey, Vec<&'a CallRecord>)> {
    let mut groups: BTreeMap<GroupKey, Vec<&'a CallRecord>> = BTreeMap::new();
    for record in records {
        groups
            .entry(grouping.key_of(record))
            .or_default()
            .push(*record);
    }
    groups.into_iter().collect()
}

/// Catalog fields that are null on every record
fn missing_fields(records: &[&CallRecord], catalog: &MetricCatalog) -> Vec<Field> {
    catalog
        .referenced_fields()
        .into_iter()
        .filter(|field| records.iter().all(|r| r.field(*field).is_none()))
        .collect()
}

fn group_label(key: &GroupKey) -> String {
    match &key.location {
        Some(location) => format!("{} / {}", key.date, location),
        None => key.date.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Level, FRL_AGENT_ABANDONED, FRL_AGENT_ANSWERED};
    use pretty_assertions::assert_eq;
    use std::ops::ControlFlow;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn call(day: u32, location: &str, frl: i32, queue: f64) -> CallRecord {
        let mut r = CallRecord::new(date(day), location);
        r.level = Level::Entry;
        r.frl = Some(frl);
        r.hour = Some(19);
        r.que_duration = Some(queue);
        r.total_time_at_agent = Some(queue * 2.0);
        r
    }

    fn sample() -> Vec<CallRecord> {
        vec![
            call(2, "Kerala", FRL_AGENT_ANSWERED, 30.0),
            call(1, "TamilNadu", FRL_AGENT_ABANDONED, 100.0),
            call(1, "Kerala", FRL_AGENT_ANSWERED, 50.0),
            call(1, "Kerala", FRL_AGENT_ABANDONED, 5.0),
            call(3, "Chennai", 0, 1.0),
        ]
    }

    fn keys(table: &ReportTable) -> Vec<(NaiveDate, Option<String>)> {
        table
            .rows
            .iter()
            .map(|r| {
                let key = r.group_key().unwrap();
                (key.date, key.location.clone())
            })
            .collect()
    }

    #[test]
    fn test_groups_in_ascending_key_order() {
        let table = compute_kpi_report(&sample(), date(1), date(3)).unwrap();
        assert_eq!(
            keys(&table),
            vec![
                (date(1), Some("Kerala".to_string())),
                (date(1), Some("TamilNadu".to_string())),
                (date(2), Some("Kerala".to_string())),
                (date(3), Some("Chennai".to_string())),
            ]
        );
    }

    #[test]
    fn test_range_filter_is_inclusive() {
        let table = compute_kpi_report(&sample(), date(2), date(3)).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.column_sum("total_calls"), MetricValue::Integer(2));
    }

    #[test]
    fn test_empty_range_is_an_error() {
        let err = compute_kpi_report(&sample(), date(10), date(20)).unwrap_err();
        assert!(matches!(err, Error::EmptyRange { .. }));
    }

    #[test]
    fn test_inverted_range_is_empty() {
        let err = compute_kpi_report(&sample(), date(3), date(1)).unwrap_err();
        match err {
            Error::EmptyRange { from, to } => {
                assert_eq!(from, date(3));
                assert_eq!(to, date(1));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_date_range_new_rejects_inverted_bounds() {
        assert!(matches!(
            DateRange::new(date(3), date(1)),
            Err(Error::Validation(_))
        ));
        assert!(DateRange::new(date(1), date(1)).is_ok());
    }

    #[test]
    fn test_blank_location_forms_its_own_group() {
        let records = vec![call(1, "", 0, 1.0), call(1, "Kerala", 0, 1.0)];
        let table = compute_kpi_report(&records, date(1), date(1)).unwrap();

        assert_eq!(
            keys(&table),
            vec![
                (date(1), Some(String::new())),
                (date(1), Some("Kerala".to_string())),
            ]
        );
        let total = table.grand_total.as_ref().unwrap();
        assert_eq!(total.get("total_calls"), Some(MetricValue::Integer(2)));
    }

    #[test]
    fn test_full_range_matches_unfiltered() {
        let records = sample();
        let range = DateRange::covering(&records).unwrap();
        let engine = AggregationEngine::default();
        let catalog = MetricCatalog::kpi();

        let filtered = engine
            .aggregate(&records, Some(range), GroupingKey::DateLocation, &catalog, &mut NoProgress)
            .unwrap();
        let unfiltered = engine
            .aggregate(&records, None, GroupingKey::DateLocation, &catalog, &mut NoProgress)
            .unwrap();

        assert_eq!(filtered, unfiltered);
    }

    #[test]
    fn test_grand_total_sums_columns() {
        let table = compute_kpi_report(&sample(), date(1), date(3)).unwrap();
        let total = table.grand_total.as_ref().unwrap();

        assert!(total.is_grand_total());
        assert_eq!(total.get("total_calls"), Some(MetricValue::Integer(5)));
        assert_eq!(total.get("agent_ans"), Some(MetricValue::Integer(2)));
        // Sum of per-group percentages, not a recomputed ratio
        assert_eq!(
            total.get("tcbh_entry_sla_pct"),
            Some(MetricValue::Decimal(200.0))
        );
        assert_eq!(table.all_rows().last(), Some(total));
    }

    #[test]
    fn test_billing_groups_by_date_without_total() {
        let table = compute_billing_report(&sample()).unwrap();
        assert_eq!(table.profile, ReportProfile::Billing);
        assert!(table.grand_total.is_none());
        assert_eq!(
            keys(&table),
            vec![(date(1), None), (date(2), None), (date(3), None)]
        );
        assert_eq!(table.rows[0].get("Total_Calls"), Some(MetricValue::Integer(3)));
    }

    #[test]
    fn test_billing_of_nothing_is_an_error() {
        let err = compute_billing_report(&[]).unwrap_err();
        assert!(matches!(err, Error::NoRecords));
    }

    #[test]
    fn test_missing_fields_reported() {
        let table = compute_kpi_report(&sample(), date(1), date(3)).unwrap();
        assert_eq!(table.missing_fields, vec![Field::TotalDuration]);
        assert_eq!(
            table.rows[0].get("total_acht"),
            Some(MetricValue::Decimal(0.0))
        );
    }

    #[test]
    fn test_progress_events() {
        let mut events = Vec::new();
        let mut sink = |event: &ProgressEvent| {
            events.push((event.completed, event.total, event.estimate.fraction));
            ControlFlow::Continue(())
        };

        AggregationEngine::default()
            .compute_kpi_report(&sample(), date(1), date(3), &mut sink)
            .unwrap();

        assert_eq!(
            events,
            vec![(1, 4, 0.25), (2, 4, 0.5), (3, 4, 0.75), (4, 4, 1.0)]
        );
    }

    #[test]
    fn test_sink_can_cancel() {
        let mut sink = |event: &ProgressEvent| {
            if event.completed == 2 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        };

        let err = AggregationEngine::default()
            .compute_kpi_report(&sample(), date(1), date(3), &mut sink)
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[test]
    fn test_raised_flag_cancels_before_first_group() {
        let engine = AggregationEngine::default();
        engine.cancel_flag().cancel();

        let err = engine
            .compute_billing_report(&sample(), &mut NoProgress)
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let mut records = Vec::new();
        for day in 1..=20 {
            for (i, location) in ["Kerala", "TamilNadu", "Chennai", ""].iter().enumerate() {
                records.push(call(day, location, FRL_AGENT_ANSWERED, (day * 7 + i as u32) as f64));
                records.push(call(day, location, FRL_AGENT_ABANDONED, 95.0));
            }
        }

        let sequential = AggregationEngine::new(EngineConfig {
            parallel: false,
            ..EngineConfig::default()
        });
        let parallel = AggregationEngine::new(EngineConfig {
            parallel: true,
            parallel_min_groups: 1,
        });

        let a = sequential
            .compute_kpi_report(&records, date(1), date(20), &mut NoProgress)
            .unwrap();
        let mut seen = 0;
        let mut sink = |_: &ProgressEvent| {
            seen += 1;
            ControlFlow::Continue(())
        };
        let b = parallel
            .compute_kpi_report(&records, date(1), date(20), &mut sink)
            .unwrap();

        assert_eq!(a, b);
        assert_eq!(seen, 80);
    }

    #[test]
    fn test_parallel_cancel_leaves_no_rows() {
        let engine = AggregationEngine::new(EngineConfig {
            parallel: true,
            parallel_min_groups: 1,
        });
        let mut sink = |_: &ProgressEvent| ControlFlow::Break(());

        let err = engine
            .compute_kpi_report(&sample(), date(1), date(3), &mut sink)
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}
