//! Metric catalog - declarative per-group aggregation rules
//!
//! A catalog is an ordered list of [`MetricRule`]s. Each rule selects records
//! with an AND-combined [`Predicate`], reduces the matches with a
//! [`Reduction`], and may be expressed as a percentage of an earlier rule.
//! Evaluating a catalog against a group is a pure function of the group.

mod billing;
mod kpi;

pub use billing::SHORT_CALL;
pub use kpi::{BILLABLE, BUSY_HOUR, REGIONS};

use std::borrow::Borrow;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{round2, CallRecord, Field, Level, Metric, MetricValue, ReportProfile};

/// A single test applied to a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    /// FRL code is one of `codes`
    FrlIn { codes: Vec<i32> },
    /// Level equals `level`
    LevelIs { level: Level },
    /// Routed during hour `hour`
    HourIs { hour: u8 },
    /// Queue duration `<= seconds`
    QueueAtMost { seconds: f64 },
    /// Queue duration `< seconds`
    QueueBelow { seconds: f64 },
    /// Queue duration `> seconds`
    QueueAbove { seconds: f64 },
    /// Location equals `location`
    LocationIs { location: String },
    /// Location is not blank
    LocationPresent,
    /// Agent billing category equals `category`
    AgentBillingIs { category: String },
    /// IVR billing category equals `category`
    IvrBillingIs { category: String },
}

impl Condition {
    /// Test a record. Comparisons against a missing value are false.
    pub fn matches(&self, record: &CallRecord) -> bool {
        let queue = || record.field(Field::QueDuration);
        match self {
            Self::FrlIn { codes } => record.frl.is_some_and(|c| codes.contains(&c)),
            Self::LevelIs { level } => record.level == *level,
            Self::HourIs { hour } => record.hour == Some(*hour),
            Self::QueueAtMost { seconds } => queue().is_some_and(|q| q <= *seconds),
            Self::QueueBelow { seconds } => queue().is_some_and(|q| q < *seconds),
            Self::QueueAbove { seconds } => queue().is_some_and(|q| q > *seconds),
            Self::LocationIs { location } => record.location == *location,
            Self::LocationPresent => record.has_location(),
            Self::AgentBillingIs { category } => {
                record.agent_billing_category.as_deref() == Some(category.as_str())
            }
            Self::IvrBillingIs { category } => {
                record.ivr_billing_category.as_deref() == Some(category.as_str())
            }
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FrlIn { codes } if codes.len() == 1 => write!(f, "frl == {}", codes[0]),
            Self::FrlIn { codes } => {
                let codes: Vec<String> = codes.iter().map(ToString::to_string).collect();
                write!(f, "frl in {{{}}}", codes.join(","))
            }
            Self::LevelIs { level } => write!(f, "level == {level}"),
            Self::HourIs { hour } => write!(f, "hour == {hour}"),
            Self::QueueAtMost { seconds } => write!(f, "que_duration <= {seconds}"),
            Self::QueueBelow { seconds } => write!(f, "que_duration < {seconds}"),
            Self::QueueAbove { seconds } => write!(f, "que_duration > {seconds}"),
            Self::LocationIs { location } => write!(f, "location == {location}"),
            Self::LocationPresent => f.write_str("location not blank"),
            Self::AgentBillingIs { category } => write!(f, "agent_billing_category == {category}"),
            Self::IvrBillingIs { category } => write!(f, "ivr_billing_category == {category}"),
        }
    }
}

/// AND-combination of conditions. An empty predicate matches every record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Predicate {
    conditions: Vec<Condition>,
}

impl Predicate {
    /// Predicate matching every record
    pub fn all() -> Self {
        Self::default()
    }

    /// Add a condition
    pub fn and(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Require the FRL code to be one of `codes`
    pub fn frl(self, codes: &[i32]) -> Self {
        self.and(Condition::FrlIn {
            codes: codes.to_vec(),
        })
    }

    /// Require a level
    pub fn level(self, level: Level) -> Self {
        self.and(Condition::LevelIs { level })
    }

    /// Require the routing hour
    pub fn hour(self, hour: u8) -> Self {
        self.and(Condition::HourIs { hour })
    }

    /// Require `que_duration <= seconds`
    pub fn queue_at_most(self, seconds: f64) -> Self {
        self.and(Condition::QueueAtMost { seconds })
    }

    /// Require `que_duration < seconds`
    pub fn queue_below(self, seconds: f64) -> Self {
        self.and(Condition::QueueBelow { seconds })
    }

    /// Require `que_duration > seconds`
    pub fn queue_above(self, seconds: f64) -> Self {
        self.and(Condition::QueueAbove { seconds })
    }

    /// Require an exact location
    pub fn location(self, location: impl Into<String>) -> Self {
        self.and(Condition::LocationIs {
            location: location.into(),
        })
    }

    /// Require a non-blank location
    pub fn location_present(self) -> Self {
        self.and(Condition::LocationPresent)
    }

    /// Require an agent billing category
    pub fn agent_billing(self, category: impl Into<String>) -> Self {
        self.and(Condition::AgentBillingIs {
            category: category.into(),
        })
    }

    /// Require an IVR billing category
    pub fn ivr_billing(self, category: impl Into<String>) -> Self {
        self.and(Condition::IvrBillingIs {
            category: category.into(),
        })
    }

    /// Test a record against every condition
    pub fn matches(&self, record: &CallRecord) -> bool {
        self.conditions.iter().all(|c| c.matches(record))
    }

    /// Conditions in this predicate
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.conditions.is_empty() {
            return f.write_str("*");
        }
        let parts: Vec<String> = self.conditions.iter().map(ToString::to_string).collect();
        f.write_str(&parts.join(" AND "))
    }
}

/// How matching records are reduced to one value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "field", rename_all = "snake_case")]
pub enum Reduction {
    /// Number of matching records
    Count,
    /// Sum of a field over matches, missing values skipped
    Sum(Field),
    /// Mean of a field over matches, missing values skipped, `0` when empty
    Mean(Field),
}

impl Reduction {
    /// Field read by this reduction
    pub fn field(self) -> Option<Field> {
        match self {
            Self::Count => None,
            Self::Sum(field) | Self::Mean(field) => Some(field),
        }
    }

    fn reduce<'a>(self, matches: impl Iterator<Item = &'a CallRecord>) -> f64 {
        match self {
            Self::Count => matches.count() as f64,
            Self::Sum(field) => matches.filter_map(|r| r.field(field)).sum(),
            Self::Mean(field) => {
                let (sum, n) = matches
                    .filter_map(|r| r.field(field))
                    .fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
                if n == 0 {
                    0.0
                } else {
                    sum / n as f64
                }
            }
        }
    }
}

impl fmt::Display for Reduction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count => f.write_str("count"),
            Self::Sum(field) => write!(f, "sum({field})"),
            Self::Mean(field) => write!(f, "mean({field})"),
        }
    }
}

/// A named aggregation rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRule {
    /// Column name
    pub name: String,
    /// Which records the rule considers
    pub predicate: Predicate,
    /// How matches are reduced
    pub reduction: Reduction,
    /// Express the value as a percentage of this earlier metric
    pub percentage_of: Option<String>,
}

impl MetricRule {
    /// Count matching records
    pub fn count(name: impl Into<String>, predicate: Predicate) -> Self {
        Self::new(name, predicate, Reduction::Count)
    }

    /// Sum a field over matching records
    pub fn sum(name: impl Into<String>, predicate: Predicate, field: Field) -> Self {
        Self::new(name, predicate, Reduction::Sum(field))
    }

    /// Mean of a field over matching records
    pub fn mean(name: impl Into<String>, predicate: Predicate, field: Field) -> Self {
        Self::new(name, predicate, Reduction::Mean(field))
    }

    fn new(name: impl Into<String>, predicate: Predicate, reduction: Reduction) -> Self {
        Self {
            name: name.into(),
            predicate,
            reduction,
            percentage_of: None,
        }
    }

    /// Express this rule as a percentage of `denominator`
    pub fn percentage_of(mut self, denominator: impl Into<String>) -> Self {
        self.percentage_of = Some(denominator.into());
        self
    }
}

/// Ordered, validated set of metric rules for one report profile
#[derive(Debug, Clone)]
pub struct MetricCatalog {
    profile: ReportProfile,
    rules: Vec<MetricRule>,
    /// Index of each rule's `percentage_of` target
    denominators: Vec<Option<usize>>,
}

impl MetricCatalog {
    /// Build a catalog. Names must be unique and every `percentage_of`
    /// must name a rule that appears earlier in the list.
    pub fn new(profile: ReportProfile, rules: Vec<MetricRule>) -> Result<Self> {
        let mut seen: HashMap<&str, usize> = HashMap::with_capacity(rules.len());
        let mut denominators = Vec::with_capacity(rules.len());

        for (idx, rule) in rules.iter().enumerate() {
            if seen.contains_key(rule.name.as_str()) {
                return Err(Error::validation(format!(
                    "duplicate metric name '{}'",
                    rule.name
                )));
            }

            let denominator = match &rule.percentage_of {
                Some(target) => Some(*seen.get(target.as_str()).ok_or_else(|| {
                    Error::validation(format!(
                        "metric '{}' is a percentage of '{}', which is not defined before it",
                        rule.name, target
                    ))
                })?),
                None => None,
            };

            denominators.push(denominator);
            seen.insert(rule.name.as_str(), idx);
        }

        Ok(Self {
            profile,
            rules,
            denominators,
        })
    }

    /// Built-in catalog for a profile
    pub fn for_profile(profile: ReportProfile) -> Self {
        match profile {
            ReportProfile::Kpi => Self::kpi(),
            ReportProfile::Billing => Self::billing(),
        }
    }

    /// KPI catalog (per date and location)
    pub fn kpi() -> Self {
        Self::builtin(ReportProfile::Kpi, kpi::rules())
    }

    /// Billing catalog (per date)
    pub fn billing() -> Self {
        Self::builtin(ReportProfile::Billing, billing::rules())
    }

    fn builtin(profile: ReportProfile, rules: Vec<MetricRule>) -> Self {
        match Self::new(profile, rules) {
            Ok(catalog) => catalog,
            Err(e) => unreachable!("built-in {profile} catalog is invalid: {e}"),
        }
    }

    /// Profile this catalog belongs to
    pub fn profile(&self) -> ReportProfile {
        self.profile
    }

    /// Rules in evaluation order
    pub fn rules(&self) -> &[MetricRule] {
        &self.rules
    }

    /// Metric column names in evaluation order
    pub fn column_names(&self) -> Vec<String> {
        self.rules.iter().map(|r| r.name.clone()).collect()
    }

    /// Numeric fields read by any rule
    pub fn referenced_fields(&self) -> BTreeSet<Field> {
        self.rules
            .iter()
            .filter_map(|r| r.reduction.field())
            .chain(self.rules.iter().flat_map(|r| {
                r.predicate.conditions().iter().filter_map(|c| match c {
                    Condition::QueueAtMost { .. }
                    | Condition::QueueBelow { .. }
                    | Condition::QueueAbove { .. } => Some(Field::QueDuration),
                    _ => None,
                })
            }))
            .collect()
    }

    /// Evaluate every rule against one group of records, in catalog order.
    pub fn evaluate<R: Borrow<CallRecord>>(&self, group: &[R]) -> Vec<Metric> {
        let mut raw: Vec<f64> = Vec::with_capacity(self.rules.len());
        let mut metrics = Vec::with_capacity(self.rules.len());

        for (rule, denominator) in self.rules.iter().zip(&self.denominators) {
            let matches = group
                .iter()
                .map(<R as Borrow<CallRecord>>::borrow)
                .filter(|r| rule.predicate.matches(r));
            let value = rule.reduction.reduce(matches);

            let metric_value = match denominator {
                Some(idx) => {
                    let denom = raw[*idx];
                    let pct = if denom == 0.0 {
                        0.0
                    } else {
                        value / denom * 100.0
                    };
                    MetricValue::Decimal(round2(pct))
                }
                None => match rule.reduction {
                    Reduction::Count => MetricValue::Integer(value as i64),
                    Reduction::Sum(_) | Reduction::Mean(_) => MetricValue::Decimal(round2(value)),
                },
            };

            raw.push(value);
            metrics.push(Metric {
                name: rule.name.clone(),
                value: metric_value,
            });
        }

        metrics
    }
}
