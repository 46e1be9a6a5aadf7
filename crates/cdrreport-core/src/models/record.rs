//! Call detail record data model

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// FRL code: call disposed inside the IVR
pub const FRL_IVR_DISPOSED: i32 = 0;
/// FRL code: call answered by an agent
pub const FRL_AGENT_ANSWERED: i32 = 2;
/// FRL code: call abandoned while queued for an agent
pub const FRL_AGENT_ABANDONED: i32 = 3;

/// Escalation tier of agent handling
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum Level {
    /// First-line agents
    Entry,
    /// Second-line agents
    Second,
    /// Third-line agents
    Third,
    /// No level recorded
    #[default]
    Unknown,
    /// A level label outside the known tiers, carried through unchanged
    Other(String),
}

impl Level {
    /// Normalize a raw level cell. Absent or blank cells become [`Level::Unknown`].
    pub fn from_raw(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") => Self::Unknown,
            Some("Entry") => Self::Entry,
            Some("Second") => Self::Second,
            Some("Third") => Self::Third,
            Some("Unknown") => Self::Unknown,
            Some(other) => Self::Other(other.to_string()),
        }
    }

    /// Label as it appears in CDR files
    pub fn as_str(&self) -> &str {
        match self {
            Self::Entry => "Entry",
            Self::Second => "Second",
            Self::Third => "Third",
            Self::Unknown => "Unknown",
            Self::Other(label) => label,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One decoded row of CDR input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    /// Calendar date of the call
    pub date: NaiveDate,

    /// Region label (free text, may be blank)
    pub location: String,

    /// Handling tier, `Unknown` when the source had none
    pub level: Level,

    /// Routing outcome code (see the `FRL_*` constants)
    pub frl: Option<i32>,

    /// Hour of day (0-23) the call was routed
    pub hour: Option<u8>,

    // Durations, seconds
    /// Time spent queued for an agent
    pub que_duration: Option<f64>,

    /// End-to-end call duration
    pub total_duration: Option<f64>,

    /// Time spent talking to an agent
    pub total_time_at_agent: Option<f64>,

    /// Time spent inside the IVR
    pub ivr_duration: Option<f64>,

    // Billing classifiers
    /// Agent-side billing category (e.g. `Billable`, `ShortCall`)
    pub agent_billing_category: Option<String>,

    /// IVR-side billing category
    pub ivr_billing_category: Option<String>,
}

impl CallRecord {
    /// Create a record with only the grouping columns set
    pub fn new(date: NaiveDate, location: impl Into<String>) -> Self {
        Self {
            date,
            location: location.into(),
            level: Level::Unknown,
            frl: None,
            hour: None,
            que_duration: None,
            total_duration: None,
            total_time_at_agent: None,
            ivr_duration: None,
            agent_billing_category: None,
            ivr_billing_category: None,
        }
    }

    /// Whether the location is blank or whitespace-only
    pub fn has_location(&self) -> bool {
        !self.location.trim().is_empty()
    }

    /// Read a numeric field
    pub fn field(&self, field: Field) -> Option<f64> {
        match field {
            Field::QueDuration => self.que_duration,
            Field::TotalDuration => self.total_duration,
            Field::TotalTimeAtAgent => self.total_time_at_agent,
            Field::IvrDuration => self.ivr_duration,
        }
        .filter(|v| v.is_finite())
    }
}

/// Numeric record fields a metric can reduce over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    /// `que_duration`
    QueDuration,
    /// `total_duration`
    TotalDuration,
    /// `total_time_at_agent`
    TotalTimeAtAgent,
    /// `ivr_duration`
    IvrDuration,
}

impl Field {
    /// Column header used by CDR files
    pub fn column(self) -> &'static str {
        match self {
            Self::QueDuration => "QueDuration",
            Self::TotalDuration => "TotalDuration",
            Self::TotalTimeAtAgent => "TotalTimeAtAgent",
            Self::IvrDuration => "IVRDuration",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(None, Level::Unknown)]
    #[case(Some(""), Level::Unknown)]
    #[case(Some("   "), Level::Unknown)]
    #[case(Some("Entry"), Level::Entry)]
    #[case(Some(" Second "), Level::Second)]
    #[case(Some("Third"), Level::Third)]
    #[case(Some("Supervisor"), Level::Other("Supervisor".to_string()))]
    fn test_level_normalization(#[case] raw: Option<&str>, #[case] expected: Level) {
        assert_eq!(Level::from_raw(raw), expected);
    }

    #[test]
    fn test_blank_location() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert!(!CallRecord::new(date, "  \t").has_location());
        assert!(CallRecord::new(date, "Kerala").has_location());
    }

    #[test]
    fn test_non_finite_field_is_missing() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut record = CallRecord::new(date, "Kerala");
        record.que_duration = Some(f64::NAN);
        record.total_duration = Some(12.5);

        assert_eq!(record.field(Field::QueDuration), None);
        assert_eq!(record.field(Field::TotalDuration), Some(12.5));
    }
}
