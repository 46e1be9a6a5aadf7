//! Billing catalog rules (per date)

use crate::models::{
    Field, Level, FRL_AGENT_ABANDONED, FRL_AGENT_ANSWERED, FRL_IVR_DISPOSED,
};

use super::{MetricRule, Predicate};

/// Billing category marking a short call
pub const SHORT_CALL: &str = "ShortCall";

/// One call-handling stage of the billing report
struct Stage {
    suffix: &'static str,
    /// Records handled at this stage
    scope: Predicate,
    duration: Field,
    short_call: fn(Predicate) -> Predicate,
}

fn stages() -> Vec<Stage> {
    let ivr = Stage {
        suffix: "IVR",
        scope: Predicate::all().frl(&[FRL_IVR_DISPOSED, FRL_AGENT_ABANDONED]),
        duration: Field::IvrDuration,
        short_call: |p| p.ivr_billing(SHORT_CALL),
    };

    let agent = |suffix: &'static str, level: Level| Stage {
        suffix,
        scope: Predicate::all().frl(&[FRL_AGENT_ANSWERED]).level(level),
        duration: Field::TotalTimeAtAgent,
        short_call: |p| p.agent_billing(SHORT_CALL),
    };

    vec![
        ivr,
        agent("Entry", Level::Entry),
        agent("Second", Level::Second),
        agent("Third", Level::Third),
    ]
}

pub(super) fn rules() -> Vec<MetricRule> {
    let mut rules = vec![MetricRule::count(
        "Total_Calls",
        Predicate::all()
            .frl(&[FRL_IVR_DISPOSED, FRL_AGENT_ABANDONED, FRL_AGENT_ANSWERED])
            .location_present(),
    )];

    for stage in stages() {
        let Stage {
            suffix,
            scope,
            duration,
            short_call,
        } = stage;

        // The IVR count column is capitalised differently in the billing sheet
        let calls_column = if suffix == "IVR" {
            format!("no_of_Calls_{suffix}")
        } else {
            format!("no_of_calls_{suffix}")
        };

        rules.push(MetricRule::count(
            calls_column,
            scope.clone().location_present(),
        ));
        rules.push(MetricRule::count(
            format!("no_of_shortcall_{suffix}"),
            short_call(scope.clone()).location_present(),
        ));
        rules.push(MetricRule::sum(
            format!("short_call_duration_{suffix}"),
            short_call(scope.clone()),
            duration,
        ));
        rules.push(MetricRule::sum(
            format!("Total_duration_{suffix}"),
            scope,
            duration,
        ));
    }

    rules
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MetricCatalog;
    use crate::models::{CallRecord, Metric, MetricValue};
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn value(metrics: &[Metric], name: &str) -> MetricValue {
        metrics
            .iter()
            .find(|m| m.name == name)
            .unwrap_or_else(|| panic!("missing metric {name}"))
            .value
    }

    fn ivr_short_call(location: &str) -> CallRecord {
        let mut r = CallRecord::new(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), location);
        r.frl = Some(FRL_IVR_DISPOSED);
        r.ivr_billing_category = Some(SHORT_CALL.to_string());
        r.ivr_duration = Some(20.0);
        r
    }

    #[test]
    fn test_column_layout() {
        let names = MetricCatalog::billing().column_names();
        assert_eq!(names.len(), 17);
        assert_eq!(
            &names[..5],
            &[
                "Total_Calls",
                "no_of_Calls_IVR",
                "no_of_shortcall_IVR",
                "short_call_duration_IVR",
                "Total_duration_IVR",
            ]
        );
        assert_eq!(names[5], "no_of_calls_Entry");
        assert_eq!(names[16], "Total_duration_Third");
    }

    #[test]
    fn test_ivr_short_call() {
        let metrics = MetricCatalog::billing().evaluate(&[ivr_short_call("Kerala")]);

        assert_eq!(value(&metrics, "Total_Calls"), MetricValue::Integer(1));
        assert_eq!(value(&metrics, "no_of_Calls_IVR"), MetricValue::Integer(1));
        assert_eq!(value(&metrics, "no_of_shortcall_IVR"), MetricValue::Integer(1));
        assert_eq!(
            value(&metrics, "short_call_duration_IVR"),
            MetricValue::Decimal(20.0)
        );
        assert_eq!(
            value(&metrics, "Total_duration_IVR"),
            MetricValue::Decimal(20.0)
        );
    }

    #[test]
    fn test_blank_location_excluded_from_counts_only() {
        let metrics = MetricCatalog::billing().evaluate(&[ivr_short_call("   ")]);

        assert_eq!(value(&metrics, "Total_Calls"), MetricValue::Integer(0));
        assert_eq!(value(&metrics, "no_of_Calls_IVR"), MetricValue::Integer(0));
        assert_eq!(value(&metrics, "no_of_shortcall_IVR"), MetricValue::Integer(0));
        assert_eq!(
            value(&metrics, "short_call_duration_IVR"),
            MetricValue::Decimal(20.0)
        );
        assert_eq!(
            value(&metrics, "Total_duration_IVR"),
            MetricValue::Decimal(20.0)
        );
    }

    #[test]
    fn test_agent_tiers() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut third = CallRecord::new(date, "Chennai");
        third.frl = Some(FRL_AGENT_ANSWERED);
        third.level = Level::Third;
        third.total_time_at_agent = Some(42.5);
        third.agent_billing_category = Some(SHORT_CALL.to_string());

        let mut abandoned = CallRecord::new(date, "Chennai");
        abandoned.frl = Some(FRL_AGENT_ABANDONED);
        abandoned.level = Level::Third;
        abandoned.total_time_at_agent = Some(100.0);
        abandoned.ivr_duration = Some(7.0);

        let metrics = MetricCatalog::billing().evaluate(&[third, abandoned]);

        assert_eq!(value(&metrics, "Total_Calls"), MetricValue::Integer(2));
        assert_eq!(value(&metrics, "no_of_calls_Third"), MetricValue::Integer(1));
        assert_eq!(value(&metrics, "no_of_shortcall_Third"), MetricValue::Integer(1));
        assert_eq!(
            value(&metrics, "Total_duration_Third"),
            MetricValue::Decimal(42.5)
        );
        // Abandons are billed as IVR traffic
        assert_eq!(value(&metrics, "no_of_Calls_IVR"), MetricValue::Integer(1));
        assert_eq!(value(&metrics, "Total_duration_IVR"), MetricValue::Decimal(7.0));
        assert_eq!(value(&metrics, "no_of_calls_Entry"), MetricValue::Integer(0));
    }
}
