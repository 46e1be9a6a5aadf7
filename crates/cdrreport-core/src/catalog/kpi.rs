//! KPI catalog rules (per date and location)

use crate::models::{
    Field, Level, FRL_AGENT_ABANDONED, FRL_AGENT_ANSWERED, FRL_IVR_DISPOSED,
};

use super::{MetricRule, Predicate};

/// Hour of day used for the busy-hour (TCBH) metrics
pub const BUSY_HOUR: u8 = 19;

/// Agent billing category counted towards tier AHT
pub const BILLABLE: &str = "Billable";

/// Abandons queued for less than this are short abandons
const SHORT_ABANDON_SECS: f64 = 10.0;

/// Regional answer/abandon threshold
const REGION_THRESHOLD_SECS: f64 = 90.0;

/// Regions reported individually: (location label, column prefix)
pub const REGIONS: [(&str, &str); 3] = [("Kerala", "kl"), ("TamilNadu", "tn"), ("Chennai", "ch")];

/// Tiers with their busy-hour SLA queue threshold in seconds
fn tiers() -> [(Level, &'static str, f64); 3] {
    [
        (Level::Entry, "entry", 60.0),
        (Level::Second, "second", 45.0),
        (Level::Third, "third", 30.0),
    ]
}

fn busy_hour_answered(level: Level) -> Predicate {
    Predicate::all()
        .level(level)
        .frl(&[FRL_AGENT_ANSWERED])
        .hour(BUSY_HOUR)
}

pub(super) fn rules() -> Vec<MetricRule> {
    let agent_offered = [FRL_AGENT_ANSWERED, FRL_AGENT_ABANDONED];

    let mut rules = vec![
        MetricRule::count("total_calls", Predicate::all()),
        MetricRule::count("ivrs_disposed", Predicate::all().frl(&[FRL_IVR_DISPOSED])),
        MetricRule::mean("total_acht", Predicate::all(), Field::TotalDuration),
        MetricRule::mean("overall_aht", Predicate::all(), Field::TotalTimeAtAgent),
    ];

    for (level, prefix, _) in tiers() {
        rules.push(MetricRule::mean(
            format!("{prefix}_aht"),
            Predicate::all().level(level).agent_billing(BILLABLE),
            Field::TotalTimeAtAgent,
        ));
    }

    rules.extend([
        MetricRule::count("agent_off", Predicate::all().frl(&agent_offered)),
        MetricRule::count(
            "short_abd",
            Predicate::all()
                .frl(&[FRL_AGENT_ABANDONED])
                .queue_below(SHORT_ABANDON_SECS),
        ),
        MetricRule::count("agent_ans", Predicate::all().frl(&[FRL_AGENT_ANSWERED])),
    ]);

    for (level, prefix, _) in tiers() {
        rules.push(MetricRule::count(
            format!("tcbh_{prefix}_ans"),
            busy_hour_answered(level),
        ));
    }

    for (level, prefix, threshold) in tiers() {
        rules.push(MetricRule::count(
            format!("tcbh_{prefix}_sla"),
            busy_hour_answered(level).queue_at_most(threshold),
        ));
    }

    for (level, prefix, threshold) in tiers() {
        rules.push(
            MetricRule::count(
                format!("tcbh_{prefix}_sla_pct"),
                busy_hour_answered(level).queue_at_most(threshold),
            )
            .percentage_of(format!("tcbh_{prefix}_ans")),
        );
    }

    for (location, prefix) in REGIONS {
        rules.push(MetricRule::count(
            format!("{prefix}_90s_ans"),
            Predicate::all()
                .location(location)
                .frl(&[FRL_AGENT_ANSWERED])
                .queue_at_most(REGION_THRESHOLD_SECS),
        ));
    }

    for (location, prefix) in REGIONS {
        rules.push(MetricRule::count(
            format!("{prefix}_90s_abd"),
            Predicate::all()
                .location(location)
                .frl(&[FRL_AGENT_ABANDONED])
                .queue_above(REGION_THRESHOLD_SECS),
        ));
    }

    for (location, prefix) in REGIONS {
        rules.push(MetricRule::mean(
            format!("{prefix}_overall_queue"),
            Predicate::all().location(location).frl(&agent_offered),
            Field::QueDuration,
        ));
    }

    rules
}
