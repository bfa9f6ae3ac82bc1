//! Recurrence rule checks: time of day, timezone, cadence fields, validity window.

use std::collections::HashSet;

use chrono_tz::Tz;
use pulse_core::{Frequency, RecurrenceRule};

use super::fuzzy::suggest_timezone;
use super::ValidationResult;
use crate::recurrence::CompiledRule;

pub(super) fn validate_rule(rule: &RecurrenceRule, result: &mut ValidationResult) {
    if CompiledRule::compile(rule).is_ok() {
        advisories(rule, result);
        check_window(rule, result);
        return;
    }

    // Compile stops at the first problem; walk the fields to report all of them.
    if crate::recurrence::parse_time_of_day(&rule.time_of_day).is_none() {
        result.reject(
            "rule.time_of_day",
            format!(
                "Invalid time of day '{}', expected HH:MM between 00:00 and 23:59",
                rule.time_of_day
            ),
        );
    }

    validate_timezone(&rule.timezone, result);

    match rule.frequency {
        Frequency::Daily => {}
        Frequency::Weekly => {
            if rule.days_of_week.is_empty() {
                result.reject(
                    "rule.days_of_week",
                    "Weekly schedules need at least one day of week (0 = Sunday .. 6 = Saturday)",
                );
            }
            for (i, day) in rule.days_of_week.iter().enumerate() {
                if *day > 6 {
                    result.reject(
                        format!("rule.days_of_week[{i}]"),
                        format!("Day of week must be 0 to 6, got {day}"),
                    );
                }
            }
        }
        Frequency::Monthly => match rule.day_of_month {
            None => result.reject("rule.day_of_month", "Monthly schedules need a day of month"),
            Some(dom) if !(1..=31).contains(&dom) => result.reject(
                "rule.day_of_month",
                format!("Day of month must be 1 to 31, got {dom}"),
            ),
            Some(_) => {}
        },
    }

    check_window(rule, result);
}

fn validate_timezone(tz: &str, result: &mut ValidationResult) {
    if tz.parse::<Tz>().is_ok() {
        return;
    }
    let message = format!("Unknown timezone '{tz}', expected an IANA name such as 'Europe/Amsterdam'");
    match suggest_timezone(tz) {
        Some(suggestion) => result.reject_with_hint(
            "rule.timezone",
            message,
            format!("Did you mean '{suggestion}'?"),
        ),
        None => result.reject("rule.timezone", message),
    }
}

fn check_window(rule: &RecurrenceRule, result: &mut ValidationResult) {
    if let Some(end) = rule.ends_at {
        if end < rule.starts_at {
            result.reject("rule.ends_at", "ends_at must not be earlier than starts_at");
        }
    }
}

fn advisories(rule: &RecurrenceRule, result: &mut ValidationResult) {
    match rule.frequency {
        Frequency::Weekly => {
            let unique: HashSet<u8> = rule.days_of_week.iter().copied().collect();
            if unique.len() != rule.days_of_week.len() {
                result.note("rule.days_of_week", "Duplicate days of week are ignored");
            }
        }
        Frequency::Monthly => {
            if let Some(dom) = rule.day_of_month {
                if dom > 28 {
                    result.note(
                        "rule.day_of_month",
                        format!("Months shorter than {dom} days run on their last day"),
                    );
                }
            }
        }
        Frequency::Daily => {}
    }

    if rule.frequency != Frequency::Weekly && !rule.days_of_week.is_empty() {
        result.note("rule.days_of_week", "Only weekly schedules use days of week");
    }
    if rule.frequency != Frequency::Monthly && rule.day_of_month.is_some() {
        result.note("rule.day_of_month", "Only monthly schedules use day of month");
    }
}
