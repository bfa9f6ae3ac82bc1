use chrono::{DateTime, Datelike, TimeZone, Utc};
use chrono_tz::Tz;

use pulse_core::{Frequency, RecurrenceRule};

use super::RecurrenceError;

/// Calendar slot that `at` falls in, read in `tz`.
///
/// - daily: `2024-01-15`
/// - weekly: ISO week, `2024-W03`
/// - monthly: `2024-01`
pub fn window_key(frequency: Frequency, tz: Tz, at: DateTime<Utc>) -> String {
    let local = tz.from_utc_datetime(&at.naive_utc());
    match frequency {
        Frequency::Daily => local.format("%Y-%m-%d").to_string(),
        Frequency::Weekly => {
            let iso = local.iso_week();
            format!("{}-W{:02}", iso.year(), iso.week())
        }
        Frequency::Monthly => local.format("%Y-%m").to_string(),
    }
}

/// Window key for a firing of `rule` at `at`.
///
/// Weekly rules that select more than one weekday fire several times per ISO
/// week, so their windows are ISO week dates (`2024-W03-3`) instead.
pub fn window_key_for(rule: &RecurrenceRule, at: DateTime<Utc>) -> Result<String, RecurrenceError> {
    let tz: Tz = rule
        .timezone
        .parse()
        .map_err(|_| RecurrenceError::UnknownTimezone(rule.timezone.clone()))?;
    if rule.frequency == Frequency::Weekly && fires_more_than_once_a_week(&rule.days_of_week) {
        let local = tz.from_utc_datetime(&at.naive_utc());
        let iso = local.iso_week();
        return Ok(format!(
            "{}-W{:02}-{}",
            iso.year(),
            iso.week(),
            local.weekday().number_from_monday()
        ));
    }
    Ok(window_key(rule.frequency, tz, at))
}

fn fires_more_than_once_a_week(days: &[u8]) -> bool {
    days.iter().any(|d| *d != days[0])
}
