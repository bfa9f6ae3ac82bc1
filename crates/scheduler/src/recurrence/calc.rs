use chrono::{
    DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, Offset,
    TimeZone, Utc,
};
use chrono_tz::Tz;

use pulse_core::{Frequency, RecurrenceRule};

use super::RecurrenceError;

/// Upper bound on local dates examined per lookup. Every valid rule matches
/// at least once a month, so running out means the rule is broken.
const MAX_SCAN_DAYS: u32 = 400;

/// A [`RecurrenceRule`] with its string fields parsed.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    frequency: Frequency,
    /// Bit `n` set when weekday `n` (0 = Sunday) is selected.
    weekdays: u8,
    day_of_month: u32,
    time: NaiveTime,
    tz: Tz,
    starts_at: DateTime<Utc>,
    ends_at: Option<DateTime<Utc>>,
}

impl CompiledRule {
    pub fn compile(rule: &RecurrenceRule) -> Result<Self, RecurrenceError> {
        let time = parse_time_of_day(&rule.time_of_day)
            .ok_or_else(|| RecurrenceError::InvalidTimeOfDay(rule.time_of_day.clone()))?;
        let tz: Tz = rule
            .timezone
            .parse()
            .map_err(|_| RecurrenceError::UnknownTimezone(rule.timezone.clone()))?;

        let mut weekdays = 0u8;
        let mut day_of_month = 1;
        match rule.frequency {
            Frequency::Daily => {}
            Frequency::Weekly => {
                if rule.days_of_week.is_empty() {
                    return Err(RecurrenceError::EmptyWeekdays);
                }
                for &day in &rule.days_of_week {
                    if day > 6 {
                        return Err(RecurrenceError::InvalidWeekday(day));
                    }
                    weekdays |= 1 << day;
                }
            }
            Frequency::Monthly => {
                let dom = rule.day_of_month.ok_or(RecurrenceError::MissingDayOfMonth)?;
                if !(1..=31).contains(&dom) {
                    return Err(RecurrenceError::InvalidDayOfMonth(dom));
                }
                day_of_month = u32::from(dom);
            }
        }

        Ok(Self {
            frequency: rule.frequency,
            weekdays,
            day_of_month,
            time,
            tz,
            starts_at: rule.starts_at,
            ends_at: rule.ends_at,
        })
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn frequency(&self) -> Frequency {
        self.frequency
    }

    /// Earliest occurrence strictly after `reference` and no earlier than
    /// `starts_at`. `None` once the occurrence would pass `ends_at`.
    pub fn next_after(&self, reference: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let floor = reference.max(self.starts_at);
        // Start one local day early: a gap-shifted occurrence from the
        // previous date can still land after the floor.
        let mut date = self
            .tz
            .from_utc_datetime(&floor.naive_utc())
            .date_naive()
            .pred_opt()?;

        for _ in 0..MAX_SCAN_DAYS {
            if self.matches(date) {
                if let Some(candidate) = resolve_local(&self.tz, date.and_time(self.time)) {
                    if candidate > reference && candidate >= self.starts_at {
                        if self.ends_at.is_some_and(|end| candidate > end) {
                            return None;
                        }
                        return Some(candidate);
                    }
                }
            }
            date = date.succ_opt()?;
        }
        None
    }

    fn matches(&self, date: NaiveDate) -> bool {
        match self.frequency {
            Frequency::Daily => true,
            Frequency::Weekly => {
                let dow = date.weekday().num_days_from_sunday();
                self.weekdays & (1 << dow) != 0
            }
            Frequency::Monthly => {
                let last = last_day_of_month(date.year(), date.month());
                date.day() == self.day_of_month.min(last)
            }
        }
    }
}

/// Next eligible instant for `rule` strictly after `reference`.
///
/// `Ok(None)` means the rule has no further occurrence inside its validity
/// window and the schedule is dormant.
pub fn compute_next_run(
    rule: &RecurrenceRule,
    reference: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>, RecurrenceError> {
    Ok(CompiledRule::compile(rule)?.next_after(reference))
}

/// The next `count` occurrences after `from`, fewer if the rule runs out.
pub fn upcoming(
    rule: &RecurrenceRule,
    from: DateTime<Utc>,
    count: usize,
) -> Result<Vec<DateTime<Utc>>, RecurrenceError> {
    let compiled = CompiledRule::compile(rule)?;
    let mut out = Vec::with_capacity(count);
    let mut cursor = from;
    while out.len() < count {
        match compiled.next_after(cursor) {
            Some(next) => {
                out.push(next);
                cursor = next;
            }
            None => break,
        }
    }
    Ok(out)
}

/// Strict `HH:MM` parse. Single-digit hours and seconds are rejected.
pub(crate) fn parse_time_of_day(s: &str) -> Option<NaiveTime> {
    let bytes = s.as_bytes();
    if bytes.len() != 5 || bytes[2] != b':' {
        return None;
    }
    let digits = [bytes[0], bytes[1], bytes[3], bytes[4]];
    if !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    let hour = u32::from(bytes[0] - b'0') * 10 + u32::from(bytes[1] - b'0');
    let minute = u32::from(bytes[3] - b'0') * 10 + u32::from(bytes[4] - b'0');
    NaiveTime::from_hms_opt(hour, minute, 0)
}

fn last_day_of_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(28)
}

/// Map a local wall-clock time to an instant.
fn resolve_local(tz: &Tz, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
        LocalResult::None => {
            // Skipped by a gap: read it with the offset in force before the
            // transition, which lands the gap length later.
            let before = tz.offset_from_utc_datetime(&(naive - Duration::days(1))).fix();
            before
                .from_local_datetime(&naive)
                .single()
                .map(|dt| dt.with_timezone(&Utc))
        }
    }
}
