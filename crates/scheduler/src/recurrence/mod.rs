//! Recurrence math: when a schedule is next due, and which calendar window a
//! firing belongs to.
//!
//! Everything here is a pure function of its inputs. Callers pass the
//! reference instant explicitly; nothing in this module reads the clock.
//!
//! Local-time policy:
//! - A wall-clock time skipped by a DST gap fires the gap length later
//!   (02:30 on a spring-forward night in Europe/Amsterdam fires at 03:30).
//! - A wall-clock time that occurs twice picks the earlier instant.
//! - `day_of_month` past the end of a short month fires on that month's last
//!   day (31 in February fires on the 28th or 29th).

mod calc;
mod window;


use thiserror::Error;

pub use calc::{compute_next_run, upcoming, CompiledRule};
pub(crate) use calc::parse_time_of_day;
pub use window::{window_key, window_key_for};

/// A recurrence rule that cannot be evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecurrenceError {
    #[error("time of day must be HH:MM between 00:00 and 23:59, got '{0}'")]
    InvalidTimeOfDay(String),

    #[error("unknown timezone '{0}'")]
    UnknownTimezone(String),

    #[error("weekly schedules need at least one day of week")]
    EmptyWeekdays,

    #[error("day of week must be 0 (Sunday) to 6 (Saturday), got {0}")]
    InvalidWeekday(u8),

    #[error("monthly schedules need a day of month")]
    MissingDayOfMonth,

    #[error("day of month must be 1 to 31, got {0}")]
    InvalidDayOfMonth(u8),
}
