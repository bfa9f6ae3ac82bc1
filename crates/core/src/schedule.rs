//! Schedule and recurrence-rule entities.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PulseError;

/// Maximum number of report recipients on a single schedule.
pub const MAX_RECIPIENTS: usize = 20;

/// How often a schedule fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "DAILY",
            Frequency::Weekly => "WEEKLY",
            Frequency::Monthly => "MONTHLY",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = PulseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DAILY" => Ok(Frequency::Daily),
            "WEEKLY" => Ok(Frequency::Weekly),
            "MONTHLY" => Ok(Frequency::Monthly),
            _ => Err(PulseError::UnknownVariant {
                kind: "frequency",
                value: s.to_string(),
            }),
        }
    }
}

/// When a schedule is due.
///
/// Field-level constraints (checked by the scheduler's validation before a
/// rule is persisted):
/// - `time_of_day` is `HH:MM`, 00:00 to 23:59, local to `timezone`.
/// - `days_of_week` uses 0 = Sunday .. 6 = Saturday and must be non-empty
///   for [`Frequency::Weekly`]. Ignored otherwise.
/// - `day_of_month` is 1..=31 and required for [`Frequency::Monthly`].
///   Months shorter than `day_of_month` fire on their last day.
/// - `starts_at` is inclusive, `ends_at` (when set) is inclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub frequency: Frequency,
    #[serde(default)]
    pub days_of_week: Vec<u8>,
    #[serde(default)]
    pub day_of_month: Option<u8>,
    pub time_of_day: String,
    pub timezone: String,
    pub starts_at: DateTime<Utc>,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
}

/// Output format for delivered reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Html,
    Text,
    Json,
}

impl ReportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportFormat::Html => "html",
            ReportFormat::Text => "text",
            ReportFormat::Json => "json",
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportFormat {
    type Err = PulseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "html" => Ok(ReportFormat::Html),
            "text" => Ok(ReportFormat::Text),
            "json" => Ok(ReportFormat::Json),
            _ => Err(PulseError::UnknownVariant {
                kind: "report format",
                value: s.to_string(),
            }),
        }
    }
}

/// Who receives a report after each run, and in what shape.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default)]
    pub recipients: Vec<String>,
    #[serde(default)]
    pub format: ReportFormat,
    #[serde(default)]
    pub summary_only: bool,
}

/// A recurring monitoring intent for one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: Uuid,
    pub owner_id: String,
    pub target_id: Uuid,
    pub rule: RecurrenceRule,
    pub enabled: bool,
    /// Next due instant. `None` means the rule is exhausted (dormant).
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub delivery: DeliveryConfig,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Schedule {
    /// Whether the schedule belongs in the due set at `as_of`.
    pub fn is_due(&self, as_of: DateTime<Utc>) -> bool {
        self.enabled && self.next_run_at.is_some_and(|next| next <= as_of)
    }
}
