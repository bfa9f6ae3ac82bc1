//! Run records and scan results.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PulseError;

/// Lifecycle state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
        }
    }

    /// Non-failed runs occupy their window.
    pub fn holds_window(&self) -> bool {
        !matches!(self, RunStatus::Failed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = PulseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(RunStatus::Running),
            "succeeded" => Ok(RunStatus::Succeeded),
            "failed" => Ok(RunStatus::Failed),
            _ => Err(PulseError::UnknownVariant {
                kind: "run status",
                value: s.to_string(),
            }),
        }
    }
}

/// Issue counts by impact, as reported by the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IssueCounts {
    #[serde(default)]
    pub critical: u32,
    #[serde(default)]
    pub serious: u32,
    #[serde(default)]
    pub moderate: u32,
    #[serde(default)]
    pub minor: u32,
}

impl IssueCounts {
    pub fn total(&self) -> u32 {
        self.critical + self.serious + self.moderate + self.minor
    }
}

/// What the scan collaborator returns for one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    /// Accessibility score, 0..=100.
    pub score: f64,
    pub issue_counts: IssueCounts,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
}

/// Final state handed to the store when a run completes.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Succeeded {
        result: ScanResult,
        completed_at: DateTime<Utc>,
    },
    Failed {
        error: String,
        completed_at: DateTime<Utc>,
    },
}

impl RunOutcome {
    pub fn status(&self) -> RunStatus {
        match self {
            RunOutcome::Succeeded { .. } => RunStatus::Succeeded,
            RunOutcome::Failed { .. } => RunStatus::Failed,
        }
    }

    pub fn completed_at(&self) -> DateTime<Utc> {
        match self {
            RunOutcome::Succeeded { completed_at, .. } | RunOutcome::Failed { completed_at, .. } => {
                *completed_at
            }
        }
    }
}

/// One executed (or attempted) occurrence of a schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub schedule_id: Uuid,
    /// Calendar slot this run satisfies, e.g. `2024-01-15`, `2024-W03`, `2024-01`.
    pub window_key: String,
    pub status: RunStatus,
    /// Scheduled instant that made the schedule due.
    pub fired_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub score: Option<f64>,
    pub issue_counts: Option<IssueCounts>,
    pub error: Option<String>,
}

impl Run {
    /// A freshly claimed run.
    pub fn running(
        schedule_id: Uuid,
        window_key: impl Into<String>,
        fired_at: DateTime<Utc>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            schedule_id,
            window_key: window_key.into(),
            status: RunStatus::Running,
            fired_at,
            started_at,
            completed_at: None,
            score: None,
            issue_counts: None,
            error: None,
        }
    }

    /// Copy the outcome's snapshot onto this run.
    pub fn apply(&mut self, outcome: &RunOutcome) {
        self.status = outcome.status();
        self.completed_at = Some(outcome.completed_at());
        match outcome {
            RunOutcome::Succeeded { result, .. } => {
                self.score = Some(result.score);
                self.issue_counts = Some(result.issue_counts);
                self.error = None;
            }
            RunOutcome::Failed { error, .. } => {
                self.error = Some(error.clone());
            }
        }
    }
}
