//! Regression alerts.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PulseError;

/// Kind of regression an alert reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    ScoreDrop,
    ThresholdBreach,
    NewCriticalIssues,
    ScanFailed,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::ScoreDrop => "SCORE_DROP",
            AlertType::ThresholdBreach => "THRESHOLD_BREACH",
            AlertType::NewCriticalIssues => "NEW_CRITICAL_ISSUES",
            AlertType::ScanFailed => "SCAN_FAILED",
        }
    }

    /// Tie-break rank among detector-raised types. Lower wins.
    pub fn precedence(&self) -> u8 {
        match self {
            AlertType::ScoreDrop => 0,
            AlertType::ThresholdBreach => 1,
            AlertType::NewCriticalIssues => 2,
            AlertType::ScanFailed => 3,
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertType {
    type Err = PulseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SCORE_DROP" => Ok(AlertType::ScoreDrop),
            "THRESHOLD_BREACH" => Ok(AlertType::ThresholdBreach),
            "NEW_CRITICAL_ISSUES" => Ok(AlertType::NewCriticalIssues),
            "SCAN_FAILED" => Ok(AlertType::ScanFailed),
            _ => Err(PulseError::UnknownVariant {
                kind: "alert type",
                value: s.to_string(),
            }),
        }
    }
}

/// Alert severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = PulseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LOW" => Ok(Severity::Low),
            "MEDIUM" => Ok(Severity::Medium),
            "HIGH" => Ok(Severity::High),
            "CRITICAL" => Ok(Severity::Critical),
            _ => Err(PulseError::UnknownVariant {
                kind: "severity",
                value: s.to_string(),
            }),
        }
    }
}

/// A persisted alert. Resolution only happens through an explicit owner action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub target_id: Uuid,
    pub alert_type: AlertType,
    pub severity: Severity,
    pub current_score: Option<f64>,
    pub previous_score: Option<f64>,
    pub threshold: Option<f64>,
    pub message: String,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Alert contents before the store assigns identity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewAlert {
    pub target_id: Uuid,
    pub alert_type: AlertType,
    pub severity: Severity,
    pub current_score: Option<f64>,
    pub previous_score: Option<f64>,
    pub threshold: Option<f64>,
    pub message: String,
}

impl NewAlert {
    pub fn into_alert(self, created_at: DateTime<Utc>) -> Alert {
        Alert {
            id: Uuid::new_v4(),
            target_id: self.target_id,
            alert_type: self.alert_type,
            severity: self.severity,
            current_score: self.current_score,
            previous_score: self.previous_score,
            threshold: self.threshold,
            message: self.message,
            resolved: false,
            resolved_at: None,
            resolved_by: None,
            created_at,
        }
    }
}
