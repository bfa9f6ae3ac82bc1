//! Regression detection.
//!
//! [`classify`] is pure: it compares the latest scan against the previous
//! snapshot and returns at most one candidate alert. [`RegressionDetector`]
//! wraps it with the cool-down dedup against the [`AlertStore`].

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use pulse_core::config::RegressionConfig;
use pulse_core::{Alert, AlertType, NewAlert, ScanResult, ScanSnapshot, Severity, Target};

use crate::store::{AlertInsert, AlertStore, StoreError};

/// What the detector did with a scan.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectionOutcome {
    NoRegression,
    /// A regression was found but an unresolved alert of the same type is
    /// still inside the cool-down.
    Suppressed { alert_type: AlertType, existing: uuid::Uuid },
    Raised(Alert),
}

/// Pick the single most severe regression between `previous` and `latest`.
///
/// Without a previous snapshot there is nothing to regress from, so the
/// first scan of a target never alerts.
pub fn classify(
    target: &Target,
    latest: &ScanResult,
    previous: Option<&ScanSnapshot>,
    config: &RegressionConfig,
) -> Option<NewAlert> {
    let previous = previous?;

    let candidates = [
        score_drop(target, latest, previous, config),
        threshold_breach(target, latest, previous),
        new_critical_issues(target, latest, previous, config),
    ];

    candidates.into_iter().flatten().min_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then(a.alert_type.precedence().cmp(&b.alert_type.precedence()))
    })
}

fn score_drop(
    target: &Target,
    latest: &ScanResult,
    previous: &ScanSnapshot,
    config: &RegressionConfig,
) -> Option<NewAlert> {
    let drop = previous.score - latest.score;
    if drop <= config.score_drop_delta {
        return None;
    }
    let severity = if drop >= config.score_drop_critical {
        Severity::Critical
    } else if drop >= config.score_drop_high {
        Severity::High
    } else {
        Severity::Medium
    };
    Some(NewAlert {
        target_id: target.id,
        alert_type: AlertType::ScoreDrop,
        severity,
        current_score: Some(latest.score),
        previous_score: Some(previous.score),
        threshold: Some(config.score_drop_delta),
        message: format!(
            "Score for {} dropped {:.1} points ({:.1} -> {:.1})",
            target.name, drop, previous.score, latest.score
        ),
    })
}

fn threshold_breach(target: &Target, latest: &ScanResult, previous: &ScanSnapshot) -> Option<NewAlert> {
    let min = target.min_score?;
    if latest.score >= min || previous.score < min {
        return None;
    }
    Some(NewAlert {
        target_id: target.id,
        alert_type: AlertType::ThresholdBreach,
        severity: Severity::High,
        current_score: Some(latest.score),
        previous_score: Some(previous.score),
        threshold: Some(min),
        message: format!(
            "Score for {} fell below the minimum of {:.1} ({:.1} -> {:.1})",
            target.name, min, previous.score, latest.score
        ),
    })
}

fn new_critical_issues(
    target: &Target,
    latest: &ScanResult,
    previous: &ScanSnapshot,
    config: &RegressionConfig,
) -> Option<NewAlert> {
    let before = previous.issue_counts.critical;
    let after = latest.issue_counts.critical;
    let increase = after.checked_sub(before).filter(|n| *n > 0)?;

    let [medium, high, critical] = config.critical_issue_steps;
    let severity = if increase >= critical {
        Severity::Critical
    } else if increase >= high {
        Severity::High
    } else if increase >= medium {
        Severity::Medium
    } else {
        Severity::Low
    };
    Some(NewAlert {
        target_id: target.id,
        alert_type: AlertType::NewCriticalIssues,
        severity,
        current_score: Some(latest.score),
        previous_score: Some(previous.score),
        threshold: None,
        message: format!(
            "{} new critical issue(s) on {} ({} -> {})",
            increase, target.name, before, after
        ),
    })
}

/// Runs [`classify`] and persists the result through the dedup insert.
pub struct RegressionDetector {
    config: RegressionConfig,
}

impl RegressionDetector {
    pub fn new(config: RegressionConfig) -> Self {
        Self { config }
    }

    /// Start of the cool-down window ending at `now`.
    pub fn cooldown_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::hours(self.config.alert_cooldown_hours)
    }

    pub async fn detect<S: AlertStore + ?Sized>(
        &self,
        store: &S,
        target: &Target,
        latest: &ScanResult,
        previous: Option<&ScanSnapshot>,
        now: DateTime<Utc>,
    ) -> Result<DetectionOutcome, StoreError> {
        let Some(candidate) = classify(target, latest, previous, &self.config) else {
            return Ok(DetectionOutcome::NoRegression);
        };
        self.record(store, candidate, now).await
    }

    /// Persist an alert unless one of the same type is still cooling down.
    pub async fn record<S: AlertStore + ?Sized>(
        &self,
        store: &S,
        candidate: NewAlert,
        now: DateTime<Utc>,
    ) -> Result<DetectionOutcome, StoreError> {
        let alert_type = candidate.alert_type;
        let alert = candidate.into_alert(now);
        match store.insert_alert_deduped(&alert, self.cooldown_start(now)).await? {
            AlertInsert::Inserted => {
                info!(
                    target_id = %alert.target_id,
                    alert_id = %alert.id,
                    alert_type = %alert.alert_type,
                    severity = %alert.severity,
                    "Alert raised"
                );
                Ok(DetectionOutcome::Raised(alert))
            }
            AlertInsert::Suppressed { existing } => {
                debug!(
                    target_id = %alert.target_id,
                    alert_type = %alert_type,
                    existing = %existing,
                    "Alert suppressed by cool-down"
                );
                Ok(DetectionOutcome::Suppressed { alert_type, existing })
            }
        }
    }
}
