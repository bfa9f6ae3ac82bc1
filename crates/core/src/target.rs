//! Monitored targets and their scan history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::run::{IssueCounts, ScanResult};

/// A site or domain under monitoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    /// Minimum acceptable score. Crossing below it raises a threshold breach.
    pub min_score: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// One historical scan of a target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSnapshot {
    pub target_id: Uuid,
    pub run_id: Option<Uuid>,
    pub score: f64,
    pub issue_counts: IssueCounts,
    pub scanned_at: DateTime<Utc>,
}

impl ScanSnapshot {
    pub fn from_result(
        target_id: Uuid,
        run_id: Option<Uuid>,
        result: &ScanResult,
        scanned_at: DateTime<Utc>,
    ) -> Self {
        Self {
            target_id,
            run_id,
            score: result.score,
            issue_counts: result.issue_counts,
            scanned_at,
        }
    }
}
