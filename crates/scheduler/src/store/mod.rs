//! Storage seams the scheduler depends on.
//!
//! Three narrow traits, one per concern, combined into [`MonitorStore`] for
//! callers that need all of them. Two backends: [`MemoryStore`] (tests and
//! single-process deployments) and [`PgStore`] (PostgreSQL via sqlx).
//!
//! The only operation that must be atomic across concurrent workers is
//! [`ScheduleStore::claim`]. Every other write touches a single row.

mod memory;
mod postgres;


use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use pulse_core::{Alert, Run, RunOutcome, ScanSnapshot, Schedule, Target};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: Uuid },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("corrupt {kind} row: {detail}")]
    Corrupt { kind: &'static str, detail: String },

    #[error("store lock poisoned")]
    Poisoned,
}

/// Result of trying to reserve a (schedule, window) pair.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    /// A new RUNNING run now owns the window.
    Claimed(Run),
    /// Someone else owns the window, or the schedule moved on since it was
    /// listed as due.
    AlreadyClaimed,
}

/// Result of a deduplicated alert insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertInsert {
    Inserted,
    /// An unresolved alert of the same type already exists inside the cool-down.
    Suppressed { existing: Uuid },
}

#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn insert_schedule(&self, schedule: &Schedule) -> Result<(), StoreError>;

    async fn get_schedule(&self, id: Uuid) -> Result<Option<Schedule>, StoreError>;

    /// Replace a schedule's definition (rule, delivery, enabled flag).
    ///
    /// `next_run_at` is written only when `reset_next_run` is set, and
    /// `last_run_at` never is; both otherwise belong to the executor.
    /// Errors with `NotFound` if absent.
    async fn update_schedule(&self, schedule: &Schedule, reset_next_run: bool) -> Result<(), StoreError>;

    /// Delete a schedule and its runs. Returns whether it existed.
    async fn delete_schedule(&self, id: Uuid) -> Result<bool, StoreError>;

    /// All schedules, optionally only one owner's, newest first.
    async fn list_schedules(&self, owner_id: Option<&str>) -> Result<Vec<Schedule>, StoreError>;

    /// Enabled schedules with `next_run_at <= as_of`, oldest due first, at most `limit`.
    async fn list_due(&self, limit: usize, as_of: DateTime<Utc>) -> Result<Vec<Schedule>, StoreError>;

    /// Atomically reserve `window_key` for one execution.
    ///
    /// Succeeds only when the schedule is enabled, its `next_run_at` still
    /// equals `fire_at`, and no non-failed run holds `(schedule_id, window_key)`.
    /// Anything else, including a deleted schedule, is `AlreadyClaimed`.
    async fn claim(
        &self,
        schedule_id: Uuid,
        window_key: &str,
        fire_at: DateTime<Utc>,
        started_at: DateTime<Utc>,
    ) -> Result<ClaimOutcome, StoreError>;

    /// Move a RUNNING run to its final state. Finalized runs are immutable.
    async fn finalize(&self, run_id: Uuid, outcome: &RunOutcome) -> Result<Run, StoreError>;

    async fn update_next_run(
        &self,
        schedule_id: Uuid,
        next_run_at: Option<DateTime<Utc>>,
        last_run_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Move `next_run_at` from `expected` to `next_run_at` if nobody else has
    /// moved it yet. Returns whether the swap happened. Leaves `last_run_at`
    /// alone.
    async fn advance_next_run(
        &self,
        schedule_id: Uuid,
        expected: DateTime<Utc>,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<bool, StoreError>;

    /// Runs for a schedule, newest first.
    async fn list_runs(&self, schedule_id: Uuid, limit: usize) -> Result<Vec<Run>, StoreError>;

    /// Drop finished runs beyond the newest `keep`. RUNNING runs are never
    /// removed. Returns how many were deleted.
    async fn prune_runs(&self, schedule_id: Uuid, keep: usize) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait TargetStore: Send + Sync {
    async fn insert_target(&self, target: &Target) -> Result<(), StoreError>;

    async fn get_target(&self, id: Uuid) -> Result<Option<Target>, StoreError>;

    async fn list_targets(&self) -> Result<Vec<Target>, StoreError>;

    /// Most recent scans of a target, newest first.
    async fn recent_history(&self, target_id: Uuid, limit: usize) -> Result<Vec<ScanSnapshot>, StoreError>;

    /// Record a scan and trim the target's history to the newest `keep`.
    async fn append_history(&self, snapshot: &ScanSnapshot, keep: usize) -> Result<(), StoreError>;
}

#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Insert `alert` unless an unresolved alert with the same target and
    /// type was created at or after `since`.
    async fn insert_alert_deduped(
        &self,
        alert: &Alert,
        since: DateTime<Utc>,
    ) -> Result<AlertInsert, StoreError>;

    async fn get_alert(&self, id: Uuid) -> Result<Option<Alert>, StoreError>;

    /// Alerts newest first, optionally for one target.
    async fn list_alerts(
        &self,
        target_id: Option<Uuid>,
        include_resolved: bool,
    ) -> Result<Vec<Alert>, StoreError>;

    /// Mark an alert resolved. `Conflict` if it already is.
    async fn resolve_alert(
        &self,
        id: Uuid,
        resolved_by: &str,
        at: DateTime<Utc>,
    ) -> Result<Alert, StoreError>;
}

/// Everything the scheduler and the HTTP layer need from storage.
pub trait MonitorStore: ScheduleStore + TargetStore + AlertStore {
    /// Short backend label for health output.
    fn backend(&self) -> &'static str;
}
