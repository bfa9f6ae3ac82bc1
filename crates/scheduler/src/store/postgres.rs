//! PostgreSQL store via sqlx.
//!
//! Claim exclusivity comes from the partial unique index
//! `runs(schedule_id, window_key) WHERE status <> 'failed'` plus a
//! compare-and-swap on `schedules.next_run_at` inside the same statement.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use pulse_core::{
    Alert, AlertType, DeliveryConfig, Frequency, IssueCounts, RecurrenceRule, ReportFormat, Run,
    RunOutcome, RunStatus, ScanSnapshot, Schedule, Severity, Target,
};

use super::{
    AlertInsert, AlertStore, ClaimOutcome, MonitorStore, ScheduleStore, StoreError, TargetStore,
};

macro_rules! schedule_columns {
    () => {
        "id, owner_id, target_id, frequency, days_of_week, day_of_month, time_of_day, timezone, \
         starts_at, ends_at, enabled, next_run_at, last_run_at, recipients, report_format, \
         summary_only, created_at, updated_at"
    };
}

macro_rules! run_columns {
    () => {
        "id, schedule_id, window_key, status, fired_at, started_at, completed_at, score, \
         critical_count, serious_count, moderate_count, minor_count, error"
    };
}

macro_rules! alert_columns {
    () => {
        "id, target_id, alert_type, severity, current_score, previous_score, threshold, message, \
         resolved, resolved_at, resolved_by, created_at"
    };
}

// ── Rows ─────────────────────────────────────────────────────────

#[derive(Debug, sqlx::FromRow)]
struct ScheduleRow {
    id: Uuid,
    owner_id: String,
    target_id: Uuid,
    frequency: String,
    days_of_week: Vec<i16>,
    day_of_month: Option<i16>,
    time_of_day: String,
    timezone: String,
    starts_at: DateTime<Utc>,
    ends_at: Option<DateTime<Utc>>,
    enabled: bool,
    next_run_at: Option<DateTime<Utc>>,
    last_run_at: Option<DateTime<Utc>>,
    recipients: Vec<String>,
    report_format: String,
    summary_only: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ScheduleRow> for Schedule {
    type Error = StoreError;

    fn try_from(row: ScheduleRow) -> Result<Self, Self::Error> {
        let corrupt = |detail: String| StoreError::Corrupt { kind: "schedule", detail };
        let frequency: Frequency = row.frequency.parse().map_err(|e| corrupt(format!("{e}")))?;
        let format: ReportFormat = row.report_format.parse().map_err(|e| corrupt(format!("{e}")))?;
        let days_of_week = row
            .days_of_week
            .iter()
            .map(|d| u8::try_from(*d).map_err(|_| corrupt(format!("day of week {d}"))))
            .collect::<Result<Vec<_>, _>>()?;
        let day_of_month = row
            .day_of_month
            .map(|d| u8::try_from(d).map_err(|_| corrupt(format!("day of month {d}"))))
            .transpose()?;

        Ok(Schedule {
            id: row.id,
            owner_id: row.owner_id,
            target_id: row.target_id,
            rule: RecurrenceRule {
                frequency,
                days_of_week,
                day_of_month,
                time_of_day: row.time_of_day,
                timezone: row.timezone,
                starts_at: row.starts_at,
                ends_at: row.ends_at,
            },
            enabled: row.enabled,
            next_run_at: row.next_run_at,
            last_run_at: row.last_run_at,
            delivery: DeliveryConfig {
                recipients: row.recipients,
                format,
                summary_only: row.summary_only,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RunRow {
    id: Uuid,
    schedule_id: Uuid,
    window_key: String,
    status: String,
    fired_at: DateTime<Utc>,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    score: Option<f64>,
    critical_count: Option<i32>,
    serious_count: Option<i32>,
    moderate_count: Option<i32>,
    minor_count: Option<i32>,
    error: Option<String>,
}

impl TryFrom<RunRow> for Run {
    type Error = StoreError;

    fn try_from(row: RunRow) -> Result<Self, Self::Error> {
        let status: RunStatus = row.status.parse().map_err(|e| StoreError::Corrupt {
            kind: "run",
            detail: format!("{e}"),
        })?;
        let issue_counts = match (
            row.critical_count,
            row.serious_count,
            row.moderate_count,
            row.minor_count,
        ) {
            (Some(critical), Some(serious), Some(moderate), Some(minor)) => Some(IssueCounts {
                critical: count(critical),
                serious: count(serious),
                moderate: count(moderate),
                minor: count(minor),
            }),
            _ => None,
        };
        Ok(Run {
            id: row.id,
            schedule_id: row.schedule_id,
            window_key: row.window_key,
            status,
            fired_at: row.fired_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            score: row.score,
            issue_counts,
            error: row.error,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TargetRow {
    id: Uuid,
    name: String,
    url: String,
    min_score: Option<f64>,
    created_at: DateTime<Utc>,
}

impl From<TargetRow> for Target {
    fn from(row: TargetRow) -> Self {
        Target {
            id: row.id,
            name: row.name,
            url: row.url,
            min_score: row.min_score,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct HistoryRow {
    target_id: Uuid,
    run_id: Option<Uuid>,
    score: f64,
    critical_count: i32,
    serious_count: i32,
    moderate_count: i32,
    minor_count: i32,
    scanned_at: DateTime<Utc>,
}

impl From<HistoryRow> for ScanSnapshot {
    fn from(row: HistoryRow) -> Self {
        ScanSnapshot {
            target_id: row.target_id,
            run_id: row.run_id,
            score: row.score,
            issue_counts: IssueCounts {
                critical: count(row.critical_count),
                serious: count(row.serious_count),
                moderate: count(row.moderate_count),
                minor: count(row.minor_count),
            },
            scanned_at: row.scanned_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AlertRow {
    id: Uuid,
    target_id: Uuid,
    alert_type: String,
    severity: String,
    current_score: Option<f64>,
    previous_score: Option<f64>,
    threshold: Option<f64>,
    message: String,
    resolved: bool,
    resolved_at: Option<DateTime<Utc>>,
    resolved_by: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<AlertRow> for Alert {
    type Error = StoreError;

    fn try_from(row: AlertRow) -> Result<Self, Self::Error> {
        let corrupt = |detail: String| StoreError::Corrupt { kind: "alert", detail };
        let alert_type: AlertType = row.alert_type.parse().map_err(|e| corrupt(format!("{e}")))?;
        let severity: Severity = row.severity.parse().map_err(|e| corrupt(format!("{e}")))?;
        Ok(Alert {
            id: row.id,
            target_id: row.target_id,
            alert_type,
            severity,
            current_score: row.current_score,
            previous_score: row.previous_score,
            threshold: row.threshold,
            message: row.message,
            resolved: row.resolved,
            resolved_at: row.resolved_at,
            resolved_by: row.resolved_by,
            created_at: row.created_at,
        })
    }
}

fn count(n: i32) -> u32 {
    u32::try_from(n).unwrap_or(0)
}

fn db_count(n: u32) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

fn db_limit(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn bind_schedule<'q>(
    query: Query<'q, Postgres, PgArguments>,
    s: &'q Schedule,
) -> Query<'q, Postgres, PgArguments> {
    let days: Vec<i16> = s.rule.days_of_week.iter().map(|d| i16::from(*d)).collect();
    query
        .bind(s.id)
        .bind(&s.owner_id)
        .bind(s.target_id)
        .bind(s.rule.frequency.as_str())
        .bind(days)
        .bind(s.rule.day_of_month.map(i16::from))
        .bind(&s.rule.time_of_day)
        .bind(&s.rule.timezone)
        .bind(s.rule.starts_at)
        .bind(s.rule.ends_at)
        .bind(s.enabled)
        .bind(s.next_run_at)
        .bind(s.last_run_at)
        .bind(&s.delivery.recipients)
        .bind(s.delivery.format.as_str())
        .bind(s.delivery.summary_only)
        .bind(s.created_at)
        .bind(s.updated_at)
}

// ── Store ────────────────────────────────────────────────────────

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ScheduleStore for PgStore {
    async fn insert_schedule(&self, schedule: &Schedule) -> Result<(), StoreError> {
        let sql = concat!(
            "INSERT INTO schedules (",
            schedule_columns!(),
            ") VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)"
        );
        bind_schedule(sqlx::query(sql), schedule)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_schedule(&self, id: Uuid) -> Result<Option<Schedule>, StoreError> {
        let row = sqlx::query_as::<_, ScheduleRow>(concat!(
            "SELECT ",
            schedule_columns!(),
            " FROM schedules WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Schedule::try_from).transpose()
    }

    async fn update_schedule(&self, schedule: &Schedule, reset_next_run: bool) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"UPDATE schedules
                  SET frequency = $2, days_of_week = $3, day_of_month = $4, time_of_day = $5,
                      timezone = $6, starts_at = $7, ends_at = $8, enabled = $9,
                      recipients = $10, report_format = $11, summary_only = $12,
                      updated_at = $13,
                      next_run_at = CASE WHEN $14 THEN $15 ELSE next_run_at END
                WHERE id = $1"#,
        )
        .bind(schedule.id)
        .bind(schedule.rule.frequency.as_str())
        .bind(schedule.rule.days_of_week.iter().map(|d| i16::from(*d)).collect::<Vec<_>>())
        .bind(schedule.rule.day_of_month.map(i16::from))
        .bind(&schedule.rule.time_of_day)
        .bind(&schedule.rule.timezone)
        .bind(schedule.rule.starts_at)
        .bind(schedule.rule.ends_at)
        .bind(schedule.enabled)
        .bind(&schedule.delivery.recipients)
        .bind(schedule.delivery.format.as_str())
        .bind(schedule.delivery.summary_only)
        .bind(schedule.updated_at)
        .bind(reset_next_run)
        .bind(schedule.next_run_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                kind: "schedule",
                id: schedule.id,
            });
        }
        Ok(())
    }

    async fn delete_schedule(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM schedules WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_schedules(&self, owner_id: Option<&str>) -> Result<Vec<Schedule>, StoreError> {
        let rows = sqlx::query_as::<_, ScheduleRow>(concat!(
            "SELECT ",
            schedule_columns!(),
            " FROM schedules WHERE ($1::TEXT IS NULL OR owner_id = $1) ORDER BY created_at DESC"
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Schedule::try_from).collect()
    }

    async fn list_due(&self, limit: usize, as_of: DateTime<Utc>) -> Result<Vec<Schedule>, StoreError> {
        let rows = sqlx::query_as::<_, ScheduleRow>(concat!(
            "SELECT ",
            schedule_columns!(),
            " FROM schedules
              WHERE enabled AND next_run_at IS NOT NULL AND next_run_at <= $1
              ORDER BY next_run_at ASC
              LIMIT $2"
        ))
        .bind(as_of)
        .bind(db_limit(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Schedule::try_from).collect()
    }

    async fn claim(
        &self,
        schedule_id: Uuid,
        window_key: &str,
        fire_at: DateTime<Utc>,
        started_at: DateTime<Utc>,
    ) -> Result<ClaimOutcome, StoreError> {
        let row = sqlx::query_as::<_, RunRow>(concat!(
            "INSERT INTO runs (id, schedule_id, window_key, status, fired_at, started_at)
             SELECT $1, s.id, $3, 'running', $4, $5
               FROM schedules s
              WHERE s.id = $2 AND s.enabled AND s.next_run_at = $4
             ON CONFLICT (schedule_id, window_key) WHERE status <> 'failed' DO NOTHING
             RETURNING ",
            run_columns!()
        ))
        .bind(Uuid::new_v4())
        .bind(schedule_id)
        .bind(window_key)
        .bind(fire_at)
        .bind(started_at)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(ClaimOutcome::Claimed(Run::try_from(row)?)),
            None => Ok(ClaimOutcome::AlreadyClaimed),
        }
    }

    async fn finalize(&self, run_id: Uuid, outcome: &RunOutcome) -> Result<Run, StoreError> {
        let (score, counts, error) = match outcome {
            RunOutcome::Succeeded { result, .. } => (Some(result.score), Some(result.issue_counts), None),
            RunOutcome::Failed { error, .. } => (None, None, Some(error.as_str())),
        };

        let row = sqlx::query_as::<_, RunRow>(concat!(
            "UPDATE runs
                SET status = $2, completed_at = $3, score = $4, critical_count = $5,
                    serious_count = $6, moderate_count = $7, minor_count = $8, error = $9
              WHERE id = $1 AND status = 'running'
              RETURNING ",
            run_columns!()
        ))
        .bind(run_id)
        .bind(outcome.status().as_str())
        .bind(outcome.completed_at())
        .bind(score)
        .bind(counts.map(|c| db_count(c.critical)))
        .bind(counts.map(|c| db_count(c.serious)))
        .bind(counts.map(|c| db_count(c.moderate)))
        .bind(counts.map(|c| db_count(c.minor)))
        .bind(error)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return Run::try_from(row);
        }

        let status: Option<String> = sqlx::query_scalar("SELECT status FROM runs WHERE id = $1")
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await?;
        match status {
            Some(status) => Err(StoreError::Conflict(format!(
                "run {run_id} already finalized as {status}"
            ))),
            None => Err(StoreError::NotFound { kind: "run", id: run_id }),
        }
    }

    async fn update_next_run(
        &self,
        schedule_id: Uuid,
        next_run_at: Option<DateTime<Utc>>,
        last_run_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE schedules SET next_run_at = $2, last_run_at = $3, updated_at = now() WHERE id = $1",
        )
        .bind(schedule_id)
        .bind(next_run_at)
        .bind(last_run_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                kind: "schedule",
                id: schedule_id,
            });
        }
        Ok(())
    }

    async fn advance_next_run(
        &self,
        schedule_id: Uuid,
        expected: DateTime<Utc>,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE schedules SET next_run_at = $3, updated_at = now() WHERE id = $1 AND next_run_at = $2",
        )
        .bind(schedule_id)
        .bind(expected)
        .bind(next_run_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_runs(&self, schedule_id: Uuid, limit: usize) -> Result<Vec<Run>, StoreError> {
        let rows = sqlx::query_as::<_, RunRow>(concat!(
            "SELECT ",
            run_columns!(),
            " FROM runs WHERE schedule_id = $1 ORDER BY started_at DESC LIMIT $2"
        ))
        .bind(schedule_id)
        .bind(db_limit(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Run::try_from).collect()
    }

    async fn prune_runs(&self, schedule_id: Uuid, keep: usize) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"DELETE FROM runs
               WHERE schedule_id = $1
                 AND status <> 'running'
                 AND id NOT IN (
                     SELECT id FROM runs WHERE schedule_id = $1
                     ORDER BY started_at DESC LIMIT $2
                 )"#,
        )
        .bind(schedule_id)
        .bind(db_limit(keep))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl TargetStore for PgStore {
    async fn insert_target(&self, target: &Target) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO targets (id, name, url, min_score, created_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(target.id)
        .bind(&target.name)
        .bind(&target.url)
        .bind(target.min_score)
        .bind(target.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_target(&self, id: Uuid) -> Result<Option<Target>, StoreError> {
        let row = sqlx::query_as::<_, TargetRow>(
            "SELECT id, name, url, min_score, created_at FROM targets WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Target::from))
    }

    async fn list_targets(&self) -> Result<Vec<Target>, StoreError> {
        let rows = sqlx::query_as::<_, TargetRow>(
            "SELECT id, name, url, min_score, created_at FROM targets ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Target::from).collect())
    }

    async fn recent_history(&self, target_id: Uuid, limit: usize) -> Result<Vec<ScanSnapshot>, StoreError> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            r#"SELECT target_id, run_id, score, critical_count, serious_count,
                      moderate_count, minor_count, scanned_at
               FROM scan_history
               WHERE target_id = $1
               ORDER BY scanned_at DESC, id DESC
               LIMIT $2"#,
        )
        .bind(target_id)
        .bind(db_limit(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ScanSnapshot::from).collect())
    }

    async fn append_history(&self, snapshot: &ScanSnapshot, keep: usize) -> Result<(), StoreError> {
        let counts = snapshot.issue_counts;
        sqlx::query(
            r#"INSERT INTO scan_history
                   (target_id, run_id, score, critical_count, serious_count,
                    moderate_count, minor_count, scanned_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"#,
        )
        .bind(snapshot.target_id)
        .bind(snapshot.run_id)
        .bind(snapshot.score)
        .bind(db_count(counts.critical))
        .bind(db_count(counts.serious))
        .bind(db_count(counts.moderate))
        .bind(db_count(counts.minor))
        .bind(snapshot.scanned_at)
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"DELETE FROM scan_history
               WHERE target_id = $1
                 AND id NOT IN (
                     SELECT id FROM scan_history WHERE target_id = $1
                     ORDER BY scanned_at DESC, id DESC LIMIT $2
                 )"#,
        )
        .bind(snapshot.target_id)
        .bind(db_limit(keep))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl AlertStore for PgStore {
    async fn insert_alert_deduped(
        &self,
        alert: &Alert,
        since: DateTime<Utc>,
    ) -> Result<AlertInsert, StoreError> {
        // The CTE alone lets two READ COMMITTED writers both see no existing
        // alert. Serialize writers per (target, type) for the transaction.
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(alert_lock_key(alert))
            .execute(&mut *tx)
            .await?;

        let (inserted, existing): (Option<Uuid>, Option<Uuid>) = sqlx::query_as(
            r#"WITH existing AS (
                   SELECT id FROM alerts
                    WHERE target_id = $2 AND alert_type = $3
                      AND NOT resolved AND created_at >= $9
                    ORDER BY created_at DESC
                    LIMIT 1
               ), ins AS (
                   INSERT INTO alerts (id, target_id, alert_type, severity, current_score,
                                       previous_score, threshold, message, created_at)
                   SELECT $1, $2, $3, $4, $5, $6, $7, $8, $10
                    WHERE NOT EXISTS (SELECT 1 FROM existing)
                   RETURNING id
               )
               SELECT (SELECT id FROM ins), (SELECT id FROM existing)"#,
        )
        .bind(alert.id)
        .bind(alert.target_id)
        .bind(alert.alert_type.as_str())
        .bind(alert.severity.as_str())
        .bind(alert.current_score)
        .bind(alert.previous_score)
        .bind(alert.threshold)
        .bind(&alert.message)
        .bind(since)
        .bind(alert.created_at)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        match (inserted, existing) {
            (Some(_), _) => Ok(AlertInsert::Inserted),
            (None, Some(existing)) => Ok(AlertInsert::Suppressed { existing }),
            (None, None) => Err(StoreError::Conflict(format!(
                "alert {} was neither inserted nor suppressed",
                alert.id
            ))),
        }
    }

    async fn get_alert(&self, id: Uuid) -> Result<Option<Alert>, StoreError> {
        let row = sqlx::query_as::<_, AlertRow>(concat!(
            "SELECT ",
            alert_columns!(),
            " FROM alerts WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Alert::try_from).transpose()
    }

    async fn list_alerts(
        &self,
        target_id: Option<Uuid>,
        include_resolved: bool,
    ) -> Result<Vec<Alert>, StoreError> {
        let rows = sqlx::query_as::<_, AlertRow>(concat!(
            "SELECT ",
            alert_columns!(),
            " FROM alerts
              WHERE ($1::UUID IS NULL OR target_id = $1)
                AND ($2 OR NOT resolved)
              ORDER BY created_at DESC"
        ))
        .bind(target_id)
        .bind(include_resolved)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Alert::try_from).collect()
    }

    async fn resolve_alert(
        &self,
        id: Uuid,
        resolved_by: &str,
        at: DateTime<Utc>,
    ) -> Result<Alert, StoreError> {
        let row = sqlx::query_as::<_, AlertRow>(concat!(
            "UPDATE alerts SET resolved = TRUE, resolved_at = $2, resolved_by = $3
              WHERE id = $1 AND NOT resolved
              RETURNING ",
            alert_columns!()
        ))
        .bind(id)
        .bind(at)
        .bind(resolved_by)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Alert::try_from(row),
            None => match self.get_alert(id).await? {
                Some(_) => Err(StoreError::Conflict(format!("alert {id} is already resolved"))),
                None => Err(StoreError::NotFound { kind: "alert", id }),
            },
        }
    }
}

impl MonitorStore for PgStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }
}

/// Advisory lock name shared by every writer deduplicating `alert`'s
/// target and type.
fn alert_lock_key(alert: &Alert) -> String {
    format!("pulse-alert:{}:{}", alert.target_id, alert.alert_type.as_str())
}
