//! In-process store. One mutex guards all state, so `claim` is a single
//! critical section.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use pulse_core::{Alert, Run, RunOutcome, RunStatus, ScanSnapshot, Schedule, Target};

use super::{
    AlertInsert, AlertStore, ClaimOutcome, MonitorStore, ScheduleStore, StoreError, TargetStore,
};

#[derive(Default)]
struct Inner {
    schedules: HashMap<Uuid, Schedule>,
    /// Runs per schedule, oldest first.
    runs: HashMap<Uuid, Vec<Run>>,
    /// run id -> schedule id
    run_index: HashMap<Uuid, Uuid>,
    targets: HashMap<Uuid, Target>,
    /// Snapshots per target, newest first.
    history: HashMap<Uuid, VecDeque<ScanSnapshot>>,
    alerts: Vec<Alert>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::Poisoned)
    }
}

#[async_trait]
impl ScheduleStore for MemoryStore {
    async fn insert_schedule(&self, schedule: &Schedule) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        if inner.schedules.contains_key(&schedule.id) {
            return Err(StoreError::Conflict(format!("schedule {} already exists", schedule.id)));
        }
        inner.schedules.insert(schedule.id, schedule.clone());
        Ok(())
    }

    async fn get_schedule(&self, id: Uuid) -> Result<Option<Schedule>, StoreError> {
        Ok(self.lock()?.schedules.get(&id).cloned())
    }

    async fn update_schedule(&self, schedule: &Schedule, reset_next_run: bool) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        let existing = inner.schedules.get_mut(&schedule.id).ok_or(StoreError::NotFound {
            kind: "schedule",
            id: schedule.id,
        })?;
        let next_run_at = if reset_next_run {
            schedule.next_run_at
        } else {
            existing.next_run_at
        };
        let last_run_at = existing.last_run_at;
        *existing = Schedule {
            next_run_at,
            last_run_at,
            ..schedule.clone()
        };
        Ok(())
    }

    async fn delete_schedule(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut inner = self.lock()?;
        let existed = inner.schedules.remove(&id).is_some();
        if let Some(runs) = inner.runs.remove(&id) {
            for run in runs {
                inner.run_index.remove(&run.id);
            }
        }
        Ok(existed)
    }

    async fn list_schedules(&self, owner_id: Option<&str>) -> Result<Vec<Schedule>, StoreError> {
        let inner = self.lock()?;
        let mut out: Vec<Schedule> = inner
            .schedules
            .values()
            .filter(|s| owner_id.map_or(true, |owner| s.owner_id == owner))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn list_due(&self, limit: usize, as_of: DateTime<Utc>) -> Result<Vec<Schedule>, StoreError> {
        let inner = self.lock()?;
        let mut due: Vec<Schedule> = inner
            .schedules
            .values()
            .filter(|s| s.is_due(as_of))
            .cloned()
            .collect();
        due.sort_by_key(|s| s.next_run_at);
        due.truncate(limit);
        Ok(due)
    }

    async fn claim(
        &self,
        schedule_id: Uuid,
        window_key: &str,
        fire_at: DateTime<Utc>,
        started_at: DateTime<Utc>,
    ) -> Result<ClaimOutcome, StoreError> {
        let mut inner = self.lock()?;

        let claimable = inner
            .schedules
            .get(&schedule_id)
            .is_some_and(|s| s.enabled && s.next_run_at == Some(fire_at));
        if !claimable {
            return Ok(ClaimOutcome::AlreadyClaimed);
        }

        let held = inner.runs.get(&schedule_id).is_some_and(|runs| {
            runs.iter()
                .any(|r| r.window_key == window_key && r.status.holds_window())
        });
        if held {
            return Ok(ClaimOutcome::AlreadyClaimed);
        }

        let run = Run::running(schedule_id, window_key, fire_at, started_at);
        inner.run_index.insert(run.id, schedule_id);
        inner.runs.entry(schedule_id).or_default().push(run.clone());
        Ok(ClaimOutcome::Claimed(run))
    }

    async fn finalize(&self, run_id: Uuid, outcome: &RunOutcome) -> Result<Run, StoreError> {
        let mut inner = self.lock()?;
        let not_found = StoreError::NotFound { kind: "run", id: run_id };
        let schedule_id = *inner.run_index.get(&run_id).ok_or(not_found)?;
        let run = inner
            .runs
            .get_mut(&schedule_id)
            .and_then(|runs| runs.iter_mut().find(|r| r.id == run_id))
            .ok_or(StoreError::NotFound { kind: "run", id: run_id })?;

        if run.status != RunStatus::Running {
            return Err(StoreError::Conflict(format!(
                "run {run_id} already finalized as {}",
                run.status
            )));
        }
        run.apply(outcome);
        Ok(run.clone())
    }

    async fn update_next_run(
        &self,
        schedule_id: Uuid,
        next_run_at: Option<DateTime<Utc>>,
        last_run_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        let schedule = inner.schedules.get_mut(&schedule_id).ok_or(StoreError::NotFound {
            kind: "schedule",
            id: schedule_id,
        })?;
        schedule.next_run_at = next_run_at;
        schedule.last_run_at = Some(last_run_at);
        Ok(())
    }

    async fn advance_next_run(
        &self,
        schedule_id: Uuid,
        expected: DateTime<Utc>,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.lock()?;
        match inner.schedules.get_mut(&schedule_id) {
            Some(schedule) if schedule.next_run_at == Some(expected) => {
                schedule.next_run_at = next_run_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_runs(&self, schedule_id: Uuid, limit: usize) -> Result<Vec<Run>, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .runs
            .get(&schedule_id)
            .map(|runs| runs.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn prune_runs(&self, schedule_id: Uuid, keep: usize) -> Result<u64, StoreError> {
        let mut inner = self.lock()?;
        let Some(runs) = inner.runs.get_mut(&schedule_id) else {
            return Ok(0);
        };

        // Newest `keep` survive, plus anything still running.
        let cutoff = runs.len().saturating_sub(keep);
        let mut removed = Vec::new();
        let mut index = 0;
        runs.retain(|run| {
            let keep_it = index >= cutoff || run.status == RunStatus::Running;
            index += 1;
            if !keep_it {
                removed.push(run.id);
            }
            keep_it
        });
        for id in &removed {
            inner.run_index.remove(id);
        }
        Ok(removed.len() as u64)
    }
}

#[async_trait]
impl TargetStore for MemoryStore {
    async fn insert_target(&self, target: &Target) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        if inner.targets.contains_key(&target.id) {
            return Err(StoreError::Conflict(format!("target {} already exists", target.id)));
        }
        inner.targets.insert(target.id, target.clone());
        Ok(())
    }

    async fn get_target(&self, id: Uuid) -> Result<Option<Target>, StoreError> {
        Ok(self.lock()?.targets.get(&id).cloned())
    }

    async fn list_targets(&self) -> Result<Vec<Target>, StoreError> {
        let inner = self.lock()?;
        let mut out: Vec<Target> = inner.targets.values().cloned().collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    async fn recent_history(&self, target_id: Uuid, limit: usize) -> Result<Vec<ScanSnapshot>, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .history
            .get(&target_id)
            .map(|h| h.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn append_history(&self, snapshot: &ScanSnapshot, keep: usize) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        let history = inner.history.entry(snapshot.target_id).or_default();
        history.push_front(snapshot.clone());
        history.truncate(keep);
        Ok(())
    }
}

#[async_trait]
impl AlertStore for MemoryStore {
    async fn insert_alert_deduped(
        &self,
        alert: &Alert,
        since: DateTime<Utc>,
    ) -> Result<AlertInsert, StoreError> {
        let mut inner = self.lock()?;
        let existing = inner.alerts.iter().rev().find(|a| {
            a.target_id == alert.target_id
                && a.alert_type == alert.alert_type
                && !a.resolved
                && a.created_at >= since
        });
        if let Some(existing) = existing {
            return Ok(AlertInsert::Suppressed { existing: existing.id });
        }
        inner.alerts.push(alert.clone());
        Ok(AlertInsert::Inserted)
    }

    async fn get_alert(&self, id: Uuid) -> Result<Option<Alert>, StoreError> {
        Ok(self.lock()?.alerts.iter().find(|a| a.id == id).cloned())
    }

    async fn list_alerts(
        &self,
        target_id: Option<Uuid>,
        include_resolved: bool,
    ) -> Result<Vec<Alert>, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .alerts
            .iter()
            .rev()
            .filter(|a| target_id.map_or(true, |t| a.target_id == t))
            .filter(|a| include_resolved || !a.resolved)
            .cloned()
            .collect())
    }

    async fn resolve_alert(
        &self,
        id: Uuid,
        resolved_by: &str,
        at: DateTime<Utc>,
    ) -> Result<Alert, StoreError> {
        let mut inner = self.lock()?;
        let alert = inner
            .alerts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(StoreError::NotFound { kind: "alert", id })?;
        if alert.resolved {
            return Err(StoreError::Conflict(format!("alert {id} is already resolved")));
        }
        alert.resolved = true;
        alert.resolved_at = Some(at);
        alert.resolved_by = Some(resolved_by.to_string());
        Ok(alert.clone())
    }
}

impl MonitorStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }
}
