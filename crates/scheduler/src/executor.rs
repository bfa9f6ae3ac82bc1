//! Executes one due schedule: claim the window, scan, detect, finalize,
//! reschedule, deliver.
//!
//! Once a window is claimed the run is always finalized and `next_run_at`
//! always advances, whatever the scan or the alert store did in between.
//! Delivery happens last and never changes the run's status.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use pulse_core::config::{RegressionConfig, SchedulerConfig};
use pulse_core::{
    Alert, AlertType, NewAlert, Run, RunOutcome, ScanResult, ScanSnapshot, Schedule, Severity,
    Target,
};
use pulse_notify::{Dispatcher, ReportContext, ReportRenderer};

use crate::recurrence::{window_key_for, CompiledRule, RecurrenceError};
use crate::regression::{DetectionOutcome, RegressionDetector};
use crate::scanner::Scanner;
use crate::store::{ClaimOutcome, MonitorStore, StoreError};

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("schedule {schedule_id} has an invalid rule: {source}")]
    InvalidRule {
        schedule_id: Uuid,
        #[source]
        source: RecurrenceError,
    },
}

/// What happened to one schedule.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Succeeded { run_id: Uuid, alert: Option<Alert> },
    Failed { run_id: Uuid, error: String },
    /// Another worker owns the window, or the schedule moved on.
    AlreadyClaimed,
}

/// Tunables taken from [`SchedulerConfig`].
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub scan_timeout: Duration,
    pub run_retention: usize,
    pub history_limit: usize,
}

impl From<&SchedulerConfig> for ExecutorSettings {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            scan_timeout: Duration::from_secs(config.scan_timeout_secs),
            run_retention: config.run_retention,
            history_limit: config.history_limit,
        }
    }
}

pub struct RunExecutor {
    store: Arc<dyn MonitorStore>,
    scanner: Arc<dyn Scanner>,
    dispatcher: Arc<Dispatcher>,
    renderer: ReportRenderer,
    detector: RegressionDetector,
    settings: ExecutorSettings,
}

/// Result of the scan phase, before the run is finalized.
struct ScanPhase {
    outcome: RunOutcome,
    previous_score: Option<f64>,
    alert: Option<Alert>,
}

impl RunExecutor {
    pub fn new(
        store: Arc<dyn MonitorStore>,
        scanner: Arc<dyn Scanner>,
        dispatcher: Arc<Dispatcher>,
        renderer: ReportRenderer,
        regression: RegressionConfig,
        settings: ExecutorSettings,
    ) -> Self {
        Self {
            store,
            scanner,
            dispatcher,
            renderer,
            detector: RegressionDetector::new(regression),
            settings,
        }
    }

    pub fn store(&self) -> &Arc<dyn MonitorStore> {
        &self.store
    }

    /// Run `schedule` for the occurrence it is currently due for.
    ///
    /// `now` is the batch's reference instant. The fire instant (and so the
    /// window) comes from the schedule's `next_run_at`, not from `now`, so a
    /// late trigger still lands in the window that was due.
    pub async fn execute(
        &self,
        schedule: &Schedule,
        now: DateTime<Utc>,
    ) -> Result<ExecutionOutcome, ExecutorError> {
        let fire_at = schedule.next_run_at.unwrap_or(now);
        let (compiled, window_key) = match CompiledRule::compile(&schedule.rule)
            .and_then(|compiled| Ok((compiled, window_key_for(&schedule.rule, fire_at)?)))
        {
            Ok(prepared) => prepared,
            Err(source) => return Err(self.retire(schedule, source).await),
        };

        let run = match self.store.claim(schedule.id, &window_key, fire_at, now).await? {
            ClaimOutcome::Claimed(run) => run,
            ClaimOutcome::AlreadyClaimed => {
                // A finished or orphaned run can hold the window while
                // next_run_at still points into it. The swap only succeeds if
                // nobody has rescheduled since the due list was read.
                let next = following(&compiled, fire_at, now);
                if self.store.advance_next_run(schedule.id, fire_at, next).await? {
                    info!(
                        schedule_id = %schedule.id,
                        window_key = %window_key,
                        next_run_at = ?next,
                        "Window already held, moved to the next occurrence"
                    );
                } else {
                    debug!(
                        schedule_id = %schedule.id,
                        window_key = %window_key,
                        "Window already claimed, skipping"
                    );
                }
                return Ok(ExecutionOutcome::AlreadyClaimed);
            }
        };
        info!(
            schedule_id = %schedule.id,
            run_id = %run.id,
            window_key = %window_key,
            "Run claimed"
        );

        let target = match self.store.get_target(schedule.target_id).await {
            Ok(target) => target,
            Err(e) => {
                error!(schedule_id = %schedule.id, error = %e, "Target lookup failed");
                None
            }
        };

        let phase = match &target {
            Some(target) => self.scan_phase(target, &run).await,
            None => ScanPhase {
                outcome: RunOutcome::Failed {
                    error: format!("target {} not found", schedule.target_id),
                    completed_at: Utc::now(),
                },
                previous_score: None,
                alert: None,
            },
        };

        let finalized = self.store.finalize(run.id, &phase.outcome).await;
        let rescheduled = self.reschedule(schedule, &compiled, fire_at, now).await;
        let run = finalized?;
        rescheduled?;

        match self.store.prune_runs(schedule.id, self.settings.run_retention).await {
            Ok(0) => {}
            Ok(removed) => debug!(schedule_id = %schedule.id, removed, "Pruned old runs"),
            Err(e) => warn!(schedule_id = %schedule.id, error = %e, "Run pruning failed"),
        }

        if let Some(target) = &target {
            self.deliver(schedule, target, &run, phase.previous_score, phase.alert.as_ref())
                .await;
        }

        Ok(match phase.outcome {
            RunOutcome::Succeeded { .. } => ExecutionOutcome::Succeeded {
                run_id: run.id,
                alert: phase.alert,
            },
            RunOutcome::Failed { error, .. } => ExecutionOutcome::Failed { run_id: run.id, error },
        })
    }

    async fn scan_phase(&self, target: &Target, run: &Run) -> ScanPhase {
        let start = Instant::now();
        let scanned = tokio::time::timeout(self.settings.scan_timeout, self.scanner.scan(&target.url)).await;
        let duration_ms = start.elapsed().as_millis() as u64;
        let completed_at = Utc::now();

        let result = match scanned {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => return self.scan_failed(target, run, e.to_string(), completed_at, duration_ms).await,
            Err(_) => {
                let msg = format!("scan timed out after {}s", self.settings.scan_timeout.as_secs());
                return self.scan_failed(target, run, msg, completed_at, duration_ms).await;
            }
        };
        info!(
            target_id = %target.id,
            run_id = %run.id,
            score = result.score,
            duration_ms,
            "Scan succeeded"
        );

        let (previous, alert) = self.track_regression(target, run, &result, completed_at).await;
        ScanPhase {
            outcome: RunOutcome::Succeeded { result, completed_at },
            previous_score: previous,
            alert,
        }
    }

    /// Record the scan in history and run the detector against the snapshot
    /// that preceded it. Store failures here are logged, not fatal.
    async fn track_regression(
        &self,
        target: &Target,
        run: &Run,
        result: &ScanResult,
        completed_at: DateTime<Utc>,
    ) -> (Option<f64>, Option<Alert>) {
        let previous = match self.store.recent_history(target.id, 1).await {
            Ok(history) => history.into_iter().next(),
            Err(e) => {
                error!(target_id = %target.id, error = %e, "History lookup failed");
                None
            }
        };

        let snapshot = ScanSnapshot::from_result(target.id, Some(run.id), result, completed_at);
        if let Err(e) = self
            .store
            .append_history(&snapshot, self.settings.history_limit)
            .await
        {
            error!(target_id = %target.id, error = %e, "History append failed");
        }

        let outcome = self
            .detector
            .detect(self.store.as_ref(), target, result, previous.as_ref(), completed_at)
            .await;
        let alert = match outcome {
            Ok(DetectionOutcome::Raised(alert)) => Some(alert),
            Ok(_) => None,
            Err(e) => {
                error!(target_id = %target.id, error = %e, "Alert persistence failed");
                None
            }
        };
        (previous.map(|p| p.score), alert)
    }

    async fn scan_failed(
        &self,
        target: &Target,
        run: &Run,
        message: String,
        completed_at: DateTime<Utc>,
        duration_ms: u64,
    ) -> ScanPhase {
        warn!(
            target_id = %target.id,
            run_id = %run.id,
            error = %message,
            duration_ms,
            "Scan failed"
        );

        let candidate = NewAlert {
            target_id: target.id,
            alert_type: AlertType::ScanFailed,
            severity: Severity::Medium,
            current_score: None,
            previous_score: None,
            threshold: None,
            message: format!("Scan of {} failed: {}", target.url, message),
        };
        let alert = match self.detector.record(self.store.as_ref(), candidate, completed_at).await {
            Ok(DetectionOutcome::Raised(alert)) => Some(alert),
            Ok(_) => None,
            Err(e) => {
                error!(target_id = %target.id, error = %e, "Alert persistence failed");
                None
            }
        };

        ScanPhase {
            outcome: RunOutcome::Failed {
                error: message,
                completed_at,
            },
            previous_score: None,
            alert,
        }
    }

    /// A stored rule that no longer compiles would be listed due forever.
    /// Park the schedule (no `next_run_at`) until its owner fixes the rule.
    async fn retire(&self, schedule: &Schedule, source: RecurrenceError) -> ExecutorError {
        error!(
            schedule_id = %schedule.id,
            error = %source,
            "Stored rule is invalid, schedule is now dormant"
        );
        if let Some(expected) = schedule.next_run_at {
            if let Err(e) = self.store.advance_next_run(schedule.id, expected, None).await {
                return ExecutorError::Store(e);
            }
        }
        ExecutorError::InvalidRule {
            schedule_id: schedule.id,
            source,
        }
    }

    /// Advance `next_run_at` from the fire instant so the cadence never
    /// drifts.
    async fn reschedule(
        &self,
        schedule: &Schedule,
        compiled: &CompiledRule,
        fire_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let next = following(compiled, fire_at, now);
        if next.is_none() {
            info!(schedule_id = %schedule.id, "Recurrence exhausted, schedule is now dormant");
        }
        self.store.update_next_run(schedule.id, next, now).await
    }

    async fn deliver(
        &self,
        schedule: &Schedule,
        target: &Target,
        run: &Run,
        previous_score: Option<f64>,
        alert: Option<&Alert>,
    ) {
        let ctx = ReportContext {
            target,
            run,
            previous_score,
            alert,
            summary_only: schedule.delivery.summary_only,
            generated_at: Utc::now(),
        };

        if !schedule.delivery.recipients.is_empty() {
            match self.renderer.report_notification(
                schedule.delivery.format,
                &schedule.delivery.recipients,
                &ctx,
            ) {
                Ok(notification) => {
                    self.dispatcher.dispatch(&notification).await;
                }
                Err(e) => error!(run_id = %run.id, error = %e, "Report rendering failed"),
            }
        }

        match self.renderer.alert_notification(&ctx) {
            Ok(Some(notification)) => {
                self.dispatcher.dispatch(&notification).await;
            }
            Ok(None) => {}
            Err(e) => error!(run_id = %run.id, error = %e, "Alert rendering failed"),
        }
    }
}

/// Occurrence after `fire_at`. A schedule that fell behind skips the missed
/// occurrences instead of replaying them one batch at a time.
fn following(compiled: &CompiledRule, fire_at: DateTime<Utc>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match compiled.next_after(fire_at) {
        Some(next) if next <= now => compiled.next_after(now),
        other => other,
    }
}
