//! Batch entry point for the external cron trigger.
//!
//! A trigger authenticates, pulls the due set and fans the schedules out over
//! a bounded set of tokio tasks. Overlapping triggers are safe: the store's
//! claim decides who runs each window.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use uuid::Uuid;

use pulse_core::config::SchedulerConfig;

use crate::executor::{ExecutionOutcome, RunExecutor};
use crate::store::StoreError;

type HmacSha256 = Hmac<Sha256>;

const SECRET_CONTEXT: &[u8] = b"pulse-cron-trigger";

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("unauthorized")]
    Unauthorized,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Per-schedule failure reported back to the trigger caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchError {
    pub schedule_id: Uuid,
    pub error: String,
}

/// Aggregate result of one trigger.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub due: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub already_claimed: usize,
    pub errors: Vec<BatchError>,
}

impl BatchSummary {
    fn record(&mut self, schedule_id: Uuid, outcome: Result<ExecutionOutcome, String>) {
        match outcome {
            Ok(ExecutionOutcome::Succeeded { .. }) => self.succeeded += 1,
            Ok(ExecutionOutcome::AlreadyClaimed) => self.already_claimed += 1,
            Ok(ExecutionOutcome::Failed { error, .. }) | Err(error) => {
                self.failed += 1;
                self.errors.push(BatchError { schedule_id, error });
            }
        }
    }
}

pub struct CronDriver {
    executor: Arc<RunExecutor>,
    secret: Option<String>,
    batch_limit: usize,
    concurrency: usize,
}

impl CronDriver {
    pub fn new(executor: Arc<RunExecutor>, config: &SchedulerConfig) -> Self {
        Self {
            executor,
            secret: config.cron_secret.clone(),
            batch_limit: config.batch_limit.max(1),
            concurrency: config.concurrency.max(1),
        }
    }

    /// Authenticate `presented` against the configured secret, then run one
    /// batch. The store is not touched when authentication fails.
    pub async fn trigger(
        &self,
        presented: Option<&str>,
        limit: Option<usize>,
    ) -> Result<BatchSummary, DriverError> {
        if !self.authorized(presented) {
            warn!("Cron trigger rejected: bad or missing secret");
            return Err(DriverError::Unauthorized);
        }
        self.run(limit).await
    }

    /// Run one batch without authentication (local CLI invocations).
    pub async fn run(&self, limit: Option<usize>) -> Result<BatchSummary, DriverError> {
        let limit = limit.map_or(self.batch_limit, |l| l.clamp(1, self.batch_limit));
        self.run_at(limit, Utc::now()).await
    }

    /// Run one batch against an explicit reference instant.
    pub async fn run_at(&self, limit: usize, now: DateTime<Utc>) -> Result<BatchSummary, DriverError> {
        let start = std::time::Instant::now();
        let due = self.executor.store().list_due(limit, now).await?;

        let mut summary = BatchSummary {
            due: due.len(),
            ..BatchSummary::default()
        };
        if due.is_empty() {
            info!("Cron batch: nothing due");
            return Ok(summary);
        }

        // Each schedule runs in its own task so a panic stays with that schedule.
        let permits = Arc::new(Semaphore::new(self.concurrency));
        let (ids, handles): (Vec<Uuid>, Vec<_>) = due
            .into_iter()
            .map(|schedule| {
                let executor = self.executor.clone();
                let permits = permits.clone();
                let schedule_id = schedule.id;
                let handle = tokio::spawn(async move {
                    let _permit = permits.acquire_owned().await.map_err(|e| e.to_string())?;
                    executor.execute(&schedule, now).await.map_err(|e| e.to_string())
                });
                (schedule_id, handle)
            })
            .unzip();

        for (schedule_id, joined) in ids.into_iter().zip(join_all(handles).await) {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(join_err) => Err(format!("execution aborted: {join_err}")),
            };
            if let Err(e) = &outcome {
                error!(schedule_id = %schedule_id, error = %e, "Schedule execution failed");
            }
            summary.record(schedule_id, outcome);
        }

        info!(
            due = summary.due,
            succeeded = summary.succeeded,
            failed = summary.failed,
            already_claimed = summary.already_claimed,
            duration_ms = start.elapsed().as_millis() as u64,
            "Cron batch complete"
        );
        Ok(summary)
    }

    fn authorized(&self, presented: Option<&str>) -> bool {
        match (self.secret.as_deref(), presented) {
            (Some(expected), Some(presented)) => secrets_match(expected, presented),
            _ => false,
        }
    }
}

/// Constant-time secret comparison.
///
/// Both sides are reduced to fixed-length HMAC tags so neither the content
/// nor the length of the expected secret leaks through timing.
fn secrets_match(expected: &str, presented: &str) -> bool {
    let Some(expected_tag) = tag(expected) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(presented.as_bytes()) else {
        return false;
    };
    mac.update(SECRET_CONTEXT);
    mac.verify_slice(&expected_tag).is_ok()
}

fn tag(secret: &str) -> Option<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(SECRET_CONTEXT);
    Some(mac.finalize().into_bytes().to_vec())
}
