//! HTTP handlers, one module per resource.

mod alerts;
mod common;
mod cron;
mod health;
mod schedules;
mod targets;

use serde::Serialize;

use pulse_scheduler::ValidationResult;

// ── Shared types ─────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationResult>,
}

// ── Re-exports ───────────────────────────────────────────────────

pub use alerts::{alerts_list, alerts_resolve};
pub use cron::cron_run;
pub use health::health;
pub use schedules::{
    schedules_create, schedules_delete, schedules_get, schedules_list, schedules_preview,
    schedules_runs, schedules_update,
};
pub use targets::{targets_create, targets_get, targets_history, targets_list};
