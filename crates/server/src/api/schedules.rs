//! Schedule CRUD, run history and recurrence preview.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use pulse_core::{DeliveryConfig, Frequency, RecurrenceRule, ReportFormat, Run, Schedule};
use pulse_scheduler::validation::{validate_schedule_into, FieldIssue};
use pulse_scheduler::{compute_next_run, upcoming, ScheduleStore, TargetStore, ValidationResult};

use crate::state::AppState;

use super::common::{
    bad_request, internal_error, invalid, not_found, page_limit, store_error, ApiResult,
};

const MAX_PREVIEW: usize = 50;
const MAX_RUNS_PAGE: usize = 500;

// ── Types ────────────────────────────────────────────────────────

/// Rule as submitted. Enum fields arrive as strings so a bad value becomes a
/// field-level validation error instead of a body rejection.
#[derive(Debug, Deserialize)]
pub struct RuleInput {
    pub frequency: String,
    #[serde(default)]
    pub days_of_week: Vec<u8>,
    pub day_of_month: Option<u8>,
    pub time_of_day: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeliveryInput {
    #[serde(default)]
    pub recipients: Vec<String>,
    pub format: Option<String>,
    #[serde(default)]
    pub summary_only: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateScheduleRequest {
    pub owner_id: String,
    pub target_id: Uuid,
    pub rule: RuleInput,
    #[serde(default)]
    pub delivery: DeliveryInput,
    pub enabled: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateScheduleRequest {
    pub rule: Option<RuleInput>,
    pub delivery: Option<DeliveryInput>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub owner_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RunsParams {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct PreviewRequest {
    pub rule: RuleInput,
    pub from: Option<DateTime<Utc>>,
    pub count: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ScheduleResponse {
    #[serde(flatten)]
    pub schedule: Schedule,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<FieldIssue>,
}

#[derive(Debug, Serialize)]
pub struct PreviewResponse {
    pub occurrences: Vec<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<FieldIssue>,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

// ── Input conversion ────────────────────────────────────────────

fn parse_rule(input: RuleInput, now: DateTime<Utc>, result: &mut ValidationResult) -> RecurrenceRule {
    let frequency = match input.frequency.parse::<Frequency>() {
        Ok(f) => f,
        Err(_) => {
            result.reject_with_hint(
                "rule.frequency",
                format!("unknown frequency '{}'", input.frequency),
                "DAILY, WEEKLY or MONTHLY",
            );
            Frequency::Daily
        }
    };
    RecurrenceRule {
        frequency,
        days_of_week: input.days_of_week,
        day_of_month: input.day_of_month,
        time_of_day: input.time_of_day,
        timezone: input.timezone,
        starts_at: input.starts_at.unwrap_or(now),
        ends_at: input.ends_at,
    }
}

fn parse_delivery(input: DeliveryInput, result: &mut ValidationResult) -> DeliveryConfig {
    let format = match input.format.as_deref().map(str::parse::<ReportFormat>) {
        None => ReportFormat::default(),
        Some(Ok(f)) => f,
        Some(Err(e)) => {
            result.reject_with_hint("delivery.format", e.to_string(), "html, text or json");
            ReportFormat::default()
        }
    };
    DeliveryConfig {
        recipients: input.recipients,
        format,
        summary_only: input.summary_only,
    }
}

fn next_run(rule: &RecurrenceRule, now: DateTime<Utc>) -> ApiResult<Option<DateTime<Utc>>> {
    // Validation already compiled the rule; an error here is a bug.
    compute_next_run(rule, now).map_err(internal_error)
}

// ── Handlers ─────────────────────────────────────────────────────

/// GET /api/schedules -- list schedules, optionally for one owner.
pub async fn schedules_list(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Vec<Schedule>>> {
    let rows = state
        .store
        .list_schedules(params.owner_id.as_deref())
        .await
        .map_err(store_error)?;
    Ok(Json(rows))
}

/// POST /api/schedules -- create a schedule and compute its first run.
pub async fn schedules_create(
    State(state): State<Arc<AppState>>,
    Json(input): Json<CreateScheduleRequest>,
) -> ApiResult<(StatusCode, Json<ScheduleResponse>)> {
    let now = Utc::now();
    let mut result = ValidationResult::new();
    if input.owner_id.trim().is_empty() {
        result.reject("owner_id", "owner_id must not be empty");
    }
    let rule = parse_rule(input.rule, now, &mut result);
    let delivery = parse_delivery(input.delivery, &mut result);
    validate_schedule_into(&rule, &delivery, &mut result);
    if !result.valid {
        return Err(invalid(result));
    }

    if state
        .store
        .get_target(input.target_id)
        .await
        .map_err(store_error)?
        .is_none()
    {
        return Err(bad_request(format!("target not found: {}", input.target_id)));
    }

    let schedule = Schedule {
        id: Uuid::new_v4(),
        owner_id: input.owner_id,
        target_id: input.target_id,
        next_run_at: next_run(&rule, now)?,
        rule,
        enabled: input.enabled.unwrap_or(true),
        last_run_at: None,
        delivery,
        created_at: now,
        updated_at: now,
    };
    state.store.insert_schedule(&schedule).await.map_err(store_error)?;

    Ok((
        StatusCode::CREATED,
        Json(ScheduleResponse {
            schedule,
            warnings: result.warnings,
        }),
    ))
}

/// GET /api/schedules/{id}
pub async fn schedules_get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Schedule>> {
    let schedule = state
        .store
        .get_schedule(id)
        .await
        .map_err(store_error)?
        .ok_or_else(|| not_found("schedule", id))?;
    Ok(Json(schedule))
}

/// PUT /api/schedules/{id} -- partial update.
///
/// `next_run_at` is recomputed from now when the rule changes or the
/// schedule is re-enabled, otherwise the stored value is kept untouched.
pub async fn schedules_update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateScheduleRequest>,
) -> ApiResult<Json<ScheduleResponse>> {
    let now = Utc::now();
    let mut schedule = state
        .store
        .get_schedule(id)
        .await
        .map_err(store_error)?
        .ok_or_else(|| not_found("schedule", id))?;

    let mut result = ValidationResult::new();
    let rule = match input.rule {
        Some(rule) => parse_rule(rule, now, &mut result),
        None => schedule.rule.clone(),
    };
    let delivery = match input.delivery {
        Some(delivery) => parse_delivery(delivery, &mut result),
        None => schedule.delivery.clone(),
    };
    validate_schedule_into(&rule, &delivery, &mut result);
    if !result.valid {
        return Err(invalid(result));
    }

    let enabled = input.enabled.unwrap_or(schedule.enabled);
    let reset_next_run = rule != schedule.rule || (enabled && !schedule.enabled);
    if reset_next_run {
        schedule.next_run_at = next_run(&rule, now)?;
    }
    schedule.rule = rule;
    schedule.delivery = delivery;
    schedule.enabled = enabled;
    schedule.updated_at = now;

    state
        .store
        .update_schedule(&schedule, reset_next_run)
        .await
        .map_err(store_error)?;

    // Re-read so the response carries whatever run bookkeeping the executor
    // wrote in the meantime.
    let schedule = state
        .store
        .get_schedule(id)
        .await
        .map_err(store_error)?
        .ok_or_else(|| not_found("schedule", id))?;
    Ok(Json(ScheduleResponse {
        schedule,
        warnings: result.warnings,
    }))
}

/// DELETE /api/schedules/{id}
pub async fn schedules_delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if !state.store.delete_schedule(id).await.map_err(store_error)? {
        return Err(not_found("schedule", id));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/schedules/{id}/runs -- newest first, failures included.
pub async fn schedules_runs(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(params): Query<RunsParams>,
) -> ApiResult<Json<Vec<Run>>> {
    if state.store.get_schedule(id).await.map_err(store_error)?.is_none() {
        return Err(not_found("schedule", id));
    }
    let limit = page_limit(params.limit, 50, MAX_RUNS_PAGE);
    let runs = state.store.list_runs(id, limit).await.map_err(store_error)?;
    Ok(Json(runs))
}

/// POST /api/schedules/preview -- next occurrences of a rule, nothing stored.
pub async fn schedules_preview(Json(input): Json<PreviewRequest>) -> ApiResult<Json<PreviewResponse>> {
    let now = Utc::now();
    let mut result = ValidationResult::new();
    let rule = parse_rule(input.rule, now, &mut result);
    validate_schedule_into(&rule, &DeliveryConfig::default(), &mut result);
    if !result.valid {
        return Err(invalid(result));
    }

    let count = page_limit(input.count, 5, MAX_PREVIEW);
    let occurrences = upcoming(&rule, input.from.unwrap_or(now), count).map_err(internal_error)?;
    Ok(Json(PreviewResponse {
        occurrences,
        warnings: result.warnings,
    }))
}
