//! Monitored targets and their scan history.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use pulse_core::{ScanSnapshot, Target};
use pulse_scheduler::{TargetStore, ValidationResult};

use crate::state::AppState;

use super::common::{invalid, not_found, page_limit, store_error, ApiResult};

const MAX_HISTORY_PAGE: usize = 500;

#[derive(Debug, Deserialize)]
pub struct CreateTargetRequest {
    pub name: String,
    pub url: String,
    pub min_score: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<usize>,
}

fn validate_target(input: &CreateTargetRequest) -> ValidationResult {
    let mut result = ValidationResult::new();
    if input.name.trim().is_empty() {
        result.reject("name", "name must not be empty");
    }
    if !input.url.starts_with("http://") && !input.url.starts_with("https://") {
        result.reject("url", format!("url must start with http:// or https://, got '{}'", input.url));
    }
    if let Some(min) = input.min_score {
        if !(0.0..=100.0).contains(&min) {
            result.reject("min_score", format!("min_score must be between 0 and 100, got {min}"));
        }
    }
    result
}

/// GET /api/targets
pub async fn targets_list(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<Target>>> {
    Ok(Json(state.store.list_targets().await.map_err(store_error)?))
}

/// POST /api/targets
pub async fn targets_create(
    State(state): State<Arc<AppState>>,
    Json(input): Json<CreateTargetRequest>,
) -> ApiResult<(StatusCode, Json<Target>)> {
    let result = validate_target(&input);
    if !result.valid {
        return Err(invalid(result));
    }

    let target = Target {
        id: Uuid::new_v4(),
        name: input.name.trim().to_string(),
        url: input.url,
        min_score: input.min_score,
        created_at: Utc::now(),
    };
    state.store.insert_target(&target).await.map_err(store_error)?;
    Ok((StatusCode::CREATED, Json(target)))
}

/// GET /api/targets/{id}
pub async fn targets_get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Target>> {
    let target = state
        .store
        .get_target(id)
        .await
        .map_err(store_error)?
        .ok_or_else(|| not_found("target", id))?;
    Ok(Json(target))
}

/// GET /api/targets/{id}/history -- newest first.
pub async fn targets_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(params): Query<HistoryParams>,
) -> ApiResult<Json<Vec<ScanSnapshot>>> {
    if state.store.get_target(id).await.map_err(store_error)?.is_none() {
        return Err(not_found("target", id));
    }
    let limit = page_limit(params.limit, 30, MAX_HISTORY_PAGE);
    Ok(Json(state.store.recent_history(id, limit).await.map_err(store_error)?))
}
