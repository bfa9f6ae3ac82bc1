//! Alert listing and explicit resolution.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use pulse_core::Alert;
use pulse_scheduler::AlertStore;

use crate::state::AppState;

use super::common::{bad_request, store_error, ApiResult};

#[derive(Debug, Deserialize)]
pub struct AlertParams {
    pub target_id: Option<Uuid>,
    #[serde(default)]
    pub include_resolved: bool,
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub resolved_by: String,
}

/// GET /api/alerts -- newest first, unresolved only unless asked.
pub async fn alerts_list(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AlertParams>,
) -> ApiResult<Json<Vec<Alert>>> {
    let alerts = state
        .store
        .list_alerts(params.target_id, params.include_resolved)
        .await
        .map_err(store_error)?;
    Ok(Json(alerts))
}

/// POST /api/alerts/{id}/resolve -- 409 if already resolved.
pub async fn alerts_resolve(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(input): Json<ResolveRequest>,
) -> ApiResult<Json<Alert>> {
    let resolved_by = input.resolved_by.trim();
    if resolved_by.is_empty() {
        return Err(bad_request("resolved_by must not be empty"));
    }
    let alert = state
        .store
        .resolve_alert(id, resolved_by, Utc::now())
        .await
        .map_err(store_error)?;
    Ok(Json(alert))
}
