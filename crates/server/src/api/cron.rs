//! External cron trigger.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap};
use axum::Json;
use serde::Deserialize;

use pulse_scheduler::{BatchSummary, DriverError};

use crate::state::AppState;

use super::common::{internal_error, unauthorized, ApiResult};

#[derive(Debug, Deserialize)]
pub struct CronParams {
    /// Capped at the configured batch limit.
    pub limit: Option<usize>,
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

/// POST|GET /api/cron/run -- run one batch of due schedules.
pub async fn cron_run(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<CronParams>,
) -> ApiResult<Json<BatchSummary>> {
    match state.driver.trigger(bearer_token(&headers), params.limit).await {
        Ok(summary) => Ok(Json(summary)),
        Err(DriverError::Unauthorized) => Err(unauthorized()),
        Err(e) => Err(internal_error(e)),
    }
}
