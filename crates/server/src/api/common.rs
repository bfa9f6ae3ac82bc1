//! Shared helpers and type aliases for the API handlers.

use axum::http::StatusCode;
use axum::Json;
use tracing::error;
use uuid::Uuid;

use pulse_scheduler::{StoreError, ValidationResult};

use super::ErrorResponse;

// ── Type alias ──────────────────────────────────────────────────

pub(crate) type ApiError = (StatusCode, Json<ErrorResponse>);
pub(crate) type ApiResult<T> = Result<T, ApiError>;

// ── Helpers ─────────────────────────────────────────────────────

fn error_response(status: StatusCode, msg: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: msg.into(),
            validation: None,
        }),
    )
}

/// Log the real error, return a generic message.
pub(crate) fn internal_error(e: impl std::fmt::Display) -> ApiError {
    error!(error = %e, "Request failed");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
}

pub(crate) fn not_found(resource: &str, id: Uuid) -> ApiError {
    error_response(StatusCode::NOT_FOUND, format!("{} not found: {}", resource, id))
}

pub(crate) fn bad_request(msg: impl Into<String>) -> ApiError {
    error_response(StatusCode::BAD_REQUEST, msg)
}

pub(crate) fn unauthorized() -> ApiError {
    error_response(StatusCode::UNAUTHORIZED, "unauthorized")
}

pub(crate) fn conflict(msg: impl Into<String>) -> ApiError {
    error_response(StatusCode::CONFLICT, msg)
}

/// 400 carrying every field-level problem.
pub(crate) fn invalid(result: ValidationResult) -> ApiError {
    let summary = result.summary();
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: summary,
            validation: Some(result),
        }),
    )
}

pub(crate) fn store_error(e: StoreError) -> ApiError {
    match e {
        StoreError::NotFound { kind, id } => not_found(kind, id),
        StoreError::Conflict(msg) => conflict(msg),
        other => internal_error(other),
    }
}

/// Clamp an optional page size into `1..=max`.
pub(crate) fn page_limit(requested: Option<usize>, default: usize, max: usize) -> usize {
    requested.unwrap_or(default).clamp(1, max)
}
