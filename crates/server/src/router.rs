//! HTTP router construction.

use std::sync::Arc;

use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::api;
use crate::state::AppState;

/// Build the application router with all routes and middleware.
pub fn build_router(state: Arc<AppState>, cors_origin: &str) -> Router {
    Router::new()
        .route("/health", get(api::health))
        .route("/api/cron/run", get(api::cron_run).post(api::cron_run))
        // /preview MUST precede /{id} to avoid "preview" being captured
        .route("/api/schedules/preview", post(api::schedules_preview))
        .route(
            "/api/schedules",
            get(api::schedules_list).post(api::schedules_create),
        )
        .route(
            "/api/schedules/{id}",
            get(api::schedules_get)
                .put(api::schedules_update)
                .delete(api::schedules_delete),
        )
        .route("/api/schedules/{id}/runs", get(api::schedules_runs))
        .route(
            "/api/targets",
            get(api::targets_list).post(api::targets_create),
        )
        .route("/api/targets/{id}", get(api::targets_get))
        .route("/api/targets/{id}/history", get(api::targets_history))
        .route("/api/alerts", get(api::alerts_list))
        .route("/api/alerts/{id}/resolve", post(api::alerts_resolve))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors_origin))
        .with_state(state)
}

fn cors_layer(origin: &str) -> CorsLayer {
    if origin == "*" {
        return CorsLayer::permissive();
    }
    match origin.parse::<HeaderValue>() {
        Ok(value) => CorsLayer::new()
            .allow_origin(value)
            .allow_methods(Any)
            .allow_headers(Any),
        Err(_) => {
            warn!("Invalid CORS_ORIGIN '{}', allowing any origin", origin);
            CorsLayer::permissive()
        }
    }
}

#[cfg(test)]
mod tests;
