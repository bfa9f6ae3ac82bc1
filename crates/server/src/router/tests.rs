use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{Duration, TimeZone, Utc};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use pulse_core::config::{RegressionConfig, SchedulerConfig};
use pulse_core::{
    AlertType, DeliveryConfig, Frequency, IssueCounts, NewAlert, RecurrenceRule, ScanResult,
    Schedule, Severity, Target,
};
use pulse_notify::{Dispatcher, ReportRenderer};
use pulse_scheduler::{
    AlertStore, CronDriver, ExecutorSettings, MemoryStore, MonitorStore, RunExecutor, ScanError,
    Scanner, ScheduleStore, TargetStore,
};

use super::build_router;
use crate::state::AppState;

const SECRET: &str = "test-secret";

struct FixedScanner;

#[async_trait]
impl Scanner for FixedScanner {
    async fn scan(&self, _url: &str) -> Result<ScanResult, ScanError> {
        Ok(ScanResult {
            score: 90.0,
            issue_counts: IssueCounts::default(),
            raw: None,
        })
    }
}

fn app() -> (Router, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let dyn_store: Arc<dyn MonitorStore> = store.clone();
    let config = SchedulerConfig {
        cron_secret: Some(SECRET.into()),
        ..SchedulerConfig::default()
    };
    let executor = RunExecutor::new(
        dyn_store.clone(),
        Arc::new(FixedScanner),
        Arc::new(Dispatcher::new()),
        ReportRenderer::new().unwrap(),
        RegressionConfig::default(),
        ExecutorSettings::from(&config),
    );
    let driver = Arc::new(CronDriver::new(Arc::new(executor), &config));
    let state = Arc::new(AppState::new(dyn_store, driver, json!({ "profile": "test" })));
    (build_router(state, "*"), store)
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    bearer: Option<&str>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn create_target(app: &Router) -> Uuid {
    let (status, body) = send(
        app,
        "POST",
        "/api/targets",
        Some(json!({ "name": "Example", "url": "https://example.com", "min_score": 80.0 })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_str().unwrap().parse().unwrap()
}

fn weekly_rule(timezone: &str) -> Value {
    json!({
        "frequency": "WEEKLY",
        "days_of_week": [1, 3],
        "time_of_day": "09:00",
        "timezone": timezone,
        "starts_at": "2024-01-01T00:00:00Z"
    })
}

async fn insert_due_schedule(store: &MemoryStore, target_id: Uuid) -> Uuid {
    let now = Utc::now();
    let schedule = Schedule {
        id: Uuid::new_v4(),
        owner_id: "owner-1".into(),
        target_id,
        rule: RecurrenceRule {
            frequency: Frequency::Daily,
            days_of_week: vec![],
            day_of_month: None,
            time_of_day: "09:00".into(),
            timezone: "UTC".into(),
            starts_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            ends_at: None,
        },
        enabled: true,
        next_run_at: Some(now - Duration::hours(1)),
        last_run_at: None,
        delivery: DeliveryConfig::default(),
        created_at: now,
        updated_at: now,
    };
    store.insert_schedule(&schedule).await.unwrap();
    schedule.id
}

// ── Health ──────────────────────────────────────────────────────────

#[tokio::test]
async fn health_reports_backend() {
    let (app, _) = app();
    let (status, body) = send(&app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["store"], "memory");
    assert_eq!(body["config"]["profile"], "test");
}

// ── Cron trigger ────────────────────────────────────────────────────

#[tokio::test]
async fn cron_rejects_missing_or_wrong_secret() {
    let (app, store) = app();
    let target = Target {
        id: Uuid::new_v4(),
        name: "Example".into(),
        url: "https://example.com".into(),
        min_score: None,
        created_at: Utc::now(),
    };
    store.insert_target(&target).await.unwrap();
    let schedule_id = insert_due_schedule(&store, target.id).await;

    let (status, _) = send(&app, "POST", "/api/cron/run", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, body) = send(&app, "POST", "/api/cron/run", None, Some("wrong")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    assert!(store.list_runs(schedule_id, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn cron_runs_due_schedules() {
    let (app, store) = app();
    let target_id = create_target(&app).await;
    let schedule_id = insert_due_schedule(&store, target_id).await;

    let (status, body) = send(&app, "GET", "/api/cron/run?limit=10", None, Some(SECRET)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["due"], 1);
    assert_eq!(body["succeeded"], 1);
    assert_eq!(body["already_claimed"], 0);

    let (status, runs) = send(&app, "GET", &format!("/api/schedules/{schedule_id}/runs"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(runs.as_array().unwrap().len(), 1);
    assert_eq!(runs[0]["status"], "succeeded");

    let (_, history) = send(&app, "GET", &format!("/api/targets/{target_id}/history"), None, None).await;
    assert_eq!(history[0]["score"], 90.0);

    let (_, again) = send(&app, "POST", "/api/cron/run", None, Some(SECRET)).await;
    assert_eq!(again["due"], 0);
}

// ── Schedules ───────────────────────────────────────────────────────

#[tokio::test]
async fn create_schedule_computes_next_run() {
    let (app, _) = app();
    let target_id = create_target(&app).await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/schedules",
        Some(json!({
            "owner_id": "owner-1",
            "target_id": target_id,
            "rule": weekly_rule("Europe/Amsterdam"),
            "delivery": { "recipients": ["a@example.com"], "format": "text" }
        })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["enabled"], true);
    assert!(body["next_run_at"].is_string());
    assert_eq!(body["rule"]["frequency"], "WEEKLY");
    assert_eq!(body["delivery"]["format"], "text");

    let (status, list) = send(&app, "GET", "/api/schedules?owner_id=owner-1", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);
    let (_, other) = send(&app, "GET", "/api/schedules?owner_id=someone-else", None, None).await;
    assert!(other.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn invalid_rule_returns_field_errors() {
    let (app, _) = app();
    let target_id = create_target(&app).await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/schedules",
        Some(json!({
            "owner_id": "owner-1",
            "target_id": target_id,
            "rule": weekly_rule("europe/amsterdam")
        })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let errors = body["validation"]["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["field"], "rule.timezone");
    assert_eq!(errors[0]["hint"], "Did you mean 'Europe/Amsterdam'?");
}

#[tokio::test]
async fn unknown_frequency_and_format_are_validation_errors() {
    let (app, _) = app();
    let target_id = create_target(&app).await;

    let mut rule = weekly_rule("UTC");
    rule["frequency"] = json!("HOURLY");
    let (status, body) = send(
        &app,
        "POST",
        "/api/schedules",
        Some(json!({
            "owner_id": "owner-1",
            "target_id": target_id,
            "rule": rule,
            "delivery": { "format": "pdf" }
        })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let paths: Vec<&str> = body["validation"]["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["field"].as_str().unwrap())
        .collect();
    assert!(paths.contains(&"rule.frequency"));
    assert!(paths.contains(&"delivery.format"));
}

#[tokio::test]
async fn too_many_recipients_rejected() {
    let (app, _) = app();
    let target_id = create_target(&app).await;
    let recipients: Vec<String> = (0..21).map(|i| format!("user{i}@example.com")).collect();

    let (status, body) = send(
        &app,
        "POST",
        "/api/schedules",
        Some(json!({
            "owner_id": "owner-1",
            "target_id": target_id,
            "rule": weekly_rule("UTC"),
            "delivery": { "recipients": recipients }
        })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["validation"]["errors"][0]["field"], "delivery.recipients");
}

#[tokio::test]
async fn unknown_target_is_rejected() {
    let (app, _) = app();
    let (status, _) = send(
        &app,
        "POST",
        "/api/schedules",
        Some(json!({
            "owner_id": "owner-1",
            "target_id": Uuid::new_v4(),
            "rule": weekly_rule("UTC")
        })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn disable_then_enable_recomputes_next_run() {
    let (app, store) = app();
    let target_id = create_target(&app).await;
    let (_, created) = send(
        &app,
        "POST",
        "/api/schedules",
        Some(json!({ "owner_id": "owner-1", "target_id": target_id, "rule": weekly_rule("UTC") })),
        None,
    )
    .await;
    let id: Uuid = created["id"].as_str().unwrap().parse().unwrap();

    // Simulate a stale next_run_at left behind while disabled.
    let (status, _) = send(&app, "PUT", &format!("/api/schedules/{id}"), Some(json!({ "enabled": false })), None).await;
    assert_eq!(status, StatusCode::OK);
    let stale = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
    store.update_next_run(id, Some(stale), stale).await.unwrap();

    let (status, body) = send(&app, "PUT", &format!("/api/schedules/{id}"), Some(json!({ "enabled": true })), None).await;
    assert_eq!(status, StatusCode::OK);
    let next: chrono::DateTime<Utc> = body["next_run_at"].as_str().unwrap().parse().unwrap();
    assert!(next > Utc::now());
}

#[tokio::test]
async fn delivery_edit_keeps_run_bookkeeping() {
    let (app, store) = app();
    let target_id = create_target(&app).await;
    let id = insert_due_schedule(&store, target_id).await;

    // The executor ran and rescheduled after the schedule was created.
    let ran_at = Utc.with_ymd_and_hms(2024, 3, 1, 9, 5, 0).unwrap();
    let next = Utc.with_ymd_and_hms(2030, 3, 2, 9, 0, 0).unwrap();
    store.update_next_run(id, Some(next), ran_at).await.unwrap();

    let (status, body) = send(
        &app,
        "PUT",
        &format!("/api/schedules/{id}"),
        Some(json!({ "delivery": { "recipients": ["ops@example.com"], "format": "text" } })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["next_run_at"], "2030-03-02T09:00:00Z");
    assert_eq!(body["last_run_at"], "2024-03-01T09:05:00Z");

    let stored = store.get_schedule(id).await.unwrap().unwrap();
    assert_eq!(stored.next_run_at, Some(next));
    assert_eq!(stored.last_run_at, Some(ran_at));
    assert_eq!(stored.delivery.recipients, vec!["ops@example.com".to_string()]);
}

#[tokio::test]
async fn delete_schedule_then_404() {
    let (app, _) = app();
    let target_id = create_target(&app).await;
    let (_, created) = send(
        &app,
        "POST",
        "/api/schedules",
        Some(json!({ "owner_id": "owner-1", "target_id": target_id, "rule": weekly_rule("UTC") })),
        None,
    )
    .await;
    let id = created["id"].as_str().unwrap().to_string();

    let (status, _) = send(&app, "DELETE", &format!("/api/schedules/{id}"), None, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, "GET", &format!("/api/schedules/{id}"), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, "DELETE", &format!("/api/schedules/{id}"), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn preview_lists_upcoming_occurrences() {
    let (app, _) = app();
    let (status, body) = send(
        &app,
        "POST",
        "/api/schedules/preview",
        Some(json!({
            "rule": weekly_rule("Europe/Amsterdam"),
            "from": "2024-03-04T00:00:00Z",
            "count": 3
        })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["occurrences"],
        json!([
            "2024-03-04T08:00:00Z",
            "2024-03-06T08:00:00Z",
            "2024-03-11T08:00:00Z"
        ])
    );
}

// ── Targets ─────────────────────────────────────────────────────────

#[tokio::test]
async fn target_validation_and_lookup() {
    let (app, _) = app();
    let (status, body) = send(
        &app,
        "POST",
        "/api/targets",
        Some(json!({ "name": "", "url": "ftp://example.com", "min_score": 120.0 })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["validation"]["errors"].as_array().unwrap().len(), 3);

    let id = create_target(&app).await;
    let (status, body) = send(&app, "GET", &format!("/api/targets/{id}"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["min_score"], 80.0);

    let (status, _) = send(&app, "GET", &format!("/api/targets/{}", Uuid::new_v4()), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ── Alerts ──────────────────────────────────────────────────────────

#[tokio::test]
async fn resolve_alert_once() {
    let (app, store) = app();
    let target_id = create_target(&app).await;
    let alert = NewAlert {
        target_id,
        alert_type: AlertType::ScoreDrop,
        severity: Severity::High,
        current_score: Some(70.0),
        previous_score: Some(92.0),
        threshold: Some(10.0),
        message: "Score dropped".into(),
    }
    .into_alert(Utc::now());
    store.insert_alert_deduped(&alert, Utc::now() - Duration::hours(24)).await.unwrap();

    let (_, open) = send(&app, "GET", &format!("/api/alerts?target_id={target_id}"), None, None).await;
    assert_eq!(open.as_array().unwrap().len(), 1);
    assert_eq!(open[0]["alert_type"], "SCORE_DROP");
    assert_eq!(open[0]["severity"], "HIGH");

    let uri = format!("/api/alerts/{}/resolve", alert.id);
    let (status, body) = send(&app, "POST", &uri, Some(json!({ "resolved_by": "owner-1" })), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["resolved"], true);
    assert_eq!(body["resolved_by"], "owner-1");

    let (status, _) = send(&app, "POST", &uri, Some(json!({ "resolved_by": "owner-1" })), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, open) = send(&app, "GET", &format!("/api/alerts?target_id={target_id}"), None, None).await;
    assert!(open.as_array().unwrap().is_empty());
    let (_, all) = send(
        &app,
        "GET",
        &format!("/api/alerts?target_id={target_id}&include_resolved=true"),
        None,
        None,
    )
    .await;
    assert_eq!(all.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn resolve_unknown_alert_is_404() {
    let (app, _) = app();
    let uri = format!("/api/alerts/{}/resolve", Uuid::new_v4());
    let (status, _) = send(&app, "POST", &uri, Some(json!({ "resolved_by": "owner-1" })), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
