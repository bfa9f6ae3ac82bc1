//! End-to-end batches: CronDriver -> RunExecutor -> MemoryStore, with a
//! scripted scanner and a recording notifier.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use pulse_core::config::{RegressionConfig, SchedulerConfig};
use pulse_core::{
    AlertType, DeliveryConfig, Frequency, IssueCounts, RecurrenceRule, ReportFormat, RunStatus,
    ScanResult, ScanSnapshot, Schedule, Severity, Target,
};
use pulse_notify::{Dispatcher, Notification, Notifier, NotifyError, ReportRenderer, Topic};
use pulse_scheduler::{
    compute_next_run, AlertStore, ClaimOutcome, CronDriver, DriverError, ExecutorSettings,
    MemoryStore, MonitorStore, RunExecutor, ScanError, Scanner, ScheduleStore, TargetStore,
};

// ── Test doubles ────────────────────────────────────────────────────

enum Step {
    Score(f64, u32),
    Fail(&'static str),
    Hang,
}

struct ScriptedScanner {
    steps: Mutex<VecDeque<Step>>,
    delay: Duration,
}

impl ScriptedScanner {
    fn new(steps: Vec<Step>) -> Arc<Self> {
        Self::with_delay(steps, Duration::ZERO)
    }

    fn with_delay(steps: Vec<Step>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            delay,
        })
    }
}

#[async_trait]
impl Scanner for ScriptedScanner {
    async fn scan(&self, _url: &str) -> Result<ScanResult, ScanError> {
        let step = self.steps.lock().unwrap().pop_front();
        tokio::time::sleep(self.delay).await;
        match step {
            Some(Step::Score(score, critical)) => Ok(ScanResult {
                score,
                issue_counts: IssueCounts {
                    critical,
                    ..IssueCounts::default()
                },
                raw: None,
            }),
            Some(Step::Fail(msg)) => Err(ScanError::Status {
                status: 502,
                body: msg.to_string(),
            }),
            Some(Step::Hang) => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                unreachable!("scan timeout should have fired")
            }
            None => panic!("scanner called more often than scripted"),
        }
    }
}

#[derive(Clone, Default)]
struct RecordingNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

// ── Fixtures ────────────────────────────────────────────────────────

const SECRET: &str = "cron-secret";

fn fire_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
}

fn batch_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 5, 0).unwrap()
}

struct Harness {
    store: Arc<MemoryStore>,
    driver: Arc<CronDriver>,
    sent: Arc<Mutex<Vec<Notification>>>,
    target: Target,
    schedule: Schedule,
}

async fn harness(scanner: Arc<dyn Scanner>, recipients: Vec<String>, min_score: Option<f64>) -> Harness {
    harness_with_timeout(scanner, recipients, min_score, Duration::from_secs(5)).await
}

async fn harness_with_timeout(
    scanner: Arc<dyn Scanner>,
    recipients: Vec<String>,
    min_score: Option<f64>,
    scan_timeout: Duration,
) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let target = Target {
        id: Uuid::new_v4(),
        name: "Example".into(),
        url: "https://example.com".into(),
        min_score,
        created_at: fire_at(),
    };
    store.insert_target(&target).await.unwrap();

    let schedule = Schedule {
        id: Uuid::new_v4(),
        owner_id: "owner-1".into(),
        target_id: target.id,
        rule: RecurrenceRule {
            frequency: Frequency::Daily,
            days_of_week: vec![],
            day_of_month: None,
            time_of_day: "09:00".into(),
            timezone: "UTC".into(),
            starts_at: Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
            ends_at: None,
        },
        enabled: true,
        next_run_at: Some(fire_at()),
        last_run_at: None,
        delivery: DeliveryConfig {
            recipients,
            format: ReportFormat::Text,
            summary_only: false,
        },
        created_at: fire_at(),
        updated_at: fire_at(),
    };
    store.insert_schedule(&schedule).await.unwrap();

    let notifier = RecordingNotifier::default();
    let sent = notifier.sent.clone();
    let channel: Arc<dyn Notifier> = Arc::new(notifier);
    let dispatcher = Dispatcher::new()
        .route(Topic::Report, channel.clone())
        .route(Topic::Alert, channel);

    let config = SchedulerConfig {
        cron_secret: Some(SECRET.into()),
        ..SchedulerConfig::default()
    };
    let dyn_store: Arc<dyn MonitorStore> = store.clone();
    let executor = RunExecutor::new(
        dyn_store,
        scanner,
        Arc::new(dispatcher),
        ReportRenderer::new().unwrap(),
        RegressionConfig::default(),
        ExecutorSettings {
            scan_timeout,
            run_retention: config.run_retention,
            history_limit: config.history_limit,
        },
    );
    let driver = Arc::new(CronDriver::new(Arc::new(executor), &config));

    Harness {
        store,
        driver,
        sent,
        target,
        schedule,
    }
}

async fn seed_previous(h: &Harness, score: f64) {
    let snapshot = ScanSnapshot {
        target_id: h.target.id,
        run_id: None,
        score,
        issue_counts: IssueCounts::default(),
        scanned_at: fire_at() - chrono::Duration::days(1),
    };
    h.store.append_history(&snapshot, 90).await.unwrap();
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn successful_run_advances_and_records_history() {
    let h = harness(ScriptedScanner::new(vec![Step::Score(88.0, 0)]), vec![], None).await;

    let summary = h.driver.run_at(10, batch_time()).await.unwrap();
    assert_eq!(summary.due, 1);
    assert_eq!(summary.succeeded, 1);
    assert!(summary.errors.is_empty());

    let schedule = h.store.get_schedule(h.schedule.id).await.unwrap().unwrap();
    assert_eq!(
        schedule.next_run_at,
        Some(Utc.with_ymd_and_hms(2024, 3, 2, 9, 0, 0).unwrap())
    );
    assert_eq!(schedule.last_run_at, Some(batch_time()));

    let runs = h.store.list_runs(h.schedule.id, 10).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Succeeded);
    assert_eq!(runs[0].window_key, "2024-03-01");
    assert_eq!(runs[0].fired_at, fire_at());

    let history = h.store.recent_history(h.target.id, 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].run_id, Some(runs[0].id));
}

#[tokio::test]
async fn repeated_batch_is_idempotent() {
    let h = harness(ScriptedScanner::new(vec![Step::Score(88.0, 0)]), vec![], None).await;

    let first = h.driver.run_at(10, batch_time()).await.unwrap();
    let second = h.driver.run_at(10, batch_time()).await.unwrap();

    assert_eq!(first.succeeded, 1);
    assert_eq!(second.due, 0);
    assert_eq!(h.store.list_runs(h.schedule.id, 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn concurrent_batches_run_the_window_once() {
    let scanner = ScriptedScanner::with_delay(
        vec![Step::Score(90.0, 0), Step::Score(90.0, 0)],
        Duration::from_millis(50),
    );
    let h = harness(scanner, vec![], None).await;

    let (a, b) = tokio::join!(
        h.driver.run_at(10, batch_time()),
        h.driver.run_at(10, batch_time())
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.succeeded + b.succeeded, 1);
    assert_eq!(a.failed + b.failed, 0);
    assert_eq!(a.already_claimed + b.already_claimed, a.due + b.due - 1);

    let runs = h.store.list_runs(h.schedule.id, 10).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].window_key, "2024-03-01");
}

#[tokio::test]
async fn large_drop_raises_single_critical_score_drop() {
    let h = harness(
        ScriptedScanner::new(vec![Step::Score(58.0, 3)]),
        vec!["owner@example.com".into()],
        Some(70.0),
    )
    .await;
    seed_previous(&h, 92.0).await;

    let summary = h.driver.run_at(10, batch_time()).await.unwrap();
    assert_eq!(summary.succeeded, 1);

    let alerts = h.store.list_alerts(Some(h.target.id), true).await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].alert_type, AlertType::ScoreDrop);
    assert_eq!(alerts[0].severity, Severity::Critical);
    assert_eq!(alerts[0].previous_score, Some(92.0));
    assert_eq!(alerts[0].current_score, Some(58.0));

    let sent = h.sent.lock().unwrap();
    let topics: Vec<Topic> = sent.iter().map(|n| n.topic).collect();
    assert_eq!(topics, vec![Topic::Report, Topic::Alert]);
    assert_eq!(sent[0].recipients, vec!["owner@example.com".to_string()]);
}

#[tokio::test]
async fn scan_failure_finalizes_failed_and_advances() {
    let h = harness(
        ScriptedScanner::new(vec![Step::Fail("connection refused")]),
        vec![],
        None,
    )
    .await;

    let summary = h.driver.run_at(10, batch_time()).await.unwrap();
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.errors[0].schedule_id, h.schedule.id);
    assert!(summary.errors[0].error.contains("connection refused"));

    let runs = h.store.list_runs(h.schedule.id, 10).await.unwrap();
    assert_eq!(runs[0].status, RunStatus::Failed);
    assert!(runs[0].error.as_deref().unwrap().contains("connection refused"));

    let schedule = h.store.get_schedule(h.schedule.id).await.unwrap().unwrap();
    assert!(schedule.next_run_at.unwrap() > batch_time());

    let alerts = h.store.list_alerts(Some(h.target.id), false).await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].alert_type, AlertType::ScanFailed);
    assert_eq!(alerts[0].severity, Severity::Medium);
}

#[tokio::test]
async fn repeated_failures_share_one_scan_failed_alert() {
    let h = harness(
        ScriptedScanner::new(vec![Step::Fail("dns"), Step::Fail("dns")]),
        vec![],
        None,
    )
    .await;

    h.driver.run_at(10, batch_time()).await.unwrap();
    let next_day = Utc.with_ymd_and_hms(2024, 3, 2, 9, 5, 0).unwrap();
    let summary = h.driver.run_at(10, next_day).await.unwrap();
    assert_eq!(summary.failed, 1);

    assert_eq!(h.store.list_runs(h.schedule.id, 10).await.unwrap().len(), 2);
    let alerts = h.store.list_alerts(Some(h.target.id), false).await.unwrap();
    assert_eq!(alerts.len(), 1);
}

#[tokio::test]
async fn hung_scan_times_out_as_failed() {
    let h = harness_with_timeout(
        ScriptedScanner::new(vec![Step::Hang]),
        vec![],
        None,
        Duration::from_millis(50),
    )
    .await;

    let summary = h.driver.run_at(10, batch_time()).await.unwrap();
    assert_eq!(summary.failed, 1);
    assert!(summary.errors[0].error.contains("timed out"));

    let schedule = h.store.get_schedule(h.schedule.id).await.unwrap().unwrap();
    assert!(schedule.next_run_at.unwrap() > batch_time());
}

#[tokio::test]
async fn late_batch_skips_missed_occurrences() {
    let h = harness(ScriptedScanner::new(vec![Step::Score(90.0, 0)]), vec![], None).await;

    // Three days late: the run still belongs to the window that was due.
    let late = Utc.with_ymd_and_hms(2024, 3, 4, 12, 0, 0).unwrap();
    h.driver.run_at(10, late).await.unwrap();

    let runs = h.store.list_runs(h.schedule.id, 10).await.unwrap();
    assert_eq!(runs[0].window_key, "2024-03-01");
    let schedule = h.store.get_schedule(h.schedule.id).await.unwrap().unwrap();
    assert_eq!(
        schedule.next_run_at,
        Some(Utc.with_ymd_and_hms(2024, 3, 5, 9, 0, 0).unwrap())
    );
}

#[tokio::test]
async fn wrong_secret_never_touches_the_store() {
    let h = harness(ScriptedScanner::new(vec![]), vec![], None).await;

    let err = h.driver.trigger(Some("nope"), None).await.unwrap_err();
    assert!(matches!(err, DriverError::Unauthorized));
    let err = h.driver.trigger(None, None).await.unwrap_err();
    assert!(matches!(err, DriverError::Unauthorized));

    assert!(h.store.list_runs(h.schedule.id, 10).await.unwrap().is_empty());
    let schedule = h.store.get_schedule(h.schedule.id).await.unwrap().unwrap();
    assert_eq!(schedule.next_run_at, Some(fire_at()));
}

#[tokio::test]
async fn right_secret_runs_the_batch() {
    let h = harness(ScriptedScanner::new(vec![Step::Score(90.0, 0)]), vec![], None).await;

    let summary = h.driver.trigger(Some(SECRET), Some(5)).await.unwrap();
    assert_eq!(summary.due, 1);
    assert_eq!(summary.succeeded, 1);
}

#[tokio::test]
async fn missing_target_fails_without_stalling() {
    let h = harness(ScriptedScanner::new(vec![]), vec![], None).await;
    let mut orphan = h.schedule.clone();
    orphan.id = Uuid::new_v4();
    orphan.target_id = Uuid::new_v4();
    h.store.insert_schedule(&orphan).await.unwrap();
    h.store.delete_schedule(h.schedule.id).await.unwrap();

    let summary = h.driver.run_at(10, batch_time()).await.unwrap();
    assert_eq!(summary.failed, 1);
    assert!(summary.errors[0].error.contains("not found"));

    let schedule = h.store.get_schedule(orphan.id).await.unwrap().unwrap();
    assert!(schedule.next_run_at.unwrap() > batch_time());
}

#[tokio::test]
async fn rule_edit_into_a_claimed_window_moves_to_the_next_day() {
    let h = harness(
        ScriptedScanner::new(vec![Step::Score(90.0, 0), Step::Score(91.0, 0)]),
        vec![],
        None,
    )
    .await;
    h.driver.run_at(10, batch_time()).await.unwrap();

    // Edited at noon to 17:00: the new occurrence falls in today's window,
    // which the 09:00 run already holds.
    let noon = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    let mut edited = h.store.get_schedule(h.schedule.id).await.unwrap().unwrap();
    edited.rule.time_of_day = "17:00".into();
    edited.next_run_at = compute_next_run(&edited.rule, noon).unwrap();
    h.store.update_schedule(&edited, true).await.unwrap();
    assert_eq!(
        edited.next_run_at,
        Some(Utc.with_ymd_and_hms(2024, 3, 1, 17, 0, 0).unwrap())
    );

    let evening = Utc.with_ymd_and_hms(2024, 3, 1, 17, 5, 0).unwrap();
    let summary = h.driver.run_at(10, evening).await.unwrap();
    assert_eq!(summary.already_claimed, 1);
    let schedule = h.store.get_schedule(h.schedule.id).await.unwrap().unwrap();
    assert_eq!(
        schedule.next_run_at,
        Some(Utc.with_ymd_and_hms(2024, 3, 2, 17, 0, 0).unwrap())
    );

    let next_evening = Utc.with_ymd_and_hms(2024, 3, 2, 17, 5, 0).unwrap();
    let summary = h.driver.run_at(10, next_evening).await.unwrap();
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.already_claimed, 0);

    let runs = h.store.list_runs(h.schedule.id, 10).await.unwrap();
    let windows: Vec<&str> = runs.iter().map(|r| r.window_key.as_str()).collect();
    assert_eq!(windows, vec!["2024-03-02", "2024-03-01"]);
}

#[tokio::test]
async fn orphaned_running_run_does_not_stall_the_schedule() {
    let h = harness(ScriptedScanner::new(vec![Step::Score(90.0, 0)]), vec![], None).await;

    // A worker claimed the window and died before finalizing.
    let claimed = h
        .store
        .claim(h.schedule.id, "2024-03-01", fire_at(), fire_at())
        .await
        .unwrap();
    assert!(matches!(claimed, ClaimOutcome::Claimed(_)));

    let summary = h.driver.run_at(10, batch_time()).await.unwrap();
    assert_eq!(summary.already_claimed, 1);
    let schedule = h.store.get_schedule(h.schedule.id).await.unwrap().unwrap();
    assert_eq!(
        schedule.next_run_at,
        Some(Utc.with_ymd_and_hms(2024, 3, 2, 9, 0, 0).unwrap())
    );

    // Once moved on, the same batch time no longer lists it.
    assert_eq!(h.driver.run_at(10, batch_time()).await.unwrap().due, 0);

    let next_day = Utc.with_ymd_and_hms(2024, 3, 2, 9, 5, 0).unwrap();
    assert_eq!(h.driver.run_at(10, next_day).await.unwrap().succeeded, 1);
}

#[tokio::test]
async fn invalid_stored_rule_parks_the_schedule() {
    let h = harness(ScriptedScanner::new(vec![]), vec![], None).await;
    let mut broken = h.schedule.clone();
    broken.id = Uuid::new_v4();
    broken.rule.timezone = "Mars/Olympus".into();
    h.store.insert_schedule(&broken).await.unwrap();
    h.store.delete_schedule(h.schedule.id).await.unwrap();

    let summary = h.driver.run_at(10, batch_time()).await.unwrap();
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.errors[0].schedule_id, broken.id);
    assert!(summary.errors[0].error.contains("invalid rule"));

    let schedule = h.store.get_schedule(broken.id).await.unwrap().unwrap();
    assert_eq!(schedule.next_run_at, None);
    assert!(h.store.list_runs(broken.id, 10).await.unwrap().is_empty());

    let later = Utc.with_ymd_and_hms(2024, 3, 2, 9, 5, 0).unwrap();
    assert_eq!(h.driver.run_at(10, later).await.unwrap().due, 0);
}
