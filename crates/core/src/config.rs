use std::env;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_parse<T: std::str::FromStr>(profile: &str, key: &str, default: T) -> T {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_bool(profile: &str, key: &str, default: bool) -> bool {
    match profiled_env_opt(profile, key) {
        Some(v) => matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        None => default,
    }
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub server: ServerConfig,
    pub postgres: PostgresConfig,
    pub scheduler: SchedulerConfig,
    pub regression: RegressionConfig,
    pub scanner: ScannerConfig,
    pub smtp: SmtpConfig,
    pub webhook: WebhookConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `PULSE_PROFILE`. When set (e.g. `PROD`), every key
    /// is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("PULSE_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            server: ServerConfig::from_env_profiled(p),
            postgres: PostgresConfig::from_env_profiled(p),
            scheduler: SchedulerConfig::from_env_profiled(p),
            regression: RegressionConfig::from_env_profiled(p),
            scanner: ScannerConfig::from_env_profiled(p),
            smtp: SmtpConfig::from_env_profiled(p),
            webhook: WebhookConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  server:      {}:{}", self.server.host, self.server.port);
        tracing::info!(
            "  postgres:    host={}, db={}, configured={}",
            self.postgres.host,
            self.postgres.database,
            self.postgres.is_configured()
        );
        tracing::info!(
            "  scheduler:   batch_limit={}, concurrency={}, scan_timeout={}s, cron_secret={}",
            self.scheduler.batch_limit,
            self.scheduler.concurrency,
            self.scheduler.scan_timeout_secs,
            if self.scheduler.cron_secret.is_some() { "set" } else { "MISSING" }
        );
        tracing::info!(
            "  regression:  score_drop_delta={}, cooldown={}h",
            self.regression.score_drop_delta,
            self.regression.alert_cooldown_hours
        );
        tracing::info!("  scanner:     url={}", self.scanner.url.as_deref().unwrap_or("(none)"));
        tracing::info!(
            "  smtp:        host={}, from={}",
            self.smtp.host.as_deref().unwrap_or("(none)"),
            self.smtp.from
        );
        tracing::info!("  webhook:     configured={}", self.webhook.url.is_some());
    }

    /// Return a redacted view safe for API responses (no secrets).
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "server": { "host": self.server.host, "port": self.server.port },
            "postgres": {
                "host": self.postgres.host,
                "port": self.postgres.port,
                "database": self.postgres.database,
                "configured": self.postgres.is_configured(),
            },
            "scheduler": {
                "batch_limit": self.scheduler.batch_limit,
                "concurrency": self.scheduler.concurrency,
                "scan_timeout_secs": self.scheduler.scan_timeout_secs,
                "run_retention": self.scheduler.run_retention,
                "history_limit": self.scheduler.history_limit,
            },
            "regression": self.regression,
            "scanner": { "configured": self.scanner.is_configured() },
            "smtp": { "configured": self.smtp.is_configured() },
            "webhook": {
                "configured": self.webhook.url.is_some(),
                "token": self.webhook.token.is_some(),
                "timeout_secs": self.webhook.timeout_secs,
            },
        })
    }
}

// ── Server ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origin: String,
}

impl ServerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "HOST", "0.0.0.0"),
            port: profiled_env_parse(p, "PORT", 3001),
            cors_origin: profiled_env_or(p, "CORS_ORIGIN", "*"),
        }
    }
}

// ── PostgreSQL ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub ssl_mode: String,
    pub max_connections: u32,
}

impl PostgresConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "PG_HOST", "localhost"),
            port: profiled_env_parse(p, "PG_PORT", 5432),
            database: profiled_env_or(p, "PG_DATABASE", "pulse"),
            username: profiled_env_opt(p, "PG_USERNAME"),
            password: profiled_env_opt(p, "PG_PASSWORD"),
            ssl_mode: profiled_env_or(p, "PG_SSL_MODE", "prefer"),
            max_connections: profiled_env_parse(p, "PG_MAX_CONNECTIONS", 10),
        }
    }

    pub fn connection_string(&self) -> String {
        let user = self.username.as_deref().unwrap_or("postgres");
        let pass = self.password.as_deref().unwrap_or("");
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            user, pass, self.host, self.port, self.database, self.ssl_mode
        )
    }

    pub fn is_configured(&self) -> bool {
        self.username.is_some()
    }
}

// ── Scheduler ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Shared secret the cron trigger must present. Unset rejects every trigger.
    #[serde(skip_serializing)]
    pub cron_secret: Option<String>,
    /// Maximum schedules pulled per trigger.
    pub batch_limit: usize,
    /// Concurrent scans per trigger.
    pub concurrency: usize,
    pub scan_timeout_secs: u64,
    /// Runs kept per schedule.
    pub run_retention: usize,
    /// Scan snapshots kept per target.
    pub history_limit: usize,
}

impl SchedulerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            cron_secret: profiled_env_opt(p, "CRON_SECRET"),
            batch_limit: profiled_env_parse(p, "SCHEDULER_BATCH_LIMIT", 50),
            concurrency: profiled_env_parse(p, "SCHEDULER_CONCURRENCY", 4),
            scan_timeout_secs: profiled_env_parse(p, "SCAN_TIMEOUT_SECS", 120),
            run_retention: profiled_env_parse(p, "RUN_RETENTION", 100),
            history_limit: profiled_env_parse(p, "HISTORY_LIMIT", 90),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cron_secret: None,
            batch_limit: 50,
            concurrency: 4,
            scan_timeout_secs: 120,
            run_retention: 100,
            history_limit: 90,
        }
    }
}

// ── Regression detection ──────────────────────────────────────

/// Thresholds the regression detector classifies with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionConfig {
    /// A drop strictly larger than this many points is a regression.
    pub score_drop_delta: f64,
    /// Drop at or above which the alert is HIGH.
    pub score_drop_high: f64,
    /// Drop at or above which the alert is CRITICAL.
    pub score_drop_critical: f64,
    /// Increase in critical issues at or above which the alert is MEDIUM / HIGH / CRITICAL.
    /// Any smaller increase is LOW.
    pub critical_issue_steps: [u32; 3],
    /// Window in which an unresolved alert of the same type suppresses a new one.
    pub alert_cooldown_hours: i64,
}

impl RegressionConfig {
    fn from_env_profiled(p: &str) -> Self {
        let defaults = Self::default();
        let steps = profiled_env_opt(p, "CRITICAL_ISSUE_STEPS")
            .and_then(|raw| parse_steps(&raw))
            .unwrap_or(defaults.critical_issue_steps);
        Self {
            score_drop_delta: profiled_env_parse(p, "REGRESSION_SCORE_DROP_DELTA", defaults.score_drop_delta),
            score_drop_high: profiled_env_parse(p, "REGRESSION_SCORE_DROP_HIGH", defaults.score_drop_high),
            score_drop_critical: profiled_env_parse(
                p,
                "REGRESSION_SCORE_DROP_CRITICAL",
                defaults.score_drop_critical,
            ),
            critical_issue_steps: steps,
            alert_cooldown_hours: profiled_env_parse(p, "ALERT_COOLDOWN_HOURS", defaults.alert_cooldown_hours),
        }
    }
}

impl Default for RegressionConfig {
    fn default() -> Self {
        Self {
            score_drop_delta: 10.0,
            score_drop_high: 20.0,
            score_drop_critical: 30.0,
            critical_issue_steps: [2, 5, 10],
            alert_cooldown_hours: 24,
        }
    }
}

/// Parse `"2,5,10"` into ascending step thresholds.
fn parse_steps(raw: &str) -> Option<[u32; 3]> {
    let parts: Vec<u32> = raw
        .split(',')
        .map(|s| s.trim().parse().ok())
        .collect::<Option<Vec<_>>>()?;
    match parts.as_slice() {
        [a, b, c] if a <= b && b <= c => Some([*a, *b, *c]),
        _ => None,
    }
}

// ── Scan collaborator ─────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    pub url: Option<String>,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl ScannerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            url: profiled_env_opt(p, "SCANNER_URL"),
            api_key: profiled_env_opt(p, "SCANNER_API_KEY"),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.url.is_some()
    }
}

// ── Email delivery ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub tls: bool,
    pub from: String,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
}

impl SmtpConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_opt(p, "SMTP_HOST"),
            port: profiled_env_opt(p, "SMTP_PORT").and_then(|v| v.parse().ok()),
            tls: profiled_env_bool(p, "SMTP_TLS", true),
            from: profiled_env_or(p, "SMTP_FROM", "Pulse <reports@localhost>"),
            username: profiled_env_opt(p, "SMTP_USERNAME"),
            password: profiled_env_opt(p, "SMTP_PASSWORD"),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.host.is_some()
    }
}

// ── Alert webhook ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: Option<String>,
    /// Sent as `Authorization: Bearer <token>` when set.
    pub token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: None,
            token: None,
            timeout_secs: 10,
        }
    }
}

impl WebhookConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            url: profiled_env_opt(p, "ALERT_WEBHOOK_URL"),
            token: profiled_env_opt(p, "ALERT_WEBHOOK_TOKEN"),
            timeout_secs: profiled_env_parse(p, "ALERT_WEBHOOK_TIMEOUT_SECS", 10),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_steps_accepts_ascending_triplet() {
        assert_eq!(parse_steps("1, 3, 8"), Some([1, 3, 8]));
    }

    #[test]
    fn parse_steps_rejects_malformed() {
        assert_eq!(parse_steps("1,2"), None);
        assert_eq!(parse_steps("5,2,9"), None);
        assert_eq!(parse_steps("a,b,c"), None);
    }

    #[test]
    fn connection_string_uses_defaults() {
        let pg = PostgresConfig {
            host: "db".into(),
            port: 5433,
            database: "pulse".into(),
            username: None,
            password: None,
            ssl_mode: "disable".into(),
            max_connections: 5,
        };
        assert_eq!(pg.connection_string(), "postgres://postgres:@db:5433/pulse?sslmode=disable");
        assert!(!pg.is_configured());
    }

    #[test]
    fn profiled_lookup_prefers_prefixed_key() {
        std::env::set_var("PULSETEST_SCHEDULER_BATCH_LIMIT", "7");
        std::env::set_var("SCHEDULER_BATCH_LIMIT", "9");
        let cfg = SchedulerConfig::from_env_profiled("PULSETEST");
        assert_eq!(cfg.batch_limit, 7);
        std::env::remove_var("PULSETEST_SCHEDULER_BATCH_LIMIT");
        std::env::remove_var("SCHEDULER_BATCH_LIMIT");
    }

    #[test]
    fn redacted_summary_hides_secrets() {
        let mut cfg = Config::for_profile("REDACTTEST");
        cfg.scheduler.cron_secret = Some("super-secret".into());
        cfg.postgres.password = Some("hunter2".into());
        cfg.webhook.token = Some("hook-token".into());
        let rendered = cfg.redacted_summary().to_string();
        assert!(!rendered.contains("super-secret"));
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("hook-token"));
    }
}
