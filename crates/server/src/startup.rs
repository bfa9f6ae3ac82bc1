//! Wires configuration into the store, scanner, notification channels and
//! cron driver.

use std::sync::Arc;

use tracing::{info, warn};

use pulse_core::Config;
use pulse_notify::{Dispatcher, EmailNotifier, Notifier, ReportRenderer, Topic, WebhookNotifier};
use pulse_scheduler::{
    CronDriver, DisabledScanner, ExecutorSettings, HttpScanner, MemoryStore, MonitorStore, PgStore,
    RunExecutor, Scanner,
};

use crate::db;
use crate::state::AppState;

pub async fn build_state(config: &Config) -> anyhow::Result<AppState> {
    let store: Arc<dyn MonitorStore> = match db::init_pg_pool(&config.postgres).await? {
        Some(pool) => Arc::new(PgStore::new(pool)),
        None => Arc::new(MemoryStore::new()),
    };
    info!("Store backend: {}", store.backend());

    let scanner: Arc<dyn Scanner> = if config.scanner.is_configured() {
        Arc::new(HttpScanner::from_config(&config.scanner)?)
    } else {
        warn!("SCANNER_URL not set, every scheduled run will fail");
        Arc::new(DisabledScanner)
    };

    let executor = RunExecutor::new(
        store.clone(),
        scanner,
        Arc::new(build_dispatcher(config)?),
        ReportRenderer::new()?,
        config.regression.clone(),
        ExecutorSettings::from(&config.scheduler),
    );

    if config.scheduler.cron_secret.is_none() {
        warn!("CRON_SECRET not set, the cron trigger will reject every request");
    }
    let driver = CronDriver::new(Arc::new(executor), &config.scheduler);

    Ok(AppState::new(store, Arc::new(driver), config.redacted_summary()))
}

/// Reports go to email and the webhook. Alerts only to the webhook, since
/// they carry no recipients.
fn build_dispatcher(config: &Config) -> anyhow::Result<Dispatcher> {
    let mut dispatcher = Dispatcher::new();

    if config.smtp.is_configured() {
        dispatcher.add_route(Topic::Report, Arc::new(EmailNotifier::from_config(&config.smtp)?));
        info!("Email reports enabled via {}", config.smtp.host.as_deref().unwrap_or_default());
    } else {
        warn!("SMTP_HOST not set, reports will not be emailed");
    }

    if config.webhook.url.is_some() {
        let webhook: Arc<dyn Notifier> = Arc::new(WebhookNotifier::from_config(&config.webhook)?);
        dispatcher.add_route(Topic::Report, webhook.clone());
        dispatcher.add_route(Topic::Alert, webhook);
        info!("Alert webhook enabled");
    }

    Ok(dispatcher)
}
