use std::sync::Arc;

use pulse_scheduler::{CronDriver, MonitorStore};

pub struct AppState {
    pub store: Arc<dyn MonitorStore>,
    pub driver: Arc<CronDriver>,
    /// Redacted configuration echoed by `/health`.
    pub config_summary: serde_json::Value,
}

impl AppState {
    pub fn new(
        store: Arc<dyn MonitorStore>,
        driver: Arc<CronDriver>,
        config_summary: serde_json::Value,
    ) -> Self {
        Self {
            store,
            driver,
            config_summary,
        }
    }
}
