//! The channel seam and what travels through it.

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{channel} rejected the notification with {status}: {body}")]
    Rejected {
        channel: &'static str,
        status: u16,
        body: String,
    },

    #[error("smtp delivery failed: {0}")]
    Smtp(String),

    #[error("template rendering failed: {0}")]
    Template(String),

    #[error("invalid channel configuration: {0}")]
    Config(String),
}

/// Routing key for the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    /// Per-run report addressed to a schedule's recipients.
    Report,
    /// A newly raised alert.
    Alert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyKind {
    Html,
    Text,
    Json,
}

impl BodyKind {
    pub fn mime(&self) -> &'static str {
        match self {
            BodyKind::Html => "text/html; charset=utf-8",
            BodyKind::Text => "text/plain; charset=utf-8",
            BodyKind::Json => "application/json",
        }
    }
}

/// A rendered report or alert.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub topic: Topic,
    pub subject: String,
    pub body: String,
    pub body_kind: BodyKind,
    /// Email addresses. Only the email channel reads these.
    #[serde(skip_serializing)]
    pub recipients: Vec<String>,
    /// Identifiers for downstream filtering: `target_id`, `run_id`,
    /// `status`, and `severity` / `alert_type` on alerts.
    pub labels: BTreeMap<String, String>,
}

/// One delivery channel.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;

    /// Short channel label used in logs and delivery reports.
    fn name(&self) -> &'static str;
}
