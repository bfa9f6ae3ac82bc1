//! Alert webhook channel.
//!
//! Posts a JSON envelope per notification. Recipient addresses are never
//! part of the payload.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use pulse_core::config::WebhookConfig;

use crate::traits::{BodyKind, Notification, Notifier, NotifyError, Topic};

const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Serialize)]
struct Envelope<'a> {
    source: &'static str,
    topic: Topic,
    subject: &'a str,
    body: &'a str,
    body_kind: BodyKind,
    labels: &'a BTreeMap<String, String>,
    sent_at: DateTime<Utc>,
}

impl<'a> Envelope<'a> {
    fn new(notification: &'a Notification, sent_at: DateTime<Utc>) -> Self {
        Self {
            source: "pulse",
            topic: notification.topic,
            subject: &notification.subject,
            body: &notification.body,
            body_kind: notification.body_kind,
            labels: &notification.labels,
            sent_at,
        }
    }
}

#[derive(Debug)]
pub struct WebhookNotifier {
    url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: &str, token: Option<String>, timeout: Duration) -> Result<Self, NotifyError> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(NotifyError::Config(format!(
                "webhook url must be http(s), got '{url}'"
            )));
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: url.to_string(),
            token,
            client,
        })
    }

    pub fn from_config(config: &WebhookConfig) -> Result<Self, NotifyError> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| NotifyError::Config("ALERT_WEBHOOK_URL is not set".to_string()))?;
        Self::new(
            url,
            config.token.clone(),
            Duration::from_secs(config.timeout_secs.max(1)),
        )
    }
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let mut request = self
            .client
            .post(&self.url)
            .json(&Envelope::new(notification, Utc::now()));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if let Some((idx, _)) = body.char_indices().nth(MAX_ERROR_BODY) {
                body.truncate(idx);
            }
            return Err(NotifyError::Rejected {
                channel: self.name(),
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(url = %self.url, %status, topic = ?notification.topic, "Webhook accepted notification");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}
