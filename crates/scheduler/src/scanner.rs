//! Scan collaborator seam.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use pulse_core::config::ScannerConfig;
use pulse_core::ScanResult;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("scanner request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("scanner returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("scanner returned an invalid score: {0}")]
    InvalidScore(f64),

    #[error("scanner not configured")]
    NotConfigured,
}

/// Runs one accessibility scan against a URL.
#[async_trait]
pub trait Scanner: Send + Sync {
    async fn scan(&self, url: &str) -> Result<ScanResult, ScanError>;
}

#[derive(Serialize)]
struct ScanRequest<'a> {
    url: &'a str,
}

/// Scanner backed by an HTTP scan service.
///
/// Sends `POST <endpoint>` with `{"url": ...}` and expects a [`ScanResult`]
/// JSON body back.
pub struct HttpScanner {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpScanner {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key,
        }
    }

    pub fn from_config(config: &ScannerConfig) -> Result<Self, ScanError> {
        let url = config.url.as_deref().ok_or(ScanError::NotConfigured)?;
        Ok(Self::new(url, config.api_key.clone()))
    }
}

#[async_trait]
impl Scanner for HttpScanner {
    async fn scan(&self, url: &str) -> Result<ScanResult, ScanError> {
        let mut request = self.client.post(&self.endpoint).json(&ScanRequest { url });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ScanError::Status {
                status: status.as_u16(),
                body: truncate(&body, 512),
            });
        }

        let result: ScanResult = response.json().await?;
        if !(0.0..=100.0).contains(&result.score) {
            return Err(ScanError::InvalidScore(result.score));
        }
        debug!(url, score = result.score, "Scan completed");
        Ok(result)
    }
}

/// Stand-in when no scan service is configured. Every scan fails, so runs
/// are recorded as FAILED instead of silently skipped.
pub struct DisabledScanner;

#[async_trait]
impl Scanner for DisabledScanner {
    async fn scan(&self, _url: &str) -> Result<ScanResult, ScanError> {
        Err(ScanError::NotConfigured)
    }
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
