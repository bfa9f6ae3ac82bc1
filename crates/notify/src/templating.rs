//! Minijinja rendering for run reports and alert notices.
//!
//! Report templates are fixed per output format and registered once at
//! construction. JSON output is the serialized context rather than a
//! template.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use minijinja::Environment;
use pulse_core::{Alert, ReportFormat, Run, Target};
use serde::Serialize;

use crate::traits::{BodyKind, Notification, NotifyError, Topic};

const HTML_REPORT: &str = r#"<html><body>
<h2>Accessibility report: {{ target.name }}</h2>
<p><a href="{{ target.url }}">{{ target.url }}</a> &middot; window {{ run.window_key }}</p>
{% if run.status == "failed" -%}
<p><strong>Scan failed:</strong> {{ run.error }}</p>
{%- else -%}
<p>Score: <strong>{{ run.score | round(1) }}</strong>{% if previous_score is not none %} (previous {{ previous_score | round(1) }}){% endif %}</p>
{%- endif %}
{% if alert %}<p>[{{ alert.severity }}] {{ alert.alert_type }}: {{ alert.message }}</p>{% endif %}
{% if not summary_only and run.issue_counts %}
<table>
<tr><th>Impact</th><th>Issues</th></tr>
<tr><td>Critical</td><td>{{ run.issue_counts.critical }}</td></tr>
<tr><td>Serious</td><td>{{ run.issue_counts.serious }}</td></tr>
<tr><td>Moderate</td><td>{{ run.issue_counts.moderate }}</td></tr>
<tr><td>Minor</td><td>{{ run.issue_counts.minor }}</td></tr>
</table>
{% endif %}
<p><small>Generated {{ generated_at }}</small></p>
</body></html>"#;

const TEXT_REPORT: &str = r#"Accessibility report: {{ target.name }} ({{ target.url }})
Window: {{ run.window_key }}
{% if run.status == "failed" -%}
Scan failed: {{ run.error }}
{%- else -%}
Score: {{ run.score | round(1) }}{% if previous_score is not none %} (previous {{ previous_score | round(1) }}){% endif %}
{%- endif %}
{% if alert %}Alert: [{{ alert.severity }}] {{ alert.alert_type }}: {{ alert.message }}
{% endif %}
{%- if not summary_only and run.issue_counts %}
Issues: critical={{ run.issue_counts.critical }} serious={{ run.issue_counts.serious }} moderate={{ run.issue_counts.moderate }} minor={{ run.issue_counts.minor }}
{% endif %}
Generated {{ generated_at }}
"#;

const REPORT_SUBJECT: &str = "{% if alert %}[{{ alert.severity }}] {% endif %}Accessibility report for {{ target.name }}: {% if run.status == \"failed\" %}scan failed{% else %}{{ run.score | round(1) }}{% endif %}";

const ALERT_SUBJECT: &str = "[{{ alert.severity }}] {{ alert.alert_type }} on {{ target.name }}";

const ALERT_BODY: &str = r#"{{ alert.message }}
Target: {{ target.name }} ({{ target.url }})
{% if alert.current_score is not none %}Current score: {{ alert.current_score | round(1) }}
{% endif %}{% if alert.previous_score is not none %}Previous score: {{ alert.previous_score | round(1) }}
{% endif %}{% if alert.threshold is not none %}Threshold: {{ alert.threshold | round(1) }}
{% endif %}Raised {{ alert.created_at }}
"#;

/// Everything a report or alert template can see.
#[derive(Debug, Clone, Serialize)]
pub struct ReportContext<'a> {
    pub target: &'a Target,
    pub run: &'a Run,
    pub previous_score: Option<f64>,
    pub alert: Option<&'a Alert>,
    pub summary_only: bool,
    pub generated_at: DateTime<Utc>,
}

/// Renders reports and alerts with pre-registered minijinja templates.
#[derive(Debug)]
pub struct ReportRenderer {
    env: Environment<'static>,
}

impl ReportRenderer {
    pub fn new() -> Result<Self, NotifyError> {
        let mut env = Environment::new();
        env.add_filter("round", round_filter);
        for (name, source) in [
            ("report.html", HTML_REPORT),
            ("report.txt", TEXT_REPORT),
            ("report.subject", REPORT_SUBJECT),
            ("alert.subject", ALERT_SUBJECT),
            ("alert.txt", ALERT_BODY),
        ] {
            env.add_template(name, source)
                .map_err(|e| NotifyError::Template(e.to_string()))?;
        }
        Ok(Self { env })
    }

    fn render(&self, name: &str, ctx: &ReportContext<'_>) -> Result<String, NotifyError> {
        self.env
            .get_template(name)
            .and_then(|t| t.render(ctx))
            .map_err(|e| NotifyError::Template(e.to_string()))
    }

    /// Render the per-run report in the schedule's format.
    pub fn render_report(
        &self,
        format: ReportFormat,
        ctx: &ReportContext<'_>,
    ) -> Result<(String, BodyKind), NotifyError> {
        match format {
            ReportFormat::Html => Ok((self.render("report.html", ctx)?, BodyKind::Html)),
            ReportFormat::Text => Ok((self.render("report.txt", ctx)?, BodyKind::Text)),
            ReportFormat::Json => {
                let value = if ctx.summary_only {
                    serde_json::json!({
                        "target": { "name": ctx.target.name, "url": ctx.target.url },
                        "window_key": ctx.run.window_key,
                        "status": ctx.run.status,
                        "score": ctx.run.score,
                        "previous_score": ctx.previous_score,
                        "error": ctx.run.error,
                        "alert": ctx.alert.map(|a| serde_json::json!({
                            "alert_type": a.alert_type,
                            "severity": a.severity,
                            "message": a.message,
                        })),
                        "generated_at": ctx.generated_at,
                    })
                } else {
                    serde_json::to_value(ctx)
                        .map_err(|e| NotifyError::Template(e.to_string()))?
                };
                let body = serde_json::to_string_pretty(&value)
                    .map_err(|e| NotifyError::Template(e.to_string()))?;
                Ok((body, BodyKind::Json))
            }
        }
    }

    /// Build the report notification for a schedule's recipients.
    pub fn report_notification(
        &self,
        format: ReportFormat,
        recipients: &[String],
        ctx: &ReportContext<'_>,
    ) -> Result<Notification, NotifyError> {
        let subject = self.render("report.subject", ctx)?;
        let (body, body_kind) = self.render_report(format, ctx)?;
        Ok(Notification {
            topic: Topic::Report,
            subject,
            body,
            body_kind,
            recipients: recipients.to_vec(),
            labels: labels(ctx),
        })
    }

    /// Build the alert notice. Returns `None` when the context has no alert.
    pub fn alert_notification(
        &self,
        ctx: &ReportContext<'_>,
    ) -> Result<Option<Notification>, NotifyError> {
        let Some(alert) = ctx.alert else {
            return Ok(None);
        };
        let mut labels = labels(ctx);
        labels.insert("alert_id".to_string(), alert.id.to_string());
        Ok(Some(Notification {
            topic: Topic::Alert,
            subject: self.render("alert.subject", ctx)?,
            body: self.render("alert.txt", ctx)?,
            body_kind: BodyKind::Text,
            recipients: Vec::new(),
            labels,
        }))
    }
}

fn labels(ctx: &ReportContext<'_>) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::from([
        ("target_id".to_string(), ctx.target.id.to_string()),
        ("target_url".to_string(), ctx.target.url.clone()),
        ("schedule_id".to_string(), ctx.run.schedule_id.to_string()),
        ("run_id".to_string(), ctx.run.id.to_string()),
        ("window_key".to_string(), ctx.run.window_key.clone()),
        ("status".to_string(), ctx.run.status.to_string()),
    ]);
    if let Some(score) = ctx.run.score {
        labels.insert("score".to_string(), format!("{score:.1}"));
    }
    if let Some(alert) = ctx.alert {
        labels.insert("alert_type".to_string(), alert.alert_type.to_string());
        labels.insert("severity".to_string(), alert.severity.to_string());
    }
    labels
}

/// Round a float to N decimal places.
fn round_filter(value: f64, decimals: Option<u32>) -> String {
    let n = decimals.unwrap_or(0);
    format!("{:.prec$}", value, prec = n as usize)
}
