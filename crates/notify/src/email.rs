//! SMTP email notifier via `lettre` with TLS support.
//!
//! Delivers each notification to the recipients it carries, so one notifier
//! serves every schedule.

use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use pulse_core::config::SmtpConfig;

use crate::traits::{BodyKind, Notification, Notifier, NotifyError};

/// Whether `address` is a bare email address (`user@example.com`).
pub fn is_valid_address(address: &str) -> bool {
    address.parse::<Address>().is_ok()
}

/// Sends notifications as emails via SMTP.
#[derive(Debug)]
pub struct EmailNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl EmailNotifier {
    /// Build an `EmailNotifier` from SMTP configuration.
    ///
    /// Port defaults to 587. Port 465 uses implicit TLS, other ports use
    /// STARTTLS unless `tls` is off. Credentials are attached when both
    /// username and password are configured.
    pub fn from_config(config: &SmtpConfig) -> Result<Self, NotifyError> {
        let host = config
            .host
            .as_deref()
            .ok_or_else(|| NotifyError::Config("SMTP_HOST is not set".to_string()))?;

        let from: Mailbox = config
            .from
            .parse()
            .map_err(|e: lettre::address::AddressError| NotifyError::Config(e.to_string()))?;

        let port = config.port.unwrap_or(587);

        let mut builder = if port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                .map_err(|e| NotifyError::Config(e.to_string()))?
                .port(port)
        } else if config.tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map_err(|e| NotifyError::Config(e.to_string()))?
                .port(port)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host).port(port)
        };

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    fn build_message(&self, notification: &Notification) -> Result<Option<Message>, NotifyError> {
        if notification.recipients.is_empty() {
            return Ok(None);
        }

        let mut message_builder = Message::builder().from(self.from.clone());
        for recipient in &notification.recipients {
            let mailbox: Mailbox = recipient
                .parse()
                .map_err(|e: lettre::address::AddressError| NotifyError::Config(e.to_string()))?;
            message_builder = message_builder.to(mailbox);
        }

        let content_type = match notification.body_kind {
            BodyKind::Html => ContentType::TEXT_HTML,
            BodyKind::Text => ContentType::TEXT_PLAIN,
            BodyKind::Json => ContentType::parse(BodyKind::Json.mime())
                .map_err(|e| NotifyError::Smtp(e.to_string()))?,
        };

        let email = message_builder
            .subject(&notification.subject)
            .header(content_type)
            .body(notification.body.clone())
            .map_err(|e| NotifyError::Smtp(e.to_string()))?;
        Ok(Some(email))
    }
}

#[async_trait::async_trait]
impl Notifier for EmailNotifier {
    /// Send the notification to its recipients. No recipients is a no-op.
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let Some(email) = self.build_message(notification)? else {
            tracing::debug!(channel = "email", "no recipients, skipping");
            return Ok(());
        };

        self.transport
            .send(email)
            .await
            .map_err(|e| NotifyError::Smtp(e.to_string()))?;

        tracing::info!(
            channel = "email",
            subject = %notification.subject,
            recipients = notification.recipients.len(),
            "notification delivered"
        );

        Ok(())
    }

    fn name(&self) -> &'static str {
        "email"
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::traits::Topic;

    fn smtp(port: Option<u16>, tls: bool, from: &str) -> SmtpConfig {
        SmtpConfig {
            host: Some("smtp.example.com".to_string()),
            port,
            tls,
            from: from.to_string(),
            username: None,
            password: None,
        }
    }

    fn notification(recipients: Vec<String>) -> Notification {
        Notification {
            topic: Topic::Report,
            subject: "Weekly report".to_string(),
            body: "<p>ok</p>".to_string(),
            body_kind: BodyKind::Html,
            recipients,
            labels: BTreeMap::new(),
        }
    }

    #[test]
    fn address_validation() {
        assert!(is_valid_address("alice@example.com"));
        assert!(!is_valid_address("not-an-email"));
        assert!(!is_valid_address("Alice <alice@example.com>"));
        assert!(!is_valid_address(""));
    }

    #[test]
    fn from_config_valid() {
        let notifier = EmailNotifier::from_config(&smtp(Some(587), true, "Pulse <reports@example.com>"));
        assert!(notifier.is_ok());
    }

    #[test]
    fn from_config_requires_host() {
        let mut config = smtp(None, true, "reports@example.com");
        config.host = None;
        let err = EmailNotifier::from_config(&config).unwrap_err().to_string();
        assert!(err.contains("SMTP_HOST"), "got: {err}");
    }

    #[test]
    fn from_config_invalid_from_address() {
        let err = EmailNotifier::from_config(&smtp(None, true, "bad-address"))
            .unwrap_err()
            .to_string();
        assert!(err.contains("invalid channel configuration"), "got: {err}");
    }

    #[test]
    fn from_config_implicit_tls_and_plain() {
        assert!(EmailNotifier::from_config(&smtp(Some(465), true, "reports@example.com")).is_ok());
        assert!(EmailNotifier::from_config(&smtp(Some(25), false, "reports@example.com")).is_ok());
    }

    #[test]
    fn message_skipped_without_recipients() {
        let notifier = EmailNotifier::from_config(&smtp(None, false, "reports@example.com")).unwrap();
        assert!(notifier.build_message(&notification(vec![])).unwrap().is_none());
    }

    #[test]
    fn message_rejects_bad_recipient() {
        let notifier = EmailNotifier::from_config(&smtp(None, false, "reports@example.com")).unwrap();
        assert!(notifier
            .build_message(&notification(vec!["nope".to_string()]))
            .is_err());
    }

    #[test]
    fn message_built_for_recipients() {
        let notifier = EmailNotifier::from_config(&smtp(None, false, "reports@example.com")).unwrap();
        let message = notifier
            .build_message(&notification(vec![
                "a@example.com".to_string(),
                "b@example.com".to_string(),
            ]))
            .unwrap()
            .unwrap();
        assert_eq!(message.envelope().to().len(), 2);
    }

    #[test]
    fn channel_is_named_email() {
        let notifier = EmailNotifier::from_config(&smtp(None, true, "reports@example.com")).unwrap();
        assert_eq!(notifier.name(), "email");
    }
}
