//! Report and alert delivery.
//!
//! This crate provides:
//! - `Notifier` trait for pluggable delivery channels
//! - Email (SMTP) and webhook notifier implementations
//! - Minijinja rendering of run reports and alerts
//! - Dispatcher that routes notifications to channels by topic

pub mod dispatcher;
pub mod email;
pub mod templating;
pub mod traits;
pub mod webhook;

pub use dispatcher::{DeliveryReport, Dispatcher};
pub use email::{is_valid_address, EmailNotifier};
pub use templating::{ReportContext, ReportRenderer};
pub use traits::{BodyKind, Notification, Notifier, NotifyError, Topic};
pub use webhook::WebhookNotifier;
