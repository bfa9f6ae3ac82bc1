//! Field-level checks for schedule input.
//!
//! Errors block the save; warnings are returned alongside the stored
//! schedule. Everything is collected in one pass so a client sees every
//! problem at once.

mod delivery_checks;
mod fuzzy;
mod rule_checks;

use pulse_core::{DeliveryConfig, RecurrenceRule};
use serde::{Deserialize, Serialize};

/// One problem with one input field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldIssue {
    /// Dotted path into the request body, e.g. `rule.time_of_day`.
    pub field: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl FieldIssue {
    fn new(field: impl Into<String>, message: impl Into<String>, hint: Option<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            hint,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<FieldIssue>,
    #[serde(default)]
    pub warnings: Vec<FieldIssue>,
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn reject(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.valid = false;
        self.errors.push(FieldIssue::new(field, message, None));
    }

    pub fn reject_with_hint(
        &mut self,
        field: impl Into<String>,
        message: impl Into<String>,
        hint: impl Into<String>,
    ) {
        self.valid = false;
        self.errors.push(FieldIssue::new(field, message, Some(hint.into())));
    }

    pub fn note(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(FieldIssue::new(field, message, None));
    }

    /// One-line description for the `error` field of an API response.
    pub fn summary(&self) -> String {
        match self.errors.as_slice() {
            [] => "validation failed".to_string(),
            [only] => format!("{}: {}", only.field, only.message),
            [first, rest @ ..] => format!("{}: {} (and {} more)", first.field, first.message, rest.len()),
        }
    }
}

/// Run the rule and delivery checks into an existing result, so callers can
/// record their own parse failures (frequency, format) on the same report.
pub fn validate_schedule_into(
    rule: &RecurrenceRule,
    delivery: &DeliveryConfig,
    result: &mut ValidationResult,
) {
    rule_checks::validate_rule(rule, result);
    delivery_checks::validate_delivery(delivery, result);
}
