//! Delivery checks: recipient count and address syntax.

use std::collections::HashSet;

use pulse_core::{DeliveryConfig, MAX_RECIPIENTS};

use super::ValidationResult;

pub(super) fn validate_delivery(delivery: &DeliveryConfig, result: &mut ValidationResult) {
    if delivery.recipients.len() > MAX_RECIPIENTS {
        result.reject(
            "delivery.recipients",
            format!(
                "At most {MAX_RECIPIENTS} recipients are allowed, got {}",
                delivery.recipients.len()
            ),
        );
    }

    let mut seen = HashSet::new();
    for (i, address) in delivery.recipients.iter().enumerate() {
        if !pulse_notify::is_valid_address(address) {
            result.reject(
                format!("delivery.recipients[{i}]"),
                format!("'{address}' is not a valid email address"),
            );
        } else if !seen.insert(address.to_ascii_lowercase()) {
            result.note(
                format!("delivery.recipients[{i}]"),
                format!("'{address}' is listed more than once"),
            );
        }
    }
}
