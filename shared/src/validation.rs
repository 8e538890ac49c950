//! Validation utilities for the POS inventory core

use crate::error::{DomainError, DomainResult};

/// Longest free-text note or reason accepted on a ledger or order record
pub const MAX_NOTE_LENGTH: usize = 1000;

// ============================================================================
// Free Text
// ============================================================================

/// Require a non-blank reason (rejection, cancellation, acceptance notes).
/// Returns the trimmed text.
pub fn require_reason(field: &str, value: Option<&str>) -> DomainResult<String> {
    let trimmed = value.map(str::trim).unwrap_or_default();
    if trimmed.is_empty() {
        return Err(DomainError::validation(field, format!("{} is required", field)));
    }
    validate_note_length(field, trimmed)?;
    Ok(trimmed.to_string())
}

/// Normalize an optional note: blank becomes `None`, long text is rejected
pub fn optional_note(field: &str, value: Option<&str>) -> DomainResult<Option<String>> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => {
            validate_note_length(field, text)?;
            Ok(Some(text.to_string()))
        }
    }
}

fn validate_note_length(field: &str, text: &str) -> DomainResult<()> {
    if text.chars().count() > MAX_NOTE_LENGTH {
        return Err(DomainError::validation(
            field,
            format!("{} must be at most {} characters", field, MAX_NOTE_LENGTH),
        ));
    }
    Ok(())
}

// ============================================================================
// Quantities
// ============================================================================

/// Validate a manual stock change: non-zero
pub fn validate_quantity_change(delta: i32) -> DomainResult<()> {
    if delta == 0 {
        return Err(DomainError::validation(
            "quantity_change",
            "Quantity change cannot be zero",
        ));
    }
    Ok(())
}

/// Validate a TTL for confirmation links, in days
pub fn validate_ttl_days(ttl_days: i64) -> DomainResult<()> {
    if !(1..=30).contains(&ttl_days) {
        return Err(DomainError::validation(
            "ttl_days",
            "Confirmation links must be valid for 1 to 30 days",
        ));
    }
    Ok(())
}
