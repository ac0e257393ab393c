//! Internal helpers for validation and conversion.
//!
//! These utilities are **not** part of the public API. They centralize
//! validation and mapping logic so every workflow enforces the same rules.

use uuid::Uuid;

use crate::{EngineError, MoneyCents, ResultEngine};

/// Minimum length of a budget request justification or advance description.
pub(crate) const MIN_JUSTIFICATION_LEN: usize = 5;
/// Minimum length of any rejection reason or deletion reason.
pub(crate) const MIN_REASON_LEN: usize = 10;
/// Minimum length of a bank transfer number.
pub(crate) const MIN_TRANSFER_NUMBER_LEN: usize = 3;

/// Parse a UUID from storage and return a labeled error on failure.
pub(crate) fn parse_uuid(value: &str, label: &str) -> ResultEngine<Uuid> {
    Uuid::parse_str(value).map_err(|_| EngineError::Internal(format!("invalid {label} id")))
}

/// Parse an optional UUID column.
pub(crate) fn parse_optional_uuid(value: Option<&str>, label: &str) -> ResultEngine<Option<Uuid>> {
    value.map(|v| parse_uuid(v, label)).transpose()
}

/// Trim `value` and require at least `min` characters.
pub(crate) fn require_text(value: &str, min: usize, label: &str) -> ResultEngine<String> {
    let trimmed = value.trim();
    if trimmed.chars().count() < min {
        return Err(EngineError::BadRequest(format!(
            "{label} must be at least {min} characters"
        )));
    }
    Ok(trimmed.to_string())
}

/// Same as [`require_text`] for optional inputs where absence is an error too.
pub(crate) fn require_optional_text(
    value: Option<&str>,
    min: usize,
    label: &str,
) -> ResultEngine<String> {
    require_text(value.unwrap_or_default(), min, label)
}

pub(crate) fn normalize_optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

pub(crate) fn require_positive(amount: MoneyCents, label: &str) -> ResultEngine<()> {
    if !amount.is_positive() {
        return Err(EngineError::BadRequest(format!("{label} must be > 0")));
    }
    Ok(())
}

/// Status-guarded writes must touch exactly one row; anything else means the
/// row moved on (or vanished) between our read and our write.
pub(crate) fn expect_single_row(rows_affected: u64, what: &str) -> ResultEngine<()> {
    if rows_affected != 1 {
        return Err(EngineError::already_processed(what));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_text_trims_and_counts_chars() {
        assert_eq!(require_text("  hello ", 5, "x").unwrap(), "hello");
        assert!(require_text(" hi  ", 5, "x").is_err());
        // multi-byte characters count once
        assert!(require_text("zażół", 5, "x").is_ok());
    }

    #[test]
    fn guarded_write_requires_exactly_one_row() {
        assert!(expect_single_row(1, "request").is_ok());
        assert!(matches!(
            expect_single_row(0, "request"),
            Err(EngineError::Conflict(_))
        ));
    }
}
