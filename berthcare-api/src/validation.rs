//! Request validation helpers.
//!
//! Typed request structs are validated by explicit functions returning
//! field-error lists; there is no per-handler validation configuration.
//! Handlers call these before touching any service.

use std::sync::LazyLock;

use regex::Regex;

use berthcare_core::error::FieldError;
use berthcare_core::{ApiError, Result};

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex"));

pub const DEFAULT_PAGE_LIMIT: i64 = 20;
pub const MAX_PAGE_LIMIT: i64 = 100;

pub fn check_email(email: &str) -> Option<FieldError> {
    if EMAIL_RE.is_match(email) {
        None
    } else {
        Some(FieldError::new("email", "must be a valid email address"))
    }
}

/// Password policy: at least 8 characters with one uppercase letter and
/// one digit.
pub fn check_password(password: &str) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if password.len() < 8 {
        errors.push(FieldError::new("password", "must be at least 8 characters"));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        errors.push(FieldError::new("password", "must contain an uppercase letter"));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        errors.push(FieldError::new("password", "must contain a digit"));
    }
    errors
}

pub fn require_non_empty(value: &str, field: &str) -> Option<FieldError> {
    if value.trim().is_empty() {
        Some(FieldError::new(field, "must not be empty"))
    } else {
        None
    }
}

/// Normalize pagination: page defaults to 1 (must be >= 1), limit defaults
/// to 20 and is clamped into `[1, 100]` by rejection, not silently.
pub fn check_pagination(page: Option<i64>, limit: Option<i64>) -> Result<(i64, i64)> {
    let page = page.unwrap_or(1);
    let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT);
    let mut fields = Vec::new();
    if page < 1 {
        fields.push(FieldError::new("page", "must be at least 1"));
    }
    if !(1..=MAX_PAGE_LIMIT).contains(&limit) {
        fields.push(FieldError::new("limit", format!("must be between 1 and {MAX_PAGE_LIMIT}")));
    }
    if fields.is_empty() {
        Ok((page, limit))
    } else {
        Err(ApiError::validation("invalid pagination", fields))
    }
}

/// JSON value that must be an array (activities, medications, allergies).
pub fn check_array(value: &serde_json::Value, field: &str) -> Option<FieldError> {
    if value.is_array() {
        None
    } else {
        Some(FieldError::new(field, "must be an array"))
    }
}

/// JSON value that must be an object (vital signs, emergency contact).
pub fn check_object(value: &serde_json::Value, field: &str) -> Option<FieldError> {
    if value.is_object() {
        None
    } else {
        Some(FieldError::new(field, "must be an object"))
    }
}

/// Collect optional field errors into a validation failure.
pub fn reject_if_any(fields: Vec<FieldError>, message: &str) -> Result<()> {
    if fields.is_empty() {
        Ok(())
    } else {
        Err(ApiError::validation(message, fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_format() {
        assert!(check_email("caregiver@example.com").is_none());
        assert!(check_email("CAREGIVER@EXAMPLE.COM").is_none());
        assert!(check_email("not-an-email").is_some());
        assert!(check_email("a@b").is_some());
        assert!(check_email("a b@c.d").is_some());
        assert!(check_email("").is_some());
    }

    #[test]
    fn test_password_policy() {
        assert!(check_password("SecurePass123").is_empty());
        assert_eq!(check_password("short1A").len(), 1);
        assert_eq!(check_password("alllowercase1").len(), 1);
        assert_eq!(check_password("NoDigitsHere").len(), 1);
        assert_eq!(check_password("weak").len(), 3);
    }

    #[test]
    fn test_pagination_bounds() {
        assert_eq!(check_pagination(None, None).unwrap(), (1, 20));
        assert_eq!(check_pagination(Some(3), Some(100)).unwrap(), (3, 100));
        assert!(check_pagination(Some(0), None).is_err());
        assert!(check_pagination(None, Some(0)).is_err());
        assert!(check_pagination(None, Some(101)).is_err());
    }

    #[test]
    fn test_json_shape_checks() {
        assert!(check_array(&serde_json::json!([]), "activities").is_none());
        assert!(check_array(&serde_json::json!({}), "activities").is_some());
        assert!(check_object(&serde_json::json!({}), "vitalSigns").is_none());
        assert!(check_object(&serde_json::json!(3), "vitalSigns").is_some());
    }
}
