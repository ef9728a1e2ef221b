//! Password hashing.
//!
//! bcrypt at cost factor 12. Hashing takes on the order of 200 ms on
//! reference hardware; that cost is the point, and callers must budget
//! for it rather than lower the factor. Verification delegates to
//! bcrypt's own comparison, which does not branch on match position.

use berthcare_core::{ApiError, Result};

pub const BCRYPT_COST: u32 = 12;

/// Hash a raw password for storage. Empty input is rejected before any
/// work is done.
pub fn hash_password(raw: &str) -> Result<String> {
    if raw.is_empty() {
        return Err(ApiError::validation("password must not be empty", vec![]));
    }
    bcrypt::hash(raw, BCRYPT_COST)
        .map_err(|e| ApiError::internal(format!("bcrypt hashing failed: {e}")))
}

/// Verify a candidate password against a stored hash. A malformed stored
/// hash is an internal fault, not a failed match.
pub fn verify_password(raw: &str, stored_hash: &str) -> Result<bool> {
    if raw.is_empty() || stored_hash.is_empty() {
        return Ok(false);
    }
    bcrypt::verify(raw, stored_hash)
        .map_err(|e| ApiError::internal(format!("bcrypt verification failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_then_verify_round_trip() {
        let hash = hash_password("SecurePass123").unwrap();
        assert!(hash.starts_with("$2"));
        assert!(verify_password("SecurePass123", &hash).unwrap());
        assert!(!verify_password("securepass123", &hash).unwrap());
    }

    #[test]
    fn test_empty_password_is_rejected() {
        let err = hash_password("").unwrap_err();
        assert_eq!(err.http_status(), 400);
    }

    #[test]
    fn test_verify_against_garbage_hash_errors() {
        assert!(verify_password("whatever", "not-a-bcrypt-hash").is_err());
    }

    #[test]
    fn test_hashes_are_salted() {
        let a = hash_password("SecurePass123").unwrap();
        let b = hash_password("SecurePass123").unwrap();
        assert_ne!(a, b);
    }
}
