//! Typed errors for every service in the workspace.
//!
//! Services return [`ApiError`] and propagate with `?`; the HTTP layer maps
//! each variant onto the closed wire code set and its stable status. Failure
//! causes that must not be distinguishable to callers (token validity,
//! credential checks) collapse into a single variant here while the original
//! cause is logged by the site that raised it.

use serde_json::Value;
use thiserror::Error;

/// The closed set of wire error codes.
///
/// Each code has exactly one HTTP status. New codes are additions to this
/// enum, never ad-hoc strings in handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ValidationError,
    InvalidEmail,
    WeakPassword,
    InvalidTransition,
    InvalidCredentials,
    MissingToken,
    InvalidTokenFormat,
    InvalidToken,
    TokenExpired,
    TokenRevoked,
    Forbidden,
    Unauthorized,
    NotFound,
    EmailExists,
    DuplicateClient,
    RateLimitExceeded,
    GeocodingError,
    OutsideServiceArea,
    InternalError,
    ServiceUnavailable,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::InvalidEmail => "INVALID_EMAIL",
            ErrorCode::WeakPassword => "WEAK_PASSWORD",
            ErrorCode::InvalidTransition => "INVALID_TRANSITION",
            ErrorCode::InvalidCredentials => "INVALID_CREDENTIALS",
            ErrorCode::MissingToken => "MISSING_TOKEN",
            ErrorCode::InvalidTokenFormat => "INVALID_TOKEN_FORMAT",
            ErrorCode::InvalidToken => "INVALID_TOKEN",
            ErrorCode::TokenExpired => "TOKEN_EXPIRED",
            ErrorCode::TokenRevoked => "TOKEN_REVOKED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::EmailExists => "EMAIL_EXISTS",
            ErrorCode::DuplicateClient => "DUPLICATE_CLIENT",
            ErrorCode::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            ErrorCode::GeocodingError => "GEOCODING_ERROR",
            ErrorCode::OutsideServiceArea => "OUTSIDE_SERVICE_AREA",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::ServiceUnavailable => "SERVICE_UNAVAILABLE",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            ErrorCode::ValidationError
            | ErrorCode::InvalidEmail
            | ErrorCode::WeakPassword
            | ErrorCode::InvalidTransition
            | ErrorCode::GeocodingError
            | ErrorCode::OutsideServiceArea => 400,
            ErrorCode::InvalidCredentials
            | ErrorCode::MissingToken
            | ErrorCode::InvalidTokenFormat
            | ErrorCode::InvalidToken
            | ErrorCode::TokenExpired
            | ErrorCode::TokenRevoked => 401,
            ErrorCode::Forbidden | ErrorCode::Unauthorized => 403,
            ErrorCode::NotFound => 404,
            ErrorCode::EmailExists | ErrorCode::DuplicateClient => 409,
            ErrorCode::RateLimitExceeded => 429,
            ErrorCode::InternalError => 500,
            ErrorCode::ServiceUnavailable => 503,
        }
    }
}

/// A single field-level validation failure.
#[derive(Debug, Clone, serde::Serialize, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self { field: field.into(), message: message.into() }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    Validation { message: String, fields: Vec<FieldError> },

    #[error("invalid email address")]
    InvalidEmail,

    #[error("password does not meet strength requirements")]
    WeakPassword { fields: Vec<FieldError> },

    #[error("illegal visit status transition from '{from}' to '{to}'")]
    InvalidTransition { from: String, to: String },

    /// Unknown email, wrong password and disabled accounts all collapse
    /// here so callers cannot enumerate accounts. The raising site logs
    /// the real reason.
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("missing authorization token")]
    MissingToken,

    #[error("authorization header is not a bearer token")]
    InvalidTokenFormat,

    /// Generic token rejection: bad signature, unknown key, missing or
    /// revoked server-side record. Collapsed to prevent token enumeration.
    #[error("invalid token")]
    InvalidToken,

    #[error("token has expired")]
    TokenExpired,

    #[error("token has been revoked")]
    TokenRevoked,

    #[error("{message}")]
    Forbidden { message: String },

    #[error("{message}")]
    Unauthorized { message: String },

    #[error("{resource} not found")]
    NotFound { resource: &'static str },

    #[error("an account with this email already exists")]
    EmailExists,

    #[error("a client with this name and date of birth already exists")]
    DuplicateClient,

    #[error("rate limit exceeded")]
    RateLimitExceeded { limit: u32, retry_after_secs: i64 },

    #[error("geocoding failed: {message}")]
    Geocoding { message: String },

    #[error("address resolves outside the service area")]
    OutsideServiceArea,

    #[error("internal error: {message}")]
    Internal { message: String },

    #[error("service unavailable: {message}")]
    Unavailable { message: String },
}

impl ApiError {
    pub fn validation(message: impl Into<String>, fields: Vec<FieldError>) -> Self {
        ApiError::Validation { message: message.into(), fields }
    }

    pub fn invalid_transition(from: impl Into<String>, to: impl Into<String>) -> Self {
        ApiError::InvalidTransition { from: from.into(), to: to.into() }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden { message: message.into() }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized { message: message.into() }
    }

    pub fn not_found(resource: &'static str) -> Self {
        ApiError::NotFound { resource }
    }

    pub fn geocoding(message: impl Into<String>) -> Self {
        ApiError::Geocoding { message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::Internal { message: message.into() }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        ApiError::Unavailable { message: message.into() }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ApiError::Validation { .. } => ErrorCode::ValidationError,
            ApiError::InvalidEmail => ErrorCode::InvalidEmail,
            ApiError::WeakPassword { .. } => ErrorCode::WeakPassword,
            ApiError::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            ApiError::InvalidCredentials => ErrorCode::InvalidCredentials,
            ApiError::MissingToken => ErrorCode::MissingToken,
            ApiError::InvalidTokenFormat => ErrorCode::InvalidTokenFormat,
            ApiError::InvalidToken => ErrorCode::InvalidToken,
            ApiError::TokenExpired => ErrorCode::TokenExpired,
            ApiError::TokenRevoked => ErrorCode::TokenRevoked,
            ApiError::Forbidden { .. } => ErrorCode::Forbidden,
            ApiError::Unauthorized { .. } => ErrorCode::Unauthorized,
            ApiError::NotFound { .. } => ErrorCode::NotFound,
            ApiError::EmailExists => ErrorCode::EmailExists,
            ApiError::DuplicateClient => ErrorCode::DuplicateClient,
            ApiError::RateLimitExceeded { .. } => ErrorCode::RateLimitExceeded,
            ApiError::Geocoding { .. } => ErrorCode::GeocodingError,
            ApiError::OutsideServiceArea => ErrorCode::OutsideServiceArea,
            ApiError::Internal { .. } => ErrorCode::InternalError,
            ApiError::Unavailable { .. } => ErrorCode::ServiceUnavailable,
        }
    }

    pub fn http_status(&self) -> u16 {
        self.code().http_status()
    }

    /// Message safe to place in the response envelope. Internal and
    /// availability failures are replaced with a fixed phrase so details
    /// never leak; everything else displays as-is.
    pub fn public_message(&self) -> String {
        match self {
            ApiError::Internal { .. } => "an unexpected error occurred".to_string(),
            ApiError::Unavailable { .. } => "service temporarily unavailable".to_string(),
            other => other.to_string(),
        }
    }

    /// Structured `details` payload for the envelope, when the variant
    /// carries one.
    pub fn details(&self) -> Option<Value> {
        match self {
            ApiError::Validation { fields, .. } | ApiError::WeakPassword { fields } => {
                serde_json::to_value(fields).ok()
            }
            ApiError::RateLimitExceeded { retry_after_secs, .. } => {
                Some(serde_json::json!({ "retryAfter": retry_after_secs }))
            }
            ApiError::InvalidTransition { from, to } => {
                Some(serde_json::json!({ "from": from, "to": to }))
            }
            _ => None,
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::not_found("resource"),
            sqlx::Error::PoolTimedOut => {
                ApiError::unavailable("database connection pool exhausted")
            }
            other => ApiError::internal(format!("database error: {other}")),
        }
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_code_has_a_stable_status() {
        let cases = [
            (ErrorCode::ValidationError, 400),
            (ErrorCode::InvalidTransition, 400),
            (ErrorCode::InvalidCredentials, 401),
            (ErrorCode::TokenRevoked, 401),
            (ErrorCode::Forbidden, 403),
            (ErrorCode::Unauthorized, 403),
            (ErrorCode::NotFound, 404),
            (ErrorCode::EmailExists, 409),
            (ErrorCode::DuplicateClient, 409),
            (ErrorCode::RateLimitExceeded, 429),
            (ErrorCode::InternalError, 500),
            (ErrorCode::ServiceUnavailable, 503),
        ];
        for (code, status) in cases {
            assert_eq!(code.http_status(), status, "{}", code.as_str());
        }
    }

    #[test]
    fn test_internal_message_is_not_leaked() {
        let err = ApiError::internal("connection refused at 10.0.0.3:5432");
        assert_eq!(err.public_message(), "an unexpected error occurred");
        assert!(err.to_string().contains("10.0.0.3"));
    }

    #[test]
    fn test_validation_details_carry_fields() {
        let err = ApiError::validation(
            "invalid request body",
            vec![FieldError::new("email", "must be a valid email address")],
        );
        let details = err.details().unwrap();
        assert_eq!(details[0]["field"], "email");
    }

    #[test]
    fn test_rate_limit_details_carry_retry_after() {
        let err = ApiError::RateLimitExceeded { limit: 10, retry_after_secs: 42 };
        assert_eq!(err.details().unwrap()["retryAfter"], 42);
        assert_eq!(err.http_status(), 429);
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err: ApiError = sqlx::Error::RowNotFound.into();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }
}
