//! HTTP handlers. Thin by design: parse, validate, call the service,
//! wrap in the envelope. The auth middleware has already attached the
//! principal; handlers enforce role predicates.

pub mod alerts;
pub mod auth;
pub mod clients;
pub mod health;
pub mod uploads;
pub mod visits;
pub mod webhooks;

use axum::http::HeaderMap;

use crate::envelope::current_request_id;
use crate::services::RequestMeta;

/// Audit metadata for the current request.
pub(crate) fn request_meta(headers: &HeaderMap) -> RequestMeta {
    let source_ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string());
    RequestMeta { request_id: Some(current_request_id()), source_ip }
}
