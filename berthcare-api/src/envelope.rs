//! Wire envelopes.
//!
//! Success bodies are `{"data": ...}`. Errors are
//! `{"error": {code, message, details?, timestamp, requestId}}` with the
//! code set fixed in `berthcare_core::ErrorCode`. This module is the only
//! internal-to-wire translation point; the request id is carried in a
//! task-local scoped around each request by the context middleware.

use axum::Json;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use http::StatusCode;
use serde::Serialize;

use berthcare_core::ApiError;

tokio::task_local! {
    pub(crate) static REQUEST_ID: String;
}

/// Request id for the request currently being served, or a fixed marker
/// outside request scope (startup, background workers).
pub fn current_request_id() -> String {
    REQUEST_ID.try_with(|id| id.clone()).unwrap_or_else(|_| "unscoped".to_string())
}

#[derive(Debug, Serialize)]
pub struct Data<T> {
    pub data: T,
}

/// Success envelope.
pub fn ok<T: Serialize>(value: T) -> Json<Data<T>> {
    Json(Data { data: value })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorInfo {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
    timestamp: String,
    request_id: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorInfo,
}

impl IntoResponse for ApiErrorResponse {
    fn into_response(self) -> Response {
        let err = self.0;
        let status =
            StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let request_id = current_request_id();

        // Full internal detail lands in the log; the body carries only the
        // public message.
        if status.is_server_error() {
            tracing::error!(request_id, code = err.code().as_str(), error = %err, "request failed");
        } else {
            tracing::debug!(request_id, code = err.code().as_str(), error = %err, "request rejected");
        }

        let body = ErrorBody {
            error: ErrorInfo {
                code: err.code().as_str(),
                message: err.public_message(),
                details: err.details(),
                timestamp: Utc::now().to_rfc3339(),
                request_id,
            },
        };

        let mut response = (status, Json(body)).into_response();
        if let ApiError::RateLimitExceeded { retry_after_secs, .. } = &err {
            if let Ok(value) = retry_after_secs.to_string().parse() {
                response.headers_mut().insert(http::header::RETRY_AFTER, value);
            }
        }
        response
    }
}

/// Newtype so `?` in handlers converts `ApiError` into a response without
/// a blanket foreign impl.
pub struct ApiErrorResponse(pub ApiError);

impl From<ApiError> for ApiErrorResponse {
    fn from(err: ApiError) -> Self {
        Self(err)
    }
}

/// Handler return type: success envelope or wire error.
pub type ApiResult<T> = std::result::Result<T, ApiErrorResponse>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_falls_back_outside_request_scope() {
        assert_eq!(current_request_id(), "unscoped");
    }

    #[tokio::test]
    async fn test_request_id_comes_from_task_scope() {
        let id = REQUEST_ID
            .scope("req-123".to_string(), async { current_request_id() })
            .await;
        assert_eq!(id, "req-123");
    }

    #[test]
    fn test_success_envelope_shape() {
        let Json(body) = ok(serde_json::json!({ "value": 1 }));
        let encoded = serde_json::to_value(&body).unwrap();
        assert_eq!(encoded["data"]["value"], 1);
    }
}
