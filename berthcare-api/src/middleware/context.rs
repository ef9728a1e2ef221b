//! Request-id scoping and the structured completion log.
//!
//! `SetRequestIdLayer` (tower-http) has already stamped `x-request-id`
//! by the time this middleware runs; it scopes that id into a task-local
//! so the error envelope can embed it, and emits exactly one log line per
//! request on the way out.

use std::time::Instant;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;

use berthcare_core::Principal;

use crate::envelope::REQUEST_ID;

pub async fn request_context(req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();

    let response = REQUEST_ID.scope(request_id.clone(), next.run(req)).await;

    // The auth middleware mirrors the principal into response extensions
    // so it is still visible here after the request has been consumed.
    let user_id = response
        .extensions()
        .get::<Principal>()
        .map(|p| p.user_id.to_string())
        .unwrap_or_else(|| "-".to_string());

    tracing::info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        latency_ms = start.elapsed().as_millis() as u64,
        user_id = %user_id,
        "request completed"
    );

    response
}
