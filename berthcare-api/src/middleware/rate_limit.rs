//! Per-endpoint fixed-window rate limiting.
//!
//! Each limited route carries one of these layers; the decision is
//! advertised on every response via `X-RateLimit-*` headers. A Redis
//! outage admits the request (the limiter is advisory).

use axum::extract::{Request, State};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use berthcare_cache::{RateDecision, RatePolicy};
use berthcare_core::ApiError;

use crate::envelope::ApiErrorResponse;
use crate::state::AppState;

/// Best-effort client address: proxy headers first, then the socket peer.
pub fn client_ip(req: &Request) -> String {
    if let Some(forwarded) = req.headers().get("x-forwarded-for") {
        if let Ok(value) = forwarded.to_str() {
            if let Some(first) = value.split(',').next() {
                let first = first.trim();
                if !first.is_empty() {
                    return first.to_string();
                }
            }
        }
    }
    if let Some(real_ip) = req.headers().get("x-real-ip").and_then(|v| v.to_str().ok()) {
        return real_ip.to_string();
    }
    req.extensions()
        .get::<axum::extract::ConnectInfo<std::net::SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn apply_headers(response: &mut Response, decision: &RateDecision) {
    let headers = response.headers_mut();
    let pairs = [
        ("x-ratelimit-limit", decision.limit.to_string()),
        ("x-ratelimit-remaining", decision.remaining.to_string()),
        ("x-ratelimit-reset", decision.reset_secs.to_string()),
    ];
    for (name, value) in pairs {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(name, value);
        }
    }
}

async fn enforce(state: AppState, policy: RatePolicy, req: Request, next: Next) -> Response {
    let ip = client_ip(&req);
    match state.rate_limiter.check(&policy, &ip).await {
        // Redis unavailable: admit and move on.
        None => next.run(req).await,
        Some(decision) if decision.allowed => {
            let mut response = next.run(req).await;
            apply_headers(&mut response, &decision);
            response
        }
        Some(decision) => {
            tracing::warn!(endpoint = policy.endpoint, ip = %ip, "rate limit exceeded");
            let mut response = ApiErrorResponse(ApiError::RateLimitExceeded {
                limit: decision.limit,
                retry_after_secs: decision.reset_secs,
            })
            .into_response();
            apply_headers(&mut response, &decision);
            response
        }
    }
}

pub async fn limit_login(State(state): State<AppState>, req: Request, next: Next) -> Response {
    enforce(state, RatePolicy::LOGIN, req, next).await
}

pub async fn limit_register(State(state): State<AppState>, req: Request, next: Next) -> Response {
    enforce(state, RatePolicy::REGISTER, req, next).await
}

pub async fn limit_auth(State(state): State<AppState>, req: Request, next: Next) -> Response {
    enforce(state, RatePolicy::AUTH, req, next).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request_with_headers(pairs: &[(&str, &str)]) -> Request {
        let mut builder = axum::http::Request::builder().uri("/v1/auth/login");
        for (name, value) in pairs {
            builder = builder.header(*name, *value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_forwarded_for_takes_first_hop() {
        let req =
            request_with_headers(&[("x-forwarded-for", "192.0.2.1, 10.0.0.2, 10.0.0.3")]);
        assert_eq!(client_ip(&req), "192.0.2.1");
    }

    #[test]
    fn test_real_ip_fallback() {
        let req = request_with_headers(&[("x-real-ip", "198.51.100.7")]);
        assert_eq!(client_ip(&req), "198.51.100.7");
    }

    #[test]
    fn test_unknown_without_peer_info() {
        let req = request_with_headers(&[]);
        assert_eq!(client_ip(&req), "unknown");
    }
}
