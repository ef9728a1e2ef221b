//! Router assembly.
//!
//! Layer order (outermost first): body limit, timeout, request-id
//! assignment, request-id propagation, request context/logging, then the
//! per-route auth and rate-limit layers. Everything business-facing lives
//! under `/v1`; `/health` sits at the root for load balancers.

use std::time::Duration;

use axum::Router;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;

use crate::handlers::{alerts, auth, clients, health, uploads, visits, webhooks};
use crate::middleware::{auth as auth_mw, rate_limit};
use crate::state::AppState;

/// Request bodies cap out at 10 MiB; large artifacts go to object
/// storage through pre-signed URLs, never through this API.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub fn app(state: AppState) -> Router {
    let login = Router::new()
        .route("/auth/login", post(auth::login))
        .route_layer(from_fn_with_state(state.clone(), rate_limit::limit_login));

    let refresh = Router::new()
        .route("/auth/refresh", post(auth::refresh))
        .route_layer(from_fn_with_state(state.clone(), rate_limit::limit_auth));

    // Registration is admin-authenticated *and* rate limited by IP.
    let register = Router::new()
        .route("/auth/register", post(auth::register))
        .route_layer(from_fn_with_state(state.clone(), rate_limit::limit_register))
        .route_layer(from_fn_with_state(state.clone(), auth_mw::require_auth));

    let logout = Router::new()
        .route("/auth/logout", post(auth::logout))
        .route_layer(from_fn_with_state(state.clone(), rate_limit::limit_auth))
        .route_layer(from_fn_with_state(state.clone(), auth_mw::require_auth));

    let protected = Router::new()
        .route("/clients", get(clients::list).post(clients::create))
        .route("/clients/{id}", get(clients::get).patch(clients::update))
        .route("/care-plans", post(clients::upsert_care_plan))
        .route("/visits", get(visits::list).post(visits::create))
        .route("/visits/{id}", get(visits::get).patch(visits::update))
        .route("/visits/{id}/photos/upload-url", post(uploads::photo_upload_url))
        .route("/visits/{id}/photos", post(uploads::confirm_photo))
        .route("/visits/{id}/signature/upload-url", post(uploads::signature_upload_url))
        .route("/visits/{id}/signature", post(uploads::confirm_signature))
        .route("/alerts", post(alerts::raise))
        .route("/alerts/{id}/resolve", post(alerts::resolve))
        .route_layer(from_fn_with_state(state.clone(), auth_mw::require_auth));

    // Authenticated by Twilio signature, not bearer tokens.
    let twilio_webhooks = Router::new()
        .route("/webhooks/twilio/voice", post(webhooks::voice))
        .route("/webhooks/twilio/voice/status", post(webhooks::voice_status))
        .route("/webhooks/twilio/sms", post(webhooks::sms))
        .route("/webhooks/twilio/sms/status", post(webhooks::sms_status));

    let v1 = Router::new()
        .merge(login)
        .merge(refresh)
        .merge(register)
        .merge(logout)
        .merge(protected)
        .merge(twilio_webhooks);

    Router::new()
        .nest("/v1", v1)
        .route("/health", get(health::health))
        .layer(from_fn(crate::middleware::request_context))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}
