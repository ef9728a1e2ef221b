//! Twilio webhooks.
//!
//! Every handler authenticates the request by validating
//! `X-Twilio-Signature` against the canonical public URL and the posted
//! form parameters before touching any state; failures are 403 with no
//! side effects. Handlers finish fast (single-row updates); anything
//! heavier runs on the worker queue.

use axum::extract::{OriginalUri, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::Form;

use berthcare_core::ApiError;
use berthcare_external::twilio::validate_webhook_signature;

use crate::envelope::ApiErrorResponse;
use crate::services::notifications::NotificationService;
use crate::state::AppState;

type Params = Vec<(String, String)>;

fn param<'a>(params: &'a Params, name: &str) -> Option<&'a str> {
    params.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
}

fn twiml(body: &str) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/xml")],
        format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>{body}"),
    )
        .into_response()
}

/// Authenticate a webhook request. The canonical URL is the public base
/// plus the path Twilio posted to (Twilio signs the URL it was given).
fn authenticate(
    state: &AppState,
    uri: &OriginalUri,
    headers: &HeaderMap,
    params: &Params,
) -> Result<NotificationService, ApiError> {
    let service = state
        .notifications
        .as_ref()
        .cloned()
        .ok_or_else(|| ApiError::unavailable("notifications are not configured"))?;

    let signature = headers
        .get("x-twilio-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::forbidden("missing webhook signature"))?;

    let path_and_query =
        uri.0.path_and_query().map(|pq| pq.as_str()).unwrap_or_else(|| uri.0.path());
    let url = format!("{}{}", state.config.server.public_base_url, path_and_query);

    if !validate_webhook_signature(service.twilio_auth_token(), &url, params, signature) {
        tracing::warn!(url, "rejected webhook with invalid signature");
        return Err(ApiError::forbidden("invalid webhook signature"));
    }
    Ok(service)
}

/// `POST /v1/webhooks/twilio/voice`: inbound call greeting.
pub async fn voice(
    State(state): State<AppState>,
    uri: OriginalUri,
    headers: HeaderMap,
    Form(params): Form<Params>,
) -> Response {
    if let Err(e) = authenticate(&state, &uri, &headers, &params) {
        return ApiErrorResponse(e).into_response();
    }
    twiml(
        "<Response><Say voice=\"alice\">This is BerthCare. \
         Please contact your care coordinator through the app.</Say></Response>",
    )
}

/// `POST /v1/webhooks/twilio/voice/status`: call status callback.
pub async fn voice_status(
    State(state): State<AppState>,
    uri: OriginalUri,
    headers: HeaderMap,
    Form(params): Form<Params>,
) -> Response {
    let service = match authenticate(&state, &uri, &headers, &params) {
        Ok(service) => service,
        Err(e) => return ApiErrorResponse(e).into_response(),
    };

    let (Some(sid), Some(status)) = (param(&params, "CallSid"), param(&params, "CallStatus"))
    else {
        return ApiErrorResponse(ApiError::validation(
            "missing CallSid or CallStatus",
            vec![],
        ))
        .into_response();
    };

    if let Err(e) = service.record_call_status(sid, status).await {
        return ApiErrorResponse(e).into_response();
    }
    StatusCode::NO_CONTENT.into_response()
}

/// `POST /v1/webhooks/twilio/sms`: inbound SMS acknowledgement.
pub async fn sms(
    State(state): State<AppState>,
    uri: OriginalUri,
    headers: HeaderMap,
    Form(params): Form<Params>,
) -> Response {
    if let Err(e) = authenticate(&state, &uri, &headers, &params) {
        return ApiErrorResponse(e).into_response();
    }
    twiml("<Response></Response>")
}

/// `POST /v1/webhooks/twilio/sms/status`: message status callback.
pub async fn sms_status(
    State(state): State<AppState>,
    uri: OriginalUri,
    headers: HeaderMap,
    Form(params): Form<Params>,
) -> Response {
    let service = match authenticate(&state, &uri, &headers, &params) {
        Ok(service) => service,
        Err(e) => return ApiErrorResponse(e).into_response(),
    };

    let (Some(sid), Some(status)) =
        (param(&params, "MessageSid"), param(&params, "MessageStatus"))
    else {
        return ApiErrorResponse(ApiError::validation(
            "missing MessageSid or MessageStatus",
            vec![],
        ))
        .into_response();
    };

    if let Err(e) = service.record_sms_status(sid, status).await {
        return ApiErrorResponse(e).into_response();
    }
    StatusCode::NO_CONTENT.into_response()
}
