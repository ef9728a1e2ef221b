//! Bearer authentication.
//!
//! Order matters and is fixed: extract the bearer token, verify its
//! signature/issuer/audience/expiry, check the revocation blacklist, then
//! attach the principal to the request. Handlers read the principal from
//! extensions and never see the token itself — except logout, which needs
//! the raw token and its expiry to blacklist it, provided via
//! [`AccessToken`].

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use berthcare_core::{ApiError, Principal, Result};

use crate::envelope::ApiErrorResponse;
use crate::state::AppState;

/// The verified raw bearer token, kept for logout's blacklist write.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub raw: String,
    pub expires_at: i64,
}

fn extract_bearer(req: &Request) -> Result<String> {
    let header = req.headers().get(AUTHORIZATION).ok_or(ApiError::MissingToken)?;
    let value = header.to_str().map_err(|_| ApiError::InvalidTokenFormat)?;
    let token = value.strip_prefix("Bearer ").ok_or(ApiError::InvalidTokenFormat)?;
    if token.is_empty() {
        return Err(ApiError::InvalidTokenFormat);
    }
    Ok(token.to_string())
}

pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let token = match extract_bearer(&req) {
        Ok(token) => token,
        Err(e) => return ApiErrorResponse(e).into_response(),
    };

    let claims = match state.tokens.verify_access(&token) {
        Ok(claims) => claims,
        Err(e) => return ApiErrorResponse(e).into_response(),
    };

    if state.blacklist.is_revoked(&token).await {
        return ApiErrorResponse(ApiError::TokenRevoked).into_response();
    }

    let principal = Principal {
        user_id: claims.user_id,
        role: claims.role,
        zone_id: claims.zone_id,
        email: claims.email,
        device_id: claims.device_id,
    };

    req.extensions_mut().insert(principal.clone());
    req.extensions_mut().insert(AccessToken { raw: token, expires_at: claims.exp });

    let mut response = next.run(req).await;
    response.extensions_mut().insert(principal);
    response
}
