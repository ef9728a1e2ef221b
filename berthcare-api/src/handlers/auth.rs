use axum::Json;
use axum::extract::{Extension, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use berthcare_core::error::FieldError;
use berthcare_core::{ApiError, Principal, Role};

use crate::envelope::{ApiResult, ok};
use crate::middleware::AccessToken;
use crate::services::identity::RegisterInput;
use crate::state::AppState;
use crate::validation;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterBody {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub zone_id: Option<Uuid>,
    pub device_id: String,
}

/// `POST /v1/auth/register` (admin only).
pub async fn register(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<RegisterBody>,
) -> ApiResult<impl IntoResponse> {
    principal.require_role(&[Role::Admin])?;

    let mut fields = Vec::new();
    fields.extend(validation::check_email(&body.email));
    fields.extend(validation::require_non_empty(&body.first_name, "firstName"));
    fields.extend(validation::require_non_empty(&body.last_name, "lastName"));
    fields.extend(validation::require_non_empty(&body.device_id, "deviceId"));

    let role = match Role::parse(&body.role) {
        Some(role) => role,
        None => {
            fields.push(FieldError::new("role", "must be caregiver, coordinator or admin"));
            Role::Caregiver
        }
    };
    if role.requires_zone() && body.zone_id.is_none() {
        fields.push(FieldError::new("zoneId", "required for caregivers and coordinators"));
    }
    validation::reject_if_any(fields, "invalid registration")?;

    let password_errors = validation::check_password(&body.password);
    if !password_errors.is_empty() {
        return Err(ApiError::WeakPassword { fields: password_errors }.into());
    }

    let tokens = state
        .identity
        .register(RegisterInput {
            email: body.email,
            password: body.password,
            first_name: body.first_name,
            last_name: body.last_name,
            role,
            phone: body.phone,
            zone_id: body.zone_id,
            device_id: body.device_id,
        })
        .await?;

    Ok((StatusCode::CREATED, ok(tokens)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginBody {
    pub email: String,
    pub password: String,
    pub device_id: String,
}

/// `POST /v1/auth/login`.
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginBody>,
) -> ApiResult<impl IntoResponse> {
    let mut fields = Vec::new();
    fields.extend(validation::require_non_empty(&body.email, "email"));
    fields.extend(validation::require_non_empty(&body.password, "password"));
    fields.extend(validation::require_non_empty(&body.device_id, "deviceId"));
    validation::reject_if_any(fields, "invalid login request")?;

    let tokens = state.identity.login(&body.email, &body.password, &body.device_id).await?;
    Ok(ok(tokens))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshBody {
    pub refresh_token: String,
}

/// `POST /v1/auth/refresh`. The refresh token is not rotated.
pub async fn refresh(
    State(state): State<AppState>,
    Json(body): Json<RefreshBody>,
) -> ApiResult<impl IntoResponse> {
    if body.refresh_token.trim().is_empty() {
        return Err(ApiError::InvalidToken.into());
    }
    let access_token = state.identity.refresh(&body.refresh_token).await?;
    Ok(ok(json!({ "accessToken": access_token })))
}

/// `POST /v1/auth/logout`. Idempotent; a second call with the same (now
/// blacklisted) token is rejected by the auth middleware, and a repeat
/// within the same token's life simply re-revokes.
pub async fn logout(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Extension(token): Extension<AccessToken>,
) -> ApiResult<impl IntoResponse> {
    state.identity.logout(&principal, &token).await?;
    Ok(ok(json!({ "message": "logged out" })))
}
