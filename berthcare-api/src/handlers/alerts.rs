use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;
use uuid::Uuid;

use berthcare_core::error::FieldError;
use berthcare_core::{ApiError, Principal};

use crate::envelope::{ApiResult, ok};
use crate::services::notifications::{NotificationService, RaiseAlertInput};
use crate::state::AppState;
use crate::validation;

fn notifications(state: &AppState) -> Result<&NotificationService, ApiError> {
    state
        .notifications
        .as_ref()
        .ok_or_else(|| ApiError::unavailable("notifications are not configured"))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaiseAlertBody {
    pub client_id: Uuid,
    pub message: String,
    #[serde(default = "default_priority")]
    pub priority: String,
    pub coordinator_id: Uuid,
    #[serde(default)]
    pub backup_coordinator_id: Option<Uuid>,
}

fn default_priority() -> String {
    "normal".to_string()
}

/// `POST /v1/alerts`: raise a voice alert for a client. Dispatch happens
/// on the worker queue; this returns as soon as the alert is recorded.
pub async fn raise(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<RaiseAlertBody>,
) -> ApiResult<impl IntoResponse> {
    let service = notifications(&state)?;

    let mut fields = Vec::new();
    fields.extend(validation::require_non_empty(&body.message, "message"));
    if !matches!(body.priority.as_str(), "normal" | "urgent") {
        fields.push(FieldError::new("priority", "must be normal or urgent"));
    }
    validation::reject_if_any(fields, "invalid alert")?;

    let alert = service
        .raise_alert(
            &principal,
            RaiseAlertInput {
                client_id: body.client_id,
                message: body.message,
                priority: body.priority,
                coordinator_id: body.coordinator_id,
                backup_coordinator_id: body.backup_coordinator_id,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, ok(alert)))
}

/// `POST /v1/alerts/:id/resolve` (coordinator or admin). Idempotent.
pub async fn resolve(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let service = notifications(&state)?;
    let alert = service.resolve_alert(&principal, id).await?;
    Ok(ok(alert))
}
