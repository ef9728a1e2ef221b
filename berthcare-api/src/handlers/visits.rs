use axum::Json;
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use berthcare_core::error::FieldError;
use berthcare_core::{ApiError, Principal};
use berthcare_db::models::VisitStatus;

use crate::envelope::{ApiResult, ok};
use crate::services::visits::{CreateVisitInput, ListVisitsQuery, UpdateVisitInput};
use crate::state::AppState;
use crate::validation;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVisitBody {
    pub client_id: Uuid,
    #[serde(default)]
    pub scheduled_start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub staff_id: Option<Uuid>,
    #[serde(default)]
    pub check_in_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub check_in_lat: Option<f64>,
    #[serde(default)]
    pub check_in_lng: Option<f64>,
    #[serde(default)]
    pub copied_from_visit_id: Option<Uuid>,
}

/// `POST /v1/visits`: caregiver check-in, or scheduling by a
/// coordinator/admin.
pub async fn create(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<CreateVisitBody>,
) -> ApiResult<impl IntoResponse> {
    let visit = state
        .visits
        .create(
            &principal,
            CreateVisitInput {
                client_id: body.client_id,
                scheduled_start_time: body.scheduled_start_time,
                staff_id: body.staff_id,
                check_in_time: body.check_in_time,
                check_in_lat: body.check_in_lat,
                check_in_lng: body.check_in_lng,
                copied_from_visit_id: body.copied_from_visit_id,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, ok(visit)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    #[serde(default)]
    pub client_id: Option<Uuid>,
    #[serde(default)]
    pub staff_id: Option<Uuid>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub limit: Option<i64>,
}

/// `GET /v1/visits`.
pub async fn list(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<ListQuery>,
) -> ApiResult<impl IntoResponse> {
    let (page, limit) = validation::check_pagination(query.page, query.limit)?;

    let status = match &query.status {
        None => None,
        Some(raw) => Some(VisitStatus::parse(raw).ok_or_else(|| {
            ApiError::validation(
                "invalid status filter",
                vec![FieldError::new(
                    "status",
                    "must be scheduled, in_progress, completed or cancelled",
                )],
            )
        })?),
    };

    let result = state
        .visits
        .list(
            &principal,
            ListVisitsQuery {
                client_id: query.client_id,
                staff_id: query.staff_id,
                status,
                start_date: query.start_date,
                end_date: query.end_date,
            },
            page,
            limit,
        )
        .await?;
    Ok(ok(result))
}

/// `GET /v1/visits/:id`: aggregated detail.
pub async fn get(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let detail = state.visits.detail(&principal, id).await?;
    Ok(ok(detail))
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateVisitBody {
    #[serde(default)]
    pub vital_signs: Option<Value>,
    #[serde(default)]
    pub activities: Option<Value>,
    #[serde(default)]
    pub observations: Option<String>,
    #[serde(default)]
    pub concerns: Option<String>,
    #[serde(default)]
    pub check_out_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub check_out_lat: Option<f64>,
    #[serde(default)]
    pub check_out_lng: Option<f64>,
    #[serde(default)]
    pub status: Option<String>,
}

/// `PATCH /v1/visits/:id`: documentation upsert, check-out and status
/// transitions.
pub async fn update(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateVisitBody>,
) -> ApiResult<impl IntoResponse> {
    let mut fields = Vec::new();
    if let Some(vitals) = &body.vital_signs {
        fields.extend(validation::check_object(vitals, "vitalSigns"));
    }
    if let Some(activities) = &body.activities {
        fields.extend(validation::check_array(activities, "activities"));
    }
    let status = match &body.status {
        None => None,
        Some(raw) => match VisitStatus::parse(raw) {
            Some(status) => Some(status),
            None => {
                fields.push(FieldError::new(
                    "status",
                    "must be scheduled, in_progress, completed or cancelled",
                ));
                None
            }
        },
    };
    validation::reject_if_any(fields, "invalid visit update")?;

    let visit = state
        .visits
        .update(
            &principal,
            id,
            UpdateVisitInput {
                vital_signs: body.vital_signs,
                activities: body.activities,
                observations: body.observations,
                concerns: body.concerns,
                check_out_time: body.check_out_time,
                check_out_lat: body.check_out_lat,
                check_out_lng: body.check_out_lng,
                status,
            },
        )
        .await?;
    Ok(ok(visit))
}
