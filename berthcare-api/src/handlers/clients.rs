use axum::Json;
use axum::extract::{Extension, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use berthcare_core::error::FieldError;
use berthcare_core::{Patch, Principal, Role};
use berthcare_db::repos::CarePlanChanges;

use crate::envelope::{ApiResult, ok};
use crate::handlers::request_meta;
use crate::services::clients::{CreateClientInput, UpdateClientInput};
use crate::state::AppState;
use crate::validation;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateClientBody {
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub address: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub emergency_contact: Option<Value>,
    #[serde(default)]
    pub zone_id: Option<Uuid>,
}

/// `POST /v1/clients` (admin only).
pub async fn create(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    headers: HeaderMap,
    Json(body): Json<CreateClientBody>,
) -> ApiResult<impl IntoResponse> {
    principal.require_role(&[Role::Admin])?;

    let mut fields = Vec::new();
    fields.extend(validation::require_non_empty(&body.first_name, "firstName"));
    fields.extend(validation::require_non_empty(&body.last_name, "lastName"));
    fields.extend(validation::require_non_empty(&body.address, "address"));
    if let Some(contact) = &body.emergency_contact {
        fields.extend(validation::check_object(contact, "emergencyContact"));
    }
    validation::reject_if_any(fields, "invalid client")?;

    let created = state
        .clients
        .create(
            &principal,
            CreateClientInput {
                first_name: body.first_name,
                last_name: body.last_name,
                date_of_birth: body.date_of_birth,
                address: body.address,
                phone: body.phone,
                emergency_contact: body.emergency_contact,
                zone_id: body.zone_id,
            },
            &request_meta(&headers),
        )
        .await?;

    Ok((StatusCode::CREATED, ok(created)))
}

/// `GET /v1/clients/:id`.
pub async fn get(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let detail = state.clients.get(&principal, id).await?;
    Ok(ok(detail))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListClientsQuery {
    #[serde(default)]
    pub zone_id: Option<Uuid>,
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub limit: Option<i64>,
}

/// `GET /v1/clients`.
pub async fn list(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<ListClientsQuery>,
) -> ApiResult<impl IntoResponse> {
    let (page, limit) = validation::check_pagination(query.page, query.limit)?;
    let result = state.clients.list(&principal, query.zone_id, page, limit).await?;
    Ok(ok(result))
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateClientBody {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub zone_id: Option<Uuid>,
    // `null` clears; omission leaves untouched.
    #[serde(default)]
    pub phone: Patch<String>,
    #[serde(default)]
    pub emergency_contact: Patch<Value>,
}

/// `PATCH /v1/clients/:id` (coordinator or admin).
pub async fn update(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<UpdateClientBody>,
) -> ApiResult<impl IntoResponse> {
    principal.require_role(&[Role::Coordinator, Role::Admin])?;

    let mut fields = Vec::new();
    if let Some(name) = &body.first_name {
        fields.extend(validation::require_non_empty(name, "firstName"));
    }
    if let Some(name) = &body.last_name {
        fields.extend(validation::require_non_empty(name, "lastName"));
    }
    if let Some(address) = &body.address {
        fields.extend(validation::require_non_empty(address, "address"));
    }
    if let Patch::Value(contact) = &body.emergency_contact {
        fields.extend(validation::check_object(contact, "emergencyContact"));
    }
    validation::reject_if_any(fields, "invalid client update")?;

    let updated = state
        .clients
        .update(
            &principal,
            id,
            UpdateClientInput {
                first_name: body.first_name,
                last_name: body.last_name,
                date_of_birth: body.date_of_birth,
                address: body.address,
                zone_id: body.zone_id,
                phone: body.phone,
                emergency_contact: body.emergency_contact,
            },
            &request_meta(&headers),
        )
        .await?;

    Ok(ok(updated))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarePlanBody {
    pub client_id: Uuid,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub medications: Option<Value>,
    #[serde(default)]
    pub allergies: Option<Value>,
    #[serde(default)]
    pub special_instructions: Patch<String>,
}

/// `POST /v1/care-plans` (coordinator or admin). Bumps the plan version.
pub async fn upsert_care_plan(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    headers: HeaderMap,
    Json(body): Json<CarePlanBody>,
) -> ApiResult<impl IntoResponse> {
    principal.require_role(&[Role::Coordinator, Role::Admin])?;

    let mut fields: Vec<FieldError> = Vec::new();
    if let Some(medications) = &body.medications {
        fields.extend(validation::check_array(medications, "medications"));
    }
    if let Some(allergies) = &body.allergies {
        fields.extend(validation::check_array(allergies, "allergies"));
    }
    validation::reject_if_any(fields, "invalid care plan")?;

    let plan = state
        .clients
        .update_care_plan(
            &principal,
            body.client_id,
            CarePlanChanges {
                summary: body.summary,
                medications: body.medications,
                allergies: body.allergies,
                special_instructions: body.special_instructions,
            },
            &request_meta(&headers),
        )
        .await?;

    Ok(ok(plan))
}
