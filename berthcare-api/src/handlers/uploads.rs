use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use berthcare_core::error::FieldError;
use berthcare_core::{ApiError, Principal};

use crate::envelope::{ApiResult, ok};
use crate::services::uploads::UploadRequest;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSpec {
    pub mime_type: String,
    pub size: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoUploadUrlBody {
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub size: Option<i64>,
    /// Batch form; when present, `mimeType`/`size` at the top level are
    /// ignored and the response is an ordered array.
    #[serde(default)]
    pub uploads: Option<Vec<UploadSpec>>,
}

/// `POST /v1/visits/:id/photos/upload-url`. Phase one of the two-phase
/// upload: no state is created.
pub async fn photo_upload_url(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(visit_id): Path<Uuid>,
    Json(body): Json<PhotoUploadUrlBody>,
) -> ApiResult<impl IntoResponse> {
    match body.uploads {
        Some(specs) => {
            if specs.is_empty() {
                return Err(ApiError::validation(
                    "uploads must not be empty",
                    vec![FieldError::new("uploads", "provide at least one upload")],
                )
                .into());
            }
            let requests: Vec<UploadRequest> = specs
                .into_iter()
                .map(|s| UploadRequest { mime_type: s.mime_type, size_bytes: s.size })
                .collect();
            let uploads =
                state.uploads.photo_upload_urls(&principal, visit_id, &requests).await?;
            Ok(ok(json!(uploads)))
        }
        None => {
            let (Some(mime_type), Some(size)) = (body.mime_type, body.size) else {
                return Err(ApiError::validation(
                    "mimeType and size are required",
                    vec![FieldError::new("mimeType", "required"), FieldError::new("size", "required")],
                )
                .into());
            };
            let request = UploadRequest { mime_type, size_bytes: size };
            let uploads = state
                .uploads
                .photo_upload_urls(&principal, visit_id, std::slice::from_ref(&request))
                .await?;
            let single = uploads.into_iter().next().ok_or_else(|| {
                ApiError::internal("presign batch returned no entries")
            })?;
            Ok(ok(json!(single)))
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmPhotoBody {
    pub key: String,
    #[serde(default)]
    pub thumbnail_key: Option<String>,
}

/// `POST /v1/visits/:id/photos`. Phase two: record metadata after the
/// client PUT the object.
pub async fn confirm_photo(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(visit_id): Path<Uuid>,
    Json(body): Json<ConfirmPhotoBody>,
) -> ApiResult<impl IntoResponse> {
    if body.key.trim().is_empty() {
        return Err(ApiError::validation(
            "key is required",
            vec![FieldError::new("key", "required")],
        )
        .into());
    }
    let photo = state
        .uploads
        .confirm_photo(&principal, visit_id, &body.key, body.thumbnail_key.as_deref())
        .await?;
    Ok((StatusCode::CREATED, ok(photo)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureUploadUrlBody {
    pub mime_type: String,
    pub size: i64,
    /// Who is signing: the client or the caregiver.
    #[serde(default = "default_signature_type")]
    pub signature_type: String,
}

fn default_signature_type() -> String {
    "client".to_string()
}

/// `POST /v1/visits/:id/signature/upload-url`.
pub async fn signature_upload_url(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(visit_id): Path<Uuid>,
    Json(body): Json<SignatureUploadUrlBody>,
) -> ApiResult<impl IntoResponse> {
    if !matches!(body.signature_type.as_str(), "client" | "caregiver") {
        return Err(ApiError::validation(
            "invalid signature type",
            vec![FieldError::new("signatureType", "must be client or caregiver")],
        )
        .into());
    }
    let upload = state
        .uploads
        .signature_upload_url(
            &principal,
            visit_id,
            &body.signature_type,
            &UploadRequest { mime_type: body.mime_type, size_bytes: body.size },
        )
        .await?;
    Ok(ok(upload))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmSignatureBody {
    pub key: String,
}

/// `POST /v1/visits/:id/signature`.
pub async fn confirm_signature(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(visit_id): Path<Uuid>,
    Json(body): Json<ConfirmSignatureBody>,
) -> ApiResult<impl IntoResponse> {
    if body.key.trim().is_empty() {
        return Err(ApiError::validation(
            "key is required",
            vec![FieldError::new("key", "required")],
        )
        .into());
    }
    let documentation =
        state.uploads.confirm_signature(&principal, visit_id, &body.key).await?;
    Ok(ok(documentation))
}
