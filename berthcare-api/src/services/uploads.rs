//! Two-phase uploads: issue a pre-signed PUT, then record metadata after
//! the client confirms the object landed.
//!
//! Issuing a URL creates no state. Confirmation validates that the key
//! sits inside the namespace the URL was issued for (the caregiver's
//! photo prefix, the visit's signature prefix) before any row is written.

use std::sync::Arc;

use uuid::Uuid;

use berthcare_cache::keys as cache_keys;
use berthcare_cache::Cache;
use berthcare_core::{ApiError, Principal, Result};
use berthcare_db::models::{Visit, VisitDocumentation, VisitPhoto};
use berthcare_db::repos::{DocumentationChanges, VisitRepo};
use berthcare_external::storage::{
    self, ObjectStorage, PresignedUpload, UploadKind, photo_key_in_scope, signature_key_in_scope,
};

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub mime_type: String,
    pub size_bytes: i64,
}

#[derive(Clone)]
pub struct UploadService {
    storage: Arc<ObjectStorage>,
    visits: VisitRepo,
    cache: Cache,
}

impl UploadService {
    pub fn new(storage: Arc<ObjectStorage>, visits: VisitRepo, cache: Cache) -> Self {
        Self { storage, visits, cache }
    }

    /// Pre-signed PUT URLs for one or more photos, in request order.
    pub async fn photo_upload_urls(
        &self,
        principal: &Principal,
        visit_id: Uuid,
        requests: &[UploadRequest],
    ) -> Result<Vec<PresignedUpload>> {
        self.authorize_visit(principal, visit_id).await?;

        let mut uploads = Vec::with_capacity(requests.len());
        for request in requests {
            let key = storage::photo_key(principal.user_id, &request.mime_type, chrono::Utc::now());
            let upload = self
                .storage
                .presign_put(UploadKind::Photo, &key, &request.mime_type, request.size_bytes)
                .await?;
            uploads.push(upload);
        }
        Ok(uploads)
    }

    /// Phase two: link an uploaded object to the visit. The key must sit
    /// under the caller's own photo prefix.
    pub async fn confirm_photo(
        &self,
        principal: &Principal,
        visit_id: Uuid,
        key: &str,
        thumbnail_key: Option<&str>,
    ) -> Result<VisitPhoto> {
        self.authorize_visit(principal, visit_id).await?;
        if !photo_key_in_scope(key, principal.user_id) {
            return Err(ApiError::forbidden("upload key is outside the caller's namespace"));
        }

        let photo = self
            .visits
            .insert_photo(visit_id, key, &self.storage.object_url(key), thumbnail_key)
            .await?;
        self.cache.delete(&cache_keys::visit_detail(visit_id)).await;
        Ok(photo)
    }

    pub async fn signature_upload_url(
        &self,
        principal: &Principal,
        visit_id: Uuid,
        signature_type: &str,
        request: &UploadRequest,
    ) -> Result<PresignedUpload> {
        self.authorize_visit(principal, visit_id).await?;
        let key = storage::signature_key(visit_id, signature_type, chrono::Utc::now());
        self.storage
            .presign_put(UploadKind::Signature, &key, &request.mime_type, request.size_bytes)
            .await
    }

    pub async fn confirm_signature(
        &self,
        principal: &Principal,
        visit_id: Uuid,
        key: &str,
    ) -> Result<VisitDocumentation> {
        self.authorize_visit(principal, visit_id).await?;
        if !signature_key_in_scope(key, visit_id) {
            return Err(ApiError::forbidden("upload key does not belong to this visit"));
        }

        let changes = DocumentationChanges {
            signature_url: Some(self.storage.object_url(key)),
            ..Default::default()
        };
        let doc = self.visits.upsert_documentation(visit_id, &changes).await?;
        self.cache.delete(&cache_keys::visit_detail(visit_id)).await;
        Ok(doc)
    }

    async fn authorize_visit(&self, principal: &Principal, visit_id: Uuid) -> Result<Visit> {
        let visit = self
            .visits
            .find_by_id(visit_id)
            .await?
            .ok_or_else(|| ApiError::not_found("visit"))?;
        let zone_id = self
            .visits
            .client_zone(visit_id)
            .await?
            .ok_or_else(|| ApiError::not_found("visit"))?;
        principal.require_visit_access(visit.staff_id, zone_id)?;
        Ok(visit)
    }
}
