//! Pre-signed URL issuance for private S3 objects.
//!
//! | Kind      | Max size | Types                    | URL TTL |
//! |-----------|----------|--------------------------|---------|
//! | Photo     | 10 MiB   | jpeg, png, heic          | 60 min  |
//! | Signature | 1 MiB    | png                      | 10 min  |
//! | Document  | 25 MiB   | pdf                      | 60 min  |
//!
//! The signature TTL is short because signing happens at the moment of
//! capture; photos may be uploaded later from a queue. Object keys follow
//! fixed per-kind patterns and the metadata-confirmation endpoint accepts
//! a key only when it matches the expected prefix for its scope.

use std::time::Duration;

use aws_sdk_s3::presigning::PresigningConfig;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use berthcare_core::config::StorageConfig;
use berthcare_core::error::FieldError;
use berthcare_core::{ApiError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Photo,
    Signature,
    Document,
}

#[derive(Debug, Clone, Copy)]
pub struct UploadPolicy {
    pub max_size_bytes: i64,
    pub allowed_types: &'static [&'static str],
    pub url_ttl: Duration,
}

impl UploadKind {
    pub fn policy(&self) -> UploadPolicy {
        match self {
            UploadKind::Photo => UploadPolicy {
                max_size_bytes: 10 * 1024 * 1024,
                allowed_types: &["image/jpeg", "image/png", "image/heic"],
                url_ttl: Duration::from_secs(60 * 60),
            },
            UploadKind::Signature => UploadPolicy {
                max_size_bytes: 1024 * 1024,
                allowed_types: &["image/png"],
                url_ttl: Duration::from_secs(10 * 60),
            },
            UploadKind::Document => UploadPolicy {
                max_size_bytes: 25 * 1024 * 1024,
                allowed_types: &["application/pdf"],
                url_ttl: Duration::from_secs(60 * 60),
            },
        }
    }

    /// Reject a requested upload before any URL is signed.
    pub fn validate(&self, mime_type: &str, size_bytes: i64) -> Result<()> {
        let policy = self.policy();
        let mut fields = Vec::new();
        if !policy.allowed_types.contains(&mime_type) {
            fields.push(FieldError::new(
                "mimeType",
                format!("'{mime_type}' is not allowed; expected one of {:?}", policy.allowed_types),
            ));
        }
        if size_bytes <= 0 || size_bytes > policy.max_size_bytes {
            fields.push(FieldError::new(
                "size",
                format!("size must be between 1 and {} bytes", policy.max_size_bytes),
            ));
        }
        if fields.is_empty() {
            Ok(())
        } else {
            Err(ApiError::validation("upload request rejected by policy", fields))
        }
    }
}

fn extension_for(mime_type: &str) -> &'static str {
    match mime_type {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/heic" => "heic",
        "application/pdf" => "pdf",
        _ => "bin",
    }
}

/// `photos/<userId>/<ts>-<uuid>.<ext>`
pub fn photo_key(user_id: Uuid, mime_type: &str, now: DateTime<Utc>) -> String {
    format!(
        "photos/{user_id}/{}-{}.{}",
        now.timestamp_millis(),
        Uuid::new_v4(),
        extension_for(mime_type)
    )
}

/// `visits/<visitId>/signatures/<type>-<ts>.png`
pub fn signature_key(visit_id: Uuid, signature_type: &str, now: DateTime<Utc>) -> String {
    format!("visits/{visit_id}/signatures/{signature_type}-{}.png", now.timestamp_millis())
}

/// `documents/<userId>/<ts>-<uuid>.pdf`
pub fn document_key(user_id: Uuid, now: DateTime<Utc>) -> String {
    format!("documents/{user_id}/{}-{}.pdf", now.timestamp_millis(), Uuid::new_v4())
}

/// A confirmed photo key must sit under the uploading caregiver's prefix.
pub fn photo_key_in_scope(key: &str, user_id: Uuid) -> bool {
    key.starts_with(&format!("photos/{user_id}/")) && !key.contains("..")
}

/// A confirmed signature key must sit under the visit's signature prefix.
pub fn signature_key_in_scope(key: &str, visit_id: Uuid) -> bool {
    key.starts_with(&format!("visits/{visit_id}/signatures/"))
        && key.ends_with(".png")
        && !key.contains("..")
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignedUpload {
    pub upload_url: String,
    pub key: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct ObjectStorage {
    client: aws_sdk_s3::Client,
    bucket: String,
    region: String,
}

impl ObjectStorage {
    pub async fn from_config(cfg: &StorageConfig) -> Self {
        let aws_cfg = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(cfg.region.clone()))
            .load()
            .await;
        Self {
            client: aws_sdk_s3::Client::new(&aws_cfg),
            bucket: cfg.bucket.clone(),
            region: cfg.region.clone(),
        }
    }

    /// Canonical (non-signed) object URL recorded alongside metadata.
    /// The object stays private; reads go through [`presign_get`].
    ///
    /// [`presign_get`]: ObjectStorage::presign_get
    pub fn object_url(&self, key: &str) -> String {
        format!("https://{}.s3.{}.amazonaws.com/{key}", self.bucket, self.region)
    }

    /// Sign a PUT for a validated upload. The signature pins content type
    /// and length, so a client cannot swap in a different payload shape.
    pub async fn presign_put(
        &self,
        kind: UploadKind,
        key: &str,
        mime_type: &str,
        size_bytes: i64,
    ) -> Result<PresignedUpload> {
        kind.validate(mime_type, size_bytes)?;
        let ttl = kind.policy().url_ttl;
        let presigning = PresigningConfig::expires_in(ttl)
            .map_err(|e| ApiError::internal(format!("invalid presign TTL: {e}")))?;

        let request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(mime_type)
            .content_length(size_bytes)
            .presigned(presigning)
            .await
            .map_err(|e| ApiError::unavailable(format!("failed to presign upload: {e}")))?;

        Ok(PresignedUpload {
            upload_url: request.uri().to_string(),
            key: key.to_string(),
            expires_at: Utc::now() + chrono::Duration::from_std(ttl).unwrap_or_default(),
        })
    }

    /// Sign a bounded-lifetime GET for a private object.
    pub async fn presign_get(&self, key: &str, ttl: Duration) -> Result<String> {
        let presigning = PresigningConfig::expires_in(ttl)
            .map_err(|e| ApiError::internal(format!("invalid presign TTL: {e}")))?;
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| ApiError::unavailable(format!("failed to presign download: {e}")))?;
        Ok(request.uri().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_table() {
        assert_eq!(UploadKind::Photo.policy().max_size_bytes, 10 * 1024 * 1024);
        assert_eq!(UploadKind::Signature.policy().max_size_bytes, 1024 * 1024);
        assert_eq!(UploadKind::Document.policy().max_size_bytes, 25 * 1024 * 1024);
        assert_eq!(UploadKind::Signature.policy().url_ttl, Duration::from_secs(600));
        assert_eq!(UploadKind::Photo.policy().url_ttl, Duration::from_secs(3_600));
    }

    #[test]
    fn test_validation_rejects_type_and_size() {
        assert!(UploadKind::Photo.validate("image/jpeg", 2 * 1024 * 1024).is_ok());
        assert!(UploadKind::Photo.validate("image/gif", 1024).is_err());
        assert!(UploadKind::Photo.validate("image/jpeg", 11 * 1024 * 1024).is_err());
        assert!(UploadKind::Photo.validate("image/jpeg", 0).is_err());
        assert!(UploadKind::Signature.validate("image/jpeg", 1024).is_err());
        assert!(UploadKind::Signature.validate("image/png", 1024).is_ok());
    }

    #[test]
    fn test_key_patterns() {
        let user = Uuid::new_v4();
        let visit = Uuid::new_v4();
        let now = Utc::now();

        let photo = photo_key(user, "image/jpeg", now);
        assert!(photo.starts_with(&format!("photos/{user}/")));
        assert!(photo.ends_with(".jpg"));

        let sig = signature_key(visit, "client", now);
        assert!(sig.starts_with(&format!("visits/{visit}/signatures/client-")));
        assert!(sig.ends_with(".png"));

        let doc = document_key(user, now);
        assert!(doc.starts_with(&format!("documents/{user}/")));
        assert!(doc.ends_with(".pdf"));
    }

    #[test]
    fn test_key_scope_checks() {
        let user = Uuid::new_v4();
        let other = Uuid::new_v4();
        let visit = Uuid::new_v4();
        let now = Utc::now();

        let photo = photo_key(user, "image/png", now);
        assert!(photo_key_in_scope(&photo, user));
        assert!(!photo_key_in_scope(&photo, other));
        assert!(!photo_key_in_scope("photos/../secrets", user));

        let sig = signature_key(visit, "client", now);
        assert!(signature_key_in_scope(&sig, visit));
        assert!(!signature_key_in_scope(&sig, Uuid::new_v4()));
        assert!(!signature_key_in_scope(
            &format!("visits/{visit}/signatures/evil.exe"),
            visit
        ));
    }
}
