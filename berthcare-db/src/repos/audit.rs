use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use berthcare_core::{Result, Role};

use crate::models::AuditEntry;

#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub actor_user_id: Uuid,
    pub actor_role: Role,
    pub action: String,
    pub object_type: String,
    pub object_id: Uuid,
    /// Map of `field -> {old, new}`.
    pub changed_fields: Value,
    pub request_id: Option<String>,
    pub source_ip: Option<String>,
}

#[derive(Clone)]
pub struct AuditRepo {
    pool: PgPool,
}

impl AuditRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, entry: &NewAuditEntry) -> Result<AuditEntry> {
        let row = sqlx::query_as::<_, AuditEntry>(
            "INSERT INTO audit_log
                 (actor_user_id, actor_role, action, object_type, object_id,
                  changed_fields, request_id, source_ip)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING *",
        )
        .bind(entry.actor_user_id)
        .bind(entry.actor_role)
        .bind(&entry.action)
        .bind(&entry.object_type)
        .bind(entry.object_id)
        .bind(&entry.changed_fields)
        .bind(&entry.request_id)
        .bind(&entry.source_ip)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }
}
