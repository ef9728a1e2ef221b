use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use berthcare_core::Result;

use crate::models::RefreshToken;

#[derive(Clone)]
pub struct RefreshTokenRepo {
    pool: PgPool,
}

impl RefreshTokenRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Store the hash of a freshly minted refresh token, atomically
    /// replacing whatever the device held before. Guarantees at most one
    /// active token per `(user, device)`.
    pub async fn replace_for_device(
        &self,
        user_id: Uuid,
        device_id: &str,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<RefreshToken> {
        let row = sqlx::query_as::<_, RefreshToken>(
            "INSERT INTO refresh_tokens (user_id, device_id, token_hash, expires_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (user_id, device_id) DO UPDATE SET
                 token_hash = EXCLUDED.token_hash,
                 expires_at = EXCLUDED.expires_at,
                 revoked_at = NULL,
                 created_at = now()
             RETURNING *",
        )
        .bind(user_id)
        .bind(device_id)
        .bind(token_hash)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn find_by_hash(&self, token_hash: &str) -> Result<Option<RefreshToken>> {
        let row =
            sqlx::query_as::<_, RefreshToken>("SELECT * FROM refresh_tokens WHERE token_hash = $1")
                .bind(token_hash)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row)
    }

    /// Remove an expired row outright so the table does not accumulate
    /// dead tokens.
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM refresh_tokens WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Revoke the device's token if one is active. Idempotent.
    pub async fn revoke_for_device(&self, user_id: Uuid, device_id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = now()
             WHERE user_id = $1 AND device_id = $2 AND revoked_at IS NULL",
        )
        .bind(user_id)
        .bind(device_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
