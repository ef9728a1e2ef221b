use sqlx::PgPool;
use uuid::Uuid;

use berthcare_core::Result;

use crate::models::Zone;

#[derive(Clone)]
pub struct ZoneRepo {
    pool: PgPool,
}

impl ZoneRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list_all(&self) -> Result<Vec<Zone>> {
        let zones = sqlx::query_as::<_, Zone>(
            "SELECT id, name, center_lat, center_lng FROM zones ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(zones)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Zone>> {
        let zone = sqlx::query_as::<_, Zone>(
            "SELECT id, name, center_lat, center_lng FROM zones WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(zone)
    }
}
