use serde_json::Value;
use sqlx::{PgPool, QueryBuilder};
use uuid::Uuid;

use berthcare_core::{ApiError, Patch, Result};

use crate::models::CarePlan;

/// Every client gets a default care plan at creation, so plan writes are
/// updates against that row; each one bumps `version`.
#[derive(Debug, Clone, Default)]
pub struct CarePlanChanges {
    pub summary: Option<String>,
    pub medications: Option<Value>,
    pub allergies: Option<Value>,
    pub special_instructions: Patch<String>,
}

impl CarePlanChanges {
    pub fn is_empty(&self) -> bool {
        self.summary.is_none()
            && self.medications.is_none()
            && self.allergies.is_none()
            && self.special_instructions.is_missing()
    }
}

#[derive(Clone)]
pub struct CarePlanRepo {
    pool: PgPool,
}

impl CarePlanRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_client(&self, client_id: Uuid) -> Result<Option<CarePlan>> {
        let plan = sqlx::query_as::<_, CarePlan>("SELECT * FROM care_plans WHERE client_id = $1")
            .bind(client_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(plan)
    }

    pub async fn update_for_client(
        &self,
        client_id: Uuid,
        changes: &CarePlanChanges,
    ) -> Result<CarePlan> {
        let mut qb: QueryBuilder<'_, sqlx::Postgres> =
            QueryBuilder::new("UPDATE care_plans SET updated_at = now(), version = version + 1");

        if let Some(v) = &changes.summary {
            qb.push(", summary = ").push_bind(v);
        }
        if let Some(v) = &changes.medications {
            qb.push(", medications = ").push_bind(v);
        }
        if let Some(v) = &changes.allergies {
            qb.push(", allergies = ").push_bind(v);
        }
        match &changes.special_instructions {
            Patch::Missing => {}
            Patch::Null => {
                qb.push(", special_instructions = NULL");
            }
            Patch::Value(v) => {
                qb.push(", special_instructions = ").push_bind(v);
            }
        }

        qb.push(" WHERE client_id = ").push_bind(client_id).push(" RETURNING *");

        qb.build_query_as::<CarePlan>()
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::not_found("care plan"))
    }
}
