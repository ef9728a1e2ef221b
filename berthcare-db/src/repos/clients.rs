use chrono::NaiveDate;
use serde_json::Value;
use sqlx::{PgPool, QueryBuilder};
use uuid::Uuid;

use berthcare_core::{ApiError, Patch, Result};

use crate::models::{CarePlan, Client};

#[derive(Debug, Clone)]
pub struct NewClient {
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub phone: Option<String>,
    pub emergency_contact: Option<Value>,
    pub zone_id: Uuid,
}

/// PATCH payload after validation and geocoding. Address, coordinates and
/// zone travel together: the service never sets an address without having
/// resolved it.
#[derive(Debug, Clone, Default)]
pub struct ClientChanges {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub zone_id: Option<Uuid>,
    pub phone: Patch<String>,
    pub emergency_contact: Patch<Value>,
}

impl ClientChanges {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.date_of_birth.is_none()
            && self.address.is_none()
            && self.latitude.is_none()
            && self.longitude.is_none()
            && self.zone_id.is_none()
            && self.phone.is_missing()
            && self.emergency_contact.is_missing()
    }
}

#[derive(Clone)]
pub struct ClientRepo {
    pool: PgPool,
}

impl ClientRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert the client and its default care plan (`version = 1`, empty
    /// medication/allergy lists) in one transaction.
    pub async fn insert_with_care_plan(&self, new: &NewClient) -> Result<(Client, CarePlan)> {
        let mut tx = self.pool.begin().await?;

        let insert_result = sqlx::query_as::<_, Client>(
            "INSERT INTO clients
                 (first_name, last_name, date_of_birth, address, latitude, longitude,
                  phone, emergency_contact, zone_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING *",
        )
        .bind(&new.first_name)
        .bind(&new.last_name)
        .bind(new.date_of_birth)
        .bind(&new.address)
        .bind(new.latitude)
        .bind(new.longitude)
        .bind(&new.phone)
        .bind(&new.emergency_contact)
        .bind(new.zone_id)
        .fetch_one(&mut *tx)
        .await;

        let client = match insert_result {
            Ok(client) => client,
            // Lost a race with a concurrent create for the same person.
            Err(sqlx::Error::Database(db_err))
                if db_err.constraint() == Some("clients_identity_unique") =>
            {
                return Err(ApiError::DuplicateClient);
            }
            Err(e) => return Err(e.into()),
        };

        let plan = sqlx::query_as::<_, CarePlan>(
            "INSERT INTO care_plans (client_id) VALUES ($1) RETURNING *",
        )
        .bind(client.id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((client, plan))
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Client>> {
        let client = sqlx::query_as::<_, Client>("SELECT * FROM clients WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(client)
    }

    /// Duplicate heuristic: `(first_name, last_name)` case-insensitive plus
    /// date of birth. `exclude` skips the row being updated.
    pub async fn find_duplicate(
        &self,
        first_name: &str,
        last_name: &str,
        date_of_birth: NaiveDate,
        exclude: Option<Uuid>,
    ) -> Result<Option<Uuid>> {
        let id = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM clients
             WHERE lower(first_name) = lower($1)
               AND lower(last_name) = lower($2)
               AND date_of_birth = $3
               AND ($4::uuid IS NULL OR id <> $4)",
        )
        .bind(first_name)
        .bind(last_name)
        .bind(date_of_birth)
        .bind(exclude)
        .fetch_optional(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn list(
        &self,
        zone_id: Option<Uuid>,
        page: i64,
        limit: i64,
    ) -> Result<(Vec<Client>, i64)> {
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT count(*) FROM clients WHERE ($1::uuid IS NULL OR zone_id = $1)",
        )
        .bind(zone_id)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query_as::<_, Client>(
            "SELECT * FROM clients
             WHERE ($1::uuid IS NULL OR zone_id = $1)
             ORDER BY last_name, first_name
             LIMIT $2 OFFSET $3",
        )
        .bind(zone_id)
        .bind(limit)
        .bind((page - 1) * limit)
        .fetch_all(&self.pool)
        .await?;

        Ok((rows, total))
    }

    /// Apply a partial update. Column names are literals appended per
    /// provided field; values always travel as bind parameters.
    pub async fn update(&self, id: Uuid, changes: &ClientChanges) -> Result<Client> {
        let mut qb: QueryBuilder<'_, sqlx::Postgres> =
            QueryBuilder::new("UPDATE clients SET updated_at = now()");

        if let Some(v) = &changes.first_name {
            qb.push(", first_name = ").push_bind(v);
        }
        if let Some(v) = &changes.last_name {
            qb.push(", last_name = ").push_bind(v);
        }
        if let Some(v) = changes.date_of_birth {
            qb.push(", date_of_birth = ").push_bind(v);
        }
        if let Some(v) = &changes.address {
            qb.push(", address = ").push_bind(v);
        }
        if let Some(v) = changes.latitude {
            qb.push(", latitude = ").push_bind(v);
        }
        if let Some(v) = changes.longitude {
            qb.push(", longitude = ").push_bind(v);
        }
        if let Some(v) = changes.zone_id {
            qb.push(", zone_id = ").push_bind(v);
        }
        match &changes.phone {
            Patch::Missing => {}
            Patch::Null => {
                qb.push(", phone = NULL");
            }
            Patch::Value(v) => {
                qb.push(", phone = ").push_bind(v);
            }
        }
        match &changes.emergency_contact {
            Patch::Missing => {}
            Patch::Null => {
                qb.push(", emergency_contact = NULL");
            }
            Patch::Value(v) => {
                qb.push(", emergency_contact = ").push_bind(v);
            }
        }

        qb.push(" WHERE id = ").push_bind(id).push(" RETURNING *");

        qb.build_query_as::<Client>()
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::not_found("client"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_sql_includes_only_provided_columns() {
        let changes = ClientChanges {
            first_name: Some("Jane".into()),
            phone: Patch::Null,
            ..Default::default()
        };

        // Mirror the builder logic to inspect the generated SQL.
        let mut qb: QueryBuilder<'_, sqlx::Postgres> =
            QueryBuilder::new("UPDATE clients SET updated_at = now()");
        if let Some(v) = &changes.first_name {
            qb.push(", first_name = ").push_bind(v);
        }
        if let Patch::Null = &changes.phone {
            qb.push(", phone = NULL");
        }
        qb.push(" WHERE id = ");

        let sql = qb.sql();
        assert!(sql.contains("first_name = $1"));
        assert!(sql.contains("phone = NULL"));
        assert!(!sql.contains("last_name"));
        assert!(!sql.contains("zone_id"));
    }

    #[test]
    fn test_changes_emptiness() {
        assert!(ClientChanges::default().is_empty());
        let with_phone = ClientChanges { phone: Patch::Null, ..Default::default() };
        assert!(!with_phone.is_empty());
    }
}
