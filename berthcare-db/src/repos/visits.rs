use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{PgPool, QueryBuilder};
use uuid::Uuid;

use berthcare_core::{ApiError, Result, Role};

use crate::models::{Visit, VisitDocumentation, VisitPhoto, VisitStatus};

#[derive(Debug, Clone)]
pub struct NewVisit {
    pub client_id: Uuid,
    pub staff_id: Uuid,
    pub scheduled_start_time: Option<DateTime<Utc>>,
    pub check_in_time: Option<DateTime<Utc>>,
    pub check_in_lat: Option<f64>,
    pub check_in_lng: Option<f64>,
    pub status: VisitStatus,
    pub copied_from_visit_id: Option<Uuid>,
}

/// Documentation fields from a visit PATCH. `None` leaves the stored value
/// untouched.
#[derive(Debug, Clone, Default)]
pub struct DocumentationChanges {
    pub vital_signs: Option<Value>,
    pub activities: Option<Value>,
    pub observations: Option<String>,
    pub concerns: Option<String>,
    pub signature_url: Option<String>,
}

impl DocumentationChanges {
    pub fn is_empty(&self) -> bool {
        self.vital_signs.is_none()
            && self.activities.is_none()
            && self.observations.is_none()
            && self.concerns.is_none()
            && self.signature_url.is_none()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CheckOut {
    pub time: DateTime<Utc>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct VisitListFilter {
    pub client_id: Option<Uuid>,
    pub staff_id: Option<Uuid>,
    pub status: Option<VisitStatus>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    /// Zone of the visited client, applied via join.
    pub zone_id: Option<Uuid>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSummary {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub address: String,
    pub phone: Option<String>,
    pub zone_id: Uuid,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffSummary {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
}

/// Aggregate payload for `GET /visits/:id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitDetail {
    #[serde(flatten)]
    pub visit: Visit,
    pub client: ClientSummary,
    pub staff: StaffSummary,
    pub documentation: Option<VisitDocumentation>,
    pub photos: Vec<VisitPhoto>,
}

#[derive(Clone)]
pub struct VisitRepo {
    pool: PgPool,
}

impl VisitRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the visit plus its documentation row in one transaction.
    /// When `copy_documentation_from` is set (already authorized by the
    /// caller), the prior visit's documentation seeds the new row;
    /// otherwise the row starts empty.
    pub async fn create_with_documentation(
        &self,
        new: &NewVisit,
        copy_documentation_from: Option<Uuid>,
    ) -> Result<Visit> {
        let mut tx = self.pool.begin().await?;

        let visit = sqlx::query_as::<_, Visit>(
            "INSERT INTO visits
                 (client_id, staff_id, scheduled_start_time, check_in_time,
                  check_in_lat, check_in_lng, status, copied_from_visit_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING *",
        )
        .bind(new.client_id)
        .bind(new.staff_id)
        .bind(new.scheduled_start_time)
        .bind(new.check_in_time)
        .bind(new.check_in_lat)
        .bind(new.check_in_lng)
        .bind(new.status)
        .bind(new.copied_from_visit_id)
        .fetch_one(&mut *tx)
        .await?;

        let mut copied = false;
        if let Some(source_visit_id) = copy_documentation_from {
            let result = sqlx::query(
                "INSERT INTO visit_documentation
                     (visit_id, vital_signs, activities, observations, concerns)
                 SELECT $1, d.vital_signs, d.activities, d.observations, d.concerns
                 FROM visit_documentation d
                 WHERE d.visit_id = $2",
            )
            .bind(visit.id)
            .bind(source_visit_id)
            .execute(&mut *tx)
            .await?;
            copied = result.rows_affected() == 1;
        }
        if !copied {
            sqlx::query("INSERT INTO visit_documentation (visit_id) VALUES ($1)")
                .bind(visit.id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(visit)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Visit>> {
        let visit = sqlx::query_as::<_, Visit>("SELECT * FROM visits WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(visit)
    }

    /// Zone of the client this visit belongs to; used by authorization.
    pub async fn client_zone(&self, visit_id: Uuid) -> Result<Option<Uuid>> {
        let zone = sqlx::query_scalar::<_, Uuid>(
            "SELECT c.zone_id FROM visits v JOIN clients c ON c.id = v.client_id WHERE v.id = $1",
        )
        .bind(visit_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(zone)
    }

    /// Read-only aggregation: visit, client summary, staff summary,
    /// documentation, ordered photos.
    pub async fn find_detail(&self, id: Uuid) -> Result<Option<VisitDetail>> {
        let Some(visit) = self.find_by_id(id).await? else {
            return Ok(None);
        };

        let client = sqlx::query_as::<_, ClientSummary>(
            "SELECT id, first_name, last_name, address, phone, zone_id
             FROM clients WHERE id = $1",
        )
        .bind(visit.client_id)
        .fetch_one(&self.pool)
        .await?;

        let staff = sqlx::query_as::<_, StaffSummary>(
            "SELECT id, first_name, last_name, role FROM users WHERE id = $1",
        )
        .bind(visit.staff_id)
        .fetch_one(&self.pool)
        .await?;

        let documentation = self.find_documentation(id).await?;
        let photos = self.list_photos(id).await?;

        Ok(Some(VisitDetail { visit, client, staff, documentation, photos }))
    }

    pub async fn list(
        &self,
        filter: &VisitListFilter,
        page: i64,
        limit: i64,
    ) -> Result<(Vec<Visit>, i64)> {
        let mut count_qb = QueryBuilder::new(
            "SELECT count(*) FROM visits v JOIN clients c ON c.id = v.client_id WHERE TRUE",
        );
        push_filters(&mut count_qb, filter);
        let total: i64 = count_qb.build_query_scalar().fetch_one(&self.pool).await?;

        let mut qb = QueryBuilder::new(
            "SELECT v.* FROM visits v JOIN clients c ON c.id = v.client_id WHERE TRUE",
        );
        push_filters(&mut qb, filter);
        qb.push(" ORDER BY v.scheduled_start_time DESC NULLS LAST, v.created_at DESC");
        qb.push(" LIMIT ").push_bind(limit).push(" OFFSET ").push_bind((page - 1) * limit);

        let rows = qb.build_query_as::<Visit>().fetch_all(&self.pool).await?;
        Ok((rows, total))
    }

    /// Conditional transition: the row moves only if its current status is
    /// a legal predecessor of `to`. Zero rows affected surfaces as
    /// `INVALID_TRANSITION` (the caller has already established the visit
    /// exists).
    pub async fn transition(
        &self,
        id: Uuid,
        to: VisitStatus,
        check_out: Option<CheckOut>,
        duration_minutes: Option<i32>,
    ) -> Result<Visit> {
        let predecessors: Vec<String> =
            to.legal_predecessors().iter().map(|s| s.as_str().to_string()).collect();

        let mut qb: QueryBuilder<'_, sqlx::Postgres> =
            QueryBuilder::new("UPDATE visits SET updated_at = now(), status = ");
        qb.push_bind(to);
        if let Some(co) = check_out {
            qb.push(", check_out_time = ").push_bind(co.time);
            qb.push(", check_out_lat = ").push_bind(co.lat);
            qb.push(", check_out_lng = ").push_bind(co.lng);
        }
        if let Some(minutes) = duration_minutes {
            qb.push(", duration_minutes = ").push_bind(minutes);
        }
        qb.push(" WHERE id = ").push_bind(id);
        qb.push(" AND status = ANY(").push_bind(predecessors).push("::text[])");
        qb.push(" RETURNING *");

        match qb.build_query_as::<Visit>().fetch_optional(&self.pool).await? {
            Some(visit) => Ok(visit),
            None => {
                let current = self
                    .find_by_id(id)
                    .await?
                    .ok_or_else(|| ApiError::not_found("visit"))?;
                Err(ApiError::invalid_transition(current.status.as_str(), to.as_str()))
            }
        }
    }

    /// Check-out fields without a status change.
    pub async fn set_check_out(
        &self,
        id: Uuid,
        check_out: CheckOut,
        duration_minutes: Option<i32>,
    ) -> Result<Visit> {
        sqlx::query_as::<_, Visit>(
            "UPDATE visits SET updated_at = now(),
                 check_out_time = $2, check_out_lat = $3, check_out_lng = $4,
                 duration_minutes = COALESCE($5, duration_minutes)
             WHERE id = $1
             RETURNING *",
        )
        .bind(id)
        .bind(check_out.time)
        .bind(check_out.lat)
        .bind(check_out.lng)
        .bind(duration_minutes)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ApiError::not_found("visit"))
    }

    pub async fn find_documentation(&self, visit_id: Uuid) -> Result<Option<VisitDocumentation>> {
        let doc = sqlx::query_as::<_, VisitDocumentation>(
            "SELECT * FROM visit_documentation WHERE visit_id = $1",
        )
        .bind(visit_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(doc)
    }

    /// Upsert documentation fields. The row normally exists from visit
    /// creation; the insert arm covers rows removed by admin cascades.
    pub async fn upsert_documentation(
        &self,
        visit_id: Uuid,
        changes: &DocumentationChanges,
    ) -> Result<VisitDocumentation> {
        let mut qb: QueryBuilder<'_, sqlx::Postgres> =
            QueryBuilder::new("UPDATE visit_documentation SET updated_at = now()");
        if let Some(v) = &changes.vital_signs {
            qb.push(", vital_signs = ").push_bind(v);
        }
        if let Some(v) = &changes.activities {
            qb.push(", activities = ").push_bind(v);
        }
        if let Some(v) = &changes.observations {
            qb.push(", observations = ").push_bind(v);
        }
        if let Some(v) = &changes.concerns {
            qb.push(", concerns = ").push_bind(v);
        }
        if let Some(v) = &changes.signature_url {
            qb.push(", signature_url = ").push_bind(v);
        }
        qb.push(" WHERE visit_id = ").push_bind(visit_id).push(" RETURNING *");

        if let Some(doc) =
            qb.build_query_as::<VisitDocumentation>().fetch_optional(&self.pool).await?
        {
            return Ok(doc);
        }

        let doc = sqlx::query_as::<_, VisitDocumentation>(
            "INSERT INTO visit_documentation
                 (visit_id, vital_signs, activities, observations, concerns, signature_url)
             VALUES ($1, COALESCE($2, '{}'::jsonb), COALESCE($3, '[]'::jsonb), $4, $5, $6)
             ON CONFLICT (visit_id) DO UPDATE SET updated_at = now()
             RETURNING *",
        )
        .bind(visit_id)
        .bind(&changes.vital_signs)
        .bind(&changes.activities)
        .bind(&changes.observations)
        .bind(&changes.concerns)
        .bind(&changes.signature_url)
        .fetch_one(&self.pool)
        .await?;
        Ok(doc)
    }

    pub async fn insert_photo(
        &self,
        visit_id: Uuid,
        s3_key: &str,
        s3_url: &str,
        thumbnail_s3_key: Option<&str>,
    ) -> Result<VisitPhoto> {
        let photo = sqlx::query_as::<_, VisitPhoto>(
            "INSERT INTO visit_photos (visit_id, s3_key, s3_url, thumbnail_s3_key)
             VALUES ($1, $2, $3, $4)
             RETURNING *",
        )
        .bind(visit_id)
        .bind(s3_key)
        .bind(s3_url)
        .bind(thumbnail_s3_key)
        .fetch_one(&self.pool)
        .await?;
        Ok(photo)
    }

    pub async fn list_photos(&self, visit_id: Uuid) -> Result<Vec<VisitPhoto>> {
        let photos = sqlx::query_as::<_, VisitPhoto>(
            "SELECT * FROM visit_photos WHERE visit_id = $1 ORDER BY uploaded_at, id",
        )
        .bind(visit_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(photos)
    }
}

fn push_filters(qb: &mut QueryBuilder<'_, sqlx::Postgres>, filter: &VisitListFilter) {
    if let Some(client_id) = filter.client_id {
        qb.push(" AND v.client_id = ").push_bind(client_id);
    }
    if let Some(staff_id) = filter.staff_id {
        qb.push(" AND v.staff_id = ").push_bind(staff_id);
    }
    if let Some(status) = filter.status {
        qb.push(" AND v.status = ").push_bind(status);
    }
    if let Some(start) = filter.start_date {
        qb.push(" AND COALESCE(v.scheduled_start_time, v.check_in_time) >= ").push_bind(start);
    }
    if let Some(end) = filter.end_date {
        qb.push(" AND COALESCE(v.scheduled_start_time, v.check_in_time) <= ").push_bind(end);
    }
    if let Some(zone_id) = filter.zone_id {
        qb.push(" AND c.zone_id = ").push_bind(zone_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_sql_only_contains_requested_predicates() {
        let filter = VisitListFilter {
            staff_id: Some(Uuid::new_v4()),
            status: Some(VisitStatus::InProgress),
            ..Default::default()
        };
        let mut qb = QueryBuilder::new("SELECT v.* FROM visits v WHERE TRUE");
        push_filters(&mut qb, &filter);
        let sql = qb.sql();
        assert!(sql.contains("v.staff_id = $1"));
        assert!(sql.contains("v.status = $2"));
        assert!(!sql.contains("client_id"));
        assert!(!sql.contains("zone_id"));
    }

    #[test]
    fn test_transition_predecessor_lists_match_dag() {
        let predecessors: Vec<String> = VisitStatus::Completed
            .legal_predecessors()
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();
        assert_eq!(predecessors, vec!["in_progress".to_string()]);

        let cancellable: Vec<String> = VisitStatus::Cancelled
            .legal_predecessors()
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();
        assert_eq!(cancellable, vec!["scheduled".to_string(), "in_progress".to_string()]);
    }
}
