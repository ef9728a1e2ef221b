//! Visit service: lifecycle, documentation upserts, smart copy, scoped
//! listing and the cached detail aggregation.
//!
//! Status moves happen through conditional updates in the repository, so
//! a concurrent PATCH cannot regress a visit; this layer decides *what*
//! transition was requested and derives the visit duration at completion.

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use berthcare_cache::keys::{self as cache_keys, VisitScope};
use berthcare_cache::Cache;
use berthcare_core::{ApiError, Principal, Result, Role};
use berthcare_db::models::{Visit, VisitStatus};
use berthcare_db::repos::{
    CheckOut, ClientRepo, DocumentationChanges, NewVisit, VisitDetail, VisitListFilter, VisitRepo,
};

use super::Paginated;

#[derive(Debug, Clone)]
pub struct CreateVisitInput {
    pub client_id: Uuid,
    pub scheduled_start_time: Option<DateTime<Utc>>,
    /// Assigned caregiver for scheduled visits; ignored for check-ins,
    /// which always assign the caller.
    pub staff_id: Option<Uuid>,
    pub check_in_time: Option<DateTime<Utc>>,
    pub check_in_lat: Option<f64>,
    pub check_in_lng: Option<f64>,
    pub copied_from_visit_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateVisitInput {
    pub vital_signs: Option<Value>,
    pub activities: Option<Value>,
    pub observations: Option<String>,
    pub concerns: Option<String>,
    pub check_out_time: Option<DateTime<Utc>>,
    pub check_out_lat: Option<f64>,
    pub check_out_lng: Option<f64>,
    pub status: Option<VisitStatus>,
}

impl UpdateVisitInput {
    fn documentation_changes(&self) -> DocumentationChanges {
        DocumentationChanges {
            vital_signs: self.vital_signs.clone(),
            activities: self.activities.clone(),
            observations: self.observations.clone(),
            concerns: self.concerns.clone(),
            signature_url: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.documentation_changes().is_empty()
            && self.check_out_time.is_none()
            && self.status.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ListVisitsQuery {
    pub client_id: Option<Uuid>,
    pub staff_id: Option<Uuid>,
    pub status: Option<VisitStatus>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

/// Compute `duration_minutes` when both endpoints exist.
fn derive_duration(
    check_in: Option<DateTime<Utc>>,
    check_out: Option<DateTime<Utc>>,
) -> Option<i32> {
    let (check_in, check_out) = (check_in?, check_out?);
    let seconds = (check_out - check_in).num_seconds();
    if seconds < 0 {
        return None;
    }
    Some((seconds / 60) as i32)
}

#[derive(Clone)]
pub struct VisitService {
    visits: VisitRepo,
    clients: ClientRepo,
    cache: Cache,
}

impl VisitService {
    pub fn new(visits: VisitRepo, clients: ClientRepo, cache: Cache) -> Self {
        Self { visits, clients, cache }
    }

    /// Caregiver check-in (immediate `in_progress` visit) or scheduled
    /// visit creation by a coordinator/admin. Smart copy seeds the new
    /// documentation from a prior visit of the *same* client, and only
    /// when the caller could read that prior visit.
    pub async fn create(&self, principal: &Principal, input: CreateVisitInput) -> Result<Visit> {
        let client = self
            .clients
            .find_by_id(input.client_id)
            .await?
            .ok_or_else(|| ApiError::not_found("client"))?;
        principal.require_zone(client.zone_id)?;

        let new_visit = match principal.role {
            Role::Caregiver => NewVisit {
                client_id: client.id,
                staff_id: principal.user_id,
                scheduled_start_time: input.scheduled_start_time,
                check_in_time: Some(input.check_in_time.unwrap_or_else(Utc::now)),
                check_in_lat: input.check_in_lat,
                check_in_lng: input.check_in_lng,
                status: VisitStatus::InProgress,
                copied_from_visit_id: input.copied_from_visit_id,
            },
            Role::Coordinator | Role::Admin => {
                let staff_id = input.staff_id.ok_or_else(|| {
                    ApiError::validation(
                        "staffId is required when scheduling a visit",
                        vec![berthcare_core::error::FieldError::new("staffId", "required")],
                    )
                })?;
                let scheduled = input.scheduled_start_time.ok_or_else(|| {
                    ApiError::validation(
                        "scheduledStartTime is required when scheduling a visit",
                        vec![berthcare_core::error::FieldError::new(
                            "scheduledStartTime",
                            "required",
                        )],
                    )
                })?;
                NewVisit {
                    client_id: client.id,
                    staff_id,
                    scheduled_start_time: Some(scheduled),
                    check_in_time: None,
                    check_in_lat: None,
                    check_in_lng: None,
                    status: VisitStatus::Scheduled,
                    copied_from_visit_id: input.copied_from_visit_id,
                }
            }
        };

        let copy_from = match input.copied_from_visit_id {
            None => None,
            Some(source_id) => {
                let source = self
                    .visits
                    .find_by_id(source_id)
                    .await?
                    .ok_or_else(|| ApiError::not_found("source visit"))?;
                if source.client_id != client.id {
                    return Err(ApiError::forbidden(
                        "documentation can only be copied from the same client",
                    ));
                }
                principal.require_visit_access(source.staff_id, client.zone_id)?;
                Some(source_id)
            }
        };

        let visit = self.visits.create_with_documentation(&new_visit, copy_from).await?;
        self.invalidate_visit_caches(visit.id, visit.staff_id, client.zone_id).await;
        Ok(visit)
    }

    pub async fn update(
        &self,
        principal: &Principal,
        id: Uuid,
        input: UpdateVisitInput,
    ) -> Result<Visit> {
        if input.is_empty() {
            return Err(ApiError::validation("at least one field must be provided", vec![]));
        }

        let visit =
            self.visits.find_by_id(id).await?.ok_or_else(|| ApiError::not_found("visit"))?;
        let zone_id = self
            .visits
            .client_zone(id)
            .await?
            .ok_or_else(|| ApiError::not_found("visit"))?;
        principal.require_visit_access(visit.staff_id, zone_id)?;

        let doc_changes = input.documentation_changes();
        if !doc_changes.is_empty() {
            self.visits.upsert_documentation(id, &doc_changes).await?;
        }

        let check_out = input.check_out_time.map(|time| CheckOut {
            time,
            lat: input.check_out_lat,
            lng: input.check_out_lng,
        });

        let updated = match input.status {
            Some(to) => {
                // Completing a visit checks the caregiver out; an explicit
                // check-out time wins, otherwise now.
                let check_out = match (to, check_out) {
                    (VisitStatus::Completed, None) => {
                        Some(CheckOut { time: Utc::now(), lat: None, lng: None })
                    }
                    (_, co) => co,
                };
                let duration = check_out
                    .and_then(|co| derive_duration(visit.check_in_time, Some(co.time)));
                self.visits.transition(id, to, check_out, duration).await?
            }
            None => match check_out {
                Some(co) => {
                    let duration = derive_duration(visit.check_in_time, Some(co.time));
                    self.visits.set_check_out(id, co, duration).await?
                }
                None => visit.clone(),
            },
        };

        self.invalidate_visit_caches(id, visit.staff_id, zone_id).await;
        Ok(updated)
    }

    pub async fn list(
        &self,
        principal: &Principal,
        query: ListVisitsQuery,
        page: i64,
        limit: i64,
    ) -> Result<Paginated<Visit>> {
        let (scope, filter) = self.scoped_filter(principal, &query)?;

        let filters_key = format!(
            "client={}:staff={}:status={}:start={}:end={}",
            opt(filter.client_id),
            opt(filter.staff_id),
            filter.status.map(|s| s.as_str().to_string()).unwrap_or_else(|| "-".into()),
            filter.start_date.map(|t| t.timestamp().to_string()).unwrap_or_else(|| "-".into()),
            filter.end_date.map(|t| t.timestamp().to_string()).unwrap_or_else(|| "-".into()),
        );
        let key = cache_keys::visit_list(scope, &filters_key, page, limit);
        if let Some(cached) = self.cache.get_json::<Paginated<Visit>>(&key).await {
            return Ok(cached);
        }

        let (items, total) = self.visits.list(&filter, page, limit).await?;
        let result = Paginated { items, total, page, limit };
        self.cache.set_json(&key, &result, cache_keys::VISIT_LIST_TTL_SECS).await;
        Ok(result)
    }

    /// Aggregated detail with cached reads. Authorization runs on the
    /// cached payload exactly as on a fresh one; a hit the principal may
    /// not read is a `FORBIDDEN`, never a leak.
    pub async fn detail(&self, principal: &Principal, id: Uuid) -> Result<VisitDetail> {
        let key = cache_keys::visit_detail(id);
        if let Some(cached) = self.cache.get_json::<VisitDetail>(&key).await {
            principal.require_visit_access(cached.visit.staff_id, cached.client.zone_id)?;
            return Ok(cached);
        }

        let detail =
            self.visits.find_detail(id).await?.ok_or_else(|| ApiError::not_found("visit"))?;
        principal.require_visit_access(detail.visit.staff_id, detail.client.zone_id)?;

        self.cache.set_json(&key, &detail, cache_keys::VISIT_DETAIL_TTL_SECS).await;
        Ok(detail)
    }

    fn scoped_filter(
        &self,
        principal: &Principal,
        query: &ListVisitsQuery,
    ) -> Result<(VisitScope, VisitListFilter)> {
        let mut filter = VisitListFilter {
            client_id: query.client_id,
            staff_id: query.staff_id,
            status: query.status,
            start_date: query.start_date,
            end_date: query.end_date,
            zone_id: None,
        };

        let scope = match principal.role {
            Role::Caregiver => {
                if let Some(requested) = query.staff_id {
                    if requested != principal.user_id {
                        return Err(ApiError::forbidden(
                            "caregivers can only list their own visits",
                        ));
                    }
                }
                filter.staff_id = Some(principal.user_id);
                VisitScope::Caregiver(principal.user_id)
            }
            Role::Coordinator => {
                let zone = principal
                    .zone_id
                    .ok_or_else(|| ApiError::forbidden("user has no zone assignment"))?;
                filter.zone_id = Some(zone);
                VisitScope::Zone(zone)
            }
            Role::Admin => VisitScope::All,
        };
        Ok((scope, filter))
    }

    async fn invalidate_visit_caches(&self, visit_id: Uuid, staff_id: Uuid, zone_id: Uuid) {
        self.cache.delete(&cache_keys::visit_detail(visit_id)).await;
        self.cache
            .invalidate_pattern(&cache_keys::visit_list_pattern(VisitScope::Caregiver(staff_id)))
            .await;
        self.cache
            .invalidate_pattern(&cache_keys::visit_list_pattern(VisitScope::Zone(zone_id)))
            .await;
        self.cache.invalidate_pattern(&cache_keys::visit_list_pattern(VisitScope::All)).await;
    }
}

fn opt(id: Option<Uuid>) -> String {
    id.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_is_floored_minutes() {
        let check_in = Utc::now();
        let check_out = check_in + chrono::Duration::seconds(45 * 60 + 59);
        assert_eq!(derive_duration(Some(check_in), Some(check_out)), Some(45));
        assert_eq!(derive_duration(Some(check_in), Some(check_in)), Some(0));
    }

    #[test]
    fn test_duration_requires_both_endpoints() {
        let now = Utc::now();
        assert_eq!(derive_duration(None, Some(now)), None);
        assert_eq!(derive_duration(Some(now), None), None);
        // A check-out before check-in is bad data, not a negative duration.
        assert_eq!(derive_duration(Some(now), Some(now - chrono::Duration::minutes(5))), None);
    }

    #[test]
    fn test_update_input_emptiness() {
        assert!(UpdateVisitInput::default().is_empty());
        let with_status =
            UpdateVisitInput { status: Some(VisitStatus::Completed), ..Default::default() };
        assert!(!with_status.is_empty());
    }
}
