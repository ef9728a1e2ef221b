//! Client service: CRUD, care plans, geocoding and cache discipline.
//!
//! Addresses are geocoded before any row is written, so a client always
//! carries coordinates and a zone consistent with them (unless an admin
//! pinned the zone explicitly). Every write invalidates the detail key
//! and the list patterns of each affected zone after the transaction has
//! committed.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use berthcare_cache::{Cache, keys as cache_keys};
use berthcare_core::error::FieldError;
use berthcare_core::{ApiError, Patch, Principal, Result, Role};
use berthcare_db::models::{CarePlan, Client, Zone};
use berthcare_db::repos::{
    AuditRepo, CarePlanChanges, CarePlanRepo, ClientChanges, ClientRepo, NewAuditEntry, NewClient,
    ZoneRepo,
};
use berthcare_external::geocode::{self, GeoPoint, Geocoder};

use super::{Paginated, RequestMeta};

#[derive(Debug, Clone)]
pub struct CreateClientInput {
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub address: String,
    pub phone: Option<String>,
    pub emergency_contact: Option<Value>,
    /// Admin-only explicit zone override.
    pub zone_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateClientInput {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub address: Option<String>,
    pub zone_id: Option<Uuid>,
    pub phone: Patch<String>,
    pub emergency_contact: Patch<Value>,
}

impl UpdateClientInput {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.date_of_birth.is_none()
            && self.address.is_none()
            && self.zone_id.is_none()
            && self.phone.is_missing()
            && self.emergency_contact.is_missing()
    }
}

/// Client plus its current care plan, the cached detail payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientWithPlan {
    #[serde(flatten)]
    pub client: Client,
    pub care_plan: Option<CarePlan>,
}

#[derive(Clone)]
pub struct ClientService {
    clients: ClientRepo,
    care_plans: CarePlanRepo,
    zones: ZoneRepo,
    audit: AuditRepo,
    cache: Cache,
    geocoder: Option<Arc<dyn Geocoder>>,
}

impl ClientService {
    pub fn new(
        clients: ClientRepo,
        care_plans: CarePlanRepo,
        zones: ZoneRepo,
        audit: AuditRepo,
        cache: Cache,
        geocoder: Option<Arc<dyn Geocoder>>,
    ) -> Self {
        Self { clients, care_plans, zones, audit, cache, geocoder }
    }

    pub async fn create(
        &self,
        principal: &Principal,
        input: CreateClientInput,
        meta: &RequestMeta,
    ) -> Result<ClientWithPlan> {
        if self
            .clients
            .find_duplicate(&input.first_name, &input.last_name, input.date_of_birth, None)
            .await?
            .is_some()
        {
            return Err(ApiError::DuplicateClient);
        }

        let point = self.geocode_cached(&input.address).await?;
        if !geocode::within_service_area(point.latitude, point.longitude) {
            return Err(ApiError::OutsideServiceArea);
        }

        let zone_id = match input.zone_id {
            Some(zone_id) => {
                self.require_zone_exists(zone_id).await?;
                zone_id
            }
            None => self.assign_zone(&point).await?,
        };

        let (client, plan) = self
            .clients
            .insert_with_care_plan(&NewClient {
                first_name: input.first_name,
                last_name: input.last_name,
                date_of_birth: input.date_of_birth,
                address: point.formatted_address,
                latitude: point.latitude,
                longitude: point.longitude,
                phone: input.phone,
                emergency_contact: input.emergency_contact,
                zone_id,
            })
            .await?;

        self.invalidate_lists(&[client.zone_id]).await;
        self.write_audit(principal, "client.create", client.id, json!({}), meta).await;

        Ok(ClientWithPlan { client, care_plan: Some(plan) })
    }

    /// Detail read with write-through cache. The zone predicate runs on
    /// every path: a cached row the principal may not see is a 404, the
    /// same as a direct read.
    pub async fn get(&self, principal: &Principal, id: Uuid) -> Result<ClientWithPlan> {
        let key = cache_keys::client_detail(id);
        if let Some(cached) = self.cache.get_json::<ClientWithPlan>(&key).await {
            if !principal.can_access_zone(cached.client.zone_id) {
                return Err(ApiError::not_found("client"));
            }
            return Ok(cached);
        }

        let client =
            self.clients.find_by_id(id).await?.ok_or_else(|| ApiError::not_found("client"))?;
        if !principal.can_access_zone(client.zone_id) {
            return Err(ApiError::not_found("client"));
        }
        let care_plan = self.care_plans.find_by_client(id).await?;

        let detail = ClientWithPlan { client, care_plan };
        self.cache.set_json(&key, &detail, cache_keys::CLIENT_DETAIL_TTL_SECS).await;
        Ok(detail)
    }

    pub async fn list(
        &self,
        principal: &Principal,
        requested_zone: Option<Uuid>,
        page: i64,
        limit: i64,
    ) -> Result<Paginated<Client>> {
        let zone = self.effective_list_zone(principal, requested_zone)?;

        let key = cache_keys::client_list(zone, "", page, limit);
        if let Some(cached) = self.cache.get_json::<Paginated<Client>>(&key).await {
            return Ok(cached);
        }

        let (items, total) = self.clients.list(zone, page, limit).await?;
        let result = Paginated { items, total, page, limit };
        self.cache.set_json(&key, &result, cache_keys::CLIENT_LIST_TTL_SECS).await;
        Ok(result)
    }

    pub async fn update(
        &self,
        principal: &Principal,
        id: Uuid,
        input: UpdateClientInput,
        meta: &RequestMeta,
    ) -> Result<Client> {
        if input.is_empty() {
            return Err(ApiError::validation(
                "at least one field must be provided",
                vec![],
            ));
        }
        if principal.role == Role::Coordinator && input.zone_id.is_some() {
            return Err(ApiError::forbidden("coordinators cannot reassign zones"));
        }

        let existing =
            self.clients.find_by_id(id).await?.ok_or_else(|| ApiError::not_found("client"))?;
        if !principal.can_access_zone(existing.zone_id) {
            return Err(ApiError::not_found("client"));
        }

        // Identity change re-runs the duplicate heuristic against the
        // would-be identity.
        if input.first_name.is_some() || input.last_name.is_some() || input.date_of_birth.is_some()
        {
            let first = input.first_name.as_deref().unwrap_or(&existing.first_name);
            let last = input.last_name.as_deref().unwrap_or(&existing.last_name);
            let dob = input.date_of_birth.unwrap_or(existing.date_of_birth);
            if self.clients.find_duplicate(first, last, dob, Some(id)).await?.is_some() {
                return Err(ApiError::DuplicateClient);
            }
        }

        let mut changes = ClientChanges {
            first_name: input.first_name,
            last_name: input.last_name,
            date_of_birth: input.date_of_birth,
            phone: input.phone,
            emergency_contact: input.emergency_contact,
            ..Default::default()
        };

        if let Some(address) = &input.address {
            let point = self.geocode_cached(address).await?;
            if !geocode::within_service_area(point.latitude, point.longitude) {
                return Err(ApiError::OutsideServiceArea);
            }
            changes.address = Some(point.formatted_address.clone());
            changes.latitude = Some(point.latitude);
            changes.longitude = Some(point.longitude);
            // Re-assign by the new coordinates unless the admin pinned a
            // zone in the same request.
            changes.zone_id = match input.zone_id {
                Some(zone_id) => {
                    self.require_zone_exists(zone_id).await?;
                    Some(zone_id)
                }
                None => Some(self.assign_zone(&point).await?),
            };
        } else if let Some(zone_id) = input.zone_id {
            self.require_zone_exists(zone_id).await?;
            changes.zone_id = Some(zone_id);
        }

        let updated = self.clients.update(id, &changes).await?;

        self.cache.delete(&cache_keys::client_detail(id)).await;
        let mut zones = vec![existing.zone_id];
        if updated.zone_id != existing.zone_id {
            zones.push(updated.zone_id);
        }
        self.invalidate_lists(&zones).await;

        let diff = client_diff(&existing, &updated);
        self.write_audit(principal, "client.update", id, diff, meta).await;

        Ok(updated)
    }

    pub async fn update_care_plan(
        &self,
        principal: &Principal,
        client_id: Uuid,
        changes: CarePlanChanges,
        meta: &RequestMeta,
    ) -> Result<CarePlan> {
        if changes.is_empty() {
            return Err(ApiError::validation("at least one field must be provided", vec![]));
        }
        let client = self
            .clients
            .find_by_id(client_id)
            .await?
            .ok_or_else(|| ApiError::not_found("client"))?;
        if !principal.can_access_zone(client.zone_id) {
            return Err(ApiError::not_found("client"));
        }

        let plan = self.care_plans.update_for_client(client_id, &changes).await?;

        self.cache.delete(&cache_keys::client_detail(client_id)).await;
        self.write_audit(
            principal,
            "care_plan.update",
            plan.id,
            json!({ "version": { "old": plan.version - 1, "new": plan.version } }),
            meta,
        )
        .await;

        Ok(plan)
    }

    pub async fn zones_cached(&self) -> Result<Vec<Zone>> {
        if let Some(zones) = self.cache.get_json::<Vec<Zone>>(cache_keys::ZONES_ALL).await {
            return Ok(zones);
        }
        let zones = self.zones.list_all().await?;
        self.cache.set_json(cache_keys::ZONES_ALL, &zones, cache_keys::ZONES_TTL_SECS).await;
        Ok(zones)
    }

    async fn geocode_cached(&self, address: &str) -> Result<GeoPoint> {
        let key = cache_keys::geocode(address);
        if let Some(hit) = self.cache.get_json::<GeoPoint>(&key).await {
            return Ok(hit);
        }
        let geocoder = self
            .geocoder
            .as_ref()
            .ok_or_else(|| ApiError::unavailable("geocoding is not configured"))?;
        let point = geocoder.geocode(address).await?;
        self.cache.set_json(&key, &point, cache_keys::GEOCODE_TTL_SECS).await;
        Ok(point)
    }

    async fn assign_zone(&self, point: &GeoPoint) -> Result<Uuid> {
        let zones = self.zones_cached().await?;
        let centers: Vec<(Uuid, f64, f64)> =
            zones.iter().map(|z| (z.id, z.center_lat, z.center_lng)).collect();
        geocode::nearest_zone(point.latitude, point.longitude, &centers)
            .ok_or_else(|| ApiError::internal("no zones are configured"))
    }

    async fn require_zone_exists(&self, zone_id: Uuid) -> Result<()> {
        if self.zones.find_by_id(zone_id).await?.is_none() {
            return Err(ApiError::validation(
                "unknown zone",
                vec![FieldError::new("zoneId", "zone does not exist")],
            ));
        }
        Ok(())
    }

    fn effective_list_zone(
        &self,
        principal: &Principal,
        requested: Option<Uuid>,
    ) -> Result<Option<Uuid>> {
        match principal.role {
            Role::Admin => Ok(requested),
            _ => {
                let own = principal
                    .zone_id
                    .ok_or_else(|| ApiError::forbidden("user has no zone assignment"))?;
                match requested {
                    Some(zone) if zone != own => {
                        Err(ApiError::forbidden("cannot list clients of another zone"))
                    }
                    _ => Ok(Some(own)),
                }
            }
        }
    }

    /// List keys for every affected zone plus the unscoped admin view.
    async fn invalidate_lists(&self, zones: &[Uuid]) {
        for zone in zones {
            self.cache.invalidate_pattern(&cache_keys::client_list_pattern(Some(*zone))).await;
        }
        self.cache.invalidate_pattern(&cache_keys::client_list_pattern(None)).await;
    }

    async fn write_audit(
        &self,
        principal: &Principal,
        action: &str,
        object_id: Uuid,
        changed_fields: Value,
        meta: &RequestMeta,
    ) {
        let entry = NewAuditEntry {
            actor_user_id: principal.user_id,
            actor_role: principal.role,
            action: action.to_string(),
            object_type: "client".to_string(),
            object_id,
            changed_fields,
            request_id: meta.request_id.clone(),
            source_ip: meta.source_ip.clone(),
        };
        // Audit persistence failure must not fail the write it describes.
        if let Err(e) = self.audit.insert(&entry).await {
            tracing::warn!(action, object_id = %object_id, error = %e, "audit write failed");
        }
    }
}

/// `{field: {old, new}}` for every field the update actually changed.
fn client_diff(old: &Client, new: &Client) -> Value {
    let mut diff = serde_json::Map::new();
    let mut push = |field: &str, old_v: Value, new_v: Value| {
        if old_v != new_v {
            diff.insert(field.to_string(), json!({ "old": old_v, "new": new_v }));
        }
    };
    push("firstName", json!(old.first_name), json!(new.first_name));
    push("lastName", json!(old.last_name), json!(new.last_name));
    push("dateOfBirth", json!(old.date_of_birth), json!(new.date_of_birth));
    push("address", json!(old.address), json!(new.address));
    push("latitude", json!(old.latitude), json!(new.latitude));
    push("longitude", json!(old.longitude), json!(new.longitude));
    push("phone", json!(old.phone), json!(new.phone));
    push("emergencyContact", old.emergency_contact.clone().unwrap_or(Value::Null), new.emergency_contact.clone().unwrap_or(Value::Null));
    push("zoneId", json!(old.zone_id), json!(new.zone_id));
    Value::Object(diff)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn client(zone: Uuid) -> Client {
        Client {
            id: Uuid::new_v4(),
            first_name: "John".into(),
            last_name: "Doe".into(),
            date_of_birth: NaiveDate::from_ymd_opt(1950, 3, 14).unwrap(),
            address: "100 Queen St W, Toronto".into(),
            latitude: 43.65,
            longitude: -79.38,
            phone: None,
            emergency_contact: None,
            zone_id: zone,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_client_diff_captures_old_and_new() {
        let zone = Uuid::new_v4();
        let old = client(zone);
        let mut new = old.clone();
        new.address = "999 Robson St, Vancouver".to_string();
        new.zone_id = Uuid::new_v4();

        let diff = client_diff(&old, &new);
        assert_eq!(diff["address"]["old"], "100 Queen St W, Toronto");
        assert_eq!(diff["address"]["new"], "999 Robson St, Vancouver");
        assert!(diff.get("zoneId").is_some());
        assert!(diff.get("firstName").is_none(), "unchanged fields stay out of the diff");
    }

    #[test]
    fn test_update_input_emptiness() {
        assert!(UpdateClientInput::default().is_empty());
        let input = UpdateClientInput { phone: Patch::Null, ..Default::default() };
        assert!(!input.is_empty());
    }
}
