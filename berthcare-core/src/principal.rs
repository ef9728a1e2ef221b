//! The authenticated identity attached to each request, and the predicates
//! authorization is built from.
//!
//! Roles are a tagged enum with small predicate functions, not a hierarchy.
//! Every read path applies these predicates *after* cache lookups: a cached
//! row the principal may not see is treated exactly like a row they asked
//! for directly.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ApiError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    Caregiver,
    Coordinator,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Caregiver => "caregiver",
            Role::Coordinator => "coordinator",
            Role::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "caregiver" => Some(Role::Caregiver),
            "coordinator" => Some(Role::Coordinator),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }

    /// Caregivers and coordinators work inside exactly one zone; admins
    /// have no zone of their own.
    pub fn requires_zone(&self) -> bool {
        !matches!(self, Role::Admin)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity materialized by the auth middleware for every protected
/// request. Downstream handlers read this from request extensions; they
/// never parse tokens themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: Uuid,
    pub role: Role,
    pub zone_id: Option<Uuid>,
    pub email: Option<String>,
    pub device_id: String,
}

impl Principal {
    /// Reject unless the principal's role is one of `allowed`.
    pub fn require_role(&self, allowed: &[Role]) -> Result<()> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(ApiError::unauthorized(format!(
                "role '{}' may not perform this operation",
                self.role
            )))
        }
    }

    /// Zone predicate: admins are unrestricted; everyone else must match
    /// the entity's zone exactly.
    pub fn can_access_zone(&self, zone_id: Uuid) -> bool {
        match self.role {
            Role::Admin => true,
            _ => self.zone_id == Some(zone_id),
        }
    }

    /// Same as [`can_access_zone`], returning `Forbidden` on mismatch.
    ///
    /// [`can_access_zone`]: Principal::can_access_zone
    pub fn require_zone(&self, zone_id: Uuid) -> Result<()> {
        if self.can_access_zone(zone_id) {
            Ok(())
        } else {
            Err(ApiError::forbidden("entity belongs to another zone"))
        }
    }

    /// Visit ownership predicate: a caregiver sees only visits assigned to
    /// them; coordinators fall back to the zone predicate; admins see all.
    pub fn can_read_visit(&self, staff_id: Uuid, client_zone_id: Uuid) -> bool {
        match self.role {
            Role::Admin => true,
            Role::Coordinator => self.zone_id == Some(client_zone_id),
            Role::Caregiver => self.user_id == staff_id,
        }
    }

    pub fn require_visit_access(&self, staff_id: Uuid, client_zone_id: Uuid) -> Result<()> {
        if self.can_read_visit(staff_id, client_zone_id) {
            Ok(())
        } else {
            Err(ApiError::forbidden("visit is not accessible to this user"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(role: Role, zone: Option<Uuid>) -> Principal {
        Principal {
            user_id: Uuid::new_v4(),
            role,
            zone_id: zone,
            email: Some("user@example.com".to_string()),
            device_id: "iphone-1".to_string(),
        }
    }

    #[test]
    fn test_role_parse_round_trip() {
        for role in [Role::Caregiver, Role::Coordinator, Role::Admin] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("superuser"), None);
    }

    #[test]
    fn test_require_role_rejects_unlisted() {
        let p = principal(Role::Caregiver, Some(Uuid::new_v4()));
        assert!(p.require_role(&[Role::Caregiver, Role::Coordinator]).is_ok());
        let err = p.require_role(&[Role::Admin]).unwrap_err();
        assert_eq!(err.http_status(), 403);
    }

    #[test]
    fn test_zone_predicate_admin_bypasses() {
        let zone = Uuid::new_v4();
        let other = Uuid::new_v4();
        assert!(principal(Role::Admin, None).can_access_zone(zone));
        assert!(principal(Role::Coordinator, Some(zone)).can_access_zone(zone));
        assert!(!principal(Role::Coordinator, Some(zone)).can_access_zone(other));
        assert!(!principal(Role::Caregiver, None).can_access_zone(zone));
    }

    #[test]
    fn test_visit_ownership_for_caregiver_ignores_zone() {
        let zone = Uuid::new_v4();
        let p = principal(Role::Caregiver, Some(zone));
        // Same zone but a different caregiver's visit: still invisible.
        assert!(!p.can_read_visit(Uuid::new_v4(), zone));
        assert!(p.can_read_visit(p.user_id, zone));
    }

    #[test]
    fn test_visit_access_for_coordinator_uses_zone() {
        let zone = Uuid::new_v4();
        let p = principal(Role::Coordinator, Some(zone));
        assert!(p.can_read_visit(Uuid::new_v4(), zone));
        assert!(!p.can_read_visit(Uuid::new_v4(), Uuid::new_v4()));
    }
}
