//! Cache key construction.
//!
//! Every list key embeds the narrowest principal scope that affects the
//! authorized result set: caregivers key by user, coordinators by zone.
//! Geocode results depend only on the address and are safe to share
//! across principals.

use uuid::Uuid;

pub const CLIENT_DETAIL_TTL_SECS: i64 = 300;
pub const CLIENT_LIST_TTL_SECS: i64 = 300;
pub const VISIT_DETAIL_TTL_SECS: i64 = 300;
pub const VISIT_LIST_TTL_SECS: i64 = 300;
pub const GEOCODE_TTL_SECS: i64 = 86_400;
pub const ZONES_TTL_SECS: i64 = 3_600;

pub const ZONES_ALL: &str = "zones:all";

/// Scope component of a visit list key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitScope {
    Caregiver(Uuid),
    Zone(Uuid),
    All,
}

impl std::fmt::Display for VisitScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VisitScope::Caregiver(id) => write!(f, "caregiver:{id}"),
            VisitScope::Zone(id) => write!(f, "zone:{id}"),
            VisitScope::All => write!(f, "all"),
        }
    }
}

pub fn client_detail(id: Uuid) -> String {
    format!("client:detail:{id}")
}

pub fn client_list(zone: Option<Uuid>, filters: &str, page: i64, limit: i64) -> String {
    format!("clients:list:zone={}:{filters}:{page}:{limit}", zone_part(zone))
}

/// Pattern matching every list key for a zone; used for invalidation.
pub fn client_list_pattern(zone: Option<Uuid>) -> String {
    format!("clients:list:zone={}:*", zone_part(zone))
}

pub fn visit_detail(id: Uuid) -> String {
    format!("visit:detail:{id}")
}

pub fn visit_list(scope: VisitScope, filters: &str, page: i64, limit: i64) -> String {
    format!("visits:list:{scope}:{filters}:{page}:{limit}")
}

pub fn visit_list_pattern(scope: VisitScope) -> String {
    format!("visits:list:{scope}:*")
}

pub fn geocode(address: &str) -> String {
    format!("geocode:{}", address.trim().to_lowercase())
}

fn zone_part(zone: Option<Uuid>) -> String {
    zone.map(|z| z.to_string()).unwrap_or_else(|| "all".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_keys() {
        let id = Uuid::nil();
        assert_eq!(
            client_detail(id),
            "client:detail:00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(
            client_list(Some(id), "", 1, 20),
            "clients:list:zone=00000000-0000-0000-0000-000000000000::1:20"
        );
        assert_eq!(client_list(None, "", 2, 50), "clients:list:zone=all::2:50");
        assert!(client_list(Some(id), "", 1, 20).starts_with(
            client_list_pattern(Some(id)).trim_end_matches('*')
        ));
    }

    #[test]
    fn test_visit_scope_keys_differ_per_principal() {
        let user = Uuid::new_v4();
        let zone = Uuid::new_v4();
        let by_user = visit_list(VisitScope::Caregiver(user), "status=completed", 1, 20);
        let by_zone = visit_list(VisitScope::Zone(zone), "status=completed", 1, 20);
        assert_ne!(by_user, by_zone);
        assert!(by_user.contains(&format!("caregiver:{user}")));
        assert!(by_zone.contains(&format!("zone:{zone}")));
    }

    #[test]
    fn test_geocode_key_is_case_and_whitespace_insensitive() {
        assert_eq!(
            geocode("  100 Queen St W, Toronto "),
            geocode("100 QUEEN st w, toronto")
        );
    }
}
