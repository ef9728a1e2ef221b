//! Domain services: authorization decisions, orchestration across
//! repositories/cache/gateways, and write-through invalidation. Handlers
//! stay thin; repositories stay SQL-only.

pub mod clients;
pub mod identity;
pub mod notifications;
pub mod uploads;
pub mod visits;

pub use clients::ClientService;
pub use identity::IdentityService;
pub use notifications::{Job, NotificationService};
pub use uploads::UploadService;
pub use visits::VisitService;

use serde::{Deserialize, Serialize};

/// Paginated list payload shared by clients and visits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

/// Request metadata captured for audit rows.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub request_id: Option<String>,
    pub source_ip: Option<String>,
}
