//! One repository per aggregate. Repositories own their SQL; services own
//! authorization and orchestration.

mod alerts;
mod audit;
mod care_plans;
mod clients;
mod refresh_tokens;
mod users;
mod visits;
mod zones;

pub use alerts::{AlertRepo, NewAlert, NotificationRepo};
pub use audit::{AuditRepo, NewAuditEntry};
pub use care_plans::{CarePlanChanges, CarePlanRepo};
pub use clients::{ClientChanges, ClientRepo, NewClient};
pub use refresh_tokens::RefreshTokenRepo;
pub use users::{NewUser, UserRepo};
pub use visits::{
    CheckOut, ClientSummary, DocumentationChanges, NewVisit, StaffSummary, VisitDetail,
    VisitListFilter, VisitRepo,
};
pub use zones::ZoneRepo;
