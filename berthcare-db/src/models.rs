//! Row types for every persisted entity.
//!
//! Wire serialization is camelCase; columns that must never leave the
//! server (password and token hashes) are skipped outright.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use berthcare_core::Role;

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub phone: Option<String>,
    pub zone_id: Option<Uuid>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing)]
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub device_id: String,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl RefreshToken {
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at > now
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Zone {
    pub id: Uuid,
    pub name: String,
    pub center_lat: f64,
    pub center_lng: f64,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub phone: Option<String>,
    pub emergency_contact: Option<Value>,
    pub zone_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarePlan {
    pub id: Uuid,
    pub client_id: Uuid,
    pub summary: String,
    pub medications: Value,
    pub allergies: Value,
    pub special_instructions: Option<String>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Visit lifecycle. Transitions form a DAG: `scheduled -> in_progress ->
/// completed`, with `cancelled` reachable from the two non-terminal
/// states. Nothing leaves `completed` or `cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum VisitStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

impl VisitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VisitStatus::Scheduled => "scheduled",
            VisitStatus::InProgress => "in_progress",
            VisitStatus::Completed => "completed",
            VisitStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(VisitStatus::Scheduled),
            "in_progress" => Some(VisitStatus::InProgress),
            "completed" => Some(VisitStatus::Completed),
            "cancelled" => Some(VisitStatus::Cancelled),
            _ => None,
        }
    }

    /// Statuses a visit may move to `self` from. Empty for `scheduled`,
    /// which is only ever an initial state.
    pub fn legal_predecessors(&self) -> &'static [VisitStatus] {
        match self {
            VisitStatus::Scheduled => &[],
            VisitStatus::InProgress => &[VisitStatus::Scheduled],
            VisitStatus::Completed => &[VisitStatus::InProgress],
            VisitStatus::Cancelled => &[VisitStatus::Scheduled, VisitStatus::InProgress],
        }
    }

    pub fn can_transition_to(&self, to: VisitStatus) -> bool {
        to.legal_predecessors().contains(self)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, VisitStatus::Completed | VisitStatus::Cancelled)
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Visit {
    pub id: Uuid,
    pub client_id: Uuid,
    pub staff_id: Uuid,
    pub scheduled_start_time: Option<DateTime<Utc>>,
    pub check_in_time: Option<DateTime<Utc>>,
    pub check_in_lat: Option<f64>,
    pub check_in_lng: Option<f64>,
    pub check_out_time: Option<DateTime<Utc>>,
    pub check_out_lat: Option<f64>,
    pub check_out_lng: Option<f64>,
    pub status: VisitStatus,
    pub duration_minutes: Option<i32>,
    pub copied_from_visit_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitDocumentation {
    pub id: Uuid,
    pub visit_id: Uuid,
    pub vital_signs: Value,
    pub activities: Value,
    pub observations: Option<String>,
    pub concerns: Option<String>,
    pub signature_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitPhoto {
    pub id: Uuid,
    pub visit_id: Uuid,
    pub s3_key: String,
    pub s3_url: String,
    pub thumbnail_s3_key: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub actor_user_id: Uuid,
    pub actor_role: Role,
    pub action: String,
    pub object_type: String,
    pub object_id: Uuid,
    pub changed_fields: Value,
    pub request_id: Option<String>,
    pub source_ip: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum AlertState {
    Pending,
    PrimaryCalling,
    PrimaryNoAnswer,
    SmsSent,
    BackupCalling,
    Resolved,
    Failed,
}

impl AlertState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertState::Pending => "pending",
            AlertState::PrimaryCalling => "primary_calling",
            AlertState::PrimaryNoAnswer => "primary_no_answer",
            AlertState::SmsSent => "sms_sent",
            AlertState::BackupCalling => "backup_calling",
            AlertState::Resolved => "resolved",
            AlertState::Failed => "failed",
        }
    }

    pub fn is_open(&self) -> bool {
        !matches!(self, AlertState::Resolved | AlertState::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum NotificationChannel {
    Voice,
    Sms,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: Uuid,
    pub client_id: Uuid,
    pub raised_by: Uuid,
    pub coordinator_id: Uuid,
    pub backup_coordinator_id: Option<Uuid>,
    pub message: String,
    pub priority: String,
    pub state: AlertState,
    pub primary_called_at: Option<DateTime<Utc>>,
    pub sms_sent_at: Option<DateTime<Utc>>,
    pub backup_called_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub alert_id: Option<Uuid>,
    pub channel: NotificationChannel,
    pub to_phone: String,
    pub body: String,
    pub twilio_sid: Option<String>,
    pub delivery_status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ALL_STATUSES: [VisitStatus; 4] = [
        VisitStatus::Scheduled,
        VisitStatus::InProgress,
        VisitStatus::Completed,
        VisitStatus::Cancelled,
    ];

    #[test]
    fn test_legal_transitions_exactly() {
        use VisitStatus::*;
        let legal: &[(VisitStatus, VisitStatus)] = &[
            (Scheduled, InProgress),
            (Scheduled, Cancelled),
            (InProgress, Completed),
            (InProgress, Cancelled),
        ];
        for from in ALL_STATUSES {
            for to in ALL_STATUSES {
                assert_eq!(
                    from.can_transition_to(to),
                    legal.contains(&(from, to)),
                    "{} -> {}",
                    from.as_str(),
                    to.as_str()
                );
            }
        }
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for terminal in [VisitStatus::Completed, VisitStatus::Cancelled] {
            for to in ALL_STATUSES {
                assert!(!terminal.can_transition_to(to));
            }
        }
    }

    proptest! {
        /// No sequence of legal transitions revisits a status: the
        /// transition graph is a DAG.
        #[test]
        fn test_transition_chains_never_cycle(choices in proptest::collection::vec(0usize..4, 0..8)) {
            let mut current = VisitStatus::Scheduled;
            let mut seen = vec![current];
            for c in choices {
                let to = ALL_STATUSES[c];
                if current.can_transition_to(to) {
                    prop_assert!(!seen.contains(&to), "revisited {}", to.as_str());
                    seen.push(to);
                    current = to;
                }
            }
        }
    }

    #[test]
    fn test_refresh_token_usability() {
        let now = Utc::now();
        let token = RefreshToken {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            token_hash: "abc".into(),
            device_id: "iphone-1".into(),
            expires_at: now + chrono::Duration::days(1),
            revoked_at: None,
            created_at: now,
        };
        assert!(token.is_usable(now));
        assert!(!token.is_usable(now + chrono::Duration::days(2)));
        let revoked = RefreshToken { revoked_at: Some(now), ..token };
        assert!(!revoked.is_usable(now));
    }

    #[test]
    fn test_status_serde_matches_db_spelling() {
        assert_eq!(serde_json::to_value(VisitStatus::InProgress).unwrap(), "in_progress");
        assert_eq!(VisitStatus::parse("in_progress"), Some(VisitStatus::InProgress));
        assert_eq!(serde_json::to_value(AlertState::PrimaryNoAnswer).unwrap(), "primary_no_answer");
    }

    #[test]
    fn test_user_serialization_hides_password_hash() {
        let user = User {
            id: Uuid::new_v4(),
            email: "a@b.c".into(),
            password_hash: "$2b$12$secret".into(),
            first_name: "A".into(),
            last_name: "B".into(),
            role: Role::Admin,
            phone: None,
            zone_id: None,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains("firstName"));
    }
}
