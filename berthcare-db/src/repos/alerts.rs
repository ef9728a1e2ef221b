use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use berthcare_core::Result;

use crate::models::{Alert, AlertState, Notification, NotificationChannel};

#[derive(Debug, Clone)]
pub struct NewAlert {
    pub client_id: Uuid,
    pub raised_by: Uuid,
    pub coordinator_id: Uuid,
    pub backup_coordinator_id: Option<Uuid>,
    pub message: String,
    pub priority: String,
}

#[derive(Clone)]
pub struct AlertRepo {
    pool: PgPool,
}

impl AlertRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, new: &NewAlert) -> Result<Alert> {
        let alert = sqlx::query_as::<_, Alert>(
            "INSERT INTO alerts
                 (client_id, raised_by, coordinator_id, backup_coordinator_id, message, priority)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING *",
        )
        .bind(new.client_id)
        .bind(new.raised_by)
        .bind(new.coordinator_id)
        .bind(new.backup_coordinator_id)
        .bind(&new.message)
        .bind(&new.priority)
        .fetch_one(&self.pool)
        .await?;
        Ok(alert)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Alert>> {
        let alert = sqlx::query_as::<_, Alert>("SELECT * FROM alerts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(alert)
    }

    /// Conditional state change. Returns `None` when the row was no longer
    /// in any of `from` (another worker or a callback won the race); the
    /// per-state timestamp column is stamped on success.
    pub async fn set_state(
        &self,
        id: Uuid,
        from: &[AlertState],
        to: AlertState,
    ) -> Result<Option<Alert>> {
        let stamp_column = match to {
            AlertState::PrimaryCalling => "primary_called_at = now(), ",
            AlertState::SmsSent => "sms_sent_at = now(), ",
            AlertState::BackupCalling => "backup_called_at = now(), ",
            AlertState::Resolved => "resolved_at = now(), ",
            _ => "",
        };
        let from_states: Vec<String> = from.iter().map(|s| s.as_str().to_string()).collect();

        let alert = sqlx::query_as::<_, Alert>(&format!(
            "UPDATE alerts SET {stamp_column}updated_at = now(), state = $2
             WHERE id = $1 AND state = ANY($3::text[])
             RETURNING *"
        ))
        .bind(id)
        .bind(to)
        .bind(from_states)
        .fetch_optional(&self.pool)
        .await?;
        Ok(alert)
    }

    /// Open alerts whose last transition is older than the cutoff for the
    /// given state; the escalation scanner advances these.
    pub async fn find_due(
        &self,
        state: AlertState,
        transitioned_before: DateTime<Utc>,
    ) -> Result<Vec<Alert>> {
        let alerts = sqlx::query_as::<_, Alert>(
            "SELECT * FROM alerts WHERE state = $1 AND updated_at < $2 ORDER BY created_at",
        )
        .bind(state)
        .bind(transitioned_before)
        .fetch_all(&self.pool)
        .await?;
        Ok(alerts)
    }
}

#[derive(Clone)]
pub struct NotificationRepo {
    pool: PgPool,
}

impl NotificationRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(
        &self,
        alert_id: Option<Uuid>,
        channel: NotificationChannel,
        to_phone: &str,
        body: &str,
    ) -> Result<Notification> {
        let row = sqlx::query_as::<_, Notification>(
            "INSERT INTO notifications (alert_id, channel, to_phone, body)
             VALUES ($1, $2, $3, $4)
             RETURNING *",
        )
        .bind(alert_id)
        .bind(channel)
        .bind(to_phone)
        .bind(body)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn set_twilio_sid(&self, id: Uuid, sid: &str, status: &str) -> Result<()> {
        sqlx::query(
            "UPDATE notifications SET twilio_sid = $2, delivery_status = $3, updated_at = now()
             WHERE id = $1",
        )
        .bind(id)
        .bind(sid)
        .bind(status)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_status(&self, id: Uuid, status: &str) -> Result<()> {
        sqlx::query(
            "UPDATE notifications SET delivery_status = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(status)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Status callback handler. Idempotent: a repeated callback with the
    /// same status affects zero rows and reports `false`.
    pub async fn update_status_by_sid(&self, sid: &str, status: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE notifications SET delivery_status = $2, updated_at = now()
             WHERE twilio_sid = $1 AND delivery_status <> $2",
        )
        .bind(sid)
        .bind(status)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn find_by_sid(&self, sid: &str) -> Result<Option<Notification>> {
        let row =
            sqlx::query_as::<_, Notification>("SELECT * FROM notifications WHERE twilio_sid = $1")
                .bind(sid)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row)
    }
}
