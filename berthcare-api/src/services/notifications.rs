//! Voice/SMS alerts with a bounded work queue and an escalation state
//! machine.
//!
//! Raising an alert enqueues a dispatch job and returns immediately; the
//! workers place the Twilio calls. The escalation scanner advances stale
//! alerts: no answer within five minutes sends the SMS, no resolution
//! within ten calls the backup coordinator. Twilio status callbacks (after
//! signature verification in the webhook handler) update delivery rows
//! idempotently and resolve alerts on answered calls.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, mpsc};
use uuid::Uuid;

use berthcare_core::error::FieldError;
use berthcare_core::{ApiError, Principal, Result, Role};
use berthcare_db::models::{Alert, AlertState, NotificationChannel, User};
use berthcare_db::repos::{AlertRepo, ClientRepo, NewAlert, NotificationRepo, UserRepo};
use berthcare_external::twilio::{TwilioClient, voice_twiml};

/// Primary call answered within this window, or we fall back to SMS.
const PRIMARY_ANSWER_WINDOW: chrono::Duration = chrono::Duration::minutes(5);
/// SMS unresolved for this long (ten minutes after the primary call), and
/// the backup coordinator is called.
const SMS_RESOLUTION_WINDOW: chrono::Duration = chrono::Duration::minutes(5);
/// Backup call unanswered for this long marks the alert failed.
const BACKUP_ANSWER_WINDOW: chrono::Duration = chrono::Duration::minutes(10);
/// A dispatch job lost to a crash is retried after this long.
const DISPATCH_RETRY_WINDOW: chrono::Duration = chrono::Duration::minutes(2);

pub const QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    /// Place the primary voice call for a pending alert.
    Dispatch(Uuid),
    /// Primary did not answer: send the SMS.
    SendSms(Uuid),
    /// Still unresolved: call the backup coordinator.
    CallBackup(Uuid),
}

#[derive(Debug, Clone)]
pub struct RaiseAlertInput {
    pub client_id: Uuid,
    pub message: String,
    pub priority: String,
    pub coordinator_id: Uuid,
    pub backup_coordinator_id: Option<Uuid>,
}

#[derive(Clone)]
pub struct NotificationService {
    twilio: TwilioClient,
    alerts: AlertRepo,
    notifications: NotificationRepo,
    users: UserRepo,
    clients: ClientRepo,
    public_base_url: String,
    queue: mpsc::Sender<Job>,
}

impl NotificationService {
    pub fn new(
        twilio: TwilioClient,
        alerts: AlertRepo,
        notifications: NotificationRepo,
        users: UserRepo,
        clients: ClientRepo,
        public_base_url: String,
    ) -> (Self, mpsc::Receiver<Job>) {
        let (queue, rx) = mpsc::channel(QUEUE_CAPACITY);
        let service = Self {
            twilio,
            alerts,
            notifications,
            users,
            clients,
            public_base_url,
            queue,
        };
        (service, rx)
    }

    pub fn twilio_auth_token(&self) -> &str {
        self.twilio.auth_token()
    }

    /// Spawn the worker pool draining the job queue. Workers exit when the
    /// queue closes (all senders dropped at shutdown).
    pub fn spawn_workers(
        service: NotificationService,
        rx: mpsc::Receiver<Job>,
        count: usize,
    ) -> Vec<tokio::task::JoinHandle<()>> {
        let rx = Arc::new(Mutex::new(rx));
        (0..count.max(1))
            .map(|worker| {
                let service = service.clone();
                let rx = Arc::clone(&rx);
                tokio::spawn(async move {
                    loop {
                        let job = { rx.lock().await.recv().await };
                        match job {
                            Some(job) => service.process(job).await,
                            None => break,
                        }
                    }
                    tracing::debug!(worker, "notification worker drained");
                })
            })
            .collect()
    }

    /// Periodic escalation scan; call from a background interval task.
    pub async fn escalation_tick(&self) {
        let now = Utc::now();

        if let Ok(due) = self.alerts.find_due(AlertState::PrimaryCalling, now - PRIMARY_ANSWER_WINDOW).await {
            for alert in due {
                if let Ok(Some(_)) = self
                    .alerts
                    .set_state(alert.id, &[AlertState::PrimaryCalling], AlertState::PrimaryNoAnswer)
                    .await
                {
                    self.enqueue(Job::SendSms(alert.id)).ok();
                }
            }
        }

        if let Ok(due) = self.alerts.find_due(AlertState::SmsSent, now - SMS_RESOLUTION_WINDOW).await {
            for alert in due {
                self.enqueue(Job::CallBackup(alert.id)).ok();
            }
        }

        if let Ok(due) = self.alerts.find_due(AlertState::BackupCalling, now - BACKUP_ANSWER_WINDOW).await {
            for alert in due {
                tracing::warn!(alert_id = %alert.id, "alert unresolved after backup call");
                let _ = self
                    .alerts
                    .set_state(alert.id, &[AlertState::BackupCalling], AlertState::Failed)
                    .await;
            }
        }

        // Dispatch jobs lost between insert and queue drain.
        if let Ok(due) = self.alerts.find_due(AlertState::Pending, now - DISPATCH_RETRY_WINDOW).await {
            for alert in due {
                self.enqueue(Job::Dispatch(alert.id)).ok();
            }
        }
    }

    pub async fn raise_alert(
        &self,
        principal: &Principal,
        input: RaiseAlertInput,
    ) -> Result<Alert> {
        let client = self
            .clients
            .find_by_id(input.client_id)
            .await?
            .ok_or_else(|| ApiError::not_found("client"))?;
        principal.require_zone(client.zone_id)?;

        self.require_reachable_coordinator(input.coordinator_id).await?;
        if let Some(backup_id) = input.backup_coordinator_id {
            self.require_reachable_coordinator(backup_id).await?;
        }

        let alert = self
            .alerts
            .insert(&NewAlert {
                client_id: input.client_id,
                raised_by: principal.user_id,
                coordinator_id: input.coordinator_id,
                backup_coordinator_id: input.backup_coordinator_id,
                message: input.message,
                priority: input.priority,
            })
            .await?;

        self.enqueue(Job::Dispatch(alert.id))?;
        Ok(alert)
    }

    /// Manual resolution by a coordinator or admin. Already-closed alerts
    /// are returned as-is.
    pub async fn resolve_alert(&self, principal: &Principal, alert_id: Uuid) -> Result<Alert> {
        principal.require_role(&[Role::Coordinator, Role::Admin])?;
        let alert = self
            .alerts
            .find_by_id(alert_id)
            .await?
            .ok_or_else(|| ApiError::not_found("alert"))?;
        let client = self
            .clients
            .find_by_id(alert.client_id)
            .await?
            .ok_or_else(|| ApiError::not_found("client"))?;
        principal.require_zone(client.zone_id)?;

        if !alert.state.is_open() {
            return Ok(alert);
        }
        let resolved = self
            .alerts
            .set_state(alert_id, &OPEN_STATES, AlertState::Resolved)
            .await?;
        Ok(resolved.unwrap_or(alert))
    }

    /// Voice status callback, post signature verification. `completed`
    /// means the call was answered and finished, which resolves the alert;
    /// no-answer outcomes are left to the escalation timers.
    pub async fn record_call_status(&self, call_sid: &str, call_status: &str) -> Result<()> {
        let changed = self.notifications.update_status_by_sid(call_sid, call_status).await?;
        if !changed {
            return Ok(());
        }
        if call_status == "completed" {
            if let Some(notification) = self.notifications.find_by_sid(call_sid).await? {
                if let Some(alert_id) = notification.alert_id {
                    let _ =
                        self.alerts.set_state(alert_id, &OPEN_STATES, AlertState::Resolved).await?;
                }
            }
        }
        Ok(())
    }

    pub async fn record_sms_status(&self, message_sid: &str, message_status: &str) -> Result<()> {
        self.notifications.update_status_by_sid(message_sid, message_status).await?;
        Ok(())
    }

    async fn process(&self, job: Job) {
        let result = match job {
            Job::Dispatch(id) => self.dispatch(id).await,
            Job::SendSms(id) => self.send_sms(id).await,
            Job::CallBackup(id) => self.call_backup(id).await,
        };
        if let Err(e) = result {
            tracing::warn!(?job, error = %e, "notification job failed");
        }
    }

    async fn dispatch(&self, alert_id: Uuid) -> Result<()> {
        let Some(alert) = self
            .alerts
            .set_state(alert_id, &[AlertState::Pending], AlertState::PrimaryCalling)
            .await?
        else {
            return Ok(()); // another worker got here first
        };
        let coordinator = self.reachable_coordinator(alert.coordinator_id).await?;
        self.place_call(&alert, &coordinator).await
    }

    async fn send_sms(&self, alert_id: Uuid) -> Result<()> {
        let Some(alert) = self
            .alerts
            .set_state(alert_id, &[AlertState::PrimaryNoAnswer], AlertState::SmsSent)
            .await?
        else {
            return Ok(());
        };
        let coordinator = self.reachable_coordinator(alert.coordinator_id).await?;
        let phone = coordinator.phone.as_deref().unwrap_or_default();

        let notification = self
            .notifications
            .insert(Some(alert.id), NotificationChannel::Sms, phone, &alert.message)
            .await?;
        let callback = format!("{}/v1/webhooks/twilio/sms/status", self.public_base_url);
        match self.twilio.send_sms(phone, &alert.message, Some(&callback)).await {
            Ok(resource) => {
                self.notifications
                    .set_twilio_sid(notification.id, &resource.sid, &resource.status)
                    .await?;
            }
            Err(e) => {
                tracing::warn!(alert_id = %alert.id, error = %e, "alert SMS failed");
                self.notifications.set_status(notification.id, "failed").await.ok();
            }
        }
        Ok(())
    }

    async fn call_backup(&self, alert_id: Uuid) -> Result<()> {
        let Some(alert) = self
            .alerts
            .set_state(alert_id, &[AlertState::SmsSent], AlertState::BackupCalling)
            .await?
        else {
            return Ok(());
        };
        let Some(backup_id) = alert.backup_coordinator_id else {
            tracing::warn!(alert_id = %alert.id, "no backup coordinator, marking alert failed");
            let _ =
                self.alerts.set_state(alert.id, &[AlertState::BackupCalling], AlertState::Failed).await?;
            return Ok(());
        };
        let backup = self.reachable_coordinator(backup_id).await?;
        self.place_call(&alert, &backup).await
    }

    async fn place_call(&self, alert: &Alert, target: &User) -> Result<()> {
        let phone = target.phone.as_deref().unwrap_or_default();
        let notification = self
            .notifications
            .insert(Some(alert.id), NotificationChannel::Voice, phone, &alert.message)
            .await?;

        let twiml = voice_twiml(&alert.message);
        let callback = format!("{}/v1/webhooks/twilio/voice/status", self.public_base_url);
        match self.twilio.start_call(phone, &twiml, Some(&callback)).await {
            Ok(resource) => {
                self.notifications
                    .set_twilio_sid(notification.id, &resource.sid, &resource.status)
                    .await?;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(alert_id = %alert.id, error = %e, "alert call failed");
                self.notifications.set_status(notification.id, "failed").await.ok();
                // Leave the alert where it is; the escalation timer moves
                // it forward.
                Ok(())
            }
        }
    }

    fn enqueue(&self, job: Job) -> Result<()> {
        self.queue.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                ApiError::unavailable("notification queue is full")
            }
            mpsc::error::TrySendError::Closed(_) => {
                ApiError::unavailable("notification workers are shut down")
            }
        })
    }

    async fn require_reachable_coordinator(&self, user_id: Uuid) -> Result<()> {
        self.reachable_coordinator(user_id).await.map(|_| ())
    }

    async fn reachable_coordinator(&self, user_id: Uuid) -> Result<User> {
        let user = self.users.find_by_id(user_id).await?.ok_or_else(|| {
            ApiError::validation(
                "unknown coordinator",
                vec![FieldError::new("coordinatorId", "user does not exist")],
            )
        })?;
        if user.role != Role::Coordinator && user.role != Role::Admin {
            return Err(ApiError::validation(
                "alert target must be a coordinator",
                vec![FieldError::new("coordinatorId", "user is not a coordinator")],
            ));
        }
        if user.phone.as_deref().unwrap_or("").is_empty() {
            return Err(ApiError::validation(
                "coordinator has no phone number on file",
                vec![FieldError::new("coordinatorId", "user has no phone number")],
            ));
        }
        Ok(user)
    }
}

const OPEN_STATES: [AlertState; 5] = [
    AlertState::Pending,
    AlertState::PrimaryCalling,
    AlertState::PrimaryNoAnswer,
    AlertState::SmsSent,
    AlertState::BackupCalling,
];
