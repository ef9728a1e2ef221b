//! Composition root. Every dependency is constructed in `main`, wired
//! here, and carried through handlers as one cloneable state value. No
//! package-level mutable globals.

use std::sync::Arc;

use sqlx::PgPool;
use tokio::sync::mpsc;

use berthcare_auth::KeyStore;
use berthcare_auth::tokens::TokenService;
use berthcare_cache::{Cache, RateLimiter, TokenBlacklist};
use berthcare_core::AppConfig;
use berthcare_db::repos::{
    AlertRepo, AuditRepo, CarePlanRepo, ClientRepo, NotificationRepo, RefreshTokenRepo, UserRepo,
    VisitRepo, ZoneRepo,
};
use berthcare_external::geocode::Geocoder;
use berthcare_external::storage::ObjectStorage;
use berthcare_external::twilio::TwilioClient;

use crate::services::{
    ClientService, IdentityService, Job, NotificationService, UploadService, VisitService,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: PgPool,
    pub cache: Cache,
    pub blacklist: TokenBlacklist,
    pub rate_limiter: RateLimiter,
    pub tokens: Arc<TokenService>,
    pub identity: IdentityService,
    pub clients: ClientService,
    pub visits: VisitService,
    pub uploads: UploadService,
    /// Absent when Twilio is not configured (development profile); alert
    /// and webhook endpoints respond 503 in that case.
    pub notifications: Option<NotificationService>,
}

impl AppState {
    /// Wire repositories, gateways and services. Returns the notification
    /// job receiver (when Twilio is configured) for `main` to hand to the
    /// worker pool.
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        config: AppConfig,
        db: PgPool,
        redis: fred::prelude::Client,
        keys: Arc<KeyStore>,
        storage: Arc<ObjectStorage>,
        geocoder: Option<Arc<dyn Geocoder>>,
        twilio: Option<TwilioClient>,
    ) -> (Self, Option<mpsc::Receiver<Job>>) {
        let cache = Cache::new(redis.clone());
        let blacklist = TokenBlacklist::new(redis.clone());
        let rate_limiter = RateLimiter::new(redis);
        let tokens = Arc::new(TokenService::new(keys));

        let users = UserRepo::new(db.clone());
        let refresh_tokens = RefreshTokenRepo::new(db.clone());
        let zones = ZoneRepo::new(db.clone());
        let client_repo = ClientRepo::new(db.clone());
        let care_plans = CarePlanRepo::new(db.clone());
        let visit_repo = VisitRepo::new(db.clone());
        let audit = AuditRepo::new(db.clone());
        let alert_repo = AlertRepo::new(db.clone());
        let notification_repo = NotificationRepo::new(db.clone());

        let identity = IdentityService::new(
            users.clone(),
            refresh_tokens,
            zones.clone(),
            Arc::clone(&tokens),
            blacklist.clone(),
        );
        let clients = ClientService::new(
            client_repo.clone(),
            care_plans,
            zones,
            audit,
            cache.clone(),
            geocoder,
        );
        let visits = VisitService::new(visit_repo.clone(), client_repo.clone(), cache.clone());
        let uploads = UploadService::new(storage, visit_repo, cache.clone());

        let (notifications, job_rx) = match twilio {
            Some(twilio) => {
                let (service, rx) = NotificationService::new(
                    twilio,
                    alert_repo,
                    notification_repo,
                    users,
                    client_repo,
                    config.server.public_base_url.clone(),
                );
                (Some(service), Some(rx))
            }
            None => {
                tracing::warn!("twilio is not configured; alerts and webhooks are disabled");
                (None, None)
            }
        };

        let state = Self {
            config: Arc::new(config),
            db,
            cache,
            blacklist,
            rate_limiter,
            tokens,
            identity,
            clients,
            visits,
            uploads,
            notifications,
        };
        (state, job_rx)
    }
}
