use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use berthcare_api::AppState;
use berthcare_api::services::NotificationService;
use berthcare_auth::KeyStore;
use berthcare_core::AppConfig;
use berthcare_external::geocode::{Geocoder, HttpGeocoder};
use berthcare_external::storage::ObjectStorage;
use berthcare_external::twilio::TwilioClient;

/// Bound on waiting for in-flight work at shutdown.
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(30);

const ESCALATION_SCAN_INTERVAL: Duration = Duration::from_secs(30);

const NOTIFICATION_WORKERS: usize = 2;

fn init_tracing(production: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    if production {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install ctrl-c handler");
    };
    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received, draining");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    init_tracing(config.environment.is_production());

    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        environment = ?config.environment,
        "starting berthcare api"
    );

    // The process must not come up without a usable signing key.
    let keys = Arc::new(KeyStore::from_config(&config.jwt).await?);

    let db = berthcare_db::connect(&config.database).await?;
    berthcare_db::run_migrations(&db).await?;
    tracing::info!("database migrations applied");

    // Redis is advisory: a failed boot connection degrades the cache,
    // blacklist and limiter rather than blocking startup.
    let redis = match berthcare_cache::connect(&config.redis.url).await {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!(error = %e, "redis unreachable at boot, starting degraded");
            berthcare_cache::connect_lazy(&config.redis.url)?
        }
    };

    let storage = Arc::new(ObjectStorage::from_config(&config.storage).await);
    let geocoder: Option<Arc<dyn Geocoder>> = match &config.geocoder {
        Some(cfg) => Some(Arc::new(HttpGeocoder::new(cfg)?)),
        None => None,
    };
    let twilio = match &config.twilio {
        Some(cfg) => Some(TwilioClient::new(cfg)?),
        None => None,
    };

    let addr: SocketAddr =
        format!("{}:{}", config.server.host, config.server.port).parse()?;

    let (state, job_rx) =
        AppState::build(config, db.clone(), redis, keys, storage, geocoder, twilio);

    let mut worker_handles = Vec::new();
    let mut scanner_handle = None;
    if let (Some(service), Some(rx)) = (state.notifications.clone(), job_rx) {
        worker_handles = NotificationService::spawn_workers(service.clone(), rx, NOTIFICATION_WORKERS);
        scanner_handle = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(ESCALATION_SCAN_INTERVAL);
            loop {
                interval.tick().await;
                service.escalation_tick().await;
            }
        }));
    }

    let app = berthcare_api::app(state.clone());
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop feeding the queue, then let the workers drain what remains so
    // Twilio callbacks are not retried against a dead process.
    if let Some(handle) = scanner_handle {
        handle.abort();
    }
    drop(state);
    for handle in worker_handles {
        if tokio::time::timeout(SHUTDOWN_DRAIN, handle).await.is_err() {
            tracing::warn!("notification worker did not drain in time");
        }
    }

    db.close().await;
    tracing::info!("shutdown complete");
    Ok(())
}
