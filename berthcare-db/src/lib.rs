//! # BerthCare DB
//!
//! Postgres persistence: a single shared connection pool, numbered SQL
//! migrations applied in order at boot, and one repository per aggregate.
//!
//! All queries are parameterized; dynamic PATCH updates are assembled with
//! `sqlx::QueryBuilder` from literal column names, never from caller
//! strings. Conditional `UPDATE … WHERE status = ANY(…)` enforces the
//! visit lifecycle at the row level, so concurrent writers cannot race a
//! visit backwards.

pub mod models;
pub mod repos;

use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};

use berthcare_core::config::DatabaseConfig;

/// Soft per-statement ceiling; long reports belong in a replica, not here.
const STATEMENT_TIMEOUT: &str = "30s";

fn pool_options(cfg: &DatabaseConfig) -> PgPoolOptions {
    PgPoolOptions::new()
        .min_connections(cfg.min_connections)
        .max_connections(cfg.max_connections)
        .acquire_timeout(Duration::from_secs(2))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query(&format!("SET statement_timeout = '{STATEMENT_TIMEOUT}'"))
                    .execute(&mut *conn)
                    .await?;
                Ok(())
            })
        })
}

/// Connect eagerly; fails fast when the database is unreachable at boot.
pub async fn connect(cfg: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    pool_options(cfg).connect(&cfg.url).await
}

/// Build the pool without touching the network. Connections are opened on
/// first acquire; used by tests exercising degraded paths.
pub fn connect_lazy(cfg: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    pool_options(cfg).connect_lazy(&cfg.url)
}

/// Apply pending migrations in order. Each runs inside its own
/// transaction; the paired `.down.sql` files support manual rollback.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// Liveness probe for the health endpoint.
pub async fn ping(pool: &PgPool) -> bool {
    sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(pool).await.is_ok()
}
