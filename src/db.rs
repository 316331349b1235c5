//! PostgreSQL pool for the report store

use anyhow::{Context, Result};
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    PgPool,
};
use std::str::FromStr;
use std::time::{Duration, Instant};

use crate::config::Settings;

/// Open the pool. Every connection carries a server-side `statement_timeout`
/// equal to the request deadline, so a query abandoned by a cancelled
/// request cannot keep running after its connection is returned.
pub async fn create_pool(settings: &Settings) -> Result<PgPool> {
    let statement_timeout = format!("{}s", settings.request_timeout_seconds.max(1));
    let connect_options = PgConnectOptions::from_str(&settings.database_url)
        .context("Invalid DATABASE_URL")?
        .application_name("building-report-backend")
        .options([("statement_timeout", statement_timeout.as_str())]);

    let pool = PgPoolOptions::new()
        .max_connections(settings.database_max_connections)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(settings.database_acquire_timeout_seconds))
        .idle_timeout(Duration::from_secs(300))
        .connect_with(connect_options)
        .await
        .context("Failed to connect to PostgreSQL")?;

    tracing::info!(
        max_connections = settings.database_max_connections,
        statement_timeout = %statement_timeout,
        "Report store pool ready"
    );

    Ok(pool)
}

/// `true` when a trivial query round-trips. Slow answers are logged.
pub async fn health_check(pool: &PgPool) -> bool {
    let started = Instant::now();
    match sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(pool).await {
        Ok(_) => {
            let elapsed = started.elapsed();
            if elapsed > Duration::from_millis(500) {
                tracing::warn!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Report store is slow to answer"
                );
            }
            true
        }
        Err(e) => {
            tracing::error!(error = %e, "Report store health check failed");
            false
        }
    }
}
