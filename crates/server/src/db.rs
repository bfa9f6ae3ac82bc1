use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{info, warn};

use pulse_core::config::PostgresConfig;

/// Create a PostgreSQL connection pool and run migrations.
///
/// Returns `Ok(None)` when Postgres is not configured. A configured but
/// unreachable database is an error, never a fallback.
pub async fn init_pg_pool(config: &PostgresConfig) -> anyhow::Result<Option<PgPool>> {
    if !config.is_configured() {
        warn!("PG_USERNAME not set, using the in-memory store (state is lost on restart)");
        return Ok(None);
    }

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.connection_string())
        .await
        .with_context(|| format!("connecting to PostgreSQL at {}:{}", config.host, config.port))?;
    info!("PostgreSQL connected: {}:{}/{}", config.host, config.port, config.database);

    sqlx::migrate!("../../migrations")
        .run(&pool)
        .await
        .context("running database migrations")?;
    info!("Database migrations applied successfully");

    Ok(Some(pool))
}
