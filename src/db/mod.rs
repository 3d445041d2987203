pub mod dbproposals;
pub mod dbroutes;

use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Error as SqlxError;
use std::time::Duration;
use tracing::info;

/// Create the PostgreSQL connection pool shared by the stores
pub async fn connect(database_url: &str) -> Result<PgPool, SqlxError> {
    info!("Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(30))
        // Close idle connections after 10 minutes, recycle after 30
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await?;

    info!("Database connection pool created successfully");
    Ok(pool)
}

/// Cheap round trip used by the readiness probe
pub async fn ping(pool: &PgPool) -> Result<(), SqlxError> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}
