use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

use crate::config::Config;

/// Tables of the eBird Basic Dataset copy the Postgres store queries
const EBD_TABLES: [&str; 3] = ["checklists", "observations", "species"];

/// Creates a PostgreSQL connection pool for the eBird Basic Dataset
///
/// Fails early when the database lacks any of the EBD tables, rather than on
/// the first recommendation.
pub async fn create_pool(config: &Config) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(config.db_acquire_timeout_secs))
        .connect(&config.database_url)
        .await?;

    let present: Vec<String> = sqlx::query_scalar(
        "SELECT table_name::text FROM information_schema.tables WHERE table_schema = current_schema()",
    )
    .fetch_all(&pool)
    .await?;

    let missing = missing_tables(&present);
    if !missing.is_empty() {
        anyhow::bail!("database is missing eBird tables: {}", missing.join(", "));
    }

    tracing::debug!(
        max_connections = config.db_max_connections,
        "Connected to eBird Basic Dataset"
    );

    Ok(pool)
}

fn missing_tables(present: &[String]) -> Vec<&'static str> {
    EBD_TABLES
        .into_iter()
        .filter(|table| !present.iter().any(|p| p.as_str() == *table))
        .collect()
}
