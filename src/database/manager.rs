use std::time::Duration;

use sqlx::{postgres::PgPoolOptions, PgPool};
use thiserror::Error;
use tracing::info;

use crate::config::DatabaseConfig;

/// Errors from the handler store's persistence layer
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Invalid database URL")]
    InvalidDatabaseUrl,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Connection pool setup for the handler store
pub struct DatabaseManager;

impl DatabaseManager {
    /// Open a pool against `database.url`
    pub async fn connect(database: &DatabaseConfig) -> Result<PgPool, DatabaseError> {
        let raw = database
            .url
            .as_deref()
            .ok_or(DatabaseError::ConfigMissing("DATABASE_URL"))?;
        let url = url::Url::parse(raw).map_err(|_| DatabaseError::InvalidDatabaseUrl)?;
        if !matches!(url.scheme(), "postgres" | "postgresql") {
            return Err(DatabaseError::InvalidDatabaseUrl);
        }

        let pool = PgPoolOptions::new()
            .max_connections(database.max_connections)
            .acquire_timeout(Duration::from_secs(database.connection_timeout))
            .connect(url.as_str())
            .await?;

        info!(
            "Created database pool for: {}",
            url.path().trim_start_matches('/')
        );
        Ok(pool)
    }

    /// Pings the pool to ensure connectivity
    pub async fn health_check(pool: &PgPool) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1").execute(pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn database(url: Option<&str>) -> DatabaseConfig {
        DatabaseConfig {
            url: url.map(String::from),
            max_connections: 1,
            connection_timeout: 1,
        }
    }

    #[tokio::test]
    async fn rejects_missing_and_invalid_urls() {
        assert!(matches!(
            DatabaseManager::connect(&database(None)).await,
            Err(DatabaseError::ConfigMissing("DATABASE_URL"))
        ));
        assert!(matches!(
            DatabaseManager::connect(&database(Some("not a url"))).await,
            Err(DatabaseError::InvalidDatabaseUrl)
        ));
        assert!(matches!(
            DatabaseManager::connect(&database(Some("mysql://localhost/db"))).await,
            Err(DatabaseError::InvalidDatabaseUrl)
        ));
    }
}
