use async_trait::async_trait;
use sqlx::PgPool;
use tracing::info;

use crate::database::manager::DatabaseError;
use crate::database::models::ActionHandlerRecord;
use crate::database::repository::HandlerRepository;

const COLUMNS: &str = "id, type, name, description, version, enabled, settings, icon, code, \
                       frontend_version, created_at, updated_at";

/// Postgres-backed handler store, table `action_handlers`
pub struct PgHandlerRepository {
    pool: PgPool,
}

impl PgHandlerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the table and its (type, version) uniqueness if missing
    pub async fn ensure_schema(&self) -> Result<(), DatabaseError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS action_handlers (
                id UUID PRIMARY KEY,
                type TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT,
                version TEXT NOT NULL,
                enabled BOOLEAN NOT NULL DEFAULT TRUE,
                settings JSONB NOT NULL DEFAULT '{}'::jsonb,
                icon TEXT,
                code TEXT,
                frontend_version TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                CONSTRAINT action_handlers_type_version_key UNIQUE (type, version)
            )",
        )
        .execute(&self.pool)
        .await?;

        info!("Ensured action_handlers table");
        Ok(())
    }
}

fn map_write_error(err: sqlx::Error, record: &ActionHandlerRecord) -> DatabaseError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => DatabaseError::Conflict(format!(
            "handler {} v{} already exists",
            record.handler_type, record.version
        )),
        _ => DatabaseError::Sqlx(err),
    }
}

#[async_trait]
impl HandlerRepository for PgHandlerRepository {
    async fn find_all(&self, handler_type: Option<&str>) -> Result<Vec<ActionHandlerRecord>, DatabaseError> {
        let records = match handler_type {
            Some(t) => {
                sqlx::query_as::<_, ActionHandlerRecord>(&format!(
                    "SELECT {} FROM action_handlers WHERE type = $1 ORDER BY created_at",
                    COLUMNS
                ))
                .bind(t)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, ActionHandlerRecord>(&format!(
                    "SELECT {} FROM action_handlers ORDER BY created_at",
                    COLUMNS
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(records)
    }

    async fn find_one(
        &self,
        handler_type: &str,
        version: &str,
    ) -> Result<Option<ActionHandlerRecord>, DatabaseError> {
        let record = sqlx::query_as::<_, ActionHandlerRecord>(&format!(
            "SELECT {} FROM action_handlers WHERE type = $1 AND version = $2",
            COLUMNS
        ))
        .bind(handler_type)
        .bind(version)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn insert(&self, record: ActionHandlerRecord) -> Result<ActionHandlerRecord, DatabaseError> {
        sqlx::query_as::<_, ActionHandlerRecord>(&format!(
            "INSERT INTO action_handlers ({cols})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
             RETURNING {cols}",
            cols = COLUMNS
        ))
        .bind(record.id)
        .bind(&record.handler_type)
        .bind(&record.name)
        .bind(&record.description)
        .bind(&record.version)
        .bind(record.enabled)
        .bind(&record.settings)
        .bind(&record.icon)
        .bind(&record.code)
        .bind(&record.frontend_version)
        .bind(record.created_at)
        .bind(record.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_write_error(e, &record))
    }

    async fn save(&self, record: ActionHandlerRecord) -> Result<ActionHandlerRecord, DatabaseError> {
        let saved = sqlx::query_as::<_, ActionHandlerRecord>(&format!(
            "UPDATE action_handlers
             SET name = $3, description = $4, enabled = $5, settings = $6, icon = $7,
                 code = $8, frontend_version = $9, updated_at = $10
             WHERE type = $1 AND version = $2
             RETURNING {}",
            COLUMNS
        ))
        .bind(&record.handler_type)
        .bind(&record.version)
        .bind(&record.name)
        .bind(&record.description)
        .bind(record.enabled)
        .bind(&record.settings)
        .bind(&record.icon)
        .bind(&record.code)
        .bind(&record.frontend_version)
        .bind(record.updated_at)
        .fetch_optional(&self.pool)
        .await?;

        saved.ok_or_else(|| {
            DatabaseError::NotFound(format!("handler {} v{}", record.handler_type, record.version))
        })
    }

    async fn delete(&self, handler_type: &str, version: &str) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM action_handlers WHERE type = $1 AND version = $2")
            .bind(handler_type)
            .bind(version)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count(&self) -> Result<i64, DatabaseError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM action_handlers")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
