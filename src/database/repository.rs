use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::database::manager::DatabaseError;
use crate::database::models::ActionHandlerRecord;

/// Persistence for handler records. Rows are keyed by (type, version); the
/// pair is unique and never rewritten by `insert`.
#[async_trait]
pub trait HandlerRepository: Send + Sync {
    /// All records, optionally of one type
    async fn find_all(&self, handler_type: Option<&str>) -> Result<Vec<ActionHandlerRecord>, DatabaseError>;

    async fn find_one(
        &self,
        handler_type: &str,
        version: &str,
    ) -> Result<Option<ActionHandlerRecord>, DatabaseError>;

    /// New row; an existing (type, version) is `DatabaseError::Conflict`
    async fn insert(&self, record: ActionHandlerRecord) -> Result<ActionHandlerRecord, DatabaseError>;

    /// Overwrite the row with the same (type, version); absent is `NotFound`
    async fn save(&self, record: ActionHandlerRecord) -> Result<ActionHandlerRecord, DatabaseError>;

    /// True iff a row was deleted
    async fn delete(&self, handler_type: &str, version: &str) -> Result<bool, DatabaseError>;

    async fn count(&self) -> Result<i64, DatabaseError>;
}

/// In-process store used when no database is configured, and by tests.
/// Keeps insertion order.
#[derive(Default)]
pub struct MemoryHandlerRepository {
    records: RwLock<Vec<ActionHandlerRecord>>,
}

impl MemoryHandlerRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn same_key(record: &ActionHandlerRecord, handler_type: &str, version: &str) -> bool {
    record.handler_type == handler_type && record.version == version
}

#[async_trait]
impl HandlerRepository for MemoryHandlerRepository {
    async fn find_all(&self, handler_type: Option<&str>) -> Result<Vec<ActionHandlerRecord>, DatabaseError> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|r| handler_type.map_or(true, |t| r.handler_type == t))
            .cloned()
            .collect())
    }

    async fn find_one(
        &self,
        handler_type: &str,
        version: &str,
    ) -> Result<Option<ActionHandlerRecord>, DatabaseError> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .find(|r| same_key(r, handler_type, version))
            .cloned())
    }

    async fn insert(&self, record: ActionHandlerRecord) -> Result<ActionHandlerRecord, DatabaseError> {
        let mut records = self.records.write().await;
        if records
            .iter()
            .any(|r| same_key(r, &record.handler_type, &record.version))
        {
            return Err(DatabaseError::Conflict(format!(
                "handler {} v{} already exists",
                record.handler_type, record.version
            )));
        }
        records.push(record.clone());
        Ok(record)
    }

    async fn save(&self, record: ActionHandlerRecord) -> Result<ActionHandlerRecord, DatabaseError> {
        let mut records = self.records.write().await;
        match records
            .iter_mut()
            .find(|r| same_key(r, &record.handler_type, &record.version))
        {
            Some(existing) => {
                *existing = record.clone();
                Ok(record)
            }
            None => Err(DatabaseError::NotFound(format!(
                "handler {} v{}",
                record.handler_type, record.version
            ))),
        }
    }

    async fn delete(&self, handler_type: &str, version: &str) -> Result<bool, DatabaseError> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| !same_key(r, handler_type, version));
        Ok(records.len() != before)
    }

    async fn count(&self) -> Result<i64, DatabaseError> {
        Ok(self.records.read().await.len() as i64)
    }
}
