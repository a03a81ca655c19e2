use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use crate::actions::types::TableData;
use crate::storage::local::{load_json, save_json, LocalStore};
use crate::storage::StorageError;

pub const TABLE_STORAGE_KEY: &str = "stored_tables";

type Listener = Arc<dyn Fn(&[TableData]) + Send + Sync>;
type Listeners = Mutex<Vec<(u64, Listener)>>;

/// Collection of generated tables kept in local storage, with change listeners
pub struct TableStorage {
    store: Arc<dyn LocalStore>,
    key: String,
    tables: RwLock<Vec<TableData>>,
    listeners: Arc<Listeners>,
    next_listener: Mutex<u64>,
}

/// Returned by `add_listener`; call `unsubscribe` to stop notifications
pub struct ListenerHandle {
    id: u64,
    listeners: Weak<Listeners>,
}

impl ListenerHandle {
    pub fn unsubscribe(self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.lock().retain(|(id, _)| *id != self.id);
        }
    }
}

impl TableStorage {
    pub fn open(store: Arc<dyn LocalStore>) -> Self {
        Self::with_key(store, TABLE_STORAGE_KEY)
    }

    pub fn with_key(store: Arc<dyn LocalStore>, key: &str) -> Self {
        let storage = Self {
            store,
            key: key.to_string(),
            tables: RwLock::new(Vec::new()),
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_listener: Mutex::new(0),
        };
        storage.load();
        storage
    }

    /// Reload from the backing store; unreadable content resets to empty
    fn load(&self) {
        let loaded = match load_json::<Vec<TableData>>(self.store.as_ref(), &self.key) {
            Ok(Some(tables)) => tables,
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!("Resetting stored tables: {}", e);
                Vec::new()
            }
        };
        *self.tables.write() = loaded;
        if let Err(e) = self.persist() {
            tracing::error!("Error saving tables to local storage: {}", e);
        }
    }

    fn persist(&self) -> Result<(), StorageError> {
        let tables = self.tables.read();
        save_json(self.store.as_ref(), &self.key, &*tables)
    }

    fn notify(&self) {
        let snapshot = self.get_tables();
        let listeners: Vec<Listener> = self.listeners.lock().iter().map(|(_, l)| l.clone()).collect();
        for listener in listeners {
            listener(&snapshot);
        }
    }

    pub fn get_tables(&self) -> Vec<TableData> {
        self.tables.read().clone()
    }

    pub fn get_table_by_key(&self, key: &str) -> Option<TableData> {
        self.tables.read().iter().find(|t| t.key == key).cloned()
    }

    pub fn get_table_by_title(&self, title: &str) -> Option<TableData> {
        self.tables.read().iter().find(|t| t.title == title).cloned()
    }

    pub fn has_table(&self, key: &str) -> bool {
        self.tables.read().iter().any(|t| t.key == key)
    }

    /// Insert or replace by key
    pub fn save_table(&self, table: TableData) -> Result<(), StorageError> {
        {
            let mut tables = self.tables.write();
            match tables.iter_mut().find(|t| t.key == table.key) {
                Some(existing) => *existing = table,
                None => tables.push(table),
            }
        }
        self.persist()?;
        self.notify();
        Ok(())
    }

    pub fn remove_table(&self, key: &str) -> Result<(), StorageError> {
        self.tables.write().retain(|t| t.key != key);
        self.persist()?;
        self.notify();
        Ok(())
    }

    pub fn clear(&self) -> Result<(), StorageError> {
        self.tables.write().clear();
        self.persist()?;
        self.notify();
        Ok(())
    }

    /// Re-read storage after out-of-band writes and tell listeners
    pub fn synchronize(&self) {
        self.load();
        self.notify();
    }

    pub fn add_listener(&self, listener: impl Fn(&[TableData]) + Send + Sync + 'static) -> ListenerHandle {
        let id = {
            let mut next = self.next_listener.lock();
            *next += 1;
            *next
        };
        self.listeners.lock().push((id, Arc::new(listener)));
        ListenerHandle {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }
}
