// Client-side persistence: the key/value store and the table collection built on it

pub mod local;
pub mod tables;

pub use local::{load_json, save_json, FileStore, LocalStore, MemoryStore};
pub use tables::{ListenerHandle, TableStorage, TABLE_STORAGE_KEY};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Stored value for '{key}' is unreadable: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),
}
