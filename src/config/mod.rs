use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

use crate::versioning::CryptoError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub security: SecurityConfig,
    pub sync: SyncConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub enable_cors: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Absent means the in-memory handler store
    pub url: Option<String>,
    pub max_connections: u32,
    pub connection_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(skip_serializing)]
    pub handler_encryption_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub api_url: String,
    pub interval_ms: u64,
    pub frontend_version: String,
    #[serde(skip_serializing)]
    pub decryption_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub export_dir: PathBuf,
    pub saved_items_max: u64,
}

const DEV_ENCRYPTION_KEY: &str = "dev-handler-encryption-key";

impl AppConfig {
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Server overrides
        if let Ok(v) = env::var("ACTIONS_PORT").or_else(|_| env::var("PORT")) {
            self.server.port = v.parse().unwrap_or(self.server.port);
        }
        if let Ok(v) = env::var("ACTIONS_ENABLE_CORS") {
            self.server.enable_cors = v.parse().unwrap_or(self.server.enable_cors);
        }

        // Database overrides
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = Some(v).filter(|s| !s.trim().is_empty());
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }

        // Security overrides
        if let Ok(v) = env::var("HANDLER_ENCRYPTION_KEY") {
            self.security.handler_encryption_key = Some(v).filter(|s| !s.is_empty());
        }

        // Sync overrides
        if let Ok(v) = env::var("ACTIONS_SYNC_API_URL") {
            self.sync.api_url = v;
        }
        if let Ok(v) = env::var("ACTIONS_SYNC_INTERVAL_MS") {
            self.sync.interval_ms = v.parse().unwrap_or(self.sync.interval_ms);
        }
        if let Ok(v) = env::var("ACTIONS_FRONTEND_VERSION") {
            self.sync.frontend_version = v;
        }
        self.sync.decryption_key = env::var("ACTIONS_DECRYPTION_KEY")
            .ok()
            .filter(|s| !s.is_empty())
            .or_else(|| self.resolved_key().map(String::from));

        // Storage overrides
        if let Ok(v) = env::var("ACTIONS_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(v);
        }
        if let Ok(v) = env::var("ACTIONS_EXPORT_DIR") {
            self.storage.export_dir = PathBuf::from(v);
        }
        if let Ok(v) = env::var("ACTIONS_SAVED_ITEMS_MAX") {
            self.storage.saved_items_max = v.parse().unwrap_or(self.storage.saved_items_max);
        }

        self
    }

    /// The at-rest key. Development falls back to a fixed key; missing
    /// anywhere else is a configuration error.
    pub fn encryption_key(&self) -> Result<&str, CryptoError> {
        if self.security.handler_encryption_key.is_none() && self.environment == Environment::Development {
            tracing::warn!("HANDLER_ENCRYPTION_KEY not set, using the development key");
        }
        self.resolved_key().ok_or_else(|| {
            CryptoError::Configuration(format!(
                "HANDLER_ENCRYPTION_KEY must be set in {:?}",
                self.environment
            ))
        })
    }

    fn resolved_key(&self) -> Option<&str> {
        match (&self.security.handler_encryption_key, &self.environment) {
            (Some(key), _) => Some(key.as_str()),
            (None, Environment::Development) => Some(DEV_ENCRYPTION_KEY),
            (None, _) => None,
        }
    }

    fn base_sync(port: u16) -> SyncConfig {
        SyncConfig {
            api_url: format!("http://localhost:{}/action-handlers/definitions", port),
            interval_ms: 5 * 60 * 1000,
            frontend_version: "1.0.0".to_string(),
            decryption_key: None,
        }
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            server: ServerConfig {
                port: 3001,
                enable_cors: true,
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 10,
                connection_timeout: 30,
            },
            security: SecurityConfig {
                handler_encryption_key: None,
            },
            sync: Self::base_sync(3001),
            storage: StorageConfig {
                data_dir: PathBuf::from(".table-actions/data"),
                export_dir: PathBuf::from(".table-actions/exports"),
                saved_items_max: 50,
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            server: ServerConfig {
                port: 3001,
                enable_cors: true,
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 20,
                connection_timeout: 10,
            },
            security: SecurityConfig {
                handler_encryption_key: None,
            },
            sync: Self::base_sync(3001),
            storage: StorageConfig {
                data_dir: PathBuf::from("/var/lib/table-actions/data"),
                export_dir: PathBuf::from("/var/lib/table-actions/exports"),
                saved_items_max: 50,
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            server: ServerConfig {
                port: 3001,
                enable_cors: false,
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 50,
                connection_timeout: 5,
            },
            security: SecurityConfig {
                handler_encryption_key: None,
            },
            sync: Self::base_sync(3001),
            storage: StorageConfig {
                data_dir: PathBuf::from("/var/lib/table-actions/data"),
                export_dir: PathBuf::from("/var/lib/table-actions/exports"),
                saved_items_max: 50,
            },
        }
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}
