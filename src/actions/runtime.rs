use std::sync::Arc;
use std::time::Duration;

use crate::actions::handlers::{register_builtins, BuiltinEnv};
use crate::actions::loader::DynamicHandlerLoader;
use crate::actions::registry::ActionRegistry;
use crate::actions::sync::{ActionSyncService, SyncOptions};
use crate::actions::types::{ActionContext, ActionResult, RowData};
use crate::config::AppConfig;
use crate::storage::{FileStore, StorageError};
use crate::versioning::{CodeCipher, CryptoError};

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Composition root for the client side: owns the registry, the loader and
/// the sync service, and the lifecycle of the poll loop
pub struct ActionRuntime {
    registry: Arc<ActionRegistry>,
    loader: Arc<DynamicHandlerLoader>,
    sync: Arc<ActionSyncService>,
    env: BuiltinEnv,
}

impl ActionRuntime {
    /// Registry pre-populated with the built-ins, loader and sync service
    /// sharing it
    pub fn new(env: BuiltinEnv, decryption: Option<CodeCipher>, api_url: impl Into<String>) -> Self {
        let registry = Arc::new(ActionRegistry::new());
        register_builtins(&registry, &env);

        let loader = Arc::new(DynamicHandlerLoader::new(env.clone(), decryption));
        let sync = Arc::new(ActionSyncService::new(registry.clone(), loader.clone(), api_url));

        Self {
            registry,
            loader,
            sync,
            env,
        }
    }

    /// Build from application config: file-backed local storage under
    /// `storage.data_dir`, the shared decryption key, and the sync settings
    pub fn from_config(config: &AppConfig) -> Result<Self, RuntimeError> {
        let local = Arc::new(FileStore::open(&config.storage.data_dir)?);
        let env = BuiltinEnv::new(local, config.storage.export_dir.clone())
            .with_saved_items_max(config.storage.saved_items_max);

        let decryption = match config.sync.decryption_key.as_deref() {
            Some(key) if !key.is_empty() => Some(CodeCipher::new(key)?),
            _ => None,
        };

        let runtime = Self::new(env, decryption, config.sync.api_url.clone());
        runtime.sync.configure(SyncOptions {
            api_url: None,
            sync_interval: Some(Duration::from_millis(config.sync.interval_ms)),
            frontend_version: Some(config.sync.frontend_version.clone()),
        });
        Ok(runtime)
    }

    pub fn registry(&self) -> &Arc<ActionRegistry> {
        &self.registry
    }

    pub fn loader(&self) -> &Arc<DynamicHandlerLoader> {
        &self.loader
    }

    pub fn sync(&self) -> &Arc<ActionSyncService> {
        &self.sync
    }

    pub fn env(&self) -> &BuiltinEnv {
        &self.env
    }

    pub fn start(&self) {
        self.sync.start_sync();
    }

    pub fn stop(&self) {
        self.sync.stop_sync();
    }

    pub async fn execute(&self, action_type: &str, row: &RowData, ctx: &ActionContext) -> ActionResult {
        self.registry.execute(action_type, row, ctx).await
    }
}

impl Drop for ActionRuntime {
    fn drop(&mut self) {
        self.sync.stop_sync();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_builtins_registered() {
        let runtime = ActionRuntime::new(BuiltinEnv::in_memory(), None, "http://127.0.0.1:9");
        assert_eq!(
            runtime.registry().types(),
            vec!["delete", "edit", "export", "save", "view"]
        );
    }

    #[tokio::test]
    async fn executes_through_the_registry() {
        let runtime = ActionRuntime::new(BuiltinEnv::in_memory(), None, "http://127.0.0.1:9");
        let row = serde_json::json!({"id": "1"}).as_object().cloned().unwrap();
        let result = runtime.execute("save", &row, &ActionContext::new()).await;
        assert!(result.success);

        let missing = runtime.execute("nope", &row, &ActionContext::new()).await;
        assert!(!missing.success);
    }
}
