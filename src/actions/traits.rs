use async_trait::async_trait;
use parking_lot::RwLock;

use crate::actions::error::ActionError;
use crate::actions::types::{
    ActionContext, ActionResult, HandlerConfig, HandlerConfigPatch, HandlerMetadata, RowData,
};

/// Contract every action handler satisfies, built-in or loaded from a manifest.
///
/// `execute` may suspend indefinitely while it waits for user input. Callers
/// serialize duplicate submissions for the same row and action themselves.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Perform the action for one row
    async fn execute(&self, row: &RowData, ctx: &ActionContext) -> Result<ActionResult, ActionError>;

    /// Current declared identity
    fn metadata(&self) -> HandlerMetadata;

    /// Shallow-merge a partial config into the held one
    fn update_config(&self, patch: HandlerConfigPatch);

    /// Snapshot of the held config
    fn config(&self) -> HandlerConfig;
}

/// Config cell shared by the handler implementations.
///
/// Metadata comes from `config.metadata` once something has stamped it, which is
/// how the loader and the sync service rewrite a handler's type and version.
pub struct HandlerState {
    config: RwLock<HandlerConfig>,
    defaults: HandlerMetadata,
}

impl HandlerState {
    pub fn new(defaults: HandlerMetadata, config: HandlerConfig) -> Self {
        Self {
            config: RwLock::new(config),
            defaults,
        }
    }

    pub fn config(&self) -> HandlerConfig {
        self.config.read().clone()
    }

    pub fn metadata(&self) -> HandlerMetadata {
        self.config
            .read()
            .metadata
            .clone()
            .unwrap_or_else(|| self.defaults.clone())
    }

    pub fn update(&self, patch: HandlerConfigPatch) {
        self.config.write().merge(patch);
    }

    /// Early result when the handler is disabled or the caller lacks a
    /// required permission
    pub fn gate(&self, ctx: &ActionContext) -> Option<ActionResult> {
        let config = self.config.read();
        let action = self.metadata_type(&config);

        if !config.enabled {
            return Some(ActionResult::failure(format!(
                "The {} action is currently disabled",
                action
            )));
        }

        if let (Some(required), Some(granted)) = (&config.permissions, &ctx.granted_permissions) {
            if let Some(missing) = required.iter().find(|p| !granted.contains(p)) {
                tracing::debug!("Permission '{}' missing for {} action", missing, action);
                return Some(
                    ActionResult::failure("You do not have permission to perform this action.")
                        .with_error(format!("missing permission '{}'", missing)),
                );
            }
        }

        None
    }

    fn metadata_type(&self, config: &HandlerConfig) -> String {
        config
            .metadata
            .as_ref()
            .map(|m| m.handler_type.clone())
            .unwrap_or_else(|| self.defaults.handler_type.clone())
    }
}
