use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::RwLock;

use crate::actions::traits::ActionHandler;
use crate::actions::types::{ActionContext, ActionResult, HandlerConfigPatch, HandlerMetadata, RowData};

/// Live mapping from action type to the handler currently serving it.
///
/// One instance is built by the composition root and shared by `Arc`. Writes
/// are single map operations under a lock, so readers never observe a handler
/// mid-replacement.
#[derive(Default)]
pub struct ActionRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn ActionHandler>>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `handler` for `action_type`, replacing any previous one
    pub fn register(&self, action_type: &str, handler: Arc<dyn ActionHandler>) {
        let previous = self.handlers.write().insert(action_type.to_string(), handler);
        if previous.is_some() {
            tracing::warn!("Handler for action type '{}' is being overwritten", action_type);
        } else {
            tracing::debug!("Registered handler for action type '{}'", action_type);
        }
    }

    pub fn get(&self, action_type: &str) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.read().get(action_type).cloned()
    }

    pub fn has(&self, action_type: &str) -> bool {
        self.handlers.read().contains_key(action_type)
    }

    /// True iff a handler was registered
    pub fn remove(&self, action_type: &str) -> bool {
        self.handlers.write().remove(action_type).is_some()
    }

    pub fn update_config(&self, action_type: &str, patch: HandlerConfigPatch) {
        match self.get(action_type) {
            Some(handler) => handler.update_config(patch),
            None => tracing::warn!(
                "Cannot update config: no handler registered for action type '{}'",
                action_type
            ),
        }
    }

    /// Run the handler for `action_type`. Unknown types, handler errors and
    /// handler panics all come back as `success: false` results.
    pub async fn execute(&self, action_type: &str, row: &RowData, ctx: &ActionContext) -> ActionResult {
        // Clone out of the lock before awaiting
        let Some(handler) = self.get(action_type) else {
            tracing::warn!("No handler registered for action type '{}'", action_type);
            return ActionResult::failure(format!("No handler registered for action type: {}", action_type));
        };

        match AssertUnwindSafe(handler.execute(row, ctx)).catch_unwind().await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                tracing::error!("Error executing {} action: {}", action_type, e);
                ActionResult::failure(format!("Error executing {} action", action_type))
                    .with_error(e.to_string())
            }
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                tracing::error!("Handler for {} action panicked: {}", action_type, reason);
                ActionResult::failure(format!("Error executing {} action", action_type)).with_error(reason)
            }
        }
    }

    pub fn all_metadata(&self) -> HashMap<String, HandlerMetadata> {
        self.handlers
            .read()
            .iter()
            .map(|(action_type, handler)| (action_type.clone(), handler.metadata()))
            .collect()
    }

    /// Registered types, sorted
    pub fn types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.read().keys().cloned().collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::error::ActionError;
    use crate::actions::handlers::SafeHandler;
    use crate::actions::types::HandlerConfig;
    use async_trait::async_trait;

    struct Failing {
        panic: bool,
    }

    #[async_trait]
    impl ActionHandler for Failing {
        async fn execute(&self, _row: &RowData, _ctx: &ActionContext) -> Result<ActionResult, ActionError> {
            if self.panic {
                panic!("boom");
            }
            Err(ActionError::Handler("broken".into()))
        }

        fn metadata(&self) -> HandlerMetadata {
            HandlerMetadata::generic("broken", "1.0.0")
        }

        fn update_config(&self, _patch: HandlerConfigPatch) {}

        fn config(&self) -> HandlerConfig {
            HandlerConfig::default()
        }
    }

    fn safe(action_type: &str, version: &str) -> Arc<dyn ActionHandler> {
        Arc::new(SafeHandler::with_version(action_type, version, HandlerConfig::default()))
    }

    #[test]
    fn registering_twice_keeps_the_second() {
        let registry = ActionRegistry::new();
        registry.register("save", safe("save", "1.0.0"));
        registry.register("save", safe("save", "2.0.0"));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("save").unwrap().metadata().version, "2.0.0");
    }

    #[test]
    fn remove_reports_presence() {
        let registry = ActionRegistry::new();
        registry.register("view", safe("view", "1.0.0"));
        assert!(registry.remove("view"));
        assert!(!registry.remove("view"));
        assert!(!registry.has("view"));
    }

    #[test]
    fn update_config_on_unknown_type_is_a_noop() {
        let registry = ActionRegistry::new();
        registry.update_config("missing", HandlerConfigPatch::default());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn unknown_type_is_a_failure_result() {
        let registry = ActionRegistry::new();
        let result = registry.execute("nope", &RowData::new(), &ActionContext::new()).await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn errors_and_panics_become_failure_results() {
        let registry = ActionRegistry::new();
        registry.register("err", Arc::new(Failing { panic: false }));
        registry.register("panic", Arc::new(Failing { panic: true }));

        let err = registry.execute("err", &RowData::new(), &ActionContext::new()).await;
        assert!(!err.success);
        assert!(err.error.unwrap().contains("broken"));

        let panicked = registry.execute("panic", &RowData::new(), &ActionContext::new()).await;
        assert!(!panicked.success);
        assert_eq!(panicked.error.as_deref(), Some("boom"));
    }

    #[test]
    fn metadata_is_keyed_by_registered_type() {
        let registry = ActionRegistry::new();
        registry.register("save", safe("save", "1.1.0"));
        registry.register("view", safe("view", "1.0.0"));

        let all = registry.all_metadata();
        assert_eq!(all.len(), 2);
        assert_eq!(all["save"].version, "1.1.0");
        assert_eq!(registry.types(), vec!["save".to_string(), "view".to_string()]);
    }
}
