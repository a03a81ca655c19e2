use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::actions::error::ActionError;
use crate::actions::interaction::{ConfirmPrompt, Interaction};
use crate::actions::traits::{ActionHandler, HandlerState};
use crate::actions::types::{
    item_name, row_id, ActionContext, ActionResult, HandlerConfig, HandlerConfigPatch,
    HandlerMetadata, RowData,
};

/// Removes a row through `context.remove_item`, asking first unless
/// `confirmBeforeDelete` is off
pub struct DeleteHandler {
    state: HandlerState,
}

impl DeleteHandler {
    pub fn new(config: Option<HandlerConfig>) -> Self {
        let config = config.unwrap_or_else(|| {
            HandlerConfig::with_settings(
                json!({ "confirmBeforeDelete": true }).as_object().cloned().unwrap_or_default(),
            )
        });
        let metadata = HandlerMetadata {
            handler_type: "delete".into(),
            name: "Delete Handler".into(),
            description: "Removes items with confirmation".into(),
            version: super::BUILTIN_VERSION.into(),
            author: None,
            icon: Some("delete".into()),
        };
        Self {
            state: HandlerState::new(metadata, config),
        }
    }

    fn perform_delete(id: &str, ctx: &ActionContext) -> ActionResult {
        match &ctx.remove_item {
            Some(remove) => remove(id),
            None => tracing::warn!("No remove_item function provided in context"),
        }

        let mut data = Map::new();
        data.insert("id".into(), Value::String(id.to_string()));
        data.insert("timestamp".into(), Value::String(chrono::Utc::now().to_rfc3339()));
        ActionResult::ok("Item deleted successfully").with_data(data)
    }
}

#[async_trait]
impl ActionHandler for DeleteHandler {
    async fn execute(&self, row: &RowData, ctx: &ActionContext) -> Result<ActionResult, ActionError> {
        if let Some(blocked) = self.state.gate(ctx) {
            return Ok(blocked);
        }

        let Some(id) = row_id(row) else {
            return Ok(ActionResult::failure("Cannot delete item without ID"));
        };

        let mut interaction = Interaction::begin("delete");

        if !self.state.config().setting_bool("confirmBeforeDelete", true) {
            interaction.applying();
            return Ok(interaction.resolve(Self::perform_delete(&id, ctx)));
        }

        let Some(surface) = ctx.interaction.as_deref() else {
            return Ok(interaction.resolve(ActionResult::failure(
                "Delete requires confirmation but no interaction surface is available",
            )));
        };

        let prompt = ConfirmPrompt {
            title: "Confirm Delete".into(),
            message: format!(
                "Are you sure you want to delete \"{}\"? This action cannot be undone.",
                item_name(row)
            ),
            confirm_text: "Delete".into(),
            cancel_text: "Cancel".into(),
        };

        if !interaction.confirm(surface, prompt).await {
            return Ok(interaction.resolve(ActionResult::cancelled("Delete cancelled", Some(&id))));
        }

        interaction.applying();
        Ok(interaction.resolve(Self::perform_delete(&id, ctx)))
    }

    fn metadata(&self) -> HandlerMetadata {
        self.state.metadata()
    }

    fn update_config(&self, patch: HandlerConfigPatch) {
        self.state.update(patch);
    }

    fn config(&self) -> HandlerConfig {
        self.state.config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::interaction::AutoInteraction;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn row() -> RowData {
        json!({ "id": "r1", "name": "Budget" }).as_object().cloned().unwrap()
    }

    fn tracking_ctx(surface: Arc<AutoInteraction>) -> (ActionContext, Arc<Mutex<Vec<String>>>) {
        let removed = Arc::new(Mutex::new(Vec::new()));
        let sink = removed.clone();
        let ctx = ActionContext::new()
            .with_interaction(surface)
            .on_remove(move |id| sink.lock().push(id.to_string()));
        (ctx, removed)
    }

    #[tokio::test]
    async fn cancel_is_a_successful_noop() {
        let surface = Arc::new(AutoInteraction::declining());
        let (ctx, removed) = tracking_ctx(surface.clone());

        let result = DeleteHandler::new(None).execute(&row(), &ctx).await.unwrap();

        assert!(result.success);
        assert!(result.is_cancelled());
        assert!(removed.lock().is_empty());
        assert_eq!(surface.shown(), vec!["Confirm Delete".to_string()]);
    }

    #[tokio::test]
    async fn confirm_removes_the_row() {
        let (ctx, removed) = tracking_ctx(Arc::new(AutoInteraction::approving()));
        let result = DeleteHandler::new(None).execute(&row(), &ctx).await.unwrap();
        assert!(result.success);
        assert!(!result.is_cancelled());
        assert_eq!(*removed.lock(), vec!["r1".to_string()]);
    }

    #[tokio::test]
    async fn skips_prompt_when_configured() {
        let surface = Arc::new(AutoInteraction::declining());
        let (ctx, removed) = tracking_ctx(surface.clone());
        let handler = DeleteHandler::new(None);
        handler.update_config(HandlerConfigPatch {
            settings: Some(json!({ "confirmBeforeDelete": false }).as_object().cloned().unwrap()),
            ..Default::default()
        });

        let result = handler.execute(&row(), &ctx).await.unwrap();
        assert!(result.success);
        assert!(surface.shown().is_empty());
        assert_eq!(removed.lock().len(), 1);
    }

    #[tokio::test]
    async fn needs_a_surface_to_confirm() {
        let result = DeleteHandler::new(None)
            .execute(&row(), &ActionContext::new())
            .await
            .unwrap();
        assert!(!result.success);
    }
}
