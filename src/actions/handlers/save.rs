use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::actions::error::ActionError;
use crate::actions::traits::{ActionHandler, HandlerState};
use crate::actions::types::{
    row_id, ActionContext, ActionResult, HandlerConfig, HandlerConfigPatch, HandlerMetadata, RowData,
};
use crate::storage::{load_json, save_json, LocalStore};

pub const SAVED_ITEMS_KEY: &str = "saved_items";
pub const DEFAULT_MAX_ITEMS: u64 = 50;

/// Bookmarks rows: each execution toggles the row's membership in a persisted,
/// size-capped list (oldest evicted first)
pub struct SaveHandler {
    state: HandlerState,
    store: Arc<dyn LocalStore>,
}

impl SaveHandler {
    pub fn new(store: Arc<dyn LocalStore>, config: Option<HandlerConfig>) -> Self {
        let config = config.unwrap_or_else(|| {
            HandlerConfig::with_settings(
                json!({ "storageType": "local", "maxItems": DEFAULT_MAX_ITEMS })
                    .as_object()
                    .cloned()
                    .unwrap_or_default(),
            )
        });
        let metadata = HandlerMetadata {
            handler_type: "save".into(),
            name: "Save Handler".into(),
            description: "Allows saving/bookmarking items".into(),
            version: super::BUILTIN_VERSION.into(),
            author: None,
            icon: Some("bookmark".into()),
        };
        Self {
            state: HandlerState::new(metadata, config),
            store,
        }
    }

    /// Saved rows, oldest first. Unreadable storage reads as empty.
    pub fn saved_items(&self) -> Vec<RowData> {
        match load_json::<Vec<RowData>>(self.store.as_ref(), SAVED_ITEMS_KEY) {
            Ok(items) => items.unwrap_or_default(),
            Err(e) => {
                tracing::warn!("Ignoring unreadable saved items: {}", e);
                Vec::new()
            }
        }
    }

    pub fn is_item_saved(&self, id: &str) -> bool {
        self.saved_items()
            .iter()
            .any(|item| row_id(item).as_deref() == Some(id))
    }

    fn max_items(&self) -> usize {
        self.state.config().setting_u64("maxItems", DEFAULT_MAX_ITEMS).max(1) as usize
    }
}

#[async_trait]
impl ActionHandler for SaveHandler {
    async fn execute(&self, row: &RowData, ctx: &ActionContext) -> Result<ActionResult, ActionError> {
        if let Some(blocked) = self.state.gate(ctx) {
            return Ok(blocked);
        }

        let Some(id) = row_id(row) else {
            return Ok(ActionResult::failure("Cannot save item without ID"));
        };

        let mut items = self.saved_items();
        let was_saved = items.iter().any(|item| row_id(item).as_deref() == Some(id.as_str()));
        items.retain(|item| row_id(item).as_deref() != Some(id.as_str()));

        if !was_saved {
            items.push(row.clone());
            let max = self.max_items();
            if items.len() > max {
                let overflow = items.len() - max;
                items.drain(..overflow);
            }
        }

        save_json(self.store.as_ref(), SAVED_ITEMS_KEY, &items)?;

        let mut data = Map::new();
        data.insert("id".into(), Value::String(id));
        data.insert("saved".into(), Value::Bool(!was_saved));

        let message = if was_saved {
            "Item removed from saved items"
        } else {
            "Item saved successfully"
        };
        Ok(ActionResult::ok(message).with_data(data))
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
