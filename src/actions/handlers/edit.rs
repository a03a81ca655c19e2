use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::actions::error::ActionError;
use crate::actions::interaction::{EditForm, EditOutcome, Interaction};
use crate::actions::traits::{ActionHandler, HandlerState};
use crate::actions::types::{
    item_name, row_id, ActionContext, ActionResult, HandlerConfig, HandlerConfigPatch,
    HandlerMetadata, RowData,
};
use crate::storage::TableStorage;

/// Opens an edit form seeded from the row. Submitted values go to
/// `context.update_data`, or straight into table storage when the caller gave
/// no update function.
pub struct EditHandler {
    state: HandlerState,
    tables: Option<Arc<TableStorage>>,
}

enum Applied {
    Stored,
    TableMissing,
}

impl EditHandler {
    pub fn new(tables: Option<Arc<TableStorage>>, config: Option<HandlerConfig>) -> Self {
        let config = config.unwrap_or_else(|| {
            HandlerConfig::with_settings(
                json!({ "openInModal": true, "validateOnChange": true })
                    .as_object()
                    .cloned()
                    .unwrap_or_default(),
            )
        });
        let metadata = HandlerMetadata {
            handler_type: "edit".into(),
            name: "Edit Handler".into(),
            description: "Allows editing item data in a modal form".into(),
            version: super::BUILTIN_VERSION.into(),
            author: None,
            icon: Some("edit".into()),
        };
        Self {
            state: HandlerState::new(metadata, config),
            tables,
        }
    }

    /// Locate the owning table by key, then by title, and replace the row in place
    fn write_to_storage(&self, updated: &RowData, ctx: &ActionContext) -> Result<Applied, ActionError> {
        let Some(tables) = &self.tables else {
            return Ok(Applied::TableMissing);
        };

        let table = ctx
            .table_id
            .as_deref()
            .and_then(|key| tables.get_table_by_key(key))
            .or_else(|| ctx.table_title.as_deref().and_then(|t| tables.get_table_by_title(t)));

        let (Some(mut table), Some(id)) = (table, row_id(updated)) else {
            return Ok(Applied::TableMissing);
        };

        match table.rows.iter_mut().find(|r| row_id(r).as_deref() == Some(id.as_str())) {
            Some(existing) => *existing = updated.clone(),
            None => return Ok(Applied::TableMissing),
        }
        tables.save_table(table)?;
        Ok(Applied::Stored)
    }
}

#[async_trait]
impl ActionHandler for EditHandler {
    async fn execute(&self, row: &RowData, ctx: &ActionContext) -> Result<ActionResult, ActionError> {
        if let Some(blocked) = self.state.gate(ctx) {
            return Ok(blocked);
        }

        let Some(surface) = ctx.interaction.as_deref() else {
            return Ok(ActionResult::failure(
                "Editing requires an interaction surface but none is available",
            ));
        };

        let mut interaction = Interaction::begin("edit");
        let form = EditForm {
            title: format!("Edit {}", item_name(row)),
            fields: row.clone(),
        };

        let submitted = match interaction.edit(surface, form).await {
            EditOutcome::Submitted(fields) => fields,
            EditOutcome::Cancelled => {
                let id = row_id(row);
                return Ok(interaction.resolve(ActionResult::cancelled("Edit cancelled", id.as_deref())));
            }
        };

        interaction.applying();

        let mut merged = row.clone();
        for (k, v) in submitted {
            merged.insert(k, v);
        }

        if let Some(update) = &ctx.update_data {
            update(merged.clone());
            return Ok(interaction.resolve(
                ActionResult::ok("Item updated successfully").with_data(merged),
            ));
        }

        let outcome = self.write_to_storage(&merged, ctx).map(|applied| match applied {
            Applied::Stored => ActionResult::ok("Item updated successfully").with_data(merged),
            Applied::TableMissing => {
                tracing::warn!("Edit fallback could not locate the owning table");
                ActionResult::ok("Item updated, but its table could not be located")
                    .with_data(merged)
                    .with_warning("owning table not found; change was not persisted")
            }
        });
        Ok(interaction.settle(outcome))
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
    use crate::actions::types::TableData;
    use crate::storage::MemoryStore;
    use parking_lot::Mutex;

    fn row() -> RowData {
        json!({ "id": "r1", "name": "Old", "qty": 1 }).as_object().cloned().unwrap()
    }

    fn renaming() -> Arc<AutoInteraction> {
        Arc::new(AutoInteraction::editing(
            json!({ "name": "New" }).as_object().cloned().unwrap(),
        ))
    }

    fn storage_with_table() -> Arc<TableStorage> {
        let tables = Arc::new(TableStorage::open(Arc::new(MemoryStore::new())));
        tables
            .save_table(TableData {
                key: "t1".into(),
                title: "Inventory".into(),
                columns: vec![],
                rows: vec![row()],
                actions: vec![],
            })
            .unwrap();
        tables
    }

    #[tokio::test]
    async fn submits_through_update_data() {
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        let ctx = ActionContext::new()
            .with_interaction(renaming())
            .on_update(move |r| *sink.lock() = Some(r));

        let result = EditHandler::new(None, None).execute(&row(), &ctx).await.unwrap();

        assert!(result.success);
        let updated = seen.lock().clone().unwrap();
        assert_eq!(updated["name"], "New");
        assert_eq!(updated["qty"], 1);
    }

    #[tokio::test]
    async fn falls_back_to_table_storage() {
        let tables = storage_with_table();
        let mut ctx = ActionContext::new().with_interaction(renaming());
        ctx.table_title = Some("Inventory".into());

        let result = EditHandler::new(Some(tables.clone()), None)
            .execute(&row(), &ctx)
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.warning.is_none());
        assert_eq!(tables.get_table_by_key("t1").unwrap().rows[0]["name"], "New");
    }

    #[tokio::test]
    async fn missing_table_downgrades_to_warning() {
        let mut ctx = ActionContext::new().with_interaction(renaming());
        ctx.table_id = Some("nope".into());

        let result = EditHandler::new(Some(storage_with_table()), None)
            .execute(&row(), &ctx)
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.warning.is_some());
    }

    #[tokio::test]
    async fn cancel_resolves_cancelled() {
        let ctx = ActionContext::new().with_interaction(Arc::new(AutoInteraction::declining()));
        let result = EditHandler::new(None, None).execute(&row(), &ctx).await.unwrap();
        assert!(result.success);
        assert!(result.is_cancelled());
    }
}
