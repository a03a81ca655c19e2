use async_trait::async_trait;
use serde_json::json;

use crate::actions::error::ActionError;
use crate::actions::interaction::{DetailView, Interaction};
use crate::actions::traits::{ActionHandler, HandlerState};
use crate::actions::types::{
    item_name, ActionContext, ActionResult, HandlerConfig, HandlerConfigPatch, HandlerMetadata,
    RowData,
};

/// Read-only presentation of a row. Viewing cannot fail: without a surface the
/// row is simply returned.
pub struct ViewHandler {
    state: HandlerState,
}

impl ViewHandler {
    pub fn new(config: Option<HandlerConfig>) -> Self {
        let config = config.unwrap_or_else(|| {
            HandlerConfig::with_settings(
                json!({ "openInModal": true }).as_object().cloned().unwrap_or_default(),
            )
        });
        let metadata = HandlerMetadata {
            handler_type: "view".into(),
            name: "View Handler".into(),
            description: "Shows detailed view of a table item".into(),
            version: super::BUILTIN_VERSION.into(),
            author: None,
            icon: Some("view".into()),
        };
        Self {
            state: HandlerState::new(metadata, config),
        }
    }
}

#[async_trait]
impl ActionHandler for ViewHandler {
    async fn execute(&self, row: &RowData, ctx: &ActionContext) -> Result<ActionResult, ActionError> {
        if let Some(blocked) = self.state.gate(ctx) {
            return Ok(blocked);
        }

        let mut interaction = Interaction::begin("view");
        if let Some(surface) = ctx.interaction.as_deref() {
            let view = DetailView {
                title: item_name(row),
                fields: row.clone(),
            };
            interaction.view(surface, view).await;
        }

        Ok(interaction.resolve(ActionResult::ok("Item details loaded").with_data(row.clone())))
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
