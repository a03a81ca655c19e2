// Declarative handler definitions and the handler that interprets them

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::actions::error::{ActionError, LoaderError};
use crate::actions::interaction::{ConfirmPrompt, Interaction};
use crate::actions::traits::{ActionHandler, HandlerState};
use crate::actions::types::{
    capitalize, item_name, row_id, ActionContext, ActionResult, HandlerConfig, HandlerConfigPatch,
    HandlerMetadata, RowData,
};
use crate::versioning::INITIAL_VERSION;

/// Identity a manifest declares; every field is optional and filled from the
/// requested type when absent
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManifestMetadata {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub handler_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl ManifestMetadata {
    fn resolve(&self, requested_type: &str) -> HandlerMetadata {
        let handler_type = self
            .handler_type
            .clone()
            .unwrap_or_else(|| requested_type.to_string());
        HandlerMetadata {
            name: self
                .name
                .clone()
                .unwrap_or_else(|| format!("{} Handler", capitalize(&handler_type))),
            description: self
                .description
                .clone()
                .unwrap_or_else(|| format!("Handler for {} actions", handler_type)),
            version: self.version.clone().unwrap_or_else(|| INITIAL_VERSION.to_string()),
            author: self.author.clone(),
            icon: self.icon.clone(),
            handler_type,
        }
    }
}

/// The fixed set of behaviours a manifest can select
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Behaviour {
    /// Report success, optionally echoing the row and extra data
    Respond {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(rename = "includeRow", default)]
        include_row: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Map<String, Value>>,
    },
    /// Delegate to a built-in handler configured by this manifest
    Builtin { handler: String },
    /// Merge `set` into the row and hand it to `context.update_data`
    UpdateFields { set: Map<String, Value> },
    /// Remove the row through `context.remove_item`
    RemoveRow,
    /// Log and succeed
    Log,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteSpec {
    #[serde(flatten)]
    pub behaviour: Behaviour,
    /// Ask the user before acting; the text is the prompt message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirm: Option<String>,
}

/// A parsed handler definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerManifest {
    pub metadata: ManifestMetadata,
    pub execute: ExecuteSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<HandlerConfigPatch>,
}

impl HandlerManifest {
    /// Parse manifest text: JSON first, YAML as a fallback. The document must
    /// be a mapping that carries both `metadata` and `execute`.
    pub fn parse(text: &str) -> Result<Self, LoaderError> {
        let value: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(json_err) => serde_yaml::from_str(text).map_err(|yaml_err| {
                LoaderError::NotConstructible(format!(
                    "not a JSON or YAML document ({}; {})",
                    json_err, yaml_err
                ))
            })?,
        };

        let Value::Object(members) = &value else {
            return Err(LoaderError::NotConstructible(
                "handler definition must be a mapping".to_string(),
            ));
        };
        for member in ["metadata", "execute"] {
            if !members.contains_key(member) {
                return Err(LoaderError::MissingMember(member));
            }
        }

        serde_json::from_value(value).map_err(|e| LoaderError::NotConstructible(e.to_string()))
    }
}

/// Handler whose behaviour comes from a manifest
pub struct ManifestHandler {
    state: HandlerState,
    execute: ExecuteSpec,
    delegate: Option<Arc<dyn ActionHandler>>,
}

impl ManifestHandler {
    pub fn new(
        requested_type: &str,
        manifest: &HandlerManifest,
        config: HandlerConfig,
        delegate: Option<Arc<dyn ActionHandler>>,
    ) -> Self {
        Self {
            state: HandlerState::new(manifest.metadata.resolve(requested_type), config),
            execute: manifest.execute.clone(),
            delegate,
        }
    }

    pub fn behaviour(&self) -> &Behaviour {
        &self.execute.behaviour
    }

    async fn dispatch(&self, row: &RowData, ctx: &ActionContext) -> Result<ActionResult, ActionError> {
        let action = self.state.metadata().handler_type;

        match &self.execute.behaviour {
            Behaviour::Respond {
                message,
                include_row,
                data,
            } => {
                let mut out = data.clone().unwrap_or_default();
                if *include_row {
                    out.insert("row".into(), Value::Object(row.clone()));
                }
                let message = message
                    .clone()
                    .unwrap_or_else(|| format!("{} action completed", action));
                Ok(ActionResult::ok(message).with_data(out))
            }
            Behaviour::Builtin { handler } => match &self.delegate {
                Some(delegate) => delegate.execute(row, ctx).await,
                None => Err(ActionError::Handler(format!(
                    "built-in '{}' is not available",
                    handler
                ))),
            },
            Behaviour::UpdateFields { set } => {
                let update = ctx
                    .update_data
                    .as_ref()
                    .ok_or_else(|| ActionError::MissingContext("updateData".to_string()))?;
                let mut merged = row.clone();
                for (k, v) in set {
                    merged.insert(k.clone(), v.clone());
                }
                update(merged.clone());
                Ok(ActionResult::ok("Item updated successfully").with_data(merged))
            }
            Behaviour::RemoveRow => {
                let Some(id) = row_id(row) else {
                    return Ok(ActionResult::failure(format!("Cannot {} item without ID", action)));
                };
                let remove = ctx
                    .remove_item
                    .as_ref()
                    .ok_or_else(|| ActionError::MissingContext("removeItem".to_string()))?;
                remove(&id);
                let mut data = Map::new();
                data.insert("id".into(), Value::String(id));
                Ok(ActionResult::ok("Item removed successfully").with_data(data))
            }
            Behaviour::Log => {
                tracing::info!(action = %action, row_id = ?row_id(row), "Manifest handler logged action");
                let mut data = Map::new();
                data.insert("actionType".into(), Value::String(action.clone()));
                data.insert("timestamp".into(), Value::String(chrono::Utc::now().to_rfc3339()));
                data.insert("rowId".into(), row.get("id").cloned().unwrap_or(Value::Null));
                Ok(ActionResult::ok(format!("{} action executed successfully", action)).with_data(data))
            }
        }
    }
}

#[async_trait]
impl ActionHandler for ManifestHandler {
    async fn execute(&self, row: &RowData, ctx: &ActionContext) -> Result<ActionResult, ActionError> {
        if let Some(blocked) = self.state.gate(ctx) {
            return Ok(blocked);
        }

        let Some(message) = &self.execute.confirm else {
            return self.dispatch(row, ctx).await;
        };

        let action = self.state.metadata().handler_type;
        let mut interaction = Interaction::begin(action.clone());
        let Some(surface) = ctx.interaction.as_deref() else {
            return Ok(interaction.resolve(ActionResult::failure(format!(
                "The {} action requires confirmation but no interaction surface is available",
                action
            ))));
        };

        let prompt = ConfirmPrompt {
            title: format!("Confirm {}", capitalize(&action)),
            message: message.replace("{item}", &item_name(row)),
            confirm_text: capitalize(&action),
            cancel_text: "Cancel".into(),
        };
        if !interaction.confirm(surface, prompt).await {
            let id = row_id(row);
            return Ok(interaction.resolve(ActionResult::cancelled(
                format!("{} cancelled", capitalize(&action)),
                id.as_deref(),
            )));
        }

        interaction.applying();
        Ok(interaction.settle(self.dispatch(row, ctx).await))
    }

    fn metadata(&self) -> HandlerMetadata {
        self.state.metadata()
    }

    fn update_config(&self, patch: HandlerConfigPatch) {
        if let Some(delegate) = &self.delegate {
            delegate.update_config(patch.clone());
        }
        self.state.update(patch);
    }

    fn config(&self) -> HandlerConfig {
        self.state.config()
    }
}
