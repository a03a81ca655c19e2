use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::actions::error::ActionError;
use crate::actions::traits::{ActionHandler, HandlerState};
use crate::actions::types::{
    row_id, ActionContext, ActionResult, HandlerConfig, HandlerConfigPatch, HandlerMetadata, RowData,
};

/// Stand-in registered when a type has no usable definition. Logs and reports
/// success so callers degrade instead of breaking.
pub struct SafeHandler {
    state: HandlerState,
}

impl SafeHandler {
    pub fn new(handler_type: &str, config: HandlerConfig) -> Self {
        Self {
            state: HandlerState::new(
                HandlerMetadata::generic(handler_type, super::BUILTIN_VERSION),
                config,
            ),
        }
    }

    /// Fallback that reports the given version, e.g. the one a failed remote
    /// definition declared
    pub fn with_version(handler_type: &str, version: &str, config: HandlerConfig) -> Self {
        let handler = Self::new(handler_type, config);
        handler.update_config(HandlerConfigPatch::metadata(HandlerMetadata::generic(
            handler_type,
            version,
        )));
        handler
    }
}

#[async_trait]
impl ActionHandler for SafeHandler {
    async fn execute(&self, row: &RowData, ctx: &ActionContext) -> Result<ActionResult, ActionError> {
        if let Some(blocked) = self.state.gate(ctx) {
            return Ok(blocked);
        }

        let action = self.state.metadata().handler_type;
        tracing::info!(action = %action, row_id = ?row_id(row), "Safe handler executing action");

        let mut data = Map::new();
        data.insert("actionType".into(), Value::String(action.clone()));
        data.insert("timestamp".into(), Value::String(chrono::Utc::now().to_rfc3339()));
        data.insert("rowId".into(), row.get("id").cloned().unwrap_or(Value::Null));

        Ok(ActionResult::ok(format!("{} action executed successfully", action)).with_data(data))
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
    use serde_json::json;

    #[tokio::test]
    async fn reports_generic_success() {
        let handler = SafeHandler::new("archive", HandlerConfig::default());
        let row = json!({ "id": 7 }).as_object().cloned().unwrap();

        let result = handler.execute(&row, &ActionContext::new()).await.unwrap();

        assert!(result.success);
        assert_eq!(result.message.as_deref(), Some("archive action executed successfully"));
        let data = result.data.unwrap();
        assert_eq!(data["actionType"], "archive");
        assert_eq!(data["rowId"], 7);
        assert_eq!(handler.metadata().name, "Archive Handler");
    }

    #[tokio::test]
    async fn carries_the_requested_version() {
        let handler = SafeHandler::with_version("save", "1.2.0", HandlerConfig::default());
        assert_eq!(handler.metadata().version, "1.2.0");
    }

    #[tokio::test]
    async fn respects_disabled_config() {
        let handler = SafeHandler::new(
            "archive",
            HandlerConfig {
                enabled: false,
                ..Default::default()
            },
        );
        let result = handler.execute(&RowData::new(), &ActionContext::new()).await.unwrap();
        assert!(!result.success);
    }
}
