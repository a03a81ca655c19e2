use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::actions::interaction::UserInteraction;

/// A table row as handed to a handler: arbitrary JSON fields, usually with an `id`
pub type RowData = Map<String, Value>;

/// Handler settings block; replaced wholesale on config updates, never deep-merged
pub type Settings = Map<String, Value>;

/// Structured outcome of an action execution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set when the action succeeded in a degraded way
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl ActionResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warning = Some(warning.into());
        self
    }

    /// User cancellation is not a failure
    pub fn cancelled(message: impl Into<String>, id: Option<&str>) -> Self {
        let mut data = Map::new();
        data.insert("cancelled".into(), Value::Bool(true));
        if let Some(id) = id {
            data.insert("id".into(), Value::String(id.to_string()));
        }
        Self::ok(message).with_data(data)
    }

    pub fn is_cancelled(&self) -> bool {
        self.data
            .as_ref()
            .and_then(|d| d.get("cancelled"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// Declared identity of a live handler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerMetadata {
    #[serde(rename = "type")]
    pub handler_type: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl HandlerMetadata {
    /// Generic identity used for fallback handlers: `save` -> "Save Handler"
    pub fn generic(handler_type: &str, version: &str) -> Self {
        Self {
            handler_type: handler_type.to_string(),
            name: format!("{} Handler", capitalize(handler_type)),
            description: format!("Default handler for {} actions", handler_type),
            version: version.to_string(),
            author: None,
            icon: None,
        }
    }
}

pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Mutable configuration held by one handler instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerConfig {
    #[serde(default = "enabled_default")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<Settings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoints: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HandlerMetadata>,
}

fn enabled_default() -> bool {
    true
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            permissions: None,
            settings: None,
            endpoints: None,
            custom_code: None,
            metadata: None,
        }
    }
}

impl HandlerConfig {
    pub fn with_settings(settings: Settings) -> Self {
        Self {
            settings: Some(settings),
            ..Default::default()
        }
    }

    /// Shallow merge: every key present in the patch overwrites; `settings` is
    /// replaced as a whole
    pub fn merge(&mut self, patch: HandlerConfigPatch) {
        if let Some(enabled) = patch.enabled {
            self.enabled = enabled;
        }
        if let Some(permissions) = patch.permissions {
            self.permissions = Some(permissions);
        }
        if let Some(settings) = patch.settings {
            self.settings = Some(settings);
        }
        if let Some(endpoints) = patch.endpoints {
            self.endpoints = Some(endpoints);
        }
        if let Some(custom_code) = patch.custom_code {
            self.custom_code = Some(custom_code);
        }
        if let Some(metadata) = patch.metadata {
            self.metadata = Some(metadata);
        }
    }

    pub fn setting(&self, key: &str) -> Option<&Value> {
        self.settings.as_ref().and_then(|s| s.get(key))
    }

    pub fn setting_bool(&self, key: &str, default: bool) -> bool {
        self.setting(key).and_then(Value::as_bool).unwrap_or(default)
    }

    pub fn setting_u64(&self, key: &str, default: u64) -> u64 {
        self.setting(key).and_then(Value::as_u64).unwrap_or(default)
    }

    pub fn setting_str(&self, key: &str) -> Option<&str> {
        self.setting(key).and_then(Value::as_str)
    }
}

/// Partial config for `update_config`; absent keys leave the held value alone
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerConfigPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<Settings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoints: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HandlerMetadata>,
}

impl HandlerConfigPatch {
    pub fn metadata(metadata: HandlerMetadata) -> Self {
        Self {
            metadata: Some(metadata),
            ..Default::default()
        }
    }
}

impl From<HandlerConfig> for HandlerConfigPatch {
    fn from(config: HandlerConfig) -> Self {
        Self {
            enabled: Some(config.enabled),
            permissions: config.permissions,
            settings: config.settings,
            endpoints: config.endpoints,
            custom_code: config.custom_code,
            metadata: config.metadata,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableColumn {
    pub key: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableAction {
    #[serde(rename = "type")]
    pub action_type: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// A whole generated table as kept by the storage collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableData {
    #[serde(default)]
    pub key: String,
    pub title: String,
    #[serde(default)]
    pub columns: Vec<TableColumn>,
    #[serde(default)]
    pub rows: Vec<RowData>,
    #[serde(default)]
    pub actions: Vec<TableAction>,
}

pub type UpdateDataFn = Arc<dyn Fn(RowData) + Send + Sync>;
pub type RemoveItemFn = Arc<dyn Fn(&str) + Send + Sync>;

/// Per-invocation context; built by the caller, never persisted
#[derive(Clone, Default)]
pub struct ActionContext {
    pub user_id: Option<String>,
    pub table_id: Option<String>,
    pub view_id: Option<String>,
    pub table_title: Option<String>,
    pub table_data: Option<TableData>,
    pub update_data: Option<UpdateDataFn>,
    pub remove_item: Option<RemoveItemFn>,
    /// Permissions held by the caller, when known
    pub granted_permissions: Option<Vec<String>>,
    pub interaction: Option<Arc<dyn UserInteraction>>,
}

impl fmt::Debug for ActionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionContext")
            .field("user_id", &self.user_id)
            .field("table_id", &self.table_id)
            .field("view_id", &self.view_id)
            .field("table_title", &self.table_title)
            .field("has_table_data", &self.table_data.is_some())
            .field("has_update_data", &self.update_data.is_some())
            .field("has_remove_item", &self.remove_item.is_some())
            .field("has_interaction", &self.interaction.is_some())
            .finish()
    }
}

impl ActionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interaction(mut self, interaction: Arc<dyn UserInteraction>) -> Self {
        self.interaction = Some(interaction);
        self
    }

    pub fn with_table(mut self, table: TableData) -> Self {
        self.table_id = Some(table.key.clone());
        self.table_title = Some(table.title.clone());
        self.table_data = Some(table);
        self
    }

    pub fn on_update(mut self, f: impl Fn(RowData) + Send + Sync + 'static) -> Self {
        self.update_data = Some(Arc::new(f));
        self
    }

    pub fn on_remove(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.remove_item = Some(Arc::new(f));
        self
    }
}

/// Row identifier as a string; numeric ids are accepted too
pub fn row_id(row: &RowData) -> Option<String> {
    match row.get("id")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// A display name for prompts: first string among common name fields, else the id
pub fn item_name(row: &RowData) -> String {
    for field in ["name", "title", "label", "subject", "description"] {
        if let Some(Value::String(s)) = row.get(field) {
            if !s.is_empty() {
                return s.clone();
            }
        }
    }
    match row_id(row) {
        Some(id) => format!("Item #{}", id),
        None => "Selected Item".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn settings(v: Value) -> Settings {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn merge_overwrites_top_level_and_replaces_settings() {
        let mut config = HandlerConfig::with_settings(settings(json!({"a": 1, "nested": {"x": 1, "y": 2}})));
        config.permissions = Some(vec!["basic:read".into()]);

        config.merge(HandlerConfigPatch {
            enabled: Some(false),
            settings: Some(settings(json!({"nested": {"x": 9}}))),
            ..Default::default()
        });

        assert!(!config.enabled);
        assert_eq!(config.permissions, Some(vec!["basic:read".to_string()]));
        assert_eq!(config.settings, Some(settings(json!({"nested": {"x": 9}}))));
    }

    #[test]
    fn empty_patch_changes_nothing() {
        let mut config = HandlerConfig::with_settings(settings(json!({"maxItems": 3})));
        let before = config.clone();
        config.merge(HandlerConfigPatch::default());
        assert_eq!(config, before);
    }

    #[test]
    fn config_deserializes_camel_case_with_enabled_default() {
        let config: HandlerConfig =
            serde_json::from_value(json!({"customCode": "k", "settings": {"a": true}})).unwrap();
        assert!(config.enabled);
        assert_eq!(config.custom_code.as_deref(), Some("k"));
        assert!(config.setting_bool("a", false));
    }

    #[test]
    fn row_helpers() {
        let row = settings(json!({"id": 7, "title": "Quarterly"}));
        assert_eq!(row_id(&row).as_deref(), Some("7"));
        assert_eq!(item_name(&row), "Quarterly");
        assert_eq!(item_name(&settings(json!({"id": "r1"}))), "Item #r1");
        assert_eq!(item_name(&Map::new()), "Selected Item");
    }

    #[test]
    fn generic_metadata_capitalizes() {
        let m = HandlerMetadata::generic("archive", "2.0.0");
        assert_eq!(m.name, "Archive Handler");
        assert_eq!(m.version, "2.0.0");
    }
}
