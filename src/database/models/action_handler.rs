use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::FromRow;
use uuid::Uuid;

use crate::actions::types::capitalize;

/// One immutable (type, version) row of the handler store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ActionHandlerRecord {
    pub id: Uuid,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub handler_type: String,
    pub name: String,
    pub description: Option<String>,
    pub version: String,
    pub enabled: bool,
    pub settings: Value,
    pub icon: Option<String>,
    /// Encrypted at rest; decrypted copies are handed to clients
    pub code: Option<String>,
    pub frontend_version: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of a create call
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewActionHandler {
    #[serde(rename = "type")]
    pub handler_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frontend_version: Option<String>,
}

/// Partial fields for update and new-version calls. `type` and `version` are
/// never taken from a patch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionHandlerPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frontend_version: Option<String>,
}

impl ActionHandlerRecord {
    /// Fresh row from a create body; `code` is stored as given
    pub fn from_new(new: NewActionHandler) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: new
                .name
                .unwrap_or_else(|| format!("{} Handler", capitalize(&new.handler_type))),
            handler_type: new.handler_type,
            description: new.description,
            version: new.version,
            enabled: new.enabled.unwrap_or(true),
            settings: Value::Object(new.settings.unwrap_or_default()),
            icon: new.icon,
            code: new.code,
            frontend_version: new.frontend_version,
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrite the fields present in `patch` and touch `updated_at`
    pub fn apply(&mut self, patch: ActionHandlerPatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(description) = patch.description {
            self.description = Some(description);
        }
        if let Some(enabled) = patch.enabled {
            self.enabled = enabled;
        }
        if let Some(settings) = patch.settings {
            self.settings = Value::Object(settings);
        }
        if let Some(icon) = patch.icon {
            self.icon = Some(icon);
        }
        if let Some(code) = patch.code {
            self.code = Some(code);
        }
        if let Some(frontend_version) = patch.frontend_version {
            self.frontend_version = Some(frontend_version);
        }
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_with_client_field_names() {
        let record = ActionHandlerRecord::from_new(NewActionHandler {
            handler_type: "view".into(),
            version: "1.0.0".into(),
            frontend_version: Some("1.0.0".into()),
            ..Default::default()
        });
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "view");
        assert_eq!(json["name"], "View Handler");
        assert_eq!(json["frontendVersion"], "1.0.0");
        assert_eq!(json["enabled"], true);
        assert_eq!(json["settings"], json!({}));
    }

    #[test]
    fn apply_only_touches_present_fields() {
        let mut record = ActionHandlerRecord::from_new(NewActionHandler {
            handler_type: "save".into(),
            version: "1.0.0".into(),
            icon: Some("bookmark".into()),
            ..Default::default()
        });
        record.apply(ActionHandlerPatch {
            enabled: Some(false),
            ..Default::default()
        });
        assert!(!record.enabled);
        assert_eq!(record.icon.as_deref(), Some("bookmark"));
        assert_eq!(record.version, "1.0.0");
    }
}
