use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::actions::error::ActionError;
use crate::actions::traits::{ActionHandler, HandlerState};
use crate::actions::types::{
    ActionContext, ActionResult, HandlerConfig, HandlerConfigPatch, HandlerMetadata, RowData,
    TableData,
};
use crate::export::write_table_xlsx;
use crate::storage::TableStorage;

/// Exports the whole owning table, not just the clicked row, as a spreadsheet
pub struct ExportHandler {
    state: HandlerState,
    tables: Option<Arc<TableStorage>>,
    export_dir: PathBuf,
}

impl ExportHandler {
    pub fn new(
        tables: Option<Arc<TableStorage>>,
        export_dir: PathBuf,
        config: Option<HandlerConfig>,
    ) -> Self {
        let config = config.unwrap_or_else(|| {
            HandlerConfig::with_settings(
                json!({ "formats": ["xlsx"] }).as_object().cloned().unwrap_or_default(),
            )
        });
        let metadata = HandlerMetadata {
            handler_type: "export".into(),
            name: "Export Handler".into(),
            description: "Exports table data to XLSX format".into(),
            version: super::BUILTIN_VERSION.into(),
            author: None,
            icon: Some("download".into()),
        };
        Self {
            state: HandlerState::new(metadata, config),
            tables,
            export_dir,
        }
    }

    /// Context table first, then a storage lookup by the row's `tableTitle`,
    /// the row's `title`, or the context title
    fn resolve_table(&self, row: &RowData, ctx: &ActionContext) -> Option<TableData> {
        if let Some(table) = &ctx.table_data {
            return Some(table.clone());
        }

        let tables = self.tables.as_ref()?;
        let candidates = [
            row.get("tableTitle").and_then(Value::as_str),
            row.get("title").and_then(Value::as_str),
            ctx.table_title.as_deref(),
        ];
        candidates
            .into_iter()
            .flatten()
            .find_map(|title| tables.get_table_by_title(title))
    }

    fn target_dir(&self) -> PathBuf {
        self.state
            .config()
            .setting_str("exportDir")
            .map(PathBuf::from)
            .unwrap_or_else(|| self.export_dir.clone())
    }
}

#[async_trait]
impl ActionHandler for ExportHandler {
    async fn execute(&self, row: &RowData, ctx: &ActionContext) -> Result<ActionResult, ActionError> {
        if let Some(blocked) = self.state.gate(ctx) {
            return Ok(blocked);
        }

        let Some(table) = self.resolve_table(row, ctx) else {
            return Ok(ActionResult::failure("Could not find table data to export"));
        };

        let dir = self.target_dir();
        let written = tokio::task::spawn_blocking(move || write_table_xlsx(&table, &dir))
            .await
            .map_err(|e| ActionError::Export(e.to_string()))?;

        match written {
            Ok(path) => {
                tracing::info!("Exported table to {}", path.display());
                let mut data = Map::new();
                data.insert("format".into(), Value::String("xlsx".into()));
                data.insert("path".into(), Value::String(path.display().to_string()));
                data.insert("timestamp".into(), Value::String(chrono::Utc::now().to_rfc3339()));
                Ok(ActionResult::ok("Table exported successfully").with_data(data))
            }
            Err(e) => {
                tracing::error!("Table export failed: {}", e);
                Ok(ActionResult::failure(format!("Failed to export table: {}", e))
                    .with_error(e.to_string()))
            }
        }
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
