// Built-in action handlers

pub mod delete;
pub mod edit;
pub mod export;
pub mod safe;
pub mod save;
pub mod view;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use serde_json::json;

pub use delete::DeleteHandler;
pub use edit::EditHandler;
pub use export::ExportHandler;
pub use safe::SafeHandler;
pub use save::SaveHandler;
pub use view::ViewHandler;

use crate::actions::error::LoaderError;
use crate::actions::registry::ActionRegistry;
use crate::actions::traits::ActionHandler;
use crate::actions::types::HandlerConfig;
use crate::storage::{LocalStore, MemoryStore, TableStorage};

/// Version reported by every built-in until a synced definition replaces it
pub const BUILTIN_VERSION: &str = "1.0.0";

/// Collaborators the built-ins need: local storage for saved items, table
/// storage for edit/export fallbacks, and an output directory for exports
#[derive(Clone)]
pub struct BuiltinEnv {
    pub local: Arc<dyn LocalStore>,
    pub tables: Option<Arc<TableStorage>>,
    pub export_dir: PathBuf,
    pub saved_items_max: u64,
}

impl BuiltinEnv {
    pub fn new(local: Arc<dyn LocalStore>, export_dir: impl Into<PathBuf>) -> Self {
        let tables = Arc::new(TableStorage::open(local.clone()));
        Self {
            local,
            tables: Some(tables),
            export_dir: export_dir.into(),
            saved_items_max: save::DEFAULT_MAX_ITEMS,
        }
    }

    /// Throwaway environment backed by memory, exporting to the temp dir
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), std::env::temp_dir())
    }

    pub fn with_saved_items_max(mut self, max: u64) -> Self {
        self.saved_items_max = max;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinKind {
    Save,
    Delete,
    Edit,
    View,
    Export,
}

impl BuiltinKind {
    pub const ALL: [BuiltinKind; 5] = [
        BuiltinKind::View,
        BuiltinKind::Edit,
        BuiltinKind::Delete,
        BuiltinKind::Save,
        BuiltinKind::Export,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BuiltinKind::Save => "save",
            BuiltinKind::Delete => "delete",
            BuiltinKind::Edit => "edit",
            BuiltinKind::View => "view",
            BuiltinKind::Export => "export",
        }
    }
}

impl fmt::Display for BuiltinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuiltinKind {
    type Err = LoaderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "save" => Ok(BuiltinKind::Save),
            "delete" => Ok(BuiltinKind::Delete),
            "edit" => Ok(BuiltinKind::Edit),
            "view" => Ok(BuiltinKind::View),
            "export" => Ok(BuiltinKind::Export),
            other => Err(LoaderError::UnknownBuiltin(other.to_string())),
        }
    }
}

/// Construct a built-in. `None` config means the handler's own defaults.
pub fn builtin(kind: BuiltinKind, env: &BuiltinEnv, config: Option<HandlerConfig>) -> Arc<dyn ActionHandler> {
    match kind {
        BuiltinKind::Save => {
            let config = match config {
                Some(mut config) => {
                    // The environment's cap applies unless the config names its own
                    config
                        .settings
                        .get_or_insert_with(Default::default)
                        .entry("maxItems")
                        .or_insert_with(|| json!(env.saved_items_max));
                    config
                }
                None => HandlerConfig::with_settings(
                    json!({ "storageType": "local", "maxItems": env.saved_items_max })
                        .as_object()
                        .cloned()
                        .unwrap_or_default(),
                ),
            };
            Arc::new(SaveHandler::new(env.local.clone(), Some(config)))
        }
        BuiltinKind::Delete => Arc::new(DeleteHandler::new(config)),
        BuiltinKind::Edit => Arc::new(EditHandler::new(env.tables.clone(), config)),
        BuiltinKind::View => Arc::new(ViewHandler::new(config)),
        BuiltinKind::Export => Arc::new(ExportHandler::new(
            env.tables.clone(),
            env.export_dir.clone(),
            config,
        )),
    }
}

/// Register every built-in under its own type
pub fn register_builtins(registry: &ActionRegistry, env: &BuiltinEnv) {
    for kind in BuiltinKind::ALL {
        registry.register(kind.as_str(), builtin(kind, env, None));
    }
}
