// Client-side action runtime: handler contract, built-ins, manifest loader,
// registry and backend sync

pub mod error;
pub mod handlers;
pub mod interaction;
pub mod loader;
pub mod manifest;
pub mod registry;
pub mod runtime;
pub mod sync;
pub mod traits;
pub mod types;

pub use error::{ActionError, LoaderError};
pub use interaction::{AutoInteraction, Interaction, Phase, UserInteraction};
pub use loader::DynamicHandlerLoader;
pub use registry::ActionRegistry;
pub use runtime::{ActionRuntime, RuntimeError};
pub use sync::{ActionSyncService, HandlerDefinition, SyncError, SyncOptions, SyncReport};
pub use traits::ActionHandler;
pub use types::{
    ActionContext, ActionResult, HandlerConfig, HandlerConfigPatch, HandlerMetadata, RowData,
    TableData,
};
