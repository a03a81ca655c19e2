pub mod collection;
pub mod definitions;
pub mod record;

// Re-export handler functions for use in routing
pub use collection::get as handlers_get;
pub use collection::initialize as handlers_initialize;
pub use collection::latest as handlers_latest;
pub use collection::post as handlers_post;

pub use record::delete as record_delete;
pub use record::put as record_put;
pub use record::versions_post as record_versions_post;

pub use definitions::check_updates as definitions_check_updates;
pub use definitions::get as definitions_get;
