// HTTP route handlers, one module per resource
pub mod action_handlers;
