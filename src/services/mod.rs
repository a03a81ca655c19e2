pub mod action_handler_service;

pub use action_handler_service::{ActionHandlerService, ServiceError, DEFAULT_HANDLER_TYPES};
