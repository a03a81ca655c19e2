pub mod actions;
pub mod app;
pub mod cli;
pub mod config;
pub mod database;
pub mod error;
pub mod export;
pub mod handlers;
pub mod middleware;
pub mod services;
pub mod storage;
pub mod versioning;
