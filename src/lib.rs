pub mod anonymity;
pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod openapi;
pub mod ranking;
pub mod rate_limit; // in-memory rate limiting
pub mod repo;
pub mod routes;
pub mod school;
pub mod security;
pub mod storage;
pub mod views;

// Re-export commonly used items for tests / external users
pub use config::AppConfig;
pub use routes::{config, AppState};
pub use security::SecurityHeaders;
