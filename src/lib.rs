pub mod auth;
pub mod error;
pub mod models;
pub mod openapi;
pub mod repo;
pub mod routes;
pub mod security;
pub mod rate_limit; // in-memory rate limiting

#[cfg(feature = "postgres-store")]
pub mod pg;

// Re-export commonly used items for tests / external users
pub use routes::{config, AppState};
pub use security::SecurityHeaders;
