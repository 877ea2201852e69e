//! # sqlx-any-conn-mgr
//!
//! A minimal wrapper around the SQLx `Any` driver that turns a set of database
//! credentials into a ready connection pool.
//!
//! ## Core Types
//!
//! - **[`Database`]**: The engine. Owns the connection pool and knows which backend it talks to
//! - **[`DatabaseConfig`]**: Configuration for connection pool settings
//! - **[`Credentials`]**: Host, user and password (plus optional port and backend)
//! - **[`CredentialSource`]**: Strategy for resolving credentials
//!   ([`EnvCredentials`], [`FileCredentials`], [`StaticCredentials`])
//! - **[`Backend`]**: MySQL, PostgreSQL or SQLite
//! - **[`Error`]**: Error type for configuration and connection failures
//!
//! ## Flow
//!
//! ```text
//! CredentialSource::resolve() -> Credentials
//! Credentials::connection_url(database) -> URL
//! Database::connect(...) -> pool
//! ```

mod backend;
mod config;
mod credentials;
mod database;
mod error;

// Re-export public types
pub use backend::Backend;
pub use config::DatabaseConfig;
pub use credentials::{
   CredentialSource, Credentials, DEFAULT_CONFIG_FILE, DEFAULT_ENV_PREFIX, EnvCredentials,
   FileCredentials, StaticCredentials,
};
pub use database::Database;
pub use error::{Error, Result};
