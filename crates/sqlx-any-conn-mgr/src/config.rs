//! Configuration for the database connection pool

use std::time::Duration;

/// Configuration for the [`Database`](crate::Database) connection pool
///
/// # Examples
///
/// ```
/// use sqlx_any_conn_mgr::DatabaseConfig;
///
/// // Use defaults
/// let config = DatabaseConfig::default();
///
/// // Override just one field
/// let config = DatabaseConfig {
///     max_connections: 3,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
   /// Maximum number of pooled connections
   ///
   /// Default: 10
   pub max_connections: u32,

   /// Connections the pool keeps open even when idle
   ///
   /// Default: 0
   pub min_connections: u32,

   /// How long `acquire` waits for a free connection before failing
   ///
   /// Default: 30 seconds
   pub acquire_timeout: Duration,

   /// Idle timeout for pooled connections
   ///
   /// Connections that remain idle for this duration will be closed automatically.
   ///
   /// Default: 10 minutes
   pub idle_timeout: Duration,
}

impl Default for DatabaseConfig {
   fn default() -> Self {
      Self {
         max_connections: 10,
         min_connections: 0,
         acquire_timeout: Duration::from_secs(30),
         idle_timeout: Duration::from_secs(600),
      }
   }
}
