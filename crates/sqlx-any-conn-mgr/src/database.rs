//! The engine: a pooled database connection reached through the Any driver

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

use log::LevelFilter;
use sqlx::any::{AnyConnectOptions, AnyPoolOptions, install_default_drivers};
use sqlx::{AnyPool, ConnectOptions};
use tracing::{debug, info};

use crate::{Backend, CredentialSource, Credentials, DatabaseConfig, Error, Result};

/// A connection pool bound to one database, plus the facts about it the SQL
/// layer needs (backend, database name).
///
/// ## State Management
///
/// - **`closed`**: Prevents use after the database has been closed
/// - **`name`**: The database name the pool was connected to
/// - **`backend`**: Which server dialect the pool speaks
///
/// ## Usage Pattern
///
/// ```text
/// 1. Resolve credentials (environment, config file or explicit)
/// 2. Connect: builds the URL and the pool
/// 3. Hand pool() to sessions / queries
/// 4. Close database when done
/// ```
#[derive(Debug)]
pub struct Database {
   pool: AnyPool,
   backend: Backend,
   name: String,
   host: String,
   echo: bool,
   closed: AtomicBool,
}

impl Database {
   /// Resolve credentials from `source`, then connect to `name`.
   ///
   /// Credential errors surface before any connection attempt.
   pub async fn connect_with_source(
      source: &dyn CredentialSource,
      name: &str,
      config: DatabaseConfig,
      echo: bool,
   ) -> Result<Self> {
      let credentials = source.resolve()?;
      Self::connect(&credentials, name, config, echo).await
   }

   /// Connect to database `name` on the server described by `credentials`.
   ///
   /// With `echo` set every statement is logged at INFO level by sqlx's
   /// statement logger; otherwise statement logging is disabled.
   pub async fn connect(
      credentials: &Credentials,
      name: &str,
      config: DatabaseConfig,
      echo: bool,
   ) -> Result<Self> {
      let url = credentials.connection_url(name)?;
      let mut db = Self::connect_url(&url, config, echo).await?;
      db.name = name.to_string();
      db.host = credentials.host.clone();
      Ok(db)
   }

   /// Connect using a ready-made connection URL.
   ///
   /// The database name is taken from the last path segment of the URL
   /// (without a `.db` suffix for SQLite files).
   pub async fn connect_url(url: &str, config: DatabaseConfig, echo: bool) -> Result<Self> {
      install_default_drivers();

      let backend = Backend::from_url(url)?;
      let options = AnyConnectOptions::from_str(url)?;
      let options = if echo {
         options.log_statements(LevelFilter::Info)
      } else {
         options.disable_statement_logging()
      };

      let pool = AnyPoolOptions::new()
         .max_connections(config.max_connections)
         .min_connections(config.min_connections)
         .acquire_timeout(config.acquire_timeout)
         .idle_timeout(config.idle_timeout)
         .connect_with(options)
         .await?;

      let name = database_name_from_url(url);
      info!(backend = %backend, database = %name, "connected to database");

      Ok(Self {
         pool,
         backend,
         name,
         host: String::new(),
         echo,
         closed: AtomicBool::new(false),
      })
   }

   /// The connection pool. Fails once the database has been closed.
   pub fn pool(&self) -> Result<&AnyPool> {
      if self.closed.load(Ordering::SeqCst) {
         return Err(Error::DatabaseClosed);
      }
      Ok(&self.pool)
   }

   pub fn backend(&self) -> Backend {
      self.backend
   }

   /// The database name this engine is bound to.
   pub fn name(&self) -> &str {
      &self.name
   }

   /// Host (or SQLite directory) from the credentials, empty when connected
   /// by URL.
   pub fn host(&self) -> &str {
      &self.host
   }

   /// Whether SQL statements are echoed to the log.
   pub fn echo(&self) -> bool {
      self.echo
   }

   pub fn is_closed(&self) -> bool {
      self.closed.load(Ordering::SeqCst)
   }

   /// Close the pool, waiting for checked-out connections to be returned.
   ///
   /// A session with an open transaction holds one of those connections, so
   /// commit, roll back or drop every session first; otherwise this waits
   /// forever. Closing twice is a no-op.
   pub async fn close(&self) -> Result<()> {
      if self.closed.swap(true, Ordering::SeqCst) {
         return Ok(());
      }
      self.pool.close().await;
      debug!(database = %self.name, "database closed");
      Ok(())
   }
}

fn database_name_from_url(url: &str) -> String {
   let without_query = url.split(['?', '#']).next().unwrap_or(url);
   let last = without_query.rsplit('/').next().unwrap_or_default();
   last.strip_suffix(".db").unwrap_or(last).to_string()
}
