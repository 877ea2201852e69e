//! Error types for sqlx-any-conn-mgr

use std::path::PathBuf;

use thiserror::Error;

/// Errors that may occur when resolving credentials or connecting
#[derive(Error, Debug)]
pub enum Error {
   /// One or more credential variables are not set in the process environment.
   #[error(
      "missing database credentials in environment: set {prefix}USER, {prefix}PASSWORD and {prefix}HOST ({source})"
   )]
   Environment {
      prefix: String,
      #[source]
      source: envy::Error,
   },

   /// The credentials file could not be read (usually: it does not exist).
   #[error("failed to read credentials file {}: {source}", path.display())]
   ConfigFileRead {
      path: PathBuf,
      #[source]
      source: std::io::Error,
   },

   /// The credentials file is not valid TOML or lacks a required field.
   #[error("invalid credentials file {}: {source}", path.display())]
   ConfigFileParse {
      path: PathBuf,
      #[source]
      source: toml::de::Error,
   },

   /// The connection URL could not be assembled from the credentials.
   #[error("invalid connection url: {0}")]
   InvalidUrl(String),

   /// The URL scheme or backend name is not one of mysql, postgres, sqlite.
   #[error("unsupported database backend: {0}")]
   UnsupportedBackend(String),

   /// Error from the sqlx library. Standard sqlx errors are converted to this variant
   #[error("Sqlx error: {0}")]
   Sqlx(#[from] sqlx::Error),

   /// Database has been closed and cannot be used
   #[error("Database has been closed")]
   DatabaseClosed,
}

impl Error {
   /// Whether this error was raised while resolving configuration, before
   /// any connection was attempted.
   pub fn is_config_error(&self) -> bool {
      matches!(
         self,
         Error::Environment { .. }
            | Error::ConfigFileRead { .. }
            | Error::ConfigFileParse { .. }
            | Error::InvalidUrl(_)
            | Error::UnsupportedBackend(_)
      )
   }
}

/// A type alias for Results with our Error type
pub type Result<T> = std::result::Result<T, Error>;
