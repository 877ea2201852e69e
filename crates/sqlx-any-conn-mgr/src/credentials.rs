//! Credential resolution strategies and connection URL assembly

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::{Backend, Error, Result};

/// Environment variable prefix used by [`EnvCredentials::default`].
pub const DEFAULT_ENV_PREFIX: &str = "DB_";

/// Credentials file used by [`FileCredentials::default`], relative to the
/// working directory.
pub const DEFAULT_CONFIG_FILE: &str = "db.toml";

/// Everything needed to reach a database server, minus the database name.
///
/// For [`Backend::Sqlite`] the `host` is the directory holding the database
/// files and `user` / `password` are ignored.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
   pub host: String,
   pub user: String,
   pub password: String,
   #[serde(default)]
   pub port: Option<u16>,
   #[serde(default)]
   pub backend: Backend,
}

impl fmt::Debug for Credentials {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("Credentials")
         .field("host", &self.host)
         .field("user", &self.user)
         .field("password", &"[REDACTED]")
         .field("port", &self.port)
         .field("backend", &self.backend)
         .finish()
   }
}

impl Credentials {
   pub fn new(
      host: impl Into<String>,
      user: impl Into<String>,
      password: impl Into<String>,
   ) -> Self {
      Self {
         host: host.into(),
         user: user.into(),
         password: password.into(),
         port: None,
         backend: Backend::default(),
      }
   }

   /// Credentials for a SQLite database stored under `dir`.
   pub fn sqlite(dir: impl AsRef<Path>) -> Self {
      Self {
         host: dir.as_ref().display().to_string(),
         user: String::new(),
         password: String::new(),
         port: None,
         backend: Backend::Sqlite,
      }
   }

   pub fn with_backend(mut self, backend: Backend) -> Self {
      self.backend = backend;
      self
   }

   pub fn with_port(mut self, port: u16) -> Self {
      self.port = Some(port);
      self
   }

   /// Build the connection URL for `database`.
   ///
   /// User and password are percent-encoded, so they may contain any
   /// character.
   pub fn connection_url(&self, database: &str) -> Result<String> {
      if self.backend == Backend::Sqlite {
         let path = Path::new(&self.host).join(format!("{database}.db"));
         return Ok(format!("sqlite://{}?mode=rwc", path.display()));
      }

      let invalid = |what: &str| Error::InvalidUrl(format!("{what} rejected for host '{}'", self.host));

      let mut url = Url::parse(&format!("{}://{}", self.backend.scheme(), self.host))
         .map_err(|e| Error::InvalidUrl(format!("{e} (host '{}')", self.host)))?;
      url.set_username(&self.user).map_err(|_| invalid("user"))?;
      url.set_password(Some(&self.password))
         .map_err(|_| invalid("password"))?;
      if let Some(port) = self.port {
         url.set_port(Some(port)).map_err(|_| invalid("port"))?;
      }
      url.set_path(&format!("/{database}"));

      Ok(url.to_string())
   }
}

/// A strategy for resolving [`Credentials`].
pub trait CredentialSource: fmt::Debug + Send + Sync {
   /// Resolve the credentials. Fails with a configuration error when the
   /// source is incomplete; never touches the network.
   fn resolve(&self) -> Result<Credentials>;
}

/// Reads `<PREFIX>USER`, `<PREFIX>PASSWORD` and `<PREFIX>HOST` (optionally
/// `<PREFIX>PORT` and `<PREFIX>BACKEND`) from the process environment.
#[derive(Debug, Clone)]
pub struct EnvCredentials {
   prefix: String,
}

impl Default for EnvCredentials {
   fn default() -> Self {
      Self::with_prefix(DEFAULT_ENV_PREFIX)
   }
}

impl EnvCredentials {
   pub fn with_prefix(prefix: impl Into<String>) -> Self {
      Self {
         prefix: prefix.into(),
      }
   }

   pub fn prefix(&self) -> &str {
      &self.prefix
   }

   /// Resolve from an explicit set of variables instead of the process
   /// environment.
   pub fn resolve_from<I>(&self, vars: I) -> Result<Credentials>
   where
      I: IntoIterator<Item = (String, String)>,
   {
      let credentials = envy::prefixed(self.prefix.as_str())
         .from_iter::<_, Credentials>(vars)
         .map_err(|source| Error::Environment {
            prefix: self.prefix.clone(),
            source,
         })?;

      debug!(prefix = %self.prefix, backend = %credentials.backend, "resolved credentials from environment");
      Ok(credentials)
   }
}

impl CredentialSource for EnvCredentials {
   fn resolve(&self) -> Result<Credentials> {
      self.resolve_from(std::env::vars())
   }
}

/// Reads credentials from a TOML file:
///
/// ```toml
/// host = "localhost"
/// user = "app"
/// password = "secret"
/// # optional
/// port = 3306
/// backend = "mysql"
/// ```
#[derive(Debug, Clone)]
pub struct FileCredentials {
   path: PathBuf,
}

impl Default for FileCredentials {
   fn default() -> Self {
      Self::new(DEFAULT_CONFIG_FILE)
   }
}

impl FileCredentials {
   pub fn new(path: impl Into<PathBuf>) -> Self {
      Self { path: path.into() }
   }

   pub fn path(&self) -> &Path {
      &self.path
   }

   /// Parse credentials from the contents of a config file.
   pub fn parse(&self, contents: &str) -> Result<Credentials> {
      toml::from_str(contents).map_err(|source| Error::ConfigFileParse {
         path: self.path.clone(),
         source,
      })
   }
}

impl CredentialSource for FileCredentials {
   fn resolve(&self) -> Result<Credentials> {
      let contents =
         std::fs::read_to_string(&self.path).map_err(|source| Error::ConfigFileRead {
            path: self.path.clone(),
            source,
         })?;
      let credentials = self.parse(&contents)?;

      debug!(path = %self.path.display(), backend = %credentials.backend, "resolved credentials from file");
      Ok(credentials)
   }
}

/// Credentials supplied directly by the caller.
#[derive(Debug, Clone)]
pub struct StaticCredentials(pub Credentials);

impl CredentialSource for StaticCredentials {
   fn resolve(&self) -> Result<Credentials> {
      Ok(self.0.clone())
   }
}
