//! Database backends reachable through the Any driver

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::Error;

/// The database server (or embedded engine) behind a connection.
///
/// The backend decides the URL scheme and the few SQL details the Any driver
/// does not paper over: bind placeholders and identifier quoting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
   #[default]
   #[serde(alias = "mariadb")]
   MySql,
   #[serde(alias = "postgresql", alias = "pg")]
   Postgres,
   #[serde(alias = "sqlite3")]
   Sqlite,
}

impl Backend {
   /// URL scheme used when building connection strings.
   pub fn scheme(self) -> &'static str {
      match self {
         Backend::MySql => "mysql",
         Backend::Postgres => "postgres",
         Backend::Sqlite => "sqlite",
      }
   }

   /// Detect the backend from a connection URL.
   pub fn from_url(url: &str) -> Result<Self, Error> {
      let scheme = url
         .split_once(':')
         .map(|(scheme, _)| scheme)
         .ok_or_else(|| Error::InvalidUrl(format!("missing scheme in '{url}'")))?;
      scheme.parse()
   }

   /// Bind placeholder for the 1-based parameter `index`.
   pub fn placeholder(self, index: usize) -> String {
      match self {
         Backend::Postgres => format!("${index}"),
         Backend::MySql | Backend::Sqlite => "?".to_string(),
      }
   }

   /// Quote an identifier, doubling any embedded quote character.
   pub fn quote_identifier(self, name: &str) -> String {
      match self {
         Backend::MySql => format!("`{}`", name.replace('`', "``")),
         Backend::Postgres | Backend::Sqlite => format!("\"{}\"", name.replace('"', "\"\"")),
      }
   }

   /// Largest number of bind parameters a single statement may carry.
   pub fn max_bind_params(self) -> usize {
      match self {
         Backend::MySql | Backend::Postgres => 65_535,
         Backend::Sqlite => 32_766,
      }
   }
}

impl FromStr for Backend {
   type Err = Error;

   fn from_str(s: &str) -> Result<Self, Self::Err> {
      match s.to_ascii_lowercase().as_str() {
         "mysql" | "mariadb" => Ok(Backend::MySql),
         "postgres" | "postgresql" | "pg" => Ok(Backend::Postgres),
         "sqlite" | "sqlite3" => Ok(Backend::Sqlite),
         other => Err(Error::UnsupportedBackend(other.to_string())),
      }
   }
}

impl fmt::Display for Backend {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str(self.scheme())
   }
}
