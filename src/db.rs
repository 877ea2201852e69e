//! The database session manager

use std::path::PathBuf;

use serde_json::Value as JsonValue;
use sqlx_any_conn_mgr::{
   CredentialSource, Database, DatabaseConfig, EnvCredentials, FileCredentials,
};
use sqlx_any_toolkit::{
   ModelBase, Result, Row, Session, SessionFactory, TableDef, UpsertOutcome,
};
use tracing::{debug, info};

/// One database: its engine, session factory, live session and the model
/// base whose tables it manages.
///
/// Table arguments of the helpers are table names looked up in the model
/// base; an unregistered name fails with
/// [`Error::UnknownTable`](crate::Error::UnknownTable).
///
/// ```no_run
/// use serde_json::json;
/// use sqlx_query_helpers::{ColumnDef, Db, ModelBase, SqlType, TableDef, row_from_values};
///
/// # async fn example() -> sqlx_query_helpers::Result<()> {
/// let base = ModelBase::new().with_table(
///    TableDef::new("prices")
///       .column(ColumnDef::new("sku", SqlType::Varchar(32)).primary_key())
///       .column(ColumnDef::new("amount", SqlType::Double)),
/// );
///
/// // credentials from DB_USER / DB_PASSWORD / DB_HOST
/// let mut db = Db::connect("shop", base, true, false).await?;
///
/// let row = row_from_values(&["sku", "amount"], vec![json!("A-1"), json!(9.5)])?;
/// db.upsert("prices", vec![row], &[]).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Db {
   name: String,
   base: ModelBase,
   engine: Database,
   session_factory: SessionFactory,
   session: Session,
}

impl Db {
   /// Connect to database `name`, creating the tables of `base` that do not
   /// exist yet.
   ///
   /// Credentials come from the `DB_USER`, `DB_PASSWORD` and `DB_HOST`
   /// environment variables when `use_os_env` is set, otherwise from
   /// `db.toml` in the working directory. With `echo` every SQL statement
   /// is logged.
   pub async fn connect(name: &str, base: ModelBase, use_os_env: bool, echo: bool) -> Result<Self> {
      Self::builder(name, base)
         .use_os_env(use_os_env)
         .echo(echo)
         .connect()
         .await
   }

   pub fn builder(name: &str, base: ModelBase) -> DbBuilder {
      DbBuilder {
         name: name.to_string(),
         base,
         use_os_env: false,
         echo: false,
         source: None,
         config_path: None,
         pool_config: DatabaseConfig::default(),
         create_tables: true,
      }
   }

   /// The engine (connection pool).
   pub fn engine(&self) -> &Database {
      &self.engine
   }

   /// Database name, as the engine reports it.
   pub fn name(&self) -> &str {
      &self.name
   }

   pub fn base(&self) -> &ModelBase {
      &self.base
   }

   pub fn session_factory(&self) -> &SessionFactory {
      &self.session_factory
   }

   /// The live session the helpers run in.
   pub fn session(&mut self) -> &mut Session {
      &mut self.session
   }

   /// Look up a table of the model base.
   pub fn table(&self, name: &str) -> Result<&TableDef> {
      self.base.require(name)
   }

   /// Insert each row and commit.
   pub async fn insert_many(&mut self, table: &str, rows: Vec<Row>) -> Result<u64> {
      let table = self.base.require(table)?;
      self.session.insert_many(table, rows, true).await
   }

   /// Insert each row, leaving the transaction open.
   pub async fn insert_many_deferred(&mut self, table: &str, rows: Vec<Row>) -> Result<u64> {
      let table = self.base.require(table)?;
      self.session.insert_many(table, rows, false).await
   }

   pub async fn insert(&mut self, table: &str, row: Row) -> Result<u64> {
      let table = self.base.require(table)?;
      self.session.insert(table, row).await
   }

   /// Single-statement insert returning the generated id, if any.
   pub async fn insert_one(&mut self, table: &str, row: Row, ignore: bool) -> Result<Option<i64>> {
      let table = self.base.require(table)?;
      self.session.insert_one(table, row, ignore).await
   }

   pub async fn insert_ignore(&mut self, table: &str, row: Row) -> Result<bool> {
      let table = self.base.require(table)?;
      self.session.insert_ignore(table, row).await
   }

   /// Insert rows, skipping those that violate a constraint. Returns whether
   /// any row was inserted.
   pub async fn insert_ignore_many(&mut self, table: &str, rows: Vec<Row>) -> Result<bool> {
      let table = self.base.require(table)?;
      self.session.insert_ignore_many(table, rows).await
   }

   pub async fn insert_ignore_bulk(&mut self, table: &str, rows: Vec<Row>) -> Result<u64> {
      let table = self.base.require(table)?;
      self.session.insert_ignore_bulk(table, rows).await
   }

   /// Insert rows, overwriting the non-key columns of rows whose conflict
   /// keys exist. Empty `keys` means the primary key.
   pub async fn upsert(&mut self, table: &str, rows: Vec<Row>, keys: &[&str]) -> Result<u64> {
      let table = self.base.require(table)?;
      self.session.upsert(table, rows, keys).await
   }

   /// Set `values` on rows matching `filter`; returns the affected count.
   pub async fn update(&mut self, table: &str, filter: Row, values: Row) -> Result<u64> {
      let table = self.base.require(table)?;
      self.session.update(table, filter, values).await
   }

   pub async fn update_by_keys(&mut self, table: &str, row: Row, keys: &[&str]) -> Result<u64> {
      let table = self.base.require(table)?;
      self.session.update_by_keys(table, row, keys).await
   }

   pub async fn upsert_with_select(
      &mut self,
      table: &str,
      row: Row,
      keys: &[&str],
   ) -> Result<UpsertOutcome> {
      let table = self.base.require(table)?;
      self.session.upsert_with_select(table, row, keys).await
   }

   pub async fn select(&mut self, table: &str, filter: Row) -> Result<Vec<Row>> {
      let table = self.base.require(table)?;
      self.session.select(table, filter).await
   }

   /// Run raw SQL statements one after another on an engine connection,
   /// outside the live session.
   pub async fn execute_sqls<I, S>(&self, sqls: I) -> Result<()>
   where
      I: IntoIterator<Item = S>,
      S: AsRef<str>,
   {
      let mut conn = self.engine.pool()?.acquire().await?;
      for sql in sqls {
         let sql = sql.as_ref();
         sqlx::raw_sql(sql).execute(&mut *conn).await?;
         debug!(database = %self.name, "raw statement executed");
      }
      Ok(())
   }

   /// Introspect a table of the database, registered or not.
   pub async fn reflect_table(&mut self, name: &str) -> Result<TableDef> {
      self.session.reflect_table(name).await
   }

   /// Roll back pending work and close the engine.
   pub async fn close(&mut self) -> Result<()> {
      self.session.close().await?;
      self.engine.close().await?;
      Ok(())
   }
}

/// Configures how a [`Db`] connects.
#[derive(Debug)]
pub struct DbBuilder {
   name: String,
   base: ModelBase,
   use_os_env: bool,
   echo: bool,
   source: Option<Box<dyn CredentialSource>>,
   config_path: Option<PathBuf>,
   pool_config: DatabaseConfig,
   create_tables: bool,
}

impl DbBuilder {
   /// Read credentials from `DB_*` environment variables instead of the
   /// config file.
   pub fn use_os_env(mut self, use_os_env: bool) -> Self {
      self.use_os_env = use_os_env;
      self
   }

   /// Log every SQL statement.
   pub fn echo(mut self, echo: bool) -> Self {
      self.echo = echo;
      self
   }

   /// Use this credential source; overrides `use_os_env` and `config_path`.
   pub fn credentials(mut self, source: impl CredentialSource + 'static) -> Self {
      self.source = Some(Box::new(source));
      self
   }

   /// Credentials file to read instead of `db.toml`.
   pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
      self.config_path = Some(path.into());
      self
   }

   pub fn pool_config(mut self, config: DatabaseConfig) -> Self {
      self.pool_config = config;
      self
   }

   /// Whether to create missing tables of the model base (default: yes).
   pub fn create_tables(mut self, create_tables: bool) -> Self {
      self.create_tables = create_tables;
      self
   }

   fn credential_source(&mut self) -> Box<dyn CredentialSource> {
      if let Some(source) = self.source.take() {
         return source;
      }
      if self.use_os_env {
         return Box::new(EnvCredentials::default());
      }
      match self.config_path.take() {
         Some(path) => Box::new(FileCredentials::new(path)),
         None => Box::new(FileCredentials::default()),
      }
   }

   pub async fn connect(mut self) -> Result<Db> {
      let source = self.credential_source();
      let engine =
         Database::connect_with_source(source.as_ref(), &self.name, self.pool_config, self.echo)
            .await?;

      let session_factory = SessionFactory::new(&engine)?;
      let mut session = session_factory.session();
      if self.create_tables {
         session.create_all(&self.base).await?;
      }

      let name = engine.name().to_string();
      info!(database = %name, backend = %engine.backend(), tables = self.base.len(), "database session manager ready");

      Ok(Db {
         name,
         base: self.base,
         engine,
         session_factory,
         session,
      })
   }
}

/// Build a row from `(column, value)` pairs.
///
/// ```
/// use serde_json::json;
/// use sqlx_query_helpers::row;
///
/// let r = row([("sku", json!("A-1")), ("qty", json!(2))]);
/// assert_eq!(r["qty"], json!(2));
/// ```
pub fn row<'a>(pairs: impl IntoIterator<Item = (&'a str, JsonValue)>) -> Row {
   pairs
      .into_iter()
      .map(|(name, value)| (name.to_string(), value))
      .collect()
}
