//! Unit-of-work sessions over the engine's pool

use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::any::{AnyArguments, AnyQueryResult};
use sqlx::{Any, AnyConnection, AnyPool, Transaction};
use sqlx_any_conn_mgr::{Backend, Database};
use tracing::debug;

use crate::decode::decode_rows;
use crate::model::{ModelBase, SqlType};
use crate::row::Row;
use crate::statements::{self, BindValue, Statement};
use crate::{Error, Result};

type AnyQuery<'q> = sqlx::query::Query<'q, Any, AnyArguments<'q>>;

/// Result returned from write operations (e.g. INSERT, UPDATE, DELETE).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteQueryResult {
   /// The number of rows affected by the write operation.
   pub rows_affected: u64,
   /// The last inserted row ID.
   ///
   /// Set by MySQL, and on SQLite for INSERTs that added a row (read back
   /// with `last_insert_rowid()`). PostgreSQL never sets it.
   pub last_insert_id: Option<i64>,
}

impl From<AnyQueryResult> for WriteQueryResult {
   fn from(result: AnyQueryResult) -> Self {
      Self {
         rows_affected: result.rows_affected(),
         last_insert_id: result.last_insert_id(),
      }
   }
}

/// Creates [`Session`]s bound to one engine.
#[derive(Debug, Clone)]
pub struct SessionFactory {
   pool: AnyPool,
   backend: Backend,
}

impl SessionFactory {
   /// Bind a factory to an open database.
   pub fn new(db: &Database) -> Result<Self> {
      Ok(Self::from_pool(db.pool()?.clone(), db.backend()))
   }

   pub fn from_pool(pool: AnyPool, backend: Backend) -> Self {
      Self { pool, backend }
   }

   pub fn backend(&self) -> Backend {
      self.backend
   }

   /// Open a new session. No connection is taken until the session is used.
   pub fn session(&self) -> Session {
      Session {
         pool: self.pool.clone(),
         backend: self.backend,
         tx: None,
      }
   }
}

/// A unit of work.
///
/// The first write begins a transaction ("autobegin") which stays open until
/// [`commit`](Self::commit) or [`rollback`](Self::rollback). Reads go through
/// the open transaction so they see its uncommitted writes; without one they
/// use any pooled connection. Dropping a session with an open transaction
/// rolls it back.
#[must_use = "if unused, pending writes are rolled back"]
pub struct Session {
   pool: AnyPool,
   backend: Backend,
   tx: Option<Transaction<'static, Any>>,
}

impl fmt::Debug for Session {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("Session")
         .field("backend", &self.backend)
         .field("in_transaction", &self.in_transaction())
         .finish_non_exhaustive()
   }
}

impl Session {
   pub fn backend(&self) -> Backend {
      self.backend
   }

   /// Whether a transaction is currently open.
   pub fn in_transaction(&self) -> bool {
      self.tx.is_some()
   }

   /// Begin a transaction now instead of on the first write.
   pub async fn begin(&mut self) -> Result<()> {
      self.transaction().await.map(|_| ())
   }

   /// The open transaction, beginning one when there is none.
   pub(crate) async fn transaction(&mut self) -> Result<&mut Transaction<'static, Any>> {
      let tx = match self.tx.take() {
         Some(tx) => tx,
         None => {
            let tx = self.pool.begin().await?;
            debug!(backend = %self.backend, "transaction begun");
            tx
         }
      };
      Ok(self.tx.insert(tx))
   }

   /// Execute a write query inside the session transaction.
   pub async fn execute(&mut self, query: &str, values: Vec<JsonValue>) -> Result<WriteQueryResult> {
      self.execute_statement(untyped(query, values)).await
   }

   /// Execute a generated statement inside the session transaction.
   pub async fn execute_statement(&mut self, statement: Statement) -> Result<WriteQueryResult> {
      let backend = self.backend;
      let tx = self.transaction().await?;
      run(&mut **tx, backend, &statement).await
   }

   /// Execute a SELECT query, possibly returning multiple rows.
   pub async fn fetch_all(&mut self, query: &str, values: Vec<JsonValue>) -> Result<Vec<Row>> {
      self.fetch_statement(untyped(query, values)).await
   }

   /// Execute a SELECT query expecting zero or one result.
   pub async fn fetch_one(&mut self, query: &str, values: Vec<JsonValue>) -> Result<Option<Row>> {
      let mut rows = self.fetch_all(query, values).await?;
      match rows.len() {
         0 => Ok(None),
         1 => Ok(rows.pop()),
         count => Err(Error::MultipleRowsReturned(count)),
      }
   }

   pub(crate) async fn fetch_statement(&mut self, statement: Statement) -> Result<Vec<Row>> {
      let query = build_query(&statement)?;
      let rows = match self.tx.as_mut() {
         Some(tx) => query.fetch_all(&mut **tx).await?,
         None => {
            let mut conn = self.pool.acquire().await?;
            query.fetch_all(&mut *conn).await?
         }
      };
      decode_rows(rows)
   }

   /// Commit the open transaction. Without one this is a no-op.
   pub async fn commit(&mut self) -> Result<()> {
      if let Some(tx) = self.tx.take() {
         tx.commit().await?;
         debug!(backend = %self.backend, "transaction committed");
      }
      Ok(())
   }

   /// Roll back the open transaction. Without one this is a no-op.
   pub async fn rollback(&mut self) -> Result<()> {
      if let Some(tx) = self.tx.take() {
         tx.rollback().await?;
         debug!(backend = %self.backend, "transaction rolled back");
      }
      Ok(())
   }

   /// Release the session: pending work is rolled back and the connection
   /// returns to the pool. The session stays usable afterwards.
   pub async fn close(&mut self) -> Result<()> {
      self.rollback().await
   }

   /// Create every table of `base` that does not exist yet, then commit.
   pub async fn create_all(&mut self, base: &ModelBase) -> Result<()> {
      for table in base.tables() {
         let sql = statements::create_table(self.backend, table)?;
         self
            .execute_statement(Statement {
               query: sql,
               values: Vec::new(),
            })
            .await?;
         debug!(table = table.name(), "table ensured");
      }
      self.commit().await
   }

   /// Run `statement` inside a savepoint of the session transaction.
   ///
   /// On an integrity violation the savepoint is rolled back and `Ok(None)`
   /// is returned; the outer transaction stays usable. Other errors
   /// propagate.
   pub(crate) async fn execute_in_savepoint(
      &mut self,
      statement: &Statement,
   ) -> Result<Option<WriteQueryResult>> {
      let backend = self.backend;
      let tx = self.transaction().await?;
      let mut savepoint = sqlx::Connection::begin(&mut **tx).await?;

      match run(&mut *savepoint, backend, statement).await {
         Ok(result) => {
            savepoint.commit().await?;
            Ok(Some(result))
         }
         Err(e) => {
            savepoint.rollback().await?;
            if e.is_integrity_violation() {
               debug!(error = %e, "integrity violation ignored");
               Ok(None)
            } else {
               Err(e)
            }
         }
      }
   }
}

impl Drop for Session {
   fn drop(&mut self) {
      if self.tx.is_some() {
         // The transaction's own drop queues the ROLLBACK.
         debug!(backend = %self.backend, "dropping session with open transaction (will auto-rollback)");
      }
   }
}

fn untyped(query: &str, values: Vec<JsonValue>) -> Statement {
   Statement {
      query: query.to_string(),
      values: values.into_iter().map(BindValue::untyped).collect(),
   }
}

async fn run(
   conn: &mut AnyConnection,
   backend: Backend,
   statement: &Statement,
) -> Result<WriteQueryResult> {
   let mut result: WriteQueryResult = build_query(statement)?.execute(&mut *conn).await?.into();

   // The Any driver drops SQLite's rowid; read it on the same connection.
   if backend == Backend::Sqlite
      && result.last_insert_id.is_none()
      && result.rows_affected > 0
      && is_insert(&statement.query)
   {
      let rowid: i64 = sqlx::query_scalar("SELECT last_insert_rowid()")
         .fetch_one(&mut *conn)
         .await?;
      result.last_insert_id = Some(rowid);
   }
   Ok(result)
}

fn is_insert(query: &str) -> bool {
   query
      .trim_start()
      .get(..6)
      .is_some_and(|verb| verb.eq_ignore_ascii_case("insert"))
}

fn build_query(statement: &Statement) -> Result<AnyQuery<'_>> {
   let mut query = sqlx::query(&statement.query);
   for value in &statement.values {
      query = bind_value(query, value.clone())?;
   }
   Ok(query)
}

/// Bind a JSON value, using the column type (when known) to pick the SQL
/// type.
///
/// Blob columns take base64 strings (the form blobs are decoded into) or
/// arrays of byte values; any other string fails with
/// [`Error::InvalidBlobValue`]. Arrays and objects for other columns are
/// bound as their JSON text.
pub(crate) fn bind_value(query: AnyQuery<'_>, bind: BindValue) -> Result<AnyQuery<'_>> {
   let BindValue { value, sql_type } = bind;
   let query = match value {
      JsonValue::Null => bind_null(query, sql_type),
      JsonValue::Bool(b) => query.bind(b),
      JsonValue::Number(number) => match sql_type {
         Some(SqlType::Boolean) => query.bind(number.as_f64().is_some_and(|n| n != 0.0)),
         Some(SqlType::Double) => query.bind(number.as_f64().unwrap_or_default()),
         _ => bind_number(query, &number),
      },
      JsonValue::String(s) => match sql_type {
         Some(SqlType::Blob) => {
            let bytes = BASE64
               .decode(s.as_bytes())
               .map_err(|e| Error::InvalidBlobValue(e.to_string()))?;
            query.bind(bytes)
         }
         _ => query.bind(s),
      },
      JsonValue::Array(items)
         if sql_type == Some(SqlType::Blob) && items.iter().all(|i| i.as_u64().is_some_and(|b| b <= 255)) =>
      {
         let bytes: Vec<u8> = items
            .iter()
            .filter_map(|i| i.as_u64().map(|b| b as u8))
            .collect();
         query.bind(bytes)
      }
      other => query.bind(other.to_string()),
   };
   Ok(query)
}

fn bind_number<'q>(query: AnyQuery<'q>, number: &serde_json::Number) -> AnyQuery<'q> {
   // Preserve integer precision by binding as i64 when possible
   if let Some(int_val) = number.as_i64() {
      query.bind(int_val)
   } else if let Some(uint_val) = number.as_u64() {
      // Value too large for i64, use f64 (will lose precision)
      query.bind(uint_val as f64)
   } else {
      query.bind(number.as_f64().unwrap_or_default())
   }
}

fn bind_null(query: AnyQuery<'_>, sql_type: Option<SqlType>) -> AnyQuery<'_> {
   match sql_type {
      Some(SqlType::Double) => query.bind(None::<f64>),
      Some(SqlType::Text | SqlType::Varchar(_)) => query.bind(None::<String>),
      Some(SqlType::Boolean) => query.bind(None::<bool>),
      Some(SqlType::Blob) => query.bind(None::<Vec<u8>>),
      // an integer NULL converts to the widest range of column types
      Some(SqlType::Integer | SqlType::BigInt) | None => query.bind(None::<i64>),
   }
}
