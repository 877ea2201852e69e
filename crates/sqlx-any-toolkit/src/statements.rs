//! SQL generation for the write helpers.
//!
//! Every function here is pure: it turns a [`TableDef`] plus row data into a
//! [`Statement`] (query text and bind values) for one [`Backend`]. Only
//! identifiers validated against the table descriptor are interpolated; all
//! data travels as bind values.
//!
//! # Dialect differences
//!
//! | Form | MySQL | PostgreSQL | SQLite |
//! |---|---|---|---|
//! | placeholder | `?` | `$1` | `?` |
//! | upsert | `ON DUPLICATE KEY UPDATE c = VALUES(c)` | `ON CONFLICT (k) DO UPDATE SET c = excluded.c` | same as PostgreSQL |
//! | insert-ignore | `INSERT IGNORE` | `ON CONFLICT DO NOTHING` | `INSERT OR IGNORE` |

use serde_json::Value as JsonValue;
use sqlx_any_conn_mgr::Backend;

use crate::model::{ColumnDef, SqlType, TableDef};
use crate::row::Row;
use crate::{Error, Result};

/// A value to bind, with the declared type of its column when known.
#[derive(Debug, Clone, PartialEq)]
pub struct BindValue {
   pub value: JsonValue,
   pub sql_type: Option<SqlType>,
}

impl BindValue {
   pub fn untyped(value: JsonValue) -> Self {
      Self {
         value,
         sql_type: None,
      }
   }
}

/// Query text plus its bind values, in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
   pub query: String,
   pub values: Vec<BindValue>,
}

/// How an INSERT treats rows that collide with an existing key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertMode {
   /// Collisions are errors.
   Plain,
   /// Colliding rows are skipped.
   Ignore,
   /// Colliding rows are updated; the conflict key columns are given.
   Upsert { keys: Vec<String> },
}

/// Validate that an identifier is safe for SQL interpolation.
///
/// Accepts names matching `[a-zA-Z_][a-zA-Z0-9_]*`.
pub(crate) fn validate_identifier(name: &str) -> Result<()> {
   let mut chars = name.chars();
   let valid_start = chars
      .next()
      .is_some_and(|first| first.is_ascii_alphabetic() || first == '_');

   if !valid_start || !chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_') {
      return Err(Error::InvalidIdentifier {
         name: name.to_string(),
      });
   }

   Ok(())
}

/// Collects bind values and hands out placeholders in order.
struct Params {
   backend: Backend,
   values: Vec<BindValue>,
}

impl Params {
   fn new(backend: Backend) -> Self {
      Self {
         backend,
         values: Vec::new(),
      }
   }

   fn push(&mut self, value: JsonValue, sql_type: Option<SqlType>) -> String {
      self.values.push(BindValue { value, sql_type });
      self.backend.placeholder(self.values.len())
   }
}

fn quote(backend: Backend, name: &str) -> String {
   backend.quote_identifier(name)
}

/// Column type as written in DDL for `backend`.
pub fn column_type(backend: Backend, column: &ColumnDef) -> String {
   match (backend, column.sql_type) {
      (Backend::Postgres, SqlType::Integer) if column.auto_increment => "SERIAL".into(),
      (Backend::Postgres, SqlType::BigInt) if column.auto_increment => "BIGSERIAL".into(),
      (Backend::MySql, SqlType::Integer) => "INT".into(),
      (Backend::MySql | Backend::Postgres, SqlType::BigInt) => "BIGINT".into(),
      (Backend::Sqlite, SqlType::BigInt | SqlType::Boolean) => "INTEGER".into(),
      (_, SqlType::Integer) => "INTEGER".into(),
      (Backend::MySql, SqlType::Double) => "DOUBLE".into(),
      (Backend::Postgres, SqlType::Double) => "DOUBLE PRECISION".into(),
      (Backend::Sqlite, SqlType::Double) => "REAL".into(),
      (_, SqlType::Text) => "TEXT".into(),
      (_, SqlType::Varchar(n)) => format!("VARCHAR({n})"),
      (_, SqlType::Boolean) => "BOOLEAN".into(),
      (Backend::MySql, SqlType::Blob) => "LONGBLOB".into(),
      (Backend::Postgres, SqlType::Blob) => "BYTEA".into(),
      (Backend::Sqlite, SqlType::Blob) => "BLOB".into(),
   }
}

/// `CREATE TABLE IF NOT EXISTS` for one table.
pub fn create_table(backend: Backend, table: &TableDef) -> Result<String> {
   table.validate()?;

   let pk = table.primary_key();
   // SQLite only generates keys for an inline `INTEGER PRIMARY KEY AUTOINCREMENT`
   let sqlite_inline_pk = backend == Backend::Sqlite
      && pk.len() == 1
      && table
         .get_column(pk[0])
         .is_some_and(|c| c.auto_increment && matches!(c.sql_type, SqlType::Integer | SqlType::BigInt));

   let mut parts = Vec::new();
   for column in table.columns() {
      let mut def = format!("{} {}", quote(backend, &column.name), column_type(backend, column));
      if sqlite_inline_pk && column.primary_key {
         def.push_str(" PRIMARY KEY AUTOINCREMENT");
         parts.push(def);
         continue;
      }
      if !column.nullable {
         def.push_str(" NOT NULL");
      }
      if backend == Backend::MySql && column.auto_increment {
         def.push_str(" AUTO_INCREMENT");
      }
      if column.unique {
         def.push_str(" UNIQUE");
      }
      parts.push(def);
   }

   if !pk.is_empty() && !sqlite_inline_pk {
      parts.push(format!("PRIMARY KEY ({})", quote_list(backend, pk.iter().copied())));
   }
   for key in table.unique_keys() {
      parts.push(format!(
         "UNIQUE ({})",
         quote_list(backend, key.iter().map(String::as_str))
      ));
   }

   Ok(format!(
      "CREATE TABLE IF NOT EXISTS {} ({})",
      quote(backend, table.name()),
      parts.join(", ")
   ))
}

fn quote_list<'a>(backend: Backend, names: impl Iterator<Item = &'a str>) -> String {
   names
      .map(|n| quote(backend, n))
      .collect::<Vec<_>>()
      .join(", ")
}

/// Columns shared by all rows, taken in the order of the first row.
///
/// Fails when rows are empty, name unknown columns or differ in shape.
pub(crate) fn shared_columns<'a>(table: &'a TableDef, rows: &[Row]) -> Result<Vec<&'a ColumnDef>> {
   let Some(first) = rows.first() else {
      return Err(Error::EmptyRow(table.name().to_string()));
   };
   table.check_row(first)?;
   let columns = first
      .keys()
      .map(|name| table.require_column(name))
      .collect::<Result<Vec<_>>>()?;

   for (index, row) in rows.iter().enumerate().skip(1) {
      if row.len() != columns.len() || !columns.iter().all(|c| row.contains_key(&c.name)) {
         return Err(Error::RowShapeMismatch {
            table: table.name().to_string(),
            index,
         });
      }
   }

   Ok(columns)
}

/// Rows per statement so that `columns` bind values per row stay under the
/// backend's parameter limit.
pub fn rows_per_statement(backend: Backend, columns: usize) -> usize {
   (backend.max_bind_params() / columns.max(1)).max(1)
}

/// Resolve the conflict key columns for an upsert: the given keys, or the
/// table's primary key when none are given.
pub fn conflict_keys(table: &TableDef, keys: &[&str]) -> Result<Vec<String>> {
   let keys: Vec<&str> = if keys.is_empty() {
      table.primary_key()
   } else {
      keys.to_vec()
   };
   if keys.is_empty() {
      return Err(Error::MissingConflictKeys(table.name().to_string()));
   }
   for key in &keys {
      table.require_column(key)?;
   }
   Ok(keys.into_iter().map(str::to_string).collect())
}

/// Multi-row INSERT in the given mode.
pub fn insert(backend: Backend, table: &TableDef, rows: &[Row], mode: &InsertMode) -> Result<Statement> {
   let columns = shared_columns(table, rows)?;
   let mut params = Params::new(backend);

   let column_list = quote_list(backend, columns.iter().map(|c| c.name.as_str()));
   let tuples = rows
      .iter()
      .map(|row| {
         let placeholders = columns
            .iter()
            .map(|c| params.push(row[c.name.as_str()].clone(), Some(c.sql_type)))
            .collect::<Vec<_>>();
         format!("({})", placeholders.join(", "))
      })
      .collect::<Vec<_>>()
      .join(", ");

   let verb = match (mode, backend) {
      (InsertMode::Ignore, Backend::MySql) => "INSERT IGNORE INTO",
      (InsertMode::Ignore, Backend::Sqlite) => "INSERT OR IGNORE INTO",
      _ => "INSERT INTO",
   };

   let mut query = format!(
      "{verb} {} ({column_list}) VALUES {tuples}",
      quote(backend, table.name())
   );

   match mode {
      InsertMode::Plain => {}
      InsertMode::Ignore => {
         if backend == Backend::Postgres {
            query.push_str(" ON CONFLICT DO NOTHING");
         }
      }
      InsertMode::Upsert { keys } => {
         if keys.is_empty() {
            return Err(Error::MissingConflictKeys(table.name().to_string()));
         }
         // ON DUPLICATE KEY fires on any unique key, so MySQL never rewrites
         // primary-key or unique columns.
         let updates: Vec<&str> = columns
            .iter()
            .filter(|c| backend != Backend::MySql || !is_unique_member(table, c))
            .map(|c| c.name.as_str())
            .filter(|name| !keys.iter().any(|k| k == name))
            .collect();
         query.push_str(&upsert_clause(backend, keys, &updates));
      }
   }

   Ok(Statement {
      query,
      values: params.values,
   })
}

fn is_unique_member(table: &TableDef, column: &ColumnDef) -> bool {
   column.primary_key
      || column.unique
      || table
         .unique_keys()
         .iter()
         .any(|key| key.iter().any(|name| *name == column.name))
}

fn upsert_clause(backend: Backend, keys: &[String], updates: &[&str]) -> String {
   match backend {
      Backend::MySql => {
         let assignments = if updates.is_empty() {
            // no-op assignment keeps the statement valid
            let key = quote(backend, &keys[0]);
            format!("{key} = {key}")
         } else {
            updates
               .iter()
               .map(|name| {
                  let col = quote(backend, name);
                  format!("{col} = VALUES({col})")
               })
               .collect::<Vec<_>>()
               .join(", ")
         };
         format!(" ON DUPLICATE KEY UPDATE {assignments}")
      }
      Backend::Postgres | Backend::Sqlite => {
         let target = quote_list(backend, keys.iter().map(String::as_str));
         if updates.is_empty() {
            format!(" ON CONFLICT ({target}) DO NOTHING")
         } else {
            let assignments = updates
               .iter()
               .map(|name| {
                  let col = quote(backend, name);
                  format!("{col} = excluded.{col}")
               })
               .collect::<Vec<_>>()
               .join(", ");
            format!(" ON CONFLICT ({target}) DO UPDATE SET {assignments}")
         }
      }
   }
}

fn where_clause(backend: Backend, table: &TableDef, filter: &Row, params: &mut Params) -> Result<String> {
   if filter.is_empty() {
      return Ok(String::new());
   }
   let conditions = filter
      .iter()
      .map(|(name, value)| {
         let column = table.require_column(name)?;
         let col = quote(backend, &column.name);
         if value.is_null() {
            Ok(format!("{col} IS NULL"))
         } else {
            let placeholder = params.push(value.clone(), Some(column.sql_type));
            Ok(format!("{col} = {placeholder}"))
         }
      })
      .collect::<Result<Vec<_>>>()?;
   Ok(format!(" WHERE {}", conditions.join(" AND ")))
}

/// `UPDATE .. SET values WHERE filter` with an equality filter.
pub fn update(backend: Backend, table: &TableDef, filter: &Row, values: &Row) -> Result<Statement> {
   if filter.is_empty() {
      return Err(Error::EmptyFilter(table.name().to_string()));
   }
   table.check_row(values)?;

   let mut params = Params::new(backend);
   let assignments = values
      .iter()
      .map(|(name, value)| {
         let column = table.require_column(name)?;
         let placeholder = params.push(value.clone(), Some(column.sql_type));
         Ok(format!("{} = {placeholder}", quote(backend, &column.name)))
      })
      .collect::<Result<Vec<_>>>()?;
   let where_sql = where_clause(backend, table, filter, &mut params)?;

   Ok(Statement {
      query: format!(
         "UPDATE {} SET {}{where_sql}",
         quote(backend, table.name()),
         assignments.join(", ")
      ),
      values: params.values,
   })
}

/// `SELECT <all columns> FROM table WHERE filter [LIMIT n]`.
pub fn select(backend: Backend, table: &TableDef, filter: &Row, limit: Option<usize>) -> Result<Statement> {
   table.validate()?;
   let mut params = Params::new(backend);
   let where_sql = where_clause(backend, table, filter, &mut params)?;

   let mut query = format!(
      "SELECT {} FROM {}{where_sql}",
      quote_list(backend, table.column_names()),
      quote(backend, table.name())
   );
   if let Some(limit) = limit {
      query.push_str(&format!(" LIMIT {limit}"));
   }

   Ok(Statement {
      query,
      values: params.values,
   })
}
