//! Table reflection from the database catalog

use serde_json::Value as JsonValue;
use sqlx_any_conn_mgr::Backend;

use crate::model::{ColumnDef, SqlType, TableDef};
use crate::row::Row;
use crate::session::Session;
use crate::statements::validate_identifier;
use crate::{Error, Result};

const SQLITE_COLUMNS: &str = r#"SELECT name, type AS data_type, "notnull" AS not_null, pk FROM pragma_table_info(?) ORDER BY cid"#;

// information_schema columns come back as charset-specific or domain types
// the Any driver cannot carry, hence the casts.
const MYSQL_COLUMNS: &str = "SELECT CAST(COLUMN_NAME AS CHAR) AS name, \
   CAST(COLUMN_TYPE AS CHAR) AS data_type, \
   CAST(IS_NULLABLE AS CHAR) AS nullable, \
   CAST(COLUMN_KEY AS CHAR) AS column_key, \
   CAST(EXTRA AS CHAR) AS extra \
   FROM information_schema.COLUMNS \
   WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? \
   ORDER BY ORDINAL_POSITION";

const POSTGRES_COLUMNS: &str = "SELECT c.column_name::text AS name, \
   c.data_type::text AS data_type, \
   c.character_maximum_length::bigint AS max_len, \
   c.is_nullable::text AS nullable, \
   (COALESCE(c.column_default, '') LIKE 'nextval(%' OR c.is_identity::text = 'YES') AS auto_increment, \
   EXISTS ( \
      SELECT 1 FROM information_schema.table_constraints tc \
      JOIN information_schema.key_column_usage k \
         ON k.constraint_name = tc.constraint_name \
         AND k.table_schema = tc.table_schema \
         AND k.table_name = tc.table_name \
      WHERE tc.constraint_type = 'PRIMARY KEY' \
         AND tc.table_schema = c.table_schema \
         AND tc.table_name = c.table_name \
         AND k.column_name = c.column_name \
   ) AS is_pk \
   FROM information_schema.columns c \
   WHERE c.table_schema = current_schema() AND c.table_name = $1 \
   ORDER BY c.ordinal_position";

impl Session {
   /// Introspect an existing table: columns, types, nullability and
   /// primary key.
   ///
   /// Fails with [`Error::TableNotFound`] when the table does not exist.
   pub async fn reflect_table(&mut self, name: &str) -> Result<TableDef> {
      validate_identifier(name)?;

      let query = match self.backend() {
         Backend::MySql => MYSQL_COLUMNS,
         Backend::Postgres => POSTGRES_COLUMNS,
         Backend::Sqlite => SQLITE_COLUMNS,
      };
      let rows = self
         .fetch_all(query, vec![JsonValue::String(name.to_string())])
         .await?;
      if rows.is_empty() {
         return Err(Error::TableNotFound(name.to_string()));
      }

      let backend = self.backend();
      let single_pk = backend == Backend::Sqlite
         && rows.iter().filter(|r| int_field(r, "pk") > 0).count() == 1;

      let mut table = TableDef::new(name);
      for row in &rows {
         let column = match backend {
            Backend::Sqlite => sqlite_column(row, single_pk)?,
            Backend::MySql => mysql_column(row)?,
            Backend::Postgres => postgres_column(row)?,
         };
         table = table.column(column);
      }
      Ok(table)
   }
}

fn text_field<'a>(row: &'a Row, key: &str) -> &'a str {
   row.get(key).and_then(JsonValue::as_str).unwrap_or_default()
}

fn int_field(row: &Row, key: &str) -> i64 {
   match row.get(key) {
      Some(JsonValue::Bool(b)) => i64::from(*b),
      Some(value) => value.as_i64().unwrap_or_default(),
      None => 0,
   }
}

fn sqlite_column(row: &Row, single_pk: bool) -> Result<ColumnDef> {
   let sql_type = parse_type(Backend::Sqlite, text_field(row, "data_type"), None)?;
   let mut column = ColumnDef::new(text_field(row, "name"), sql_type);
   if int_field(row, "not_null") != 0 {
      column = column.not_null();
   }
   if int_field(row, "pk") > 0 {
      column = column.primary_key();
      // an INTEGER PRIMARY KEY aliases the rowid and is generated
      if single_pk && matches!(sql_type, SqlType::BigInt) {
         column = column.auto_increment();
      }
   }
   Ok(column)
}

fn mysql_column(row: &Row) -> Result<ColumnDef> {
   let sql_type = parse_type(Backend::MySql, text_field(row, "data_type"), None)?;
   let mut column = ColumnDef::new(text_field(row, "name"), sql_type);
   if text_field(row, "nullable") == "NO" {
      column = column.not_null();
   }
   match text_field(row, "column_key") {
      "PRI" => column = column.primary_key(),
      "UNI" => column = column.unique(),
      _ => {}
   }
   if text_field(row, "extra").contains("auto_increment") {
      column = column.auto_increment();
   }
   Ok(column)
}

fn postgres_column(row: &Row) -> Result<ColumnDef> {
   let max_len = row.get("max_len").and_then(JsonValue::as_i64);
   let sql_type = parse_type(Backend::Postgres, text_field(row, "data_type"), max_len)?;
   let mut column = ColumnDef::new(text_field(row, "name"), sql_type);
   if text_field(row, "nullable") == "NO" {
      column = column.not_null();
   }
   if int_field(row, "is_pk") != 0 {
      column = column.primary_key();
   }
   if int_field(row, "auto_increment") != 0 {
      column = column.auto_increment();
   }
   Ok(column)
}

/// Map a catalog type name such as `varchar(32)`, `tinyint(1)` or
/// `character varying` onto a [`SqlType`].
fn parse_type(backend: Backend, declared: &str, max_len: Option<i64>) -> Result<SqlType> {
   let lower = declared.trim().to_ascii_lowercase();
   let (base, arg) = match lower.split_once('(') {
      Some((base, rest)) => {
         let arg = rest
            .split([',', ')'])
            .next()
            .and_then(|n| n.trim().parse::<u32>().ok());
         (base.trim(), arg)
      }
      None => (lower.as_str(), None),
   };
   // drop modifiers like "unsigned"
   let base = base.split_whitespace().collect::<Vec<_>>().join(" ");
   let length = arg.or_else(|| max_len.and_then(|n| u32::try_from(n).ok()));

   let sql_type = match base.as_str() {
      "tinyint" if arg == Some(1) => SqlType::Boolean,
      "integer" | "int" if backend == Backend::Sqlite => SqlType::BigInt,
      "int" | "integer" | "int4" | "mediumint" | "smallint" | "int2" | "tinyint" | "serial" => {
         SqlType::Integer
      }
      "bigint" | "int8" | "bigserial" => SqlType::BigInt,
      "int unsigned" | "integer unsigned" => SqlType::BigInt,
      "double" | "double precision" | "float" | "float8" | "float4" | "real" | "decimal"
      | "numeric" => SqlType::Double,
      "varchar" | "character varying" | "char" | "character" | "nvarchar" => match length {
         Some(n) => SqlType::Varchar(n),
         None => SqlType::Text,
      },
      "text" | "tinytext" | "mediumtext" | "longtext" | "clob" | "" => SqlType::Text,
      "bool" | "boolean" => SqlType::Boolean,
      "blob" | "tinyblob" | "mediumblob" | "longblob" | "bytea" | "binary" | "varbinary" => {
         SqlType::Blob
      }
      _ => return Err(Error::UnsupportedDatatype(declared.to_string())),
   };
   Ok(sql_type)
}
