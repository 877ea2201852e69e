//! Declarative model base: table descriptors and the `Model` capability.
//!
//! A [`TableDef`] describes one relation (its columns, primary key and unique
//! keys). A [`ModelBase`] is the registry of all tables an application uses;
//! [`Session::create_all`](crate::Session::create_all) creates them.
//!
//! # Example
//!
//! ```
//! use sqlx_any_toolkit::{ColumnDef, ModelBase, SqlType, TableDef};
//!
//! let users = TableDef::new("users")
//!    .column(ColumnDef::new("id", SqlType::BigInt).primary_key().auto_increment())
//!    .column(ColumnDef::new("email", SqlType::Varchar(255)).not_null().unique())
//!    .column(ColumnDef::new("name", SqlType::Text));
//!
//! let base = ModelBase::new().with_table(users);
//! assert_eq!(base.require("users").unwrap().primary_key(), vec!["id"]);
//! ```

use indexmap::IndexMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::row::Row;
use crate::statements::validate_identifier;
use crate::{Error, Result};

/// Column types that can be carried by the Any driver on every backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
   /// 32-bit integer
   Integer,
   /// 64-bit integer
   BigInt,
   /// Double precision float
   Double,
   /// Unbounded text (not usable as a MySQL key column)
   Text,
   /// Bounded text
   Varchar(u32),
   /// Boolean; SQLite stores it as an integer
   Boolean,
   /// Binary data
   Blob,
}

/// One column of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
   pub name: String,
   pub sql_type: SqlType,
   pub nullable: bool,
   pub primary_key: bool,
   pub auto_increment: bool,
   pub unique: bool,
}

impl ColumnDef {
   /// A nullable column with no constraints.
   pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
      Self {
         name: name.into(),
         sql_type,
         nullable: true,
         primary_key: false,
         auto_increment: false,
         unique: false,
      }
   }

   /// Mark as (part of) the primary key. Implies NOT NULL.
   pub fn primary_key(mut self) -> Self {
      self.primary_key = true;
      self.nullable = false;
      self
   }

   /// Let the database generate values for this column.
   pub fn auto_increment(mut self) -> Self {
      self.auto_increment = true;
      self
   }

   pub fn not_null(mut self) -> Self {
      self.nullable = false;
      self
   }

   pub fn unique(mut self) -> Self {
      self.unique = true;
      self
   }
}

/// Descriptor of one relation: name, ordered columns and unique keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDef {
   name: String,
   columns: Vec<ColumnDef>,
   unique_keys: Vec<Vec<String>>,
}

impl TableDef {
   pub fn new(name: impl Into<String>) -> Self {
      Self {
         name: name.into(),
         columns: Vec::new(),
         unique_keys: Vec::new(),
      }
   }

   /// Append a column.
   pub fn column(mut self, column: ColumnDef) -> Self {
      self.columns.push(column);
      self
   }

   /// Add a composite unique key.
   pub fn unique_key(mut self, columns: &[&str]) -> Self {
      self
         .unique_keys
         .push(columns.iter().map(|c| c.to_string()).collect());
      self
   }

   pub fn name(&self) -> &str {
      &self.name
   }

   pub fn columns(&self) -> &[ColumnDef] {
      &self.columns
   }

   pub fn unique_keys(&self) -> &[Vec<String>] {
      &self.unique_keys
   }

   pub fn get_column(&self, name: &str) -> Option<&ColumnDef> {
      self.columns.iter().find(|c| c.name == name)
   }

   pub fn column_names(&self) -> impl Iterator<Item = &str> {
      self.columns.iter().map(|c| c.name.as_str())
   }

   /// Primary key columns in declaration order.
   pub fn primary_key(&self) -> Vec<&str> {
      self
         .columns
         .iter()
         .filter(|c| c.primary_key)
         .map(|c| c.name.as_str())
         .collect()
   }

   /// Check identifiers and that unique keys name existing columns.
   pub fn validate(&self) -> Result<()> {
      validate_identifier(&self.name)?;
      if self.columns.is_empty() {
         return Err(Error::Other(format!("table '{}' has no columns", self.name)));
      }
      for column in &self.columns {
         validate_identifier(&column.name)?;
      }
      for key in &self.unique_keys {
         for name in key {
            self.require_column(name)?;
         }
      }
      Ok(())
   }

   /// Look up a column, failing with [`Error::UnknownColumn`].
   pub fn require_column(&self, name: &str) -> Result<&ColumnDef> {
      self.get_column(name).ok_or_else(|| Error::UnknownColumn {
         table: self.name.clone(),
         column: name.to_string(),
      })
   }

   /// Reject empty rows and rows naming columns this table does not have.
   pub fn check_row(&self, row: &Row) -> Result<()> {
      if row.is_empty() {
         return Err(Error::EmptyRow(self.name.clone()));
      }
      for column in row.keys() {
         self.require_column(column)?;
      }
      Ok(())
   }

   /// Map stored values back onto the declared column types.
   ///
   /// Booleans come back from SQLite (and MySQL `TINYINT(1)`) as integers;
   /// they are turned back into JSON booleans here. Numbers take the JSON
   /// representation of their column: `Double` columns hold floats and
   /// integer columns hold integers, so `2` and `2.0` compare equal after
   /// normalizing.
   pub fn normalize_row(&self, mut row: Row) -> Row {
      for (name, value) in row.iter_mut() {
         let Some(column) = self.get_column(name) else {
            continue;
         };
         let JsonValue::Number(n) = &*value else {
            continue;
         };
         match column.sql_type {
            SqlType::Boolean => {
               if let Some(i) = n.as_i64() {
                  *value = JsonValue::Bool(i != 0);
               }
            }
            SqlType::Double => {
               if let Some(f) = n.as_f64().and_then(serde_json::Number::from_f64) {
                  *value = JsonValue::Number(f);
               }
            }
            SqlType::Integer | SqlType::BigInt => {
               if let Some(f) = n.as_f64()
                  && !n.is_i64()
                  && !n.is_u64()
                  && f.fract() == 0.0
                  && f >= i64::MIN as f64
                  && f < i64::MAX as f64
               {
                  *value = JsonValue::from(f as i64);
               }
            }
            _ => {}
         }
      }
      row
   }
}

/// Registry of the tables an application works with.
#[derive(Debug, Clone, Default)]
pub struct ModelBase {
   tables: IndexMap<String, TableDef>,
}

impl ModelBase {
   pub fn new() -> Self {
      Self::default()
   }

   /// Register a table, replacing any table of the same name.
   pub fn register(&mut self, table: TableDef) {
      self.tables.insert(table.name.clone(), table);
   }

   pub fn with_table(mut self, table: TableDef) -> Self {
      self.register(table);
      self
   }

   /// Register the table of a [`Model`] type.
   pub fn with_model<M: Model>(self) -> Self {
      self.with_table(M::table())
   }

   pub fn table(&self, name: &str) -> Option<&TableDef> {
      self.tables.get(name)
   }

   /// Look up a table, failing with [`Error::UnknownTable`].
   pub fn require(&self, name: &str) -> Result<&TableDef> {
      self
         .tables
         .get(name)
         .ok_or_else(|| Error::UnknownTable(name.to_string()))
   }

   /// Tables in registration order.
   pub fn tables(&self) -> impl Iterator<Item = &TableDef> {
      self.tables.values()
   }

   pub fn len(&self) -> usize {
      self.tables.len()
   }

   pub fn is_empty(&self) -> bool {
      self.tables.is_empty()
   }
}

/// A typed record that knows its relation and converts to and from rows.
///
/// Conversion goes through serde, so field names must match column names.
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use sqlx_any_toolkit::{ColumnDef, Model, SqlType, TableDef};
///
/// #[derive(Serialize, Deserialize)]
/// struct Tag {
///    id: Option<i64>,
///    label: String,
/// }
///
/// impl Model for Tag {
///    fn table() -> TableDef {
///       TableDef::new("tags")
///          .column(ColumnDef::new("id", SqlType::BigInt).primary_key().auto_increment())
///          .column(ColumnDef::new("label", SqlType::Varchar(64)).not_null())
///    }
/// }
///
/// let row = Tag { id: None, label: "rust".into() }.to_row().unwrap();
/// assert!(!row.contains_key("id"));
/// ```
pub trait Model: Serialize + DeserializeOwned {
   fn table() -> TableDef;

   /// Convert into a row. Null values for auto-increment columns are left
   /// out so the database generates them.
   fn to_row(&self) -> Result<Row> {
      let table = Self::table();
      match serde_json::to_value(self)? {
         JsonValue::Object(map) => Ok(map
            .into_iter()
            .filter(|(name, value)| {
               !(value.is_null() && table.get_column(name).is_some_and(|c| c.auto_increment))
            })
            .collect()),
         other => Err(Error::Other(format!(
            "model for table '{}' must serialize to an object, got {other}",
            table.name()
         ))),
      }
   }

   /// Construct an instance from a row read back from the database.
   fn from_row(row: Row) -> Result<Self> {
      let row = Self::table().normalize_row(row);
      Ok(serde_json::from_value(JsonValue::Object(
         row.into_iter().collect(),
      ))?)
   }
}
