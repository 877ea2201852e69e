//! Row dictionaries and the value cleaning applied before writes

use indexmap::IndexMap;
use serde_json::Value as JsonValue;

use crate::{Error, Result};

/// A row as an ordered column → value dictionary.
pub type Row = IndexMap<String, JsonValue>;

/// Build a row from field names and positional values.
///
/// ```
/// use serde_json::json;
/// use sqlx_any_toolkit::row_from_values;
///
/// let row = row_from_values(&["sku", "qty"], vec![json!("A-1"), json!(3)]).unwrap();
/// assert_eq!(row["qty"], json!(3));
/// ```
pub fn row_from_values(fields: &[&str], values: Vec<JsonValue>) -> Result<Row> {
   if fields.len() != values.len() {
      return Err(Error::FieldCountMismatch {
         fields: fields.len(),
         values: values.len(),
      });
   }
   Ok(fields
      .iter()
      .map(|f| f.to_string())
      .zip(values)
      .collect())
}

/// Trim string values; strings left empty become NULL.
pub fn clean_values(row: Row) -> Row {
   row.into_iter()
      .map(|(name, value)| match value {
         JsonValue::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
               (name, JsonValue::Null)
            } else if trimmed.len() == s.len() {
               (name, JsonValue::String(s))
            } else {
               (name, JsonValue::String(trimmed.to_string()))
            }
         }
         other => (name, other),
      })
      .collect()
}

/// Split a row into (key columns, remaining columns).
///
/// Keys missing from the row are simply absent from the first part.
pub fn split_by_keys(row: &Row, keys: &[&str]) -> (Row, Row) {
   let mut matched = Row::new();
   let mut rest = Row::new();
   for (name, value) in row {
      if keys.contains(&name.as_str()) {
         matched.insert(name.clone(), value.clone());
      } else {
         rest.insert(name.clone(), value.clone());
      }
   }
   (matched, rest)
}
