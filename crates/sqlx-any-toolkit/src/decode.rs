//! Decoding of `Any` rows into JSON rows

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::Value as JsonValue;
use sqlx::any::AnyRow;
use sqlx::{Column, Row as _, TypeInfo, ValueRef};

use crate::row::Row;
use crate::{Error, Result};

/// Decode one column of a row into a JSON value.
///
/// Integers and floats map to JSON numbers, text to strings, booleans to
/// booleans and binary data to base64 strings. Floats that JSON cannot hold
/// (NaN, infinities) become NULL.
pub(crate) fn to_json(row: &AnyRow, index: usize) -> Result<JsonValue> {
   let raw = row.try_get_raw(index)?;
   if raw.is_null() {
      return Ok(JsonValue::Null);
   }

   let type_name = raw.type_info().name().to_string();
   let value = match type_name.as_str() {
      "BOOLEAN" => JsonValue::Bool(row.try_get::<bool, _>(index)?),
      "SMALLINT" => JsonValue::from(row.try_get::<i16, _>(index)?),
      "INTEGER" => JsonValue::from(row.try_get::<i32, _>(index)?),
      "BIGINT" => JsonValue::from(row.try_get::<i64, _>(index)?),
      "REAL" => float_to_json(f64::from(row.try_get::<f32, _>(index)?)),
      "DOUBLE" => float_to_json(row.try_get::<f64, _>(index)?),
      "TEXT" => JsonValue::String(row.try_get::<String, _>(index)?),
      "BLOB" => JsonValue::String(BASE64.encode(row.try_get::<Vec<u8>, _>(index)?)),
      "NULL" => JsonValue::Null,
      _ => return Err(Error::UnsupportedDatatype(type_name)),
   };

   Ok(value)
}

fn float_to_json(value: f64) -> JsonValue {
   serde_json::Number::from_f64(value)
      .map(JsonValue::Number)
      .unwrap_or(JsonValue::Null)
}

/// Decode every column of every row, keyed by column name.
pub(crate) fn decode_rows(rows: Vec<AnyRow>) -> Result<Vec<Row>> {
   let mut values = Vec::with_capacity(rows.len());
   for row in rows {
      let mut value = Row::default();
      for (i, column) in row.columns().iter().enumerate() {
         value.insert(column.name().to_string(), to_json(&row, i)?);
      }
      values.push(value);
   }
   Ok(values)
}

#[cfg(test)]
mod tests {
   use super::*;
   use serde_json::json;
   use sqlx::any::AnyPoolOptions;

   async fn memory_pool() -> sqlx::AnyPool {
      sqlx::any::install_default_drivers();
      AnyPoolOptions::new()
         .max_connections(1)
         .connect("sqlite::memory:")
         .await
         .unwrap()
   }

   #[tokio::test]
   async fn decodes_scalar_types() {
      let pool = memory_pool().await;
      let rows = sqlx::query("SELECT 42 AS n, 1.5 AS f, 'hi' AS s, NULL AS z, X'0102' AS b")
         .fetch_all(&pool)
         .await
         .unwrap();

      let decoded = decode_rows(rows).unwrap();
      assert_eq!(decoded.len(), 1);
      let row = &decoded[0];
      assert_eq!(row["n"], json!(42));
      assert_eq!(row["f"], json!(1.5));
      assert_eq!(row["s"], json!("hi"));
      assert_eq!(row["z"], JsonValue::Null);
      assert_eq!(row["b"], json!("AQI="));
   }

   #[tokio::test]
   async fn keeps_column_order() {
      let pool = memory_pool().await;
      let rows = sqlx::query("SELECT 3 AS c, 1 AS a, 2 AS b")
         .fetch_all(&pool)
         .await
         .unwrap();

      let decoded = decode_rows(rows).unwrap();
      let keys: Vec<&String> = decoded[0].keys().collect();
      assert_eq!(keys, vec!["c", "a", "b"]);
   }

   #[test]
   fn non_finite_floats_become_null() {
      assert_eq!(float_to_json(f64::NAN), JsonValue::Null);
      assert_eq!(float_to_json(2.0), json!(2.0));
   }
}
