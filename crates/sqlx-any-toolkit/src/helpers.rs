//! Write helpers on [`Session`].
//!
//! Every helper cleans its input rows first (strings trimmed, blank strings
//! stored as NULL) and rejects columns the table does not define. Helpers
//! that commit roll the session back when a statement fails, so the session
//! stays usable after an error.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::model::{Model, TableDef};
use crate::row::{Row, clean_values, split_by_keys};
use crate::session::{Session, WriteQueryResult};
use crate::statements::{self, InsertMode};
use crate::{Error, Result};

/// What [`Session::upsert_with_select`] did with a row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertOutcome {
   /// An existing row had at least one differing column and was updated.
   pub updated: bool,
   /// No row matched the keys and the row was inserted.
   pub inserted: bool,
}

fn prepare_rows(table: &TableDef, rows: Vec<Row>) -> Result<Vec<Row>> {
   rows
      .into_iter()
      .map(|row| {
         let row = clean_values(row);
         table.check_row(&row)?;
         Ok(row)
      })
      .collect()
}

/// Require every key column to be present in `row`.
fn require_keys(table: &TableDef, row: &Row, keys: &[&str]) -> Result<()> {
   if keys.is_empty() {
      return Err(Error::EmptyFilter(table.name().to_string()));
   }
   for key in keys {
      table.require_column(key)?;
      if !row.contains_key(*key) {
         return Err(Error::MissingKeyValue {
            table: table.name().to_string(),
            column: key.to_string(),
         });
      }
   }
   Ok(())
}

/// Collapse rows sharing the same key values; later rows win.
///
/// PostgreSQL refuses to touch one row twice in a single upsert statement.
fn dedupe_by_keys(rows: Vec<Row>, keys: &[String]) -> Vec<Row> {
   if rows
      .first()
      .is_none_or(|row| !keys.iter().all(|k| row.contains_key(k)))
   {
      return rows;
   }

   let mut by_key: IndexMap<String, Row> = IndexMap::with_capacity(rows.len());
   for row in rows {
      let key = JsonValue::Array(keys.iter().map(|k| row[k.as_str()].clone()).collect()).to_string();
      by_key.insert(key, row);
   }
   by_key.into_values().collect()
}

impl Session {
   /// Commit on success, roll back on failure.
   async fn finish<T>(&mut self, result: Result<T>) -> Result<T> {
      match result {
         Ok(value) => {
            self.commit().await?;
            Ok(value)
         }
         Err(e) => {
            if let Err(rollback_err) = self.rollback().await {
               debug!(error = %rollback_err, "rollback after failed write also failed");
            }
            Err(e)
         }
      }
   }

   /// Insert a model in the session transaction without committing.
   pub async fn add<M: Model>(&mut self, model: &M) -> Result<WriteQueryResult> {
      let table = M::table();
      let rows = prepare_rows(&table, vec![model.to_row()?])?;
      let statement = statements::insert(self.backend(), &table, &rows, &InsertMode::Plain)?;
      self.execute_statement(statement).await
   }

   /// Insert several models in the session transaction without committing.
   pub async fn add_all<M: Model>(&mut self, models: &[M]) -> Result<u64> {
      let mut affected = 0;
      for model in models {
         affected += self.add(model).await?.rows_affected;
      }
      Ok(affected)
   }

   /// Insert each row with its own INSERT, then commit when `commit` is set.
   ///
   /// Constraint violations propagate as database errors. Without `commit`
   /// the rows stay pending in the session transaction.
   pub async fn insert_many(&mut self, table: &TableDef, rows: Vec<Row>, commit: bool) -> Result<u64> {
      let rows = prepare_rows(table, rows)?;

      let result = async {
         let mut affected = 0;
         for row in rows {
            let statement = statements::insert(
               self.backend(),
               table,
               std::slice::from_ref(&row),
               &InsertMode::Plain,
            )?;
            affected += self.execute_statement(statement).await?.rows_affected;
         }
         Ok::<u64, Error>(affected)
      }
      .await;

      if commit {
         self.finish(result).await
      } else {
         result
      }
   }

   /// Insert one row and commit.
   pub async fn insert(&mut self, table: &TableDef, row: Row) -> Result<u64> {
      self.insert_many(table, vec![row], true).await
   }

   /// Insert one row in a single statement and commit, returning the
   /// generated id when the backend reports one.
   ///
   /// With `ignore` set, a row colliding with an existing key is skipped and
   /// `None` is returned.
   pub async fn insert_one(&mut self, table: &TableDef, row: Row, ignore: bool) -> Result<Option<i64>> {
      let rows = prepare_rows(table, vec![row])?;
      let mode = if ignore {
         InsertMode::Ignore
      } else {
         InsertMode::Plain
      };

      let result = async {
         let statement = statements::insert(self.backend(), table, &rows, &mode)?;
         self.execute_statement(statement).await
      }
      .await;

      let result = self.finish(result).await?;
      Ok(result.last_insert_id.filter(|_| result.rows_affected > 0))
   }

   /// Insert rows one by one, each inside a savepoint, skipping rows that
   /// violate a constraint. Commits.
   ///
   /// Returns whether at least one row was inserted.
   pub async fn insert_ignore_many(&mut self, table: &TableDef, rows: Vec<Row>) -> Result<bool> {
      let rows = prepare_rows(table, rows)?;

      let result = async {
         let mut inserted = false;
         for row in rows {
            let statement = statements::insert(
               self.backend(),
               table,
               std::slice::from_ref(&row),
               &InsertMode::Plain,
            )?;
            if self.execute_in_savepoint(&statement).await?.is_some() {
               inserted = true;
            }
         }
         Ok::<bool, Error>(inserted)
      }
      .await;

      self.finish(result).await
   }

   /// Insert a single row, skipping it on a constraint violation. Commits.
   pub async fn insert_ignore(&mut self, table: &TableDef, row: Row) -> Result<bool> {
      self.insert_ignore_many(table, vec![row]).await
   }

   /// Multi-row insert-ignore statement(s). Commits.
   ///
   /// Returns the number of rows actually inserted. On MySQL, `INSERT IGNORE`
   /// also downgrades errors other than duplicates to warnings.
   pub async fn insert_ignore_bulk(&mut self, table: &TableDef, rows: Vec<Row>) -> Result<u64> {
      let rows = prepare_rows(table, rows)?;
      if rows.is_empty() {
         return Ok(0);
      }
      let columns = statements::shared_columns(table, &rows)?.len();
      let chunk_size = statements::rows_per_statement(self.backend(), columns);

      let result = async {
         let mut affected = 0;
         for chunk in rows.chunks(chunk_size) {
            let statement = statements::insert(self.backend(), table, chunk, &InsertMode::Ignore)?;
            affected += self.execute_statement(statement).await?.rows_affected;
         }
         Ok::<u64, Error>(affected)
      }
      .await;

      self.finish(result).await
   }

   /// Insert rows, updating the non-key columns of rows whose conflict keys
   /// already exist. Commits.
   ///
   /// `keys` defaults to the primary key when empty. All rows must carry the
   /// same columns. When several rows share key values the last one wins.
   /// Returns the affected row count as the backend reports it (MySQL counts
   /// an updated row twice).
   pub async fn upsert(&mut self, table: &TableDef, rows: Vec<Row>, keys: &[&str]) -> Result<u64> {
      let keys = statements::conflict_keys(table, keys)?;
      let rows = prepare_rows(table, rows)?;
      if rows.is_empty() {
         return Ok(0);
      }
      let columns = statements::shared_columns(table, &rows)?.len();
      let rows = dedupe_by_keys(rows, &keys);
      let chunk_size = statements::rows_per_statement(self.backend(), columns);
      let mode = InsertMode::Upsert { keys };

      let result = async {
         let mut affected = 0;
         for chunk in rows.chunks(chunk_size) {
            let statement = statements::insert(self.backend(), table, chunk, &mode)?;
            affected += self.execute_statement(statement).await?.rows_affected;
         }
         Ok::<u64, Error>(affected)
      }
      .await;

      let affected = self.finish(result).await?;
      debug!(table = table.name(), affected, "upsert finished");
      Ok(affected)
   }

   /// `UPDATE table SET values WHERE filter` and commit.
   ///
   /// The filter is a conjunction of equalities (NULL matches `IS NULL`).
   /// Matching no row is not an error; the count is 0.
   pub async fn update(&mut self, table: &TableDef, filter: Row, values: Row) -> Result<u64> {
      let values = clean_values(values);
      let statement = statements::update(self.backend(), table, &filter, &values)?;

      let result = self.execute_statement(statement).await;
      Ok(self.finish(result).await?.rows_affected)
   }

   /// Update using the `keys` columns of `row` as the filter and its other
   /// columns as the new values. Commits.
   pub async fn update_by_keys(&mut self, table: &TableDef, row: Row, keys: &[&str]) -> Result<u64> {
      let row = clean_values(row);
      table.check_row(&row)?;
      require_keys(table, &row, keys)?;

      let (filter, values) = split_by_keys(&row, keys);
      self.update(table, filter, values).await
   }

   /// Look the row up by its `keys` columns: update the columns that differ
   /// when it exists, insert it otherwise. Commits.
   pub async fn upsert_with_select(
      &mut self,
      table: &TableDef,
      row: Row,
      keys: &[&str],
   ) -> Result<UpsertOutcome> {
      let row = clean_values(row);
      table.check_row(&row)?;
      require_keys(table, &row, keys)?;
      let (filter, values) = split_by_keys(&row, keys);

      let result = async {
         let lookup = statements::select(self.backend(), table, &filter, Some(1))?;
         let existing = self.fetch_statement(lookup).await?.into_iter().next();

         let Some(existing) = existing.map(|r| table.normalize_row(r)) else {
            let statement =
               statements::insert(self.backend(), table, std::slice::from_ref(&row), &InsertMode::Plain)?;
            self.execute_statement(statement).await?;
            return Ok::<UpsertOutcome, Error>(UpsertOutcome {
               updated: false,
               inserted: true,
            });
         };

         let changed: Row = table
            .normalize_row(values)
            .into_iter()
            .filter(|(name, value)| existing.get(name) != Some(value))
            .collect();
         if changed.is_empty() {
            return Ok(UpsertOutcome::default());
         }

         let statement = statements::update(self.backend(), table, &filter, &changed)?;
         self.execute_statement(statement).await?;
         Ok(UpsertOutcome {
            updated: true,
            inserted: false,
         })
      }
      .await;

      self.finish(result).await
   }

   /// Rows of `table` matching an equality filter (empty filter: all rows),
   /// with values mapped back onto the declared column types.
   pub async fn select(&mut self, table: &TableDef, filter: Row) -> Result<Vec<Row>> {
      let statement = statements::select(self.backend(), table, &filter, None)?;
      let rows = self.fetch_statement(statement).await?;
      Ok(rows.into_iter().map(|r| table.normalize_row(r)).collect())
   }

   /// Typed variant of [`select`](Self::select).
   pub async fn select_models<M: Model>(&mut self, filter: Row) -> Result<Vec<M>> {
      let table = M::table();
      self
         .select(&table, filter)
         .await?
         .into_iter()
         .map(M::from_row)
         .collect()
   }
}
