use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx_any_conn_mgr::{Credentials, Database, DatabaseConfig};
use sqlx_any_toolkit::{
   ColumnDef, Error, Model, ModelBase, Row, Session, SessionFactory, SqlType, TableDef, UpsertOutcome,
   row_from_values,
};
use tempfile::TempDir;

fn products() -> TableDef {
   TableDef::new("products")
      .column(ColumnDef::new("sku", SqlType::Varchar(32)).primary_key())
      .column(ColumnDef::new("name", SqlType::Varchar(128)).not_null())
      .column(ColumnDef::new("price", SqlType::Double))
      .column(ColumnDef::new("active", SqlType::Boolean))
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Event {
   id: Option<i64>,
   kind: String,
   payload: Option<String>,
}

impl Model for Event {
   fn table() -> TableDef {
      TableDef::new("events")
         .column(ColumnDef::new("id", SqlType::BigInt).primary_key().auto_increment())
         .column(ColumnDef::new("kind", SqlType::Varchar(32)).not_null())
         .column(ColumnDef::new("payload", SqlType::Text))
   }
}

async fn create_test_session() -> (Database, Session, TempDir) {
   let temp_dir = TempDir::new().expect("Failed to create temp directory");
   let db = Database::connect(
      &Credentials::sqlite(temp_dir.path()),
      "toolkit",
      DatabaseConfig::default(),
      false,
   )
   .await
   .expect("Failed to connect to test database");

   let mut session = SessionFactory::new(&db).unwrap().session();
   let base = ModelBase::new().with_table(products()).with_model::<Event>();
   session.create_all(&base).await.unwrap();

   (db, session, temp_dir)
}

fn product(sku: &str, name: &str, price: f64, active: bool) -> Row {
   row_from_values(
      &["sku", "name", "price", "active"],
      vec![json!(sku), json!(name), json!(price), json!(active)],
   )
   .unwrap()
}

fn filter(column: &str, value: serde_json::Value) -> Row {
   row_from_values(&[column], vec![value]).unwrap()
}

async fn product_count(session: &mut Session) -> usize {
   session.select(&products(), Row::new()).await.unwrap().len()
}

// ─── insert_many ───

#[tokio::test]
async fn insert_many_rows_read_back_field_for_field() {
   let (db, mut session, _temp) = create_test_session().await;
   let table = products();
   let rows = vec![
      product("A-1", "anvil", 10.5, true),
      product("B-2", "bucket", 3.0, false),
      product("C-3", "chisel", 7.25, true),
   ];

   let affected = session.insert_many(&table, rows.clone(), true).await.unwrap();
   assert_eq!(affected, 3);
   assert!(!session.in_transaction());

   let mut stored = session.select(&table, Row::new()).await.unwrap();
   stored.sort_by(|a, b| a["sku"].as_str().cmp(&b["sku"].as_str()));
   assert_eq!(stored, rows);

   db.close().await.unwrap();
}

#[tokio::test]
async fn insert_many_cleans_string_values() {
   let (db, mut session, _temp) = create_test_session().await;
   let table = products();
   let row = row_from_values(
      &["sku", "name", "price"],
      vec![json!("  D-4 "), json!(" drill"), json!(1.0)],
   )
   .unwrap();
   session.insert_many(&table, vec![row], true).await.unwrap();

   let stored = session.select(&table, filter("sku", json!("D-4"))).await.unwrap();
   assert_eq!(stored.len(), 1);
   assert_eq!(stored[0]["name"], json!("drill"));
   assert_eq!(stored[0]["active"], json!(null));

   db.close().await.unwrap();
}

#[tokio::test]
async fn insert_many_rejects_unknown_column_before_writing() {
   let (db, mut session, _temp) = create_test_session().await;
   let mut row = product("A-1", "anvil", 1.0, true);
   row.insert("colour".into(), json!("red"));

   let err = session.insert_many(&products(), vec![row], true).await.unwrap_err();
   assert!(matches!(err, Error::UnknownColumn { ref column, .. } if column == "colour"));
   assert!(!session.in_transaction());
   assert_eq!(product_count(&mut session).await, 0);

   db.close().await.unwrap();
}

#[tokio::test]
async fn insert_many_duplicate_propagates_and_rolls_back() {
   let (db, mut session, _temp) = create_test_session().await;
   let table = products();
   session
      .insert(&table, product("A-1", "anvil", 1.0, true))
      .await
      .unwrap();

   let err = session
      .insert_many(
         &table,
         vec![
            product("B-2", "bucket", 2.0, true),
            product("A-1", "again", 1.0, true),
         ],
         true,
      )
      .await
      .unwrap_err();
   assert!(err.is_integrity_violation());
   assert!(err.error_code().starts_with("DB_"));

   // the batch was rolled back as a whole
   assert_eq!(product_count(&mut session).await, 1);

   db.close().await.unwrap();
}

#[tokio::test]
async fn insert_many_without_commit_stays_pending() {
   let (db, mut session, _temp) = create_test_session().await;
   let table = products();
   session
      .insert_many(&table, vec![product("A-1", "anvil", 1.0, true)], false)
      .await
      .unwrap();
   assert!(session.in_transaction());

   session.rollback().await.unwrap();
   assert_eq!(product_count(&mut session).await, 0);

   db.close().await.unwrap();
}

// ─── upsert ───

#[tokio::test]
async fn upsert_twice_keeps_one_row_with_second_payload() {
   let (db, mut session, _temp) = create_test_session().await;
   let table = products();

   session
      .upsert(&table, vec![product("A-1", "anvil", 10.0, true)], &["sku"])
      .await
      .unwrap();
   session
      .upsert(&table, vec![product("A-1", "anvil xl", 12.5, false)], &["sku"])
      .await
      .unwrap();

   let stored = session.select(&table, Row::new()).await.unwrap();
   assert_eq!(stored, vec![product("A-1", "anvil xl", 12.5, false)]);

   db.close().await.unwrap();
}

#[tokio::test]
async fn upsert_defaults_to_primary_key_and_mixes_inserts_and_updates() {
   let (db, mut session, _temp) = create_test_session().await;
   let table = products();
   session
      .insert(&table, product("A-1", "anvil", 10.0, true))
      .await
      .unwrap();

   session
      .upsert(
         &table,
         vec![
            product("A-1", "anvil", 11.0, true),
            product("B-2", "bucket", 2.0, true),
            product("B-2", "bucket", 2.5, true),
         ],
         &[],
      )
      .await
      .unwrap();

   let a = session.select(&table, filter("sku", json!("A-1"))).await.unwrap();
   let b = session.select(&table, filter("sku", json!("B-2"))).await.unwrap();
   assert_eq!(a[0]["price"], json!(11.0));
   assert_eq!(b.len(), 1);
   assert_eq!(b[0]["price"], json!(2.5));

   db.close().await.unwrap();
}

#[tokio::test]
async fn upsert_leaves_unsupplied_columns_alone() {
   let (db, mut session, _temp) = create_test_session().await;
   let table = products();
   session
      .insert(&table, product("A-1", "anvil", 10.0, true))
      .await
      .unwrap();

   let partial = row_from_values(&["sku", "name"], vec![json!("A-1"), json!("renamed")]).unwrap();
   session.upsert(&table, vec![partial], &["sku"]).await.unwrap();

   let stored = session.select(&table, Row::new()).await.unwrap();
   assert_eq!(stored[0]["name"], json!("renamed"));
   assert_eq!(stored[0]["price"], json!(10.0));

   db.close().await.unwrap();
}

#[tokio::test]
async fn upsert_rejects_rows_of_different_shape() {
   let (db, mut session, _temp) = create_test_session().await;
   let rows = vec![
      product("A-1", "anvil", 10.0, true),
      row_from_values(&["sku", "name"], vec![json!("B-2"), json!("bucket")]).unwrap(),
   ];

   let err = session.upsert(&products(), rows, &[]).await.unwrap_err();
   assert!(matches!(err, Error::RowShapeMismatch { index: 1, .. }));

   db.close().await.unwrap();
}

// ─── update ───

#[tokio::test]
async fn update_matching_nothing_affects_zero_rows() {
   let (db, mut session, _temp) = create_test_session().await;
   let table = products();

   let affected = session
      .update(&table, filter("sku", json!("missing")), filter("price", json!(1.0)))
      .await
      .unwrap();
   assert_eq!(affected, 0);

   db.close().await.unwrap();
}

#[tokio::test]
async fn update_changes_matching_rows() {
   let (db, mut session, _temp) = create_test_session().await;
   let table = products();
   session
      .insert_many(
         &table,
         vec![
            product("A-1", "anvil", 10.0, true),
            product("B-2", "bucket", 2.0, true),
            product("C-3", "chisel", 3.0, false),
         ],
         true,
      )
      .await
      .unwrap();

   let affected = session
      .update(&table, filter("active", json!(true)), filter("active", json!(false)))
      .await
      .unwrap();
   assert_eq!(affected, 2);

   let inactive = session
      .select(&table, filter("active", json!(false)))
      .await
      .unwrap();
   assert_eq!(inactive.len(), 3);

   db.close().await.unwrap();
}

#[tokio::test]
async fn update_requires_filter_and_values() {
   let (db, mut session, _temp) = create_test_session().await;
   let table = products();

   let err = session
      .update(&table, Row::new(), filter("price", json!(1.0)))
      .await
      .unwrap_err();
   assert!(matches!(err, Error::EmptyFilter(_)));

   let err = session
      .update(&table, filter("sku", json!("A-1")), Row::new())
      .await
      .unwrap_err();
   assert!(matches!(err, Error::EmptyRow(_)));

   db.close().await.unwrap();
}

#[tokio::test]
async fn update_by_keys_splits_row() {
   let (db, mut session, _temp) = create_test_session().await;
   let table = products();
   session
      .insert(&table, product("A-1", "anvil", 10.0, true))
      .await
      .unwrap();

   let affected = session
      .update_by_keys(&table, product("A-1", "anvil", 9.0, true), &["sku"])
      .await
      .unwrap();
   assert_eq!(affected, 1);

   let err = session
      .update_by_keys(&table, filter("price", json!(1.0)), &["sku"])
      .await
      .unwrap_err();
   assert!(matches!(err, Error::MissingKeyValue { ref column, .. } if column == "sku"));

   let stored = session.select(&table, Row::new()).await.unwrap();
   assert_eq!(stored[0]["price"], json!(9.0));

   db.close().await.unwrap();
}

// ─── insert-ignore and insert_one ───

#[tokio::test]
async fn insert_ignore_many_skips_duplicates() {
   let (db, mut session, _temp) = create_test_session().await;
   let table = products();
   session
      .insert(&table, product("A-1", "anvil", 10.0, true))
      .await
      .unwrap();

   let inserted = session
      .insert_ignore_many(
         &table,
         vec![
            product("A-1", "dup", 1.0, true),
            product("B-2", "bucket", 2.0, true),
         ],
      )
      .await
      .unwrap();
   assert!(inserted);

   let inserted = session
      .insert_ignore(&table, product("B-2", "dup", 1.0, true))
      .await
      .unwrap();
   assert!(!inserted);

   let a = session.select(&table, filter("sku", json!("A-1"))).await.unwrap();
   assert_eq!(a[0]["name"], json!("anvil"));
   assert_eq!(product_count(&mut session).await, 2);

   db.close().await.unwrap();
}

#[tokio::test]
async fn insert_ignore_bulk_counts_new_rows() {
   let (db, mut session, _temp) = create_test_session().await;
   let table = products();
   session
      .insert(&table, product("A-1", "anvil", 10.0, true))
      .await
      .unwrap();

   let inserted = session
      .insert_ignore_bulk(
         &table,
         vec![
            product("A-1", "dup", 1.0, true),
            product("B-2", "bucket", 2.0, true),
            product("C-3", "chisel", 3.0, true),
         ],
      )
      .await
      .unwrap();
   assert_eq!(inserted, 2);
   assert_eq!(product_count(&mut session).await, 3);

   db.close().await.unwrap();
}

#[tokio::test]
async fn insert_one_returns_generated_ids() {
   let (db, mut session, _temp) = create_test_session().await;
   let table = Event::table();

   let first = session
      .insert_one(&table, filter("kind", json!("created")), false)
      .await
      .unwrap();
   let second = session
      .insert_one(&table, filter("kind", json!("updated")), false)
      .await
      .unwrap();
   assert_eq!(first, Some(1));
   assert_eq!(second, Some(2));

   let duplicate = row_from_values(&["id", "kind"], vec![json!(1), json!("again")]).unwrap();
   let ignored = session.insert_one(&table, duplicate, true).await.unwrap();
   assert_eq!(ignored, None);

   db.close().await.unwrap();
}

// ─── upsert_with_select ───

#[tokio::test]
async fn upsert_with_select_reports_what_happened() {
   let (db, mut session, _temp) = create_test_session().await;
   let table = products();

   let outcome = session
      .upsert_with_select(&table, product("A-1", "anvil", 10.0, true), &["sku"])
      .await
      .unwrap();
   assert_eq!(
      outcome,
      UpsertOutcome {
         updated: false,
         inserted: true
      }
   );

   let outcome = session
      .upsert_with_select(&table, product("A-1", "anvil", 10.0, true), &["sku"])
      .await
      .unwrap();
   assert_eq!(outcome, UpsertOutcome::default());

   let outcome = session
      .upsert_with_select(&table, product("A-1", "anvil", 12.0, true), &["sku"])
      .await
      .unwrap();
   assert_eq!(
      outcome,
      UpsertOutcome {
         updated: true,
         inserted: false
      }
   );

   let stored = session.select(&table, Row::new()).await.unwrap();
   assert_eq!(stored, vec![product("A-1", "anvil", 12.0, true)]);

   db.close().await.unwrap();
}

#[tokio::test]
async fn upsert_with_select_compares_numbers_by_column_type() {
   let (db, mut session, _temp) = create_test_session().await;
   let table = products();
   let integral_price = row_from_values(
      &["sku", "name", "price"],
      vec![json!("B-2"), json!("bolt"), json!(2)],
   )
   .unwrap();

   let outcome = session
      .upsert_with_select(&table, integral_price.clone(), &["sku"])
      .await
      .unwrap();
   assert!(outcome.inserted);

   // price reads back as 2.0 from the Double column; 2 is the same value
   let outcome = session
      .upsert_with_select(&table, integral_price, &["sku"])
      .await
      .unwrap();
   assert_eq!(outcome, UpsertOutcome::default());

   let stored = session
      .select(&table, filter("sku", json!("B-2")))
      .await
      .unwrap();
   assert_eq!(stored[0]["price"], json!(2.0));

   db.close().await.unwrap();
}

// ─── models ───

#[tokio::test]
async fn models_add_and_select() {
   let (db, mut session, _temp) = create_test_session().await;

   let events = [
      Event {
         id: None,
         kind: "created".into(),
         payload: Some("{}".into()),
      },
      Event {
         id: None,
         kind: "deleted".into(),
         payload: None,
      },
   ];
   assert_eq!(session.add_all(&events).await.unwrap(), 2);
   session.commit().await.unwrap();

   let stored: Vec<Event> = session
      .select_models(filter("kind", json!("deleted")))
      .await
      .unwrap();
   assert_eq!(
      stored,
      vec![Event {
         id: Some(2),
         kind: "deleted".into(),
         payload: None,
      }]
   );

   db.close().await.unwrap();
}

// ─── reflection ───

#[tokio::test]
async fn reflect_table_returns_created_schema() {
   let (db, mut session, _temp) = create_test_session().await;

   let reflected = session.reflect_table("events").await.unwrap();
   let names: Vec<&str> = reflected.column_names().collect();
   assert_eq!(names, vec!["id", "kind", "payload"]);
   assert_eq!(reflected.primary_key(), vec!["id"]);

   let id = reflected.get_column("id").unwrap();
   assert_eq!(id.sql_type, SqlType::BigInt);
   assert!(id.auto_increment);

   let kind = reflected.get_column("kind").unwrap();
   assert_eq!(kind.sql_type, SqlType::Varchar(32));
   assert!(!kind.nullable);
   assert!(reflected.get_column("payload").unwrap().nullable);

   let err = session.reflect_table("missing").await.unwrap_err();
   assert!(matches!(err, Error::TableNotFound(_)));

   db.close().await.unwrap();
}
