//! # sqlx-any-toolkit
//!
//! Declarative models, unit-of-work sessions and write helpers on top of
//! [`sqlx_any_conn_mgr`].
//!
//! ## Core Types
//!
//! - **[`ModelBase`]** / **[`TableDef`]** / **[`ColumnDef`]**: the declarative model base
//! - **[`Model`]**: typed records that convert to and from [`Row`]s
//! - **[`SessionFactory`]** / **[`Session`]**: units of work with autobegin
//! - **[`Statement`]**: generated SQL plus bind values for one backend
//! - **[`Error`]**: error taxonomy with machine-readable codes
//!
//! ## Example
//!
//! ```no_run
//! use serde_json::json;
//! use sqlx_any_conn_mgr::{Credentials, Database, DatabaseConfig};
//! use sqlx_any_toolkit::{ColumnDef, ModelBase, SessionFactory, SqlType, TableDef, row_from_values};
//!
//! # async fn example() -> Result<(), sqlx_any_toolkit::Error> {
//! let stock = TableDef::new("stock")
//!    .column(ColumnDef::new("sku", SqlType::Varchar(32)).primary_key())
//!    .column(ColumnDef::new("qty", SqlType::Integer).not_null());
//! let base = ModelBase::new().with_table(stock.clone());
//!
//! let db = Database::connect(&Credentials::sqlite("/tmp"), "shop", DatabaseConfig::default(), false).await?;
//! let mut session = SessionFactory::new(&db)?.session();
//! session.create_all(&base).await?;
//!
//! let row = row_from_values(&["sku", "qty"], vec![json!("A-1"), json!(3)])?;
//! session.upsert(&stock, vec![row], &[]).await?;
//! # Ok(())
//! # }
//! ```

mod decode;
mod error;
mod helpers;
mod model;
mod reflect;
mod row;
mod session;
mod statements;

pub use error::{Error, Result};
pub use helpers::UpsertOutcome;
pub use model::{ColumnDef, Model, ModelBase, SqlType, TableDef};
pub use row::{Row, clean_values, row_from_values, split_by_keys};
pub use session::{Session, SessionFactory, WriteQueryResult};
pub use statements::{BindValue, InsertMode, Statement};

/// SQL generation for each supported backend.
pub mod sql {
   pub use crate::statements::{
      column_type, conflict_keys, create_table, insert, rows_per_statement, select, update,
   };
}
