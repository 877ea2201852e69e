//! # sqlx-query-helpers
//!
//! A database session manager over sqlx: resolves credentials from the
//! environment or a config file, owns the engine (connection pool), a
//! session factory and a live session, creates the tables of a declarative
//! model base and provides write helpers for common patterns.
//!
//! ## Architecture
//!
//! ```text
//! Db::connect(name, base, use_os_env, echo)
//!   ├── CredentialSource  (EnvCredentials | FileCredentials | StaticCredentials)
//!   ├── Database          (engine: AnyPool + backend)        sqlx-any-conn-mgr
//!   ├── SessionFactory → Session (autobegin, commit, rollback)
//!   └── helpers: insert_many, upsert, update, ...             sqlx-any-toolkit
//! ```
//!
//! MySQL is the default backend; PostgreSQL and SQLite are selected through
//! the `backend` credential field.

mod db;

pub use db::{Db, DbBuilder, row};

pub use sqlx_any_conn_mgr::{
   Backend, CredentialSource, Credentials, DEFAULT_CONFIG_FILE, DEFAULT_ENV_PREFIX, Database,
   DatabaseConfig, EnvCredentials, FileCredentials, StaticCredentials,
};
pub use sqlx_any_toolkit::{
   ColumnDef, Error, Model, ModelBase, Result, Row, Session, SessionFactory, SqlType, TableDef,
   UpsertOutcome, WriteQueryResult, clean_values, row_from_values,
};
