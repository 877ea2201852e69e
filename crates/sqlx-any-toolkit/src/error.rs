/// Result type alias for toolkit operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for toolkit operations.
///
/// Database errors are carried unmodified in [`Error::Sqlx`]; everything else
/// is raised before a statement reaches the database.
#[derive(Debug, thiserror::Error)]
pub enum Error {
   /// Error from SQLx operations (constraint violations, connection failures, ...).
   #[error(transparent)]
   Sqlx(#[from] sqlx::Error),

   /// Error from the connection manager (configuration, closed database).
   #[error(transparent)]
   ConnectionManager(#[from] sqlx_any_conn_mgr::Error),

   /// Column type that cannot be mapped to JSON.
   #[error("unsupported datatype: {0}")]
   UnsupportedDatatype(String),

   /// Multiple rows returned from a fetch_one query.
   #[error("fetch_one() query returned {0} rows, expected 0 or 1")]
   MultipleRowsReturned(usize),

   /// Table is not registered in the model base.
   #[error("table '{0}' is not registered in the model base")]
   UnknownTable(String),

   /// Row carries a column the table does not define.
   #[error("table '{table}' has no column '{column}'")]
   UnknownColumn { table: String, column: String },

   /// Table does not exist in the database.
   #[error("table '{0}' does not exist in the database")]
   TableNotFound(String),

   /// Row has no columns to write.
   #[error("row for table '{0}' has no columns")]
   EmptyRow(String),

   /// Update without a filter would touch every row.
   #[error("update on table '{0}' requires at least one filter column")]
   EmptyFilter(String),

   /// Rows of one multi-row statement must share their columns.
   #[error("row {index} for table '{table}' has different columns than the first row")]
   RowShapeMismatch { table: String, index: usize },

   /// Positional values do not line up with the field names.
   #[error("{values} values given for {fields} fields")]
   FieldCountMismatch { fields: usize, values: usize },

   /// Upsert needs conflict keys and the table has no primary key.
   #[error("upsert on table '{0}' needs conflict keys: none given and no primary key defined")]
   MissingConflictKeys(String),

   /// A key column named for an update is absent from the row.
   #[error("row for table '{table}' has no value for key column '{column}'")]
   MissingKeyValue { table: String, column: String },

   /// String bound to a blob column is not valid base64.
   #[error("value for blob column is not valid base64: {0}")]
   InvalidBlobValue(String),

   /// Identifier contains characters that are not allowed.
   ///
   /// Identifiers must match `[a-zA-Z_][a-zA-Z0-9_]*`.
   #[error("invalid identifier '{name}': must match [a-zA-Z_][a-zA-Z0-9_]*")]
   InvalidIdentifier { name: String },

   /// Model could not be converted to or from a row.
   #[error("model conversion failed: {0}")]
   Serde(#[from] serde_json::Error),

   /// Generic error for operations that don't fit other categories.
   #[error("{0}")]
   Other(String),
}

impl Error {
   /// Extract a structured error code from the error type.
   ///
   /// This provides machine-readable error codes for error handling.
   pub fn error_code(&self) -> String {
      match self {
         Error::Sqlx(e) => {
            if let Some(code) = e.as_database_error().and_then(|db_err| db_err.code()) {
               return format!("DB_{}", code);
            }
            "SQLX_ERROR".to_string()
         }
         Error::ConnectionManager(e) if e.is_config_error() => "CONFIG_ERROR".to_string(),
         Error::ConnectionManager(_) => "CONNECTION_ERROR".to_string(),
         Error::UnsupportedDatatype(_) => "UNSUPPORTED_DATATYPE".to_string(),
         Error::MultipleRowsReturned(_) => "MULTIPLE_ROWS_RETURNED".to_string(),
         Error::UnknownTable(_) => "UNKNOWN_TABLE".to_string(),
         Error::UnknownColumn { .. } => "UNKNOWN_COLUMN".to_string(),
         Error::TableNotFound(_) => "TABLE_NOT_FOUND".to_string(),
         Error::EmptyRow(_) => "EMPTY_ROW".to_string(),
         Error::EmptyFilter(_) => "EMPTY_FILTER".to_string(),
         Error::RowShapeMismatch { .. } => "ROW_SHAPE_MISMATCH".to_string(),
         Error::FieldCountMismatch { .. } => "FIELD_COUNT_MISMATCH".to_string(),
         Error::MissingConflictKeys(_) => "MISSING_CONFLICT_KEYS".to_string(),
         Error::MissingKeyValue { .. } => "MISSING_KEY_VALUE".to_string(),
         Error::InvalidIdentifier { .. } => "INVALID_IDENTIFIER".to_string(),
         Error::InvalidBlobValue(_) => "INVALID_BLOB_VALUE".to_string(),
         Error::Serde(_) => "SERDE_ERROR".to_string(),
         Error::Other(_) => "ERROR".to_string(),
      }
   }

   /// Whether this is a constraint violation reported by the database
   /// (unique, foreign key, not-null or check).
   pub fn is_integrity_violation(&self) -> bool {
      match self {
         Error::Sqlx(sqlx::Error::Database(db_err)) => matches!(
            db_err.kind(),
            sqlx::error::ErrorKind::UniqueViolation
               | sqlx::error::ErrorKind::ForeignKeyViolation
               | sqlx::error::ErrorKind::NotNullViolation
               | sqlx::error::ErrorKind::CheckViolation
         ),
         _ => false,
      }
   }

   /// Whether this error was raised while resolving configuration.
   pub fn is_config_error(&self) -> bool {
      matches!(self, Error::ConnectionManager(e) if e.is_config_error())
   }
}
