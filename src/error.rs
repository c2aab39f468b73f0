use crate::reference::Reference;

/// Result type alias for persistence operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the persistence engine.
///
/// Configuration errors (`NoMapper`, `ColumnTypeMismatch`, `InvalidDeclaration`, ...)
/// signal a model or programming error and are raised on first use. Identity errors
/// signal misuse of a single operation. `NotFound` and `MultipleRows` are expected
/// outcomes that callers may handle.
#[derive(Debug, thiserror::Error)]
pub enum Error {
   /// Error from SQLx operations.
   #[error(transparent)]
   Sqlx(#[from] sqlx::Error),

   /// Error from the connection manager.
   #[error(transparent)]
   ConnectionManager(#[from] sqlx_sqlite_conn_mgr::Error),

   /// I/O error when accessing database files.
   #[error("io error: {0}")]
   Io(#[from] std::io::Error),

   /// No registered mapper handles the declared type of a property.
   #[error("no mapper for property {property} of type {ty}")]
   NoMapper { property: String, ty: String },

   /// An existing column has a different storage type than the property requires.
   #[error("column {table}.{column} has type {found}, expected {expected}")]
   ColumnTypeMismatch {
      table: String,
      column: String,
      expected: String,
      found: String,
   },

   /// An entity kind declaration is invalid.
   #[error("invalid declaration of {kind}: {reason}")]
   InvalidDeclaration { kind: String, reason: String },

   /// An entity kind is not registered in the catalog.
   #[error("unknown entity kind: {0}")]
   UnknownKind(String),

   /// A stored discriminator does not name a kind of the table's family.
   #[error("unknown discriminator {discriminator} for table {table}")]
   UnknownDiscriminator {
      table: String,
      discriminator: String,
   },

   /// A property is not declared by the entity's kind.
   #[error("property {property} is not declared by {kind}")]
   UnknownProperty { kind: String, property: String },

   /// A row id was assigned twice with different values.
   #[error("entity already has id {existing}, cannot assign {requested}")]
   IdentityConflict { existing: i64, requested: i64 },

   /// Insert of an entity that is already persisted.
   #[error("entity {0} is already persisted")]
   AlreadyPersisted(Reference),

   /// Update or delete of an entity that was never persisted.
   #[error("entity of kind {0} is transient")]
   Transient(String),

   /// A relation points at an entity that was never persisted.
   #[error("property {0} references a transient entity")]
   TransientReference(String),

   /// A reference resolved to zero rows.
   #[error("entity not found: {0}")]
   NotFound(Reference),

   /// `single()` matched more than one row.
   #[error("query matched more than one row, first was {first}")]
   MultipleRows { first: Reference },

   /// A schema upgrade step failed; the database stays at the previous version.
   #[error("migration to version {version} failed: {source}")]
   Migration {
      version: i64,
      #[source]
      source: Box<Error>,
   },

   /// A relation has no repository to load through.
   #[error("relation {0} is detached from any repository")]
   Detached(String),

   /// A cursor was used after it was closed.
   #[error("cursor has been closed")]
   CursorClosed,

   /// A derived repository was closed independently of its parent.
   #[error("derived repositories share their parent's connection and cannot be closed")]
   DerivedRepository,

   /// Transaction was already committed or rolled back.
   #[error("transaction has already been finalized")]
   TransactionFinalized,

   /// A value does not fit the property or column it is used with.
   #[error("cannot convert {found} to {expected}")]
   Conversion { expected: String, found: String },

   /// A reference string could not be parsed.
   #[error("invalid reference: {0}")]
   InvalidReference(String),

   /// Operation not supported by this repository or locator.
   #[error("unsupported operation: {0}")]
   Unsupported(String),
}

impl Error {
   /// Extract a structured error code from the error type.
   ///
   /// This provides machine-readable error codes for error handling.
   pub fn error_code(&self) -> String {
      match self {
         Error::Sqlx(e) => {
            if let Some(code) = e.as_database_error().and_then(|db_err| db_err.code()) {
               return format!("SQLITE_{}", code);
            }
            "SQLX_ERROR".to_string()
         }
         Error::ConnectionManager(_) => "CONNECTION_ERROR".to_string(),
         Error::Io(_) => "IO_ERROR".to_string(),
         Error::NoMapper { .. } => "NO_MAPPER".to_string(),
         Error::ColumnTypeMismatch { .. } => "COLUMN_TYPE_MISMATCH".to_string(),
         Error::InvalidDeclaration { .. } => "INVALID_DECLARATION".to_string(),
         Error::UnknownKind(_) => "UNKNOWN_KIND".to_string(),
         Error::UnknownDiscriminator { .. } => "UNKNOWN_DISCRIMINATOR".to_string(),
         Error::UnknownProperty { .. } => "UNKNOWN_PROPERTY".to_string(),
         Error::IdentityConflict { .. } => "IDENTITY_CONFLICT".to_string(),
         Error::AlreadyPersisted(_) => "ALREADY_PERSISTED".to_string(),
         Error::Transient(_) => "TRANSIENT".to_string(),
         Error::TransientReference(_) => "TRANSIENT_REFERENCE".to_string(),
         Error::NotFound(_) => "NOT_FOUND".to_string(),
         Error::MultipleRows { .. } => "MULTIPLE_ROWS".to_string(),
         Error::Migration { .. } => "MIGRATION_ERROR".to_string(),
         Error::Detached(_) => "DETACHED".to_string(),
         Error::CursorClosed => "CURSOR_CLOSED".to_string(),
         Error::DerivedRepository => "DERIVED_REPOSITORY".to_string(),
         Error::TransactionFinalized => "TRANSACTION_FINALIZED".to_string(),
         Error::Conversion { .. } => "CONVERSION".to_string(),
         Error::InvalidReference(_) => "INVALID_REFERENCE".to_string(),
         Error::Unsupported(_) => "UNSUPPORTED".to_string(),
      }
   }

   /// Returns true for lookup failures that callers may treat as "already gone".
   pub fn is_not_found(&self) -> bool {
      matches!(self, Error::NotFound(_))
   }

   pub(crate) fn conversion(expected: impl Into<String>, found: impl std::fmt::Debug) -> Self {
      Error::Conversion {
         expected: expected.into(),
         found: format!("{found:?}"),
      }
   }
}
