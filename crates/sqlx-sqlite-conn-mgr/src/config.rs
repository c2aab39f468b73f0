//! Configuration for the single-writer SQLite connection

use serde::{Deserialize, Serialize};

/// Configuration for a [`SqliteDatabase`](crate::SqliteDatabase) connection
///
/// # Examples
///
/// ```
/// use sqlx_sqlite_conn_mgr::SqliteDatabaseConfig;
///
/// // Use defaults
/// let config = SqliteDatabaseConfig::default();
///
/// // Override just one field
/// let config = SqliteDatabaseConfig {
///     acquire_timeout_secs: 5,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteDatabaseConfig {
   /// Idle timeout for the write connection of file-backed databases (in seconds)
   ///
   /// The connection is closed after this much inactivity and reopened on the next
   /// acquire. In-memory databases ignore this value because closing their only
   /// connection would discard the database.
   ///
   /// Default: 30
   pub idle_timeout_secs: u64,

   /// How long `acquire_writer()` waits for the connection before failing (in seconds)
   ///
   /// The writer is exclusive and not reentrant, so a caller that already holds it and
   /// asks again fails after this timeout instead of waiting forever.
   ///
   /// Default: 30
   pub acquire_timeout_secs: u64,

   /// SQLite busy timeout applied to the connection (in seconds)
   ///
   /// Default: 5
   pub busy_timeout_secs: u64,
}

impl Default for SqliteDatabaseConfig {
   fn default() -> Self {
      Self {
         idle_timeout_secs: 30,
         acquire_timeout_secs: 30,
         busy_timeout_secs: 5,
      }
   }
}
