//! Where a repository's database lives.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::BoxFuture;
use sqlx_sqlite_conn_mgr::{SqliteDatabase, SqliteDatabaseConfig};
use tracing::debug;

use crate::Result;

/// Opens and closes the database a repository runs on.
pub trait Locator: Send + Sync {
   fn open(&self) -> BoxFuture<'_, Result<Arc<SqliteDatabase>>>;

   fn close(&self, database: Arc<SqliteDatabase>) -> BoxFuture<'_, Result<()>> {
      Box::pin(async move { Ok(database.close().await?) })
   }

   /// Human-readable location, for logs.
   fn describe(&self) -> String;
}

/// A database file. Opening the same path twice shares one database.
#[derive(Debug, Clone)]
pub struct FileLocator {
   path: PathBuf,
   config: Option<SqliteDatabaseConfig>,
}

impl FileLocator {
   pub fn new(path: impl Into<PathBuf>) -> Self {
      Self {
         path: path.into(),
         config: None,
      }
   }

   pub fn with_config(mut self, config: SqliteDatabaseConfig) -> Self {
      self.config = Some(config);
      self
   }

   pub fn path(&self) -> &Path {
      &self.path
   }

   /// Replace the database file with a copy of `source`.
   ///
   /// No repository may have the database open.
   pub async fn restore(&self, source: impl AsRef<Path>) -> Result<u64> {
      debug!(path = %self.path.display(), "restoring database");
      Ok(SqliteDatabase::restore(&self.path, source).await?)
   }
}

impl Locator for FileLocator {
   fn open(&self) -> BoxFuture<'_, Result<Arc<SqliteDatabase>>> {
      Box::pin(async move { Ok(SqliteDatabase::connect(&self.path, self.config.clone()).await?) })
   }

   fn describe(&self) -> String {
      self.path.display().to_string()
   }
}

/// A private in-memory database that lives as long as its repository.
#[derive(Debug, Clone, Default)]
pub struct MemoryLocator {
   config: Option<SqliteDatabaseConfig>,
}

impl MemoryLocator {
   pub fn new() -> Self {
      Self::default()
   }

   pub fn with_config(mut self, config: SqliteDatabaseConfig) -> Self {
      self.config = Some(config);
      self
   }
}

impl Locator for MemoryLocator {
   fn open(&self) -> BoxFuture<'_, Result<Arc<SqliteDatabase>>> {
      Box::pin(async move { Ok(SqliteDatabase::open_in_memory(self.config.clone()).await?) })
   }

   fn describe(&self) -> String {
      ":memory:".to_string()
   }
}
