//! SQLite database with a single exclusive read-write connection

use crate::Result;
use crate::config::SqliteDatabaseConfig;
use crate::error::Error;
use crate::registry::{
   get_or_open_database, is_database_open, is_memory_database, uncache_database,
};
use crate::write_guard::WriteGuard;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error};

/// SQLite database owning exactly one read-write connection.
///
/// Every statement, reads included, goes through [`acquire_writer()`](Self::acquire_writer).
/// The connection lives in a pool capped at one, so holding a [`WriteGuard`] gives exclusive
/// access and other callers wait (up to the configured acquire timeout) for it to be dropped.
///
/// File-backed databases switch to WAL mode the first time the writer is acquired.
/// In-memory databases keep their connection alive for as long as the handle exists.
///
/// # Example
///
/// ```no_run
/// use sqlx_sqlite_conn_mgr::SqliteDatabase;
///
/// # async fn example() -> Result<(), sqlx_sqlite_conn_mgr::Error> {
/// let db = SqliteDatabase::connect("test.db", None).await?;
///
/// let mut writer = db.acquire_writer().await?;
/// sqlx::query("INSERT INTO users (name) VALUES (?)")
///     .bind("Alice")
///     .execute(&mut *writer)
///     .await?;
/// drop(writer);
///
/// db.close().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct SqliteDatabase {
   /// Single read-write connection pool (max_connections=1) for serialized access
   conn: Pool<Sqlite>,

   /// Tracks if WAL mode has been initialized (set on first acquire)
   wal_initialized: AtomicBool,

   /// Marks database as closed to prevent further operations
   closed: AtomicBool,

   /// Path to database file, `None` for in-memory databases
   path: Option<PathBuf>,
}

impl SqliteDatabase {
   /// Connect to a file-backed SQLite database
   ///
   /// If the database is already connected, returns the existing connection.
   /// Multiple calls with the same path will return the same database instance.
   /// The database file is created if it doesn't exist.
   ///
   /// Passing `:memory:` is equivalent to [`open_in_memory()`](Self::open_in_memory):
   /// such databases are never cached.
   ///
   /// # Arguments
   ///
   /// * `path` - Path to the SQLite database file (will be created if missing)
   /// * `custom_config` - Optional custom configuration. Pass `None` to use defaults.
   pub async fn connect(
      path: impl AsRef<Path>,
      custom_config: Option<SqliteDatabaseConfig>,
   ) -> Result<Arc<Self>> {
      let config = custom_config.unwrap_or_default();
      let path = path.as_ref();

      // Validate path is not empty
      if path.as_os_str().is_empty() {
         return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "Database path cannot be empty",
         )));
      }

      if is_memory_database(path) {
         return Self::open_in_memory(Some(config)).await;
      }

      let path = path.to_path_buf();

      get_or_open_database(&path, || async {
         let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(config.busy_timeout_secs));

         let conn = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(0)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .idle_timeout(Some(Duration::from_secs(config.idle_timeout_secs)))
            .connect_with(options)
            .await?;

         debug!("Opened database: {}", path.display());

         Ok(Self {
            conn,
            wal_initialized: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            path: Some(path.clone()),
         })
      })
      .await
   }

   /// Open a private in-memory database
   ///
   /// Each call returns an independent database. Its single connection is never
   /// recycled, so the contents live exactly as long as the returned handle.
   pub async fn open_in_memory(custom_config: Option<SqliteDatabaseConfig>) -> Result<Arc<Self>> {
      let config = custom_config.unwrap_or_default();

      let options = SqliteConnectOptions::from_str("sqlite::memory:")?
         .busy_timeout(Duration::from_secs(config.busy_timeout_secs));

      let conn = SqlitePoolOptions::new()
         .max_connections(1)
         .min_connections(1)
         .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
         .idle_timeout(None)
         .max_lifetime(None)
         .connect_with(options)
         .await?;

      Ok(Arc::new(Self {
         conn,
         wal_initialized: AtomicBool::new(false),
         closed: AtomicBool::new(false),
         path: None,
      }))
   }

   /// Path of the database file, or `None` for in-memory databases
   pub fn path(&self) -> Option<&Path> {
      self.path.as_deref()
   }

   /// Returns true if this database lives only in memory
   pub fn is_memory(&self) -> bool {
      self.path.is_none()
   }

   /// Returns true once [`close()`](Self::close) has been called
   pub fn is_closed(&self) -> bool {
      self.closed.load(Ordering::SeqCst)
   }

   /// Acquire exclusive access to the database connection
   ///
   /// Only one `WriteGuard` exists at a time. The call is not reentrant: acquiring
   /// again while holding a guard waits for the acquire timeout and then fails.
   ///
   /// On the first call for a file-backed database, WAL mode is enabled.
   pub async fn acquire_writer(&self) -> Result<WriteGuard> {
      if self.is_closed() {
         return Err(Error::DatabaseClosed);
      }

      // Acquire connection from pool (max=1 ensures exclusive access)
      let mut conn = self.conn.acquire().await?;

      // Initialize WAL mode on first use (idempotent and safe)
      if !self.is_memory() && !self.wal_initialized.load(Ordering::SeqCst) {
         sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&mut *conn)
            .await?;

         // https://www.sqlite.org/wal.html#performance_considerations
         sqlx::query("PRAGMA synchronous = NORMAL")
            .execute(&mut *conn)
            .await?;

         self.wal_initialized.store(true, Ordering::SeqCst);
      }

      Ok(WriteGuard::new(conn))
   }

   /// Copy the raw database file to `destination`
   ///
   /// The WAL is checkpointed first and the writer is held during the copy, so the
   /// destination is a consistent snapshot. Returns the number of bytes copied.
   pub async fn backup_to(&self, destination: impl AsRef<Path>) -> Result<u64> {
      let path = self.path.as_ref().ok_or(Error::InMemory)?;
      let mut writer = self.acquire_writer().await?;

      sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
         .execute(&mut *writer)
         .await?;

      let copied = tokio::fs::copy(path, destination.as_ref()).await?;
      debug!(
         "Backed up {} ({} bytes) to {}",
         path.display(),
         copied,
         destination.as_ref().display()
      );

      drop(writer);
      Ok(copied)
   }

   /// Replace the database file at `path` with a raw copy of `source`
   ///
   /// The database must not be open in this process. Leftover WAL and SHM files are
   /// removed so they cannot be replayed over the restored contents.
   pub async fn restore(path: impl AsRef<Path>, source: impl AsRef<Path>) -> Result<u64> {
      let path = path.as_ref();
      if is_memory_database(path) {
         return Err(Error::InMemory);
      }
      if is_database_open(path).await {
         return Err(Error::DatabaseInUse(path.display().to_string()));
      }

      let copied = tokio::fs::copy(source.as_ref(), path).await?;
      remove_if_exists(&sidecar(path, "-wal"))?;
      remove_if_exists(&sidecar(path, "-shm"))?;

      debug!(
         "Restored {} ({} bytes) from {}",
         path.display(),
         copied,
         source.as_ref().display()
      );
      Ok(copied)
   }

   /// Close the database and clean up resources
   ///
   /// After calling close, any operations on this database will return `Error::DatabaseClosed`.
   ///
   /// Note: Takes `Arc<Self>` to consume ownership, preventing use-after-close at compile time.
   /// The registry stores `Weak` references, so when this Arc is dropped, the database is freed.
   pub async fn close(self: Arc<Self>) -> Result<()> {
      // Mark as closed
      self.closed.store(true, Ordering::SeqCst);

      // Remove from registry
      if let Some(path) = &self.path
         && let Err(e) = uncache_database(path).await
      {
         error!("Failed to remove database from cache: {}", e);
      }

      // Checkpoint WAL before closing to flush changes and truncate the WAL file
      if self.wal_initialized.load(Ordering::SeqCst)
         && let Ok(mut conn) = self.conn.acquire().await
      {
         let _ = sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&mut *conn)
            .await;
      }

      self.conn.close().await;

      Ok(())
   }

   /// Close the database and delete all database files
   ///
   /// This closes the connection and then deletes the database file,
   /// WAL file, and SHM file from disk. Use with caution!
   pub async fn remove(self: Arc<Self>) -> Result<()> {
      let path = self.path.clone();

      self.close().await?;

      let Some(path) = path else {
         return Ok(());
      };

      // Remove main database file - propagate errors (file should exist)
      std::fs::remove_file(&path).map_err(Error::Io)?;

      // WAL and SHM files may not exist if WAL was never initialized
      remove_if_exists(&sidecar(&path, "-wal"))?;
      remove_if_exists(&sidecar(&path, "-shm"))?;

      Ok(())
   }
}

/// `<path><suffix>`, the naming SQLite uses for WAL and SHM files
fn sidecar(path: &Path, suffix: &str) -> PathBuf {
   let mut name = OsString::from(path.as_os_str());
   name.push(suffix);
   PathBuf::from(name)
}

fn remove_if_exists(path: &Path) -> Result<()> {
   match std::fs::remove_file(path) {
      Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(Error::Io(e)),
      _ => Ok(()),
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_sidecar_appends_suffix() {
      assert_eq!(
         sidecar(Path::new("/tmp/app.db"), "-wal"),
         PathBuf::from("/tmp/app.db-wal")
      );
      assert_eq!(
         sidecar(Path::new("store"), "-shm"),
         PathBuf::from("store-shm")
      );
   }

   #[tokio::test]
   async fn test_memory_database_survives_guard_release() {
      let db = SqliteDatabase::open_in_memory(None).await.unwrap();

      let mut writer = db.acquire_writer().await.unwrap();
      sqlx::query("CREATE TABLE kept (id INTEGER)")
         .execute(&mut *writer)
         .await
         .unwrap();
      drop(writer);

      let mut writer = db.acquire_writer().await.unwrap();
      let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM kept")
         .fetch_one(&mut *writer)
         .await
         .unwrap();
      assert_eq!(count, 0);
   }

   #[tokio::test]
   async fn test_backup_of_memory_database_is_rejected() {
      let db = SqliteDatabase::open_in_memory(None).await.unwrap();
      let err = db.backup_to("never.db").await.unwrap_err();
      assert!(matches!(err, Error::InMemory));
   }
}
