//! Process-wide cache of open file-backed databases

use crate::Result;
use crate::database::SqliteDatabase;
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Weak};
use tokio::sync::Mutex;
use tracing::debug;

/// Weak handles keyed by absolute path, so dropping the last `Arc` frees the database
static DATABASES: LazyLock<Mutex<HashMap<PathBuf, Weak<SqliteDatabase>>>> =
   LazyLock::new(|| Mutex::new(HashMap::new()));

/// Returns true for paths SQLite treats as a private in-memory database
pub(crate) fn is_memory_database(path: &Path) -> bool {
   let path = path.to_string_lossy();
   path == ":memory:" || path.starts_with("file::memory:") || path == "sqlite::memory:"
}

fn registry_key(path: &Path) -> PathBuf {
   std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Return the cached database for `path`, or open it with `open` and cache it
///
/// The registry lock is held while opening so two concurrent connects to the same
/// path cannot both create a database.
pub(crate) async fn get_or_open_database<F, Fut>(path: &Path, open: F) -> Result<Arc<SqliteDatabase>>
where
   F: FnOnce() -> Fut,
   Fut: Future<Output = Result<SqliteDatabase>>,
{
   let key = registry_key(path);
   let mut databases = DATABASES.lock().await;

   if let Some(existing) = databases.get(&key).and_then(Weak::upgrade) {
      debug!("Reusing cached database: {}", key.display());
      return Ok(existing);
   }

   let database = Arc::new(open().await?);
   databases.insert(key, Arc::downgrade(&database));
   Ok(database)
}

/// Remove the cached handle for `path`
pub(crate) async fn uncache_database(path: &Path) -> Result<()> {
   let key = registry_key(path);
   DATABASES.lock().await.remove(&key);
   Ok(())
}

/// Returns true if a live handle for `path` is cached
pub(crate) async fn is_database_open(path: &Path) -> bool {
   let key = registry_key(path);
   DATABASES
      .lock()
      .await
      .get(&key)
      .is_some_and(|weak| weak.strong_count() > 0)
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_memory_paths() {
      assert!(is_memory_database(Path::new(":memory:")));
      assert!(is_memory_database(Path::new("file::memory:?cache=shared")));
      assert!(!is_memory_database(Path::new("memory.db")));
   }
}
