use sqlx_sqlite_conn_mgr::{Error, SqliteDatabase, SqliteDatabaseConfig};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn temp_db(name: &str) -> (TempDir, std::path::PathBuf) {
   let temp_dir = TempDir::new().expect("Failed to create temp directory");
   let path = temp_dir.path().join(name);
   (temp_dir, path)
}

fn wal_path(path: &std::path::Path) -> std::path::PathBuf {
   std::path::PathBuf::from(format!("{}-wal", path.display()))
}

fn shm_path(path: &std::path::Path) -> std::path::PathBuf {
   std::path::PathBuf::from(format!("{}-shm", path.display()))
}

#[tokio::test]
async fn test_database_closed_error() {
   let (_temp, test_path) = temp_db("test_close_error.db");
   let db = SqliteDatabase::connect(&test_path, None)
      .await
      .expect("Failed to connect to test database");

   // Clone db so we can use it after close
   let db_ref = Arc::clone(&db);
   db.close().await.unwrap();

   let writer_result = db_ref.acquire_writer().await;
   assert!(writer_result.is_err());
   assert!(matches!(writer_result.unwrap_err(), Error::DatabaseClosed));
   assert!(db_ref.is_closed());
}

#[tokio::test]
async fn test_memory_databases_never_cached() {
   // :memory: databases should never be cached - each connection is independent
   let db1 = SqliteDatabase::connect(":memory:", None).await.unwrap();
   let db2 = SqliteDatabase::connect(":memory:", None).await.unwrap();

   assert!(
      !Arc::ptr_eq(&db1, &db2),
      ":memory: databases should not be cached, each connect should create new instance"
   );
   assert!(db1.is_memory());
   assert!(db1.path().is_none());

   let mut writer1 = db1.acquire_writer().await.unwrap();
   sqlx::query("CREATE TABLE test (id INTEGER)")
      .execute(&mut *writer1)
      .await
      .unwrap();
   drop(writer1);

   // Second database should NOT have the table (independent instances)
   let mut writer2 = db2.acquire_writer().await.unwrap();
   let result = sqlx::query("SELECT * FROM test")
      .fetch_optional(&mut *writer2)
      .await;

   assert!(
      result.is_err(),
      "Second :memory: database should not have table from first"
   );
}

#[tokio::test]
async fn test_wal_checkpoint_on_close() {
   let (_temp, test_path) = temp_db("test_wal_checkpoint.db");
   let db = SqliteDatabase::connect(&test_path, None).await.unwrap();

   // Perform write to initialize WAL mode
   let mut writer = db.acquire_writer().await.unwrap();
   sqlx::query("CREATE TABLE test (id INTEGER, value TEXT)")
      .execute(&mut *writer)
      .await
      .unwrap();

   sqlx::query("INSERT INTO test (id, value) VALUES (1, 'test')")
      .execute(&mut *writer)
      .await
      .unwrap();

   drop(writer);

   let wal = wal_path(&test_path);
   assert!(wal.exists(), "WAL file should exist after write");

   db.close().await.unwrap();

   // WAL file should be either 0 bytes or not exist
   if wal.exists() {
      let wal_size = std::fs::metadata(&wal).unwrap().len();
      assert_eq!(wal_size, 0, "WAL file should be 0 bytes after checkpoint");
   }
}

#[tokio::test]
async fn test_remove() {
   let (_temp, test_path) = temp_db("test_close_remove.db");
   let db = SqliteDatabase::connect(&test_path, None).await.unwrap();

   // Perform write to create WAL and SHM files
   let mut writer = db.acquire_writer().await.unwrap();
   sqlx::query("CREATE TABLE test (id INTEGER)")
      .execute(&mut *writer)
      .await
      .unwrap();

   drop(writer);

   assert!(test_path.exists(), "Database file should exist");

   db.remove().await.unwrap();

   assert!(!test_path.exists(), "Database file should be removed");
   assert!(!wal_path(&test_path).exists(), "WAL file should be removed");
   assert!(!shm_path(&test_path).exists(), "SHM file should be removed");
}

#[tokio::test]
async fn test_custom_config() {
   let (_temp, test_path) = temp_db("test_custom_config.db");

   let custom_config = SqliteDatabaseConfig {
      idle_timeout_secs: 60,
      acquire_timeout_secs: 1,
      busy_timeout_secs: 1,
   };

   let db = SqliteDatabase::connect(&test_path, Some(custom_config))
      .await
      .unwrap();

   db.remove().await.unwrap();
}

#[tokio::test]
async fn test_wal_mode_initialization() {
   let (_temp, test_path) = temp_db("test_wal_mode.db");
   let db = SqliteDatabase::connect(&test_path, None).await.unwrap();

   let mut writer = db.acquire_writer().await.unwrap();

   let (mode,): (String,) = sqlx::query_as("PRAGMA journal_mode")
      .fetch_one(&mut *writer)
      .await
      .unwrap();

   assert_eq!(
      mode.to_lowercase(),
      "wal",
      "Journal mode should be WAL after first acquire_writer"
   );

   let (sync,): (i32,) = sqlx::query_as("PRAGMA synchronous")
      .fetch_one(&mut *writer)
      .await
      .unwrap();

   assert_eq!(
      sync, 1,
      "Sync mode should be NORMAL after first acquire_writer"
   );

   drop(writer);

   db.remove().await.unwrap();
}

#[tokio::test]
async fn test_db_instance_caching() {
   let (_temp, test_path) = temp_db("test_caching.db");

   let db1 = SqliteDatabase::connect(&test_path, None).await.unwrap();
   let db2 = SqliteDatabase::connect(&test_path, None).await.unwrap();

   assert!(
      Arc::ptr_eq(&db1, &db2),
      "Same path should return cached instance"
   );

   drop(db1);
   db2.remove().await.unwrap();
}

#[tokio::test]
async fn test_write_serialization() {
   let (_temp, test_path) = temp_db("test_write_serial.db");
   let db = SqliteDatabase::connect(&test_path, None).await.unwrap();

   let mut writer = db.acquire_writer().await.unwrap();
   sqlx::query("CREATE TABLE counter (id INTEGER PRIMARY KEY, value INTEGER)")
      .execute(&mut *writer)
      .await
      .unwrap();

   sqlx::query("INSERT INTO counter (id, value) VALUES (1, 0)")
      .execute(&mut *writer)
      .await
      .unwrap();

   drop(writer);

   // Spawn 3 concurrent write tasks (proves the single connection serializes)
   let start = Instant::now();
   let mut handles = vec![];

   for _ in 0..3 {
      let db_clone = Arc::clone(&db);
      handles.push(tokio::spawn(async move {
         let mut writer = db_clone.acquire_writer().await.unwrap();
         tokio::time::sleep(Duration::from_millis(10)).await;
         sqlx::query("UPDATE counter SET value = value + 1 WHERE id = 1")
            .execute(&mut *writer)
            .await
            .unwrap();
      }));
   }

   for handle in handles {
      handle.await.unwrap();
   }

   let mut writer = db.acquire_writer().await.unwrap();
   let (value,): (i64,) = sqlx::query_as("SELECT value FROM counter WHERE id = 1")
      .fetch_one(&mut *writer)
      .await
      .unwrap();
   drop(writer);

   assert_eq!(value, 3, "All 3 writes should have been serialized");

   assert!(
      start.elapsed().as_millis() >= 25,
      "Serialized writes took {}ms (expected ≥25ms, would be ~10ms if concurrent)",
      start.elapsed().as_millis()
   );

   db.remove().await.unwrap();
}

#[tokio::test]
async fn test_reentrant_acquire_times_out() {
   let config = SqliteDatabaseConfig {
      acquire_timeout_secs: 1,
      ..Default::default()
   };
   let db = SqliteDatabase::open_in_memory(Some(config)).await.unwrap();

   let _held = db.acquire_writer().await.unwrap();
   let second = db.acquire_writer().await;

   assert!(matches!(
      second.unwrap_err(),
      Error::Sqlx(sqlx::Error::PoolTimedOut)
   ));
}

#[tokio::test]
async fn test_backup_and_restore_round_trip() {
   let (temp, test_path) = temp_db("source.db");
   let backup_path = temp.path().join("source.bak");

   let db = SqliteDatabase::connect(&test_path, None).await.unwrap();
   let mut writer = db.acquire_writer().await.unwrap();
   sqlx::query("CREATE TABLE notes (body TEXT)")
      .execute(&mut *writer)
      .await
      .unwrap();
   sqlx::query("INSERT INTO notes (body) VALUES ('kept')")
      .execute(&mut *writer)
      .await
      .unwrap();
   drop(writer);

   let copied = db.backup_to(&backup_path).await.unwrap();
   assert!(copied > 0);

   // Restoring over an open database is refused
   let err = SqliteDatabase::restore(&test_path, &backup_path)
      .await
      .unwrap_err();
   assert!(matches!(err, Error::DatabaseInUse(_)));

   let mut writer = db.acquire_writer().await.unwrap();
   sqlx::query("DELETE FROM notes")
      .execute(&mut *writer)
      .await
      .unwrap();
   drop(writer);
   db.close().await.unwrap();

   SqliteDatabase::restore(&test_path, &backup_path)
      .await
      .unwrap();

   let db = SqliteDatabase::connect(&test_path, None).await.unwrap();
   let mut writer = db.acquire_writer().await.unwrap();
   let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM notes")
      .fetch_one(&mut *writer)
      .await
      .unwrap();
   drop(writer);

   assert_eq!(count, 1, "Restored database should contain the backed up row");
   db.remove().await.unwrap();
}
