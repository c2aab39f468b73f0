//! # sqlx-sqlite-conn-mgr
//!
//! A minimal wrapper around SQLx that enforces a single-writer SQLite connection
//! policy for embedded persistence.
//!
//! ## Core Types
//!
//! - **[`SqliteDatabase`]**: Database handle owning one exclusive read-write connection
//! - **[`SqliteDatabaseConfig`]**: Timeouts for the connection
//! - **[`WriteGuard`]**: RAII guard ensuring exclusive access
//! - **[`Error`]**: Error type for database operations
//!
//! ## Architecture
//!
//! - **Single connection**: One connection per database serializes every statement
//! - **Lazy WAL mode**: Write-Ahead Logging enabled on first acquire of a file database
//! - **In-memory support**: `:memory:` databases keep their connection for their whole life
//! - **Raw backup/restore**: Byte-level copies of the database file
//!
//! ## Usage
//!
//! ```no_run
//! use sqlx_sqlite_conn_mgr::SqliteDatabase;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> sqlx_sqlite_conn_mgr::Result<()> {
//!     // Connect returns Arc<SqliteDatabase>
//!     let db = SqliteDatabase::connect("example.db", None).await?;
//!
//!     // Multiple connects to the same path return the same instance
//!     let db2 = SqliteDatabase::connect("example.db", None).await?;
//!     assert!(Arc::ptr_eq(&db, &db2));
//!
//!     let mut writer = db.acquire_writer().await?;
//!     sqlx::query("INSERT INTO users (name) VALUES (?)")
//!         .bind("Alice")
//!         .execute(&mut *writer)
//!         .await?;
//!     drop(writer);
//!
//!     db.backup_to("example.bak").await?;
//!     db.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Design Principles
//!
//! - Uses sqlx's `SqlitePoolOptions` capped at one connection for exclusivity
//! - Uses sqlx's `SqliteConnectOptions` for connection flags and configuration
//! - Global registry caches file databases and returns existing ones
//! - WAL mode is enabled lazily only when the connection is first used
//!
mod config;
mod database;
mod error;
mod registry;
mod write_guard;

// Re-export public types
pub use config::SqliteDatabaseConfig;
pub use database::SqliteDatabase;
pub use error::Error;
pub use write_guard::WriteGuard;

/// A type alias for Results with our custom Error type
pub type Result<T> = std::result::Result<T, Error>;
