//! Exclusive hold on the one connection of a database

use sqlx::Sqlite;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::SqliteConnection;
use std::ops::{Deref, DerefMut};
use std::time::Instant;
use tracing::{trace, warn};

/// Exclusive access to the single connection of a [`SqliteDatabase`](crate::SqliteDatabase)
///
/// Reads and writes both go through the guard. It derefs to `SqliteConnection`, so
/// `&mut *guard` is an executor. The connection goes back to the pool on drop,
/// unless [`close_on_drop`](Self::close_on_drop) was called.
///
/// ```no_run
/// use sqlx_sqlite_conn_mgr::SqliteDatabase;
///
/// # async fn example() -> Result<(), sqlx_sqlite_conn_mgr::Error> {
/// let db = SqliteDatabase::connect("ledger.db", None).await?;
/// let mut conn = db.acquire_writer().await?;
/// sqlx::query("UPDATE Account SET balance = balance - ? WHERE _id = ?")
///    .bind(10)
///    .bind(1)
///    .execute(&mut *conn)
///    .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct WriteGuard {
   conn: PoolConnection<Sqlite>,
   acquired: Instant,
   discard: bool,
}

impl WriteGuard {
   pub(crate) fn new(conn: PoolConnection<Sqlite>) -> Self {
      Self {
         conn,
         acquired: Instant::now(),
         discard: false,
      }
   }

   /// Close the connection on drop instead of returning it to the pool
   ///
   /// For a connection left inside an open transaction. A file-backed database
   /// reconnects on the next acquire; an in-memory database loses its contents.
   pub fn close_on_drop(&mut self) {
      self.discard = true;
      self.conn.close_on_drop();
   }
}

impl Deref for WriteGuard {
   type Target = SqliteConnection;

   fn deref(&self) -> &Self::Target {
      &self.conn
   }
}

impl DerefMut for WriteGuard {
   fn deref_mut(&mut self) -> &mut Self::Target {
      &mut self.conn
   }
}

impl Drop for WriteGuard {
   fn drop(&mut self) {
      let held = self.acquired.elapsed();
      if self.discard {
         warn!(?held, "discarding database connection");
      } else {
         trace!(?held, "database connection released");
      }
   }
}
