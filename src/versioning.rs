//! Ordered schema upgrades.
//!
//! The schema version is SQLite's `user_version`. Step `n` (counting from one) runs
//! when the stored version is below `n`, inside its own transaction, and the new
//! version is written in that same transaction. An interrupted upgrade therefore
//! leaves the database at the last completed step and is retried on the next open.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use sqlx::Row as _;
use sqlx::sqlite::SqliteConnection;
use sqlx_sqlite_conn_mgr::SqliteDatabase;
use tracing::{debug, error, info, warn};

use crate::operations::quote;
use crate::{Error, Result};

/// One schema upgrade step.
pub trait Upgrade: Send + Sync {
   /// Apply the step. Runs inside a transaction the caller commits.
   fn apply<'a>(&'a self, conn: &'a mut SqliteConnection) -> BoxFuture<'a, Result<()>>;

   fn describe(&self) -> String {
      "upgrade".to_string()
   }
}

/// A step made of raw SQL statements, run in order.
#[derive(Debug, Clone)]
pub struct Statements(Vec<String>);

impl Statements {
   pub fn new<S: Into<String>>(statements: impl IntoIterator<Item = S>) -> Self {
      Self(statements.into_iter().map(Into::into).collect())
   }
}

impl Upgrade for Statements {
   fn apply<'a>(&'a self, conn: &'a mut SqliteConnection) -> BoxFuture<'a, Result<()>> {
      Box::pin(async move {
         for sql in &self.0 {
            debug!(%sql, "upgrade statement");
            sqlx::query(sql).execute(&mut *conn).await?;
         }
         Ok(())
      })
   }

   fn describe(&self) -> String {
      format!("{} statement(s)", self.0.len())
   }
}

type UpgradeFn =
   dyn for<'c> Fn(&'c mut SqliteConnection) -> BoxFuture<'c, Result<()>> + Send + Sync;

/// A step implemented by a closure.
///
/// ```no_run
/// # use sqlx_sqlite_orm::FnUpgrade;
/// let step = FnUpgrade::new(|conn| {
///    Box::pin(async move {
///       sqlx::query("UPDATE [Person] SET [name] = trim([name])")
///          .execute(&mut *conn)
///          .await?;
///       Ok(())
///    })
/// });
/// ```
pub struct FnUpgrade(Box<UpgradeFn>);

impl FnUpgrade {
   pub fn new<F>(f: F) -> Self
   where
      F: for<'c> Fn(&'c mut SqliteConnection) -> BoxFuture<'c, Result<()>> + Send + Sync + 'static,
   {
      Self(Box::new(f))
   }
}

impl Upgrade for FnUpgrade {
   fn apply<'a>(&'a self, conn: &'a mut SqliteConnection) -> BoxFuture<'a, Result<()>> {
      (self.0)(conn)
   }

   fn describe(&self) -> String {
      "function".to_string()
   }
}

#[derive(Debug, Clone)]
enum Change {
   Rename { from: String, to: String },
   Drop(String),
   Retype { column: String, ty: String },
}

/// A column as `PRAGMA table_info` reports it.
#[derive(Debug, Clone)]
struct ColumnInfo {
   name: String,
   ty: String,
   not_null: bool,
   default: Option<String>,
   pk: i64,
}

/// Column changes SQLite cannot apply in place.
///
/// The table is rebuilt: a copy named `{table}__alter` is created with the changed
/// columns, filled from the original, and renamed over it once the original is
/// dropped. The primary key and `AUTOINCREMENT` are kept; indexes on the table are
/// not, and must be recreated by a later step or [`Index`](crate::Index).
#[derive(Debug, Clone)]
pub struct AlterTable {
   table: String,
   changes: Vec<Change>,
}

impl AlterTable {
   pub fn new(table: impl Into<String>) -> Self {
      Self {
         table: table.into(),
         changes: Vec::new(),
      }
   }

   pub fn rename_column(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
      self.changes.push(Change::Rename {
         from: from.into(),
         to: to.into(),
      });
      self
   }

   pub fn drop_column(mut self, column: impl Into<String>) -> Self {
      self.changes.push(Change::Drop(column.into()));
      self
   }

   /// Change the declared type of a column; stored values are copied unchanged.
   pub fn retype_column(mut self, column: impl Into<String>, ty: impl Into<String>) -> Self {
      self.changes.push(Change::Retype {
         column: column.into(),
         ty: ty.into(),
      });
      self
   }

   fn invalid(&self, reason: String) -> Error {
      Error::InvalidDeclaration {
         kind: self.table.clone(),
         reason,
      }
   }

   /// Pairs of (old name, new column) after applying every change.
   fn plan(&self, existing: Vec<ColumnInfo>) -> Result<Vec<(String, ColumnInfo)>> {
      let mut columns: Vec<(String, ColumnInfo)> =
         existing.into_iter().map(|c| (c.name.clone(), c)).collect();
      for change in &self.changes {
         let wanted = match change {
            Change::Rename { from, .. } => from,
            Change::Drop(column) => column,
            Change::Retype { column, .. } => column,
         };
         let position = columns
            .iter()
            .position(|(_, c)| c.name.eq_ignore_ascii_case(wanted))
            .ok_or_else(|| self.invalid(format!("no column {wanted}")))?;
         match change {
            Change::Rename { to, .. } => {
               if columns.iter().any(|(_, c)| c.name.eq_ignore_ascii_case(to)) {
                  return Err(self.invalid(format!("column {to} already exists")));
               }
               columns[position].1.name = to.clone();
            }
            Change::Drop(_) => {
               if columns[position].1.pk > 0 {
                  return Err(self.invalid(format!("cannot drop primary key column {wanted}")));
               }
               columns.remove(position);
            }
            Change::Retype { ty, .. } => columns[position].1.ty = ty.clone(),
         }
      }
      Ok(columns)
   }
}

fn definition(column: &ColumnInfo, inline_key: bool, autoincrement: bool) -> String {
   let mut sql = quote(&column.name);
   if !column.ty.is_empty() {
      sql.push(' ');
      sql.push_str(&column.ty);
   }
   if inline_key && column.pk > 0 {
      sql.push_str(" PRIMARY KEY");
      if autoincrement {
         sql.push_str(" AUTOINCREMENT");
      }
   }
   if column.not_null {
      sql.push_str(" NOT NULL");
   }
   if let Some(default) = &column.default {
      sql.push_str(" DEFAULT ");
      sql.push_str(default);
   }
   sql
}

impl Upgrade for AlterTable {
   fn apply<'a>(&'a self, conn: &'a mut SqliteConnection) -> BoxFuture<'a, Result<()>> {
      Box::pin(async move {
         let table = &self.table;
         let rows = sqlx::query(&format!("PRAGMA table_info({})", quote(table)))
            .fetch_all(&mut *conn)
            .await?;
         if rows.is_empty() {
            return Err(self.invalid("no such table".to_string()));
         }
         let existing = rows
            .iter()
            .map(|row| -> Result<ColumnInfo> {
               Ok(ColumnInfo {
                  name: row.try_get("name")?,
                  ty: row.try_get("type")?,
                  not_null: row.try_get::<i64, _>("notnull")? != 0,
                  default: row.try_get("dflt_value")?,
                  pk: row.try_get("pk")?,
               })
            })
            .collect::<Result<Vec<_>>>()?;

         let created: Option<String> =
            sqlx::query_scalar("SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?")
               .bind(table)
               .fetch_optional(&mut *conn)
               .await?;
         let autoincrement = created
            .is_some_and(|sql| sql.to_ascii_uppercase().contains("AUTOINCREMENT"));

         let columns = self.plan(existing)?;
         let keys: Vec<&ColumnInfo> = {
            let mut keys: Vec<&ColumnInfo> =
               columns.iter().map(|(_, c)| c).filter(|c| c.pk > 0).collect();
            keys.sort_by_key(|c| c.pk);
            keys
         };
         let inline_key = keys.len() == 1;
         let mut definitions: Vec<String> = columns
            .iter()
            .map(|(_, c)| definition(c, inline_key, autoincrement))
            .collect();
         if keys.len() > 1 {
            let names: Vec<String> = keys.iter().map(|c| quote(&c.name)).collect();
            definitions.push(format!("PRIMARY KEY ({})", names.join(", ")));
         }

         let scratch = format!("{table}__alter");
         let targets: Vec<String> = columns.iter().map(|(_, c)| quote(&c.name)).collect();
         let sources: Vec<String> = columns.iter().map(|(old, _)| quote(old)).collect();
         let statements = [
            format!(
               "CREATE TABLE {} ({})",
               quote(&scratch),
               definitions.join(", ")
            ),
            format!(
               "INSERT INTO {} ({}) SELECT {} FROM {}",
               quote(&scratch),
               targets.join(", "),
               sources.join(", "),
               quote(table)
            ),
            format!("DROP TABLE {}", quote(table)),
            format!(
               "ALTER TABLE {} RENAME TO {}",
               quote(&scratch),
               quote(table)
            ),
         ];
         for sql in &statements {
            debug!(%sql, "alter table");
            sqlx::query(sql).execute(&mut *conn).await?;
         }
         Ok(())
      })
   }

   fn describe(&self) -> String {
      format!("alter table {}", self.table)
   }
}

/// The upgrade steps of a schema, in order.
#[derive(Clone, Default)]
pub struct Versioning {
   steps: Vec<Arc<dyn Upgrade>>,
}

impl Versioning {
   pub fn new() -> Self {
      Self::default()
   }

   /// Append the step that upgrades to version `len() + 1`.
   pub fn step(mut self, step: impl Upgrade + 'static) -> Self {
      self.steps.push(Arc::new(step));
      self
   }

   /// The version a fully upgraded database has.
   pub fn len(&self) -> usize {
      self.steps.len()
   }

   pub fn is_empty(&self) -> bool {
      self.steps.is_empty()
   }

   /// The stored schema version.
   pub async fn version(conn: &mut SqliteConnection) -> Result<i64> {
      let row = sqlx::query("PRAGMA user_version")
         .fetch_one(&mut *conn)
         .await?;
      Ok(row.try_get(0)?)
   }

   async fn apply(conn: &mut SqliteConnection, step: &dyn Upgrade, version: i64) -> Result<()> {
      sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
      step.apply(conn).await?;
      sqlx::query(&format!("PRAGMA user_version = {version}"))
         .execute(&mut *conn)
         .await?;
      sqlx::query("COMMIT").execute(&mut *conn).await?;
      Ok(())
   }

   /// Apply the pending steps. Returns how many ran.
   pub(crate) async fn upgrade(&self, database: &SqliteDatabase) -> Result<usize> {
      let mut writer = database.acquire_writer().await?;
      let current = Self::version(&mut writer).await?;
      if current > self.steps.len() as i64 {
         warn!(
            current,
            declared = self.steps.len(),
            "database schema is newer than the declared upgrades"
         );
         return Ok(0);
      }

      let mut applied = 0;
      for (index, step) in self.steps.iter().enumerate().skip(current.max(0) as usize) {
         let version = index as i64 + 1;
         if let Err(e) = Self::apply(&mut writer, step.as_ref(), version).await {
            error!(version, step = %step.describe(), error = %e, "schema upgrade failed");
            if let Err(rollback) = sqlx::query("ROLLBACK").execute(&mut *writer).await {
               debug!(error = %rollback, "rollback after failed upgrade");
            }
            return Err(Error::Migration {
               version,
               source: Box::new(e),
            });
         }
         info!(version, step = %step.describe(), "applied schema upgrade");
         applied += 1;
      }
      Ok(applied)
   }
}

impl fmt::Debug for Versioning {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      let steps: Vec<String> = self.steps.iter().map(|s| s.describe()).collect();
      f.debug_struct("Versioning").field("steps", &steps).finish()
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use sqlx::Row;

   async fn memory() -> Arc<SqliteDatabase> {
      SqliteDatabase::open_in_memory(None).await.unwrap()
   }

   async fn columns(db: &SqliteDatabase, table: &str) -> Vec<(String, String)> {
      let mut writer = db.acquire_writer().await.unwrap();
      sqlx::query(&format!("PRAGMA table_info([{table}])"))
         .fetch_all(&mut *writer)
         .await
         .unwrap()
         .iter()
         .map(|row| (row.get("name"), row.get("type")))
         .collect()
   }

   #[tokio::test]
   async fn test_applies_pending_steps_once() {
      let db = memory().await;
      let versioning = Versioning::new()
         .step(Statements::new(["CREATE TABLE t (a INTEGER)"]))
         .step(Statements::new(["INSERT INTO t (a) VALUES (1)"]));

      assert_eq!(versioning.upgrade(&db).await.unwrap(), 2);
      assert_eq!(versioning.upgrade(&db).await.unwrap(), 0);

      let mut writer = db.acquire_writer().await.unwrap();
      assert_eq!(Versioning::version(&mut writer).await.unwrap(), 2);
   }

   #[tokio::test]
   async fn test_failed_step_keeps_previous_version() {
      let db = memory().await;
      let versioning = Versioning::new()
         .step(Statements::new(["CREATE TABLE t (a INTEGER)"]))
         .step(Statements::new([
            "INSERT INTO t (a) VALUES (1)",
            "INSERT INTO missing (a) VALUES (1)",
         ]));

      let err = versioning.upgrade(&db).await.unwrap_err();
      assert!(matches!(err, Error::Migration { version: 2, .. }));

      let mut writer = db.acquire_writer().await.unwrap();
      assert_eq!(Versioning::version(&mut writer).await.unwrap(), 1);
      let count: i64 = sqlx::query_scalar("SELECT count(*) FROM t")
         .fetch_one(&mut *writer)
         .await
         .unwrap();
      assert_eq!(count, 0, "partial step must be rolled back");
   }

   #[tokio::test]
   async fn test_fn_upgrade() {
      let db = memory().await;
      let versioning = Versioning::new().step(FnUpgrade::new(|conn| {
         Box::pin(async move {
            sqlx::query("CREATE TABLE f (x TEXT)")
               .execute(&mut *conn)
               .await?;
            Ok(())
         })
      }));
      assert_eq!(versioning.upgrade(&db).await.unwrap(), 1);
      assert_eq!(columns(&db, "f").await, vec![("x".into(), "TEXT".into())]);
   }

   #[tokio::test]
   async fn test_alter_table_rebuilds_columns() {
      let db = memory().await;
      let versioning = Versioning::new()
         .step(Statements::new([
            "CREATE TABLE p ([_id] INTEGER PRIMARY KEY AUTOINCREMENT, [name] TEXT, [age] TEXT, [junk] BLOB)",
            "INSERT INTO p (name, age, junk) VALUES ('Ada', '36', x'00')",
         ]))
         .step(
            AlterTable::new("p")
               .rename_column("name", "full_name")
               .retype_column("age", "INTEGER")
               .drop_column("junk"),
         );
      assert_eq!(versioning.upgrade(&db).await.unwrap(), 2);

      assert_eq!(
         columns(&db, "p").await,
         vec![
            ("_id".into(), "INTEGER".into()),
            ("full_name".into(), "TEXT".into()),
            ("age".into(), "INTEGER".into()),
         ]
      );

      let mut writer = db.acquire_writer().await.unwrap();
      let name: String = sqlx::query_scalar("SELECT full_name FROM p WHERE _id = 1")
         .fetch_one(&mut *writer)
         .await
         .unwrap();
      assert_eq!(name, "Ada");
      let sql: String =
         sqlx::query_scalar("SELECT sql FROM sqlite_master WHERE type = 'table' AND name = 'p'")
            .fetch_one(&mut *writer)
            .await
            .unwrap();
      assert!(sql.contains("AUTOINCREMENT"));
   }

   #[tokio::test]
   async fn test_alter_unknown_column_fails() {
      let db = memory().await;
      let versioning = Versioning::new()
         .step(Statements::new(["CREATE TABLE q (a INTEGER)"]))
         .step(AlterTable::new("q").drop_column("b"));
      let err = versioning.upgrade(&db).await.unwrap_err();
      match err {
         Error::Migration { version, source } => {
            assert_eq!(version, 2);
            assert_eq!(source.error_code(), "INVALID_DECLARATION");
         }
         other => panic!("unexpected error: {other}"),
      }
   }
}
