//! Table synchronisation against entity declarations.

use sqlx::Row as _;
use tracing::{debug, info};

use crate::entity::EntityKind;
use crate::mapping::ColumnType;
use crate::operations::{Session, quote};
use crate::{Error, Result, SqlValue};

struct Column {
   name: String,
   ty: ColumnType,
   default: SqlValue,
}

/// Declared columns of `table` as `(name, type)`; empty if the table does not exist.
pub(crate) async fn table_info(session: &mut Session, table: &str) -> Result<Vec<(String, String)>> {
   let rows = session
      .fetch_all(&format!("PRAGMA table_info({})", quote(table)), Vec::new())
      .await?;
   rows
      .iter()
      .map(|row| -> Result<(String, String)> {
         Ok((row.try_get("name")?, row.try_get("type")?))
      })
      .collect()
}

/// Create the table of `kind`, or add the columns it lacks.
///
/// Runs once per kind and repository; a kind prepared inside a transaction counts
/// as prepared once it commits. Existing columns must already have the
/// storage type the property's mapper writes.
pub(crate) async fn ensure(session: &mut Session, kind: &EntityKind) -> Result<()> {
   if session.is_prepared(kind.name()) {
      return Ok(());
   }
   let repository = session.repository().clone();

   let naming = repository.settings().naming();
   let mapping = repository.settings().mapping();
   let table = naming.table(kind);

   let mut columns = Vec::with_capacity(kind.properties().len());
   for property in kind.properties() {
      let mapper = mapping.mapper(property)?;
      columns.push(Column {
         name: naming.column(property),
         ty: mapper.column_type(),
         default: mapper.encode(property, property.default_value())?,
      });
   }

   let existing = table_info(session, &table).await?;
   if existing.is_empty() {
      let mut definitions = vec![
         "[_id] INTEGER PRIMARY KEY AUTOINCREMENT".to_string(),
         "[_type] TEXT".to_string(),
      ];
      definitions.extend(
         columns
            .iter()
            .map(|c| format!("{} {}", quote(&c.name), c.ty)),
      );
      let sql = format!(
         "CREATE TABLE {} ({})",
         quote(&table),
         definitions.join(", ")
      );
      session.execute(&sql, Vec::new()).await?;
      info!(%table, kind = kind.name(), "created table");
   } else {
      for column in columns {
         match existing
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(&column.name))
         {
            Some((_, declared)) if column.ty.matches(declared) => {}
            Some((_, declared)) => {
               return Err(Error::ColumnTypeMismatch {
                  table,
                  column: column.name,
                  expected: column.ty.to_string(),
                  found: declared.clone(),
               });
            }
            None => {
               let sql = format!(
                  "ALTER TABLE {} ADD COLUMN {} {}",
                  quote(&table),
                  quote(&column.name),
                  column.ty
               );
               session.execute(&sql, Vec::new()).await?;
               if !column.default.is_null() {
                  let sql = format!(
                     "UPDATE {} SET {} = ?",
                     quote(&table),
                     quote(&column.name)
                  );
                  session.execute(&sql, vec![column.default]).await?;
               }
               debug!(%table, column = %column.name, "added column");
            }
         }
      }
   }

   session.mark_prepared(kind.name());
   Ok(())
}
