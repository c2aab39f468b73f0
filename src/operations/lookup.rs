use std::sync::Arc;

use sqlx::sqlite::SqliteRow;

use super::{Session, discriminator_filter, materialize, quote, retrieve};
use crate::entity::{Entity, EntityKind};
use crate::reference::Reference;
use crate::{Error, Result, SqlValue};

async fn select_row(session: &mut Session, kind: &Arc<EntityKind>, id: i64) -> Result<Option<SqliteRow>> {
   let repository = session.repository().clone();
   session.prepare_family(kind).await?;

   let mut args = vec![SqlValue::Integer(id)];
   let mut sql = format!(
      "SELECT a.* FROM {} a WHERE a.[_id] = ?",
      quote(&repository.settings().naming().table(kind))
   );
   if let Some(filter) = discriminator_filter(&repository, kind, "a", &mut args) {
      sql.push_str(" AND ");
      sql.push_str(&filter);
   }
   Ok(session.fetch_all(&sql, args).await?.into_iter().next())
}

/// Load the entity `reference` identifies.
///
/// The row may belong to a subtype of the reference's kind; the factory creates an
/// instance of the stored kind.
pub(crate) async fn lookup(session: &mut Session, reference: &Reference) -> Result<Entity> {
   let row = select_row(session, reference.kind(), reference.id())
      .await?
      .ok_or_else(|| Error::NotFound(reference.clone()))?;
   materialize(&session.source(), reference.kind(), &row)
}

/// Re-read the row of a persisted entity into its slots.
pub(crate) async fn refresh(session: &mut Session, entity: &Entity) -> Result<()> {
   let reference = Reference::of(entity)?;
   let row = select_row(session, reference.kind(), reference.id())
      .await?
      .ok_or_else(|| Error::NotFound(reference.clone()))?;
   retrieve(&session.source(), entity, &row)
}
