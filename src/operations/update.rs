use futures::future::BoxFuture;
use tracing::debug;

use super::{Session, insert, quote, track_relations};
use crate::cascading;
use crate::entity::Entity;
use crate::{Error, Result, SqlValue};

/// Write every mapped column of a persisted entity.
pub(crate) fn update<'a>(session: &'a mut Session, entity: &'a Entity) -> BoxFuture<'a, Result<()>> {
   Box::pin(async move {
      if entity.is_transient() {
         return Err(Error::Transient(entity.kind().name().to_string()));
      }
      let kind = entity.kind().clone();
      if kind.properties().is_empty() {
         return Ok(());
      }
      let repository = session.repository().clone();
      session.prepare(&kind).await?;

      session.enter(entity);
      let result = async {
         for property in kind.properties() {
            if repository.settings().cascading().is_cascaded(property) {
               cascading::on_update(session, entity, property).await?;
            }
         }

         let naming = repository.settings().naming();
         let mapping = repository.settings().mapping();
         let mut assignments = Vec::with_capacity(kind.properties().len());
         let mut values = Vec::with_capacity(kind.properties().len() + 1);
         for property in kind.properties() {
            assignments.push(format!("{} = ?", quote(&naming.column(property))));
            values.push(mapping.mapper(property)?.bind(entity, property)?);
         }
         values.push(SqlValue::Integer(entity.id()));

         let sql = format!(
            "UPDATE {} SET {} WHERE [_id] = ?",
            quote(&naming.table(&kind)),
            assignments.join(", ")
         );
         if session.execute(&sql, values).await?.rows_affected() == 0 {
            return Err(Error::NotFound(entity.reference()?));
         }
         track_relations(&session.source(), entity)?;
         debug!(kind = kind.name(), id = entity.id(), "updated");
         Ok(())
      }
      .await;
      session.leave(entity);
      result
   })
}

/// Insert a transient entity, update a persisted one.
pub(crate) fn merge<'a>(session: &'a mut Session, entity: &'a Entity) -> BoxFuture<'a, Result<()>> {
   if entity.is_transient() {
      insert(session, entity)
   } else {
      update(session, entity)
   }
}
