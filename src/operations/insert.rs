use futures::future::BoxFuture;
use tracing::debug;

use super::{Session, quote, track_relations};
use crate::aspect::Row;
use crate::cascading;
use crate::entity::Entity;
use crate::{Error, Result, SqlValue};

/// Insert a transient entity and bind it to the generated row id.
///
/// Cascaded relations are saved first so the owner's row can refer to their ids.
pub(crate) fn insert<'a>(session: &'a mut Session, entity: &'a Entity) -> BoxFuture<'a, Result<()>> {
   Box::pin(async move {
      if !entity.is_transient() {
         return Err(Error::AlreadyPersisted(entity.reference()?));
      }
      let repository = session.repository().clone();
      let kind = entity.kind().clone();
      session.prepare(&kind).await?;

      session.enter(entity);
      let result = async {
         for property in kind.properties() {
            if repository.settings().cascading().is_cascaded(property) {
               cascading::on_insert(session, entity, property).await?;
            }
         }

         let naming = repository.settings().naming();
         let mapping = repository.settings().mapping();
         let mut columns = vec![quote("_type")];
         let mut values = vec![
            naming
               .discriminator(&kind, repository.catalog())
               .map_or(SqlValue::Null, SqlValue::Text),
         ];
         for property in kind.properties() {
            columns.push(quote(&naming.column(property)));
            values.push(mapping.mapper(property)?.bind(entity, property)?);
         }

         let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote(&naming.table(&kind)),
            columns.join(", "),
            vec!["?"; columns.len()].join(", ")
         );
         let id = session.execute(&sql, values).await?.last_insert_rowid();
         Row::set_id(entity, id)?;
         track_relations(&session.source(), entity)?;
         debug!(kind = kind.name(), id, "inserted");
         Ok(())
      }
      .await;
      session.leave(entity);
      result
   })
}
