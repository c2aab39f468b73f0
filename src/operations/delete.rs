use futures::future::BoxFuture;
use tracing::debug;

use super::{Session, quote};
use crate::aspect::Row;
use crate::cascading;
use crate::entity::Entity;
use crate::{Error, Result, SqlValue};

/// Delete the row of a persisted entity, cascading first, and make it transient again.
pub(crate) fn delete<'a>(session: &'a mut Session, entity: &'a Entity) -> BoxFuture<'a, Result<()>> {
   Box::pin(async move {
      if entity.is_transient() {
         return Err(Error::Transient(entity.kind().name().to_string()));
      }
      let repository = session.repository().clone();
      let kind = entity.kind().clone();
      session.prepare(&kind).await?;

      session.enter(entity);
      let cascaded = async {
         for property in kind.properties() {
            if repository.settings().cascading().is_cascaded(property) {
               cascading::on_delete(session, entity, property).await?;
            }
         }
         Ok::<_, Error>(())
      }
      .await;
      session.leave(entity);
      cascaded?;

      let sql = format!(
         "DELETE FROM {} WHERE [_id] = ?",
         quote(&repository.settings().naming().table(&kind))
      );
      let id = entity.id();
      if session
         .execute(&sql, vec![SqlValue::Integer(id)])
         .await?
         .rows_affected()
         == 0
      {
         return Err(Error::NotFound(entity.reference()?));
      }
      Row::reset(entity);
      debug!(kind = kind.name(), id, "deleted");
      Ok(())
   })
}
