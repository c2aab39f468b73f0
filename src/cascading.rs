//! Propagation of writes to owned related entities.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::aspect::{Relation, ToManyRelation};
use crate::decode::first_column;
use crate::entity::{Entity, Property, PropertyMeta};
use crate::mapping::parse_ids;
use crate::operations::{Session, delete, lookup, merge, quote};
use crate::reference::Reference;
use crate::{Result, SqlValue, Value};

/// The relation and collection properties whose targets an owner manages.
///
/// Saving an owner saves its cascaded targets. Updating it deletes targets it no longer
/// refers to, and deleting it deletes all of them.
#[derive(Debug, Clone, Default)]
pub struct Cascading {
   properties: HashSet<Arc<PropertyMeta>>,
}

impl Cascading {
   pub fn new() -> Self {
      Self::default()
   }

   pub fn cascade<T>(mut self, property: &Property<T>) -> Self {
      self.properties.insert(Arc::clone(property.meta()));
      self
   }

   pub fn is_cascaded(&self, property: &PropertyMeta) -> bool {
      self.properties.contains(property)
   }
}

async fn save(session: &mut Session, target: &Entity) -> Result<()> {
   if session.is_visiting(target) {
      return Ok(());
   }
   merge(session, target).await
}

/// Delete `target`, tolerating rows that are already gone.
async fn remove(session: &mut Session, target: &Entity) -> Result<()> {
   if target.is_transient() || session.is_visiting(target) {
      return Ok(());
   }
   match delete(session, target).await {
      Err(e) if e.is_not_found() => {
         warn!(error = %e, "cascaded entity already deleted");
         Ok(())
      }
      other => other,
   }
}

/// Delete the row `id` of the kind `property` refers to, tolerating rows that are
/// already gone.
async fn remove_stale(session: &mut Session, property: &PropertyMeta, id: i64) -> Result<()> {
   let Some(target) = property.property_type().target() else {
      return Ok(());
   };
   let kind = session.repository().catalog().kind(target)?;
   let reference = Reference::new(kind, id)?;
   match lookup(session, &reference).await {
      Ok(stale) => {
         debug!(%reference, relation = %property.qualified(), "deleting orphan");
         remove(session, &stale).await
      }
      Err(e) if e.is_not_found() => {
         warn!(%reference, relation = %property.qualified(), "orphan already deleted");
         Ok(())
      }
      Err(e) => Err(e),
   }
}

/// Ids the owner's row refers to through `property`, as last written.
async fn stored_ids(session: &mut Session, owner: &Entity, property: &PropertyMeta) -> Result<Vec<i64>> {
   let naming = session.repository().settings().naming();
   let sql = format!(
      "SELECT {} FROM {} WHERE [_id] = ?",
      quote(&naming.column(property)),
      quote(&naming.table(owner.kind()))
   );
   let rows = session
      .fetch_all(&sql, vec![SqlValue::Integer(owner.id())])
      .await?;
   let Some(row) = rows.first() else {
      return Ok(Vec::new());
   };
   Ok(match first_column(row)? {
      SqlValue::Integer(id) => vec![id],
      SqlValue::Text(text) => parse_ids(&text)?,
      _ => Vec::new(),
   })
}

/// Ids `owner` currently refers to through `property`.
///
/// A relation that was never loaded still refers to the ids it tracks.
fn current_ids(owner: &Entity, property: &PropertyMeta) -> Result<Vec<i64>> {
   Ok(match owner.raw(property)? {
      Value::Entity(target) => vec![target.id()],
      Value::Entities(members) => members.iter().map(Entity::id).collect(),
      _ if property.property_type().is_relation() => Relation::of(owner, property)
         .map(|r| r.id())
         .filter(|id| *id > 0)
         .into_iter()
         .collect(),
      _ => ToManyRelation::of(owner, property)
         .filter(|r| !r.is_loaded())
         .map(|r| r.ids())
         .unwrap_or_default(),
   })
}

async fn save_targets(session: &mut Session, owner: &Entity, property: &PropertyMeta) -> Result<()> {
   match owner.raw(property)? {
      Value::Entity(target) => save(session, &target).await,
      Value::Entities(members) => {
         for member in &members {
            save(session, member).await?;
         }
         Ok(())
      }
      _ => Ok(()),
   }
}

pub(crate) async fn on_insert(session: &mut Session, owner: &Entity, property: &PropertyMeta) -> Result<()> {
   save_targets(session, owner, property).await
}

pub(crate) async fn on_update(session: &mut Session, owner: &Entity, property: &PropertyMeta) -> Result<()> {
   let previous = stored_ids(session, owner, property).await?;
   save_targets(session, owner, property).await?;

   let current: HashSet<i64> = current_ids(owner, property)?.into_iter().collect();
   let mut seen = HashSet::new();
   for id in previous {
      if id > 0 && !current.contains(&id) && seen.insert(id) {
         remove_stale(session, property, id).await?;
      }
   }
   Ok(())
}

pub(crate) async fn on_delete(session: &mut Session, owner: &Entity, property: &PropertyMeta) -> Result<()> {
   match owner.raw(property)? {
      Value::Entity(target) => remove(session, &target).await,
      Value::Entities(members) => {
         for member in &members {
            remove(session, member).await?;
         }
         Ok(())
      }
      _ => {
         for id in current_ids(owner, property)? {
            remove_stale(session, property, id).await?;
         }
         Ok(())
      }
   }
}
