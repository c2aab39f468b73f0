use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use futures::future::BoxFuture;
use parking_lot::RwLock;
use tracing::trace;

use super::{Aspect, Next, downcast};
use crate::entity::{Entity, PropertyMeta};
use crate::reference::Reference;
use crate::transaction::Source;
use crate::{Error, Result, Value};

/// Tracked id of a to-one relation whose target has not been loaded.
pub const VOID: i64 = -1;

/// Lazily resolves a to-one relation from the id stored in the owner's row.
///
/// While the slot is empty and the tracked id is not [`VOID`], the first read looks
/// the target up through its [`Source`] and caches it in the slot. A write records
/// the new target's id.
pub struct Relation {
   property: Arc<PropertyMeta>,
   id: AtomicI64,
   source: RwLock<Option<Source>>,
}

impl Relation {
   pub fn new(property: Arc<PropertyMeta>, id: i64, source: Option<Source>) -> Self {
      Self {
         property,
         id: AtomicI64::new(id),
         source: RwLock::new(source),
      }
   }

   pub fn property(&self) -> &Arc<PropertyMeta> {
      &self.property
   }

   /// Id of the related row, [`VOID`] if none.
   pub fn id(&self) -> i64 {
      self.id.load(Ordering::Acquire)
   }

   pub fn set_id(&self, id: i64) {
      self.id.store(id, Ordering::Release);
   }

   pub fn is_void(&self) -> bool {
      self.id() == VOID
   }

   /// Relation aspect attached to `entity` for `property`, if any.
   pub fn of(entity: &Entity, property: &PropertyMeta) -> Option<Arc<Relation>> {
      entity
         .aspects()
         .filter_map(downcast::<Relation>)
         .find(|r| *r.property == *property)
   }

   /// Attach or refresh the relation aspect tracking `id`.
   pub(crate) fn track(
      entity: &Entity,
      property: &Arc<PropertyMeta>,
      id: i64,
      source: &Source,
   ) {
      match Relation::of(entity, property) {
         Some(relation) => {
            relation.set_id(id);
            *relation.source.write() = Some(source.clone());
         }
         None => entity.add_aspect(Arc::new(Relation::new(
            Arc::clone(property),
            id,
            Some(source.clone()),
         ))),
      }
   }

   async fn load(&self) -> Result<Value> {
      let source = self
         .source
         .read()
         .clone()
         .ok_or_else(|| Error::Detached(self.property.qualified()))?;
      let target = self
         .property
         .property_type()
         .target()
         .ok_or_else(|| Error::conversion("relation", self.property.property_type()))?;
      let kind = source.repository().catalog().kind(target)?;
      let reference = Reference::new(kind, self.id())?;
      trace!(relation = %self.property.qualified(), %reference, "resolving relation");
      Ok(Value::Entity(source.lookup(&reference).await?))
   }
}

impl Aspect for Relation {
   fn on_get<'a>(
      &'a self,
      next: Next<'a>,
      property: &'a PropertyMeta,
      value: Value,
   ) -> BoxFuture<'a, Result<Value>> {
      if *property != *self.property || !value.is_null() || self.id() <= 0 {
         return next.get(property, value);
      }
      Box::pin(async move {
         let loaded = self.load().await?;
         next.entity().set_raw(property, loaded.clone())?;
         next.get(property, loaded).await
      })
   }

   fn on_set<'a>(
      &'a self,
      next: Next<'a>,
      property: &'a PropertyMeta,
      value: Value,
   ) -> BoxFuture<'a, Result<Value>> {
      if *property != *self.property {
         return next.set(property, value);
      }
      Box::pin(async move {
         let stored = next.set(property, value).await?;
         self.set_id(match &stored {
            Value::Entity(target) if !target.is_transient() => target.id(),
            _ => VOID,
         });
         Ok(stored)
      })
   }
}
