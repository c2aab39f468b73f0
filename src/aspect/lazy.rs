use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tracing::{trace, warn};

use super::{Aspect, Next, TRANSIENT, downcast};
use crate::entity::{Entity, PropertyMeta, PropertyType};
use crate::reference::Reference;
use crate::transaction::Source;
use crate::{Error, Result, Value};

/// Produces the value of a lazily loaded property.
pub trait Loader: Send + Sync + 'static {
   /// Property this loader fills.
   fn property(&self) -> &PropertyMeta;

   fn load(&self) -> BoxFuture<'_, Result<Value>>;
}

/// Defers a property's value until its first read.
///
/// The first read of an empty slot calls the loader once and caches the result in
/// the slot. An explicit write marks the property loaded without calling it.
pub struct Lazy<L> {
   loader: L,
   loaded: AtomicBool,
}

impl<L: Loader> Lazy<L> {
   pub fn new(loader: L) -> Self {
      Self {
         loader,
         loaded: AtomicBool::new(false),
      }
   }

   pub fn loader(&self) -> &L {
      &self.loader
   }

   pub fn is_loaded(&self) -> bool {
      self.loaded.load(Ordering::Acquire)
   }

   pub(crate) fn mark_loaded(&self, loaded: bool) {
      self.loaded.store(loaded, Ordering::Release);
   }
}

impl<L: Loader> Aspect for Lazy<L> {
   fn on_get<'a>(
      &'a self,
      next: Next<'a>,
      property: &'a PropertyMeta,
      value: Value,
   ) -> BoxFuture<'a, Result<Value>> {
      if *property != *self.loader.property() || self.is_loaded() || !value.is_null() {
         return next.get(property, value);
      }
      Box::pin(async move {
         let loaded = self.loader.load().await?;
         next.entity().set_raw(property, loaded.clone())?;
         self.mark_loaded(true);
         next.get(property, loaded).await
      })
   }

   fn on_set<'a>(
      &'a self,
      next: Next<'a>,
      property: &'a PropertyMeta,
      value: Value,
   ) -> BoxFuture<'a, Result<Value>> {
      if *property == *self.loader.property() {
         self.mark_loaded(true);
      }
      next.set(property, value)
   }
}

/// Loader for a to-many relation stored as a list of member ids.
pub struct ToMany {
   property: Arc<PropertyMeta>,
   ids: Mutex<Vec<i64>>,
   source: Option<Source>,
}

/// Lazy to-many relation, the aspect attached to retrieved collection properties.
pub type ToManyRelation = Lazy<ToMany>;

impl ToMany {
   pub fn new(property: Arc<PropertyMeta>, ids: Vec<i64>, source: Option<Source>) -> Self {
      Self {
         property,
         ids: Mutex::new(ids),
         source,
      }
   }

   /// Member ids as last stored.
   pub fn ids(&self) -> Vec<i64> {
      self.ids.lock().clone()
   }

   pub(crate) fn set_ids(&self, ids: Vec<i64>) {
      *self.ids.lock() = ids;
   }
}

impl Loader for ToMany {
   fn property(&self) -> &PropertyMeta {
      &self.property
   }

   fn load(&self) -> BoxFuture<'_, Result<Value>> {
      Box::pin(async move {
         let source = self
            .source
            .clone()
            .ok_or_else(|| Error::Detached(self.property.qualified()))?;
         let (target, distinct) = match self.property.property_type() {
            PropertyType::EntityList(target) => (target, false),
            PropertyType::EntitySet(target) => (target, true),
            other => return Err(Error::conversion("collection", other)),
         };
         let kind = source.repository().catalog().kind(target)?;

         let mut ids = self.ids();
         if distinct {
            let mut seen = std::collections::HashSet::new();
            ids.retain(|id| seen.insert(*id));
         }
         trace!(relation = %self.property.qualified(), count = ids.len(), "loading members");

         let mut members = Vec::with_capacity(ids.len());
         for id in ids {
            if id == TRANSIENT {
               // keeps positions; the placeholder has no row
               warn!(relation = %self.property.qualified(), "transient member id, using a placeholder");
               members.push(Entity::new(&kind));
               continue;
            }
            let reference = Reference::new(Arc::clone(&kind), id)?;
            members.push(source.lookup(&reference).await?);
         }
         Ok(Value::Entities(members))
      })
   }
}

impl Lazy<ToMany> {
   /// To-many aspect attached to `entity` for `property`, if any.
   pub fn of(entity: &Entity, property: &PropertyMeta) -> Option<Arc<ToManyRelation>> {
      entity
         .aspects()
         .filter_map(downcast::<ToManyRelation>)
         .find(|r| *r.loader.property == *property)
   }

   /// Member ids as last stored.
   pub fn ids(&self) -> Vec<i64> {
      self.loader.ids()
   }

   /// Attach or refresh the aspect tracking `ids`.
   ///
   /// `loaded` states whether the slot already holds the members.
   pub(crate) fn track(
      entity: &Entity,
      property: &Arc<PropertyMeta>,
      ids: Vec<i64>,
      source: &Source,
      loaded: bool,
   ) {
      if let Some(existing) = ToManyRelation::of(entity, property) {
         let handle: Arc<dyn Aspect> = existing;
         entity.remove_aspect(&handle);
      }
      let relation = Lazy::new(ToMany::new(
         Arc::clone(property),
         ids,
         Some(source.clone()),
      ));
      relation.mark_loaded(loaded);
      entity.add_aspect(Arc::new(relation));
   }
}
