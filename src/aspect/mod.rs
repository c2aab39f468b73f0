//! Aspects: interceptors attached to entity instances.
//!
//! Each entity carries an ordered chain of aspects. Reads and writes of a property
//! run through the chain head first; every link receives a [`Next`] handle that
//! continues with the rest of the chain. The end of the chain returns the value
//! unchanged: for reads, the slot content; for writes, the value to store.

mod lazy;
mod relation;
mod row;

use std::any::Any;
use std::sync::Arc;

use futures::future::BoxFuture;

pub use lazy::{Lazy, Loader, ToMany, ToManyRelation};
pub use relation::{Relation, VOID};
pub use row::{Row, TRANSIENT};

use crate::entity::{Entity, PropertyMeta};
use crate::{Result, Value};

/// Type-erasure helper so aspects can be found again by concrete type.
pub trait AsAny: Any + Send + Sync {
   fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
   fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
      self
   }
}

/// Interceptor on the property access of one entity.
///
/// Both hooks default to passing the value on unchanged. Returned futures must be
/// `Send` so entities can be used across tasks.
pub trait Aspect: AsAny {
   /// Intercept a read. `value` is what the previous link produced.
   fn on_get<'a>(
      &'a self,
      next: Next<'a>,
      property: &'a PropertyMeta,
      value: Value,
   ) -> BoxFuture<'a, Result<Value>> {
      next.get(property, value)
   }

   /// Intercept a write. The value returned by the chain is stored in the slot.
   fn on_set<'a>(
      &'a self,
      next: Next<'a>,
      property: &'a PropertyMeta,
      value: Value,
   ) -> BoxFuture<'a, Result<Value>> {
      next.set(property, value)
   }
}

/// Rest of an aspect chain.
#[derive(Clone, Copy)]
pub struct Next<'a> {
   entity: &'a Entity,
   rest: &'a [Arc<dyn Aspect>],
}

impl<'a> Next<'a> {
   pub(crate) fn new(entity: &'a Entity, chain: &'a [Arc<dyn Aspect>]) -> Self {
      Self {
         entity,
         rest: chain,
      }
   }

   /// Entity whose property is being accessed.
   pub fn entity(&self) -> &'a Entity {
      self.entity
   }

   pub fn get(self, property: &'a PropertyMeta, value: Value) -> BoxFuture<'a, Result<Value>> {
      match self.rest.split_first() {
         Some((head, rest)) => head.on_get(
            Next {
               entity: self.entity,
               rest,
            },
            property,
            value,
         ),
         None => Box::pin(futures::future::ready(Ok(value))),
      }
   }

   pub fn set(self, property: &'a PropertyMeta, value: Value) -> BoxFuture<'a, Result<Value>> {
      match self.rest.split_first() {
         Some((head, rest)) => head.on_set(
            Next {
               entity: self.entity,
               rest,
            },
            property,
            value,
         ),
         None => Box::pin(futures::future::ready(Ok(value))),
      }
   }
}

/// Recover the concrete type of an attached aspect.
pub fn downcast<A: Aspect>(aspect: Arc<dyn Aspect>) -> Option<Arc<A>> {
   <dyn Aspect as AsAny>::into_any(aspect).downcast::<A>().ok()
}

#[cfg(test)]
mod tests {
   use super::*;

   struct Marker(u8);
   impl Aspect for Marker {}

   struct Other;
   impl Aspect for Other {}

   #[test]
   fn test_downcast_by_concrete_type() {
      let aspect: Arc<dyn Aspect> = Arc::new(Marker(7));
      assert_eq!(downcast::<Marker>(aspect.clone()).unwrap().0, 7);
      assert!(downcast::<Other>(aspect).is_none());
   }
}
