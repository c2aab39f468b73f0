//! Instantiation of retrieved entities.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::entity::{Entity, EntityKind, WeakEntity};

/// Creates the instance a retrieved row is loaded into.
///
/// The returned entity may already be bound to `id`; it must not be bound to
/// another row.
pub trait Factory: Send + Sync {
   fn create(&self, kind: &Arc<EntityKind>, id: i64) -> Entity;
}

/// Creates a fresh instance for every retrieved row.
#[derive(Debug, Clone, Copy, Default)]
pub struct NewFactory;

impl Factory for NewFactory {
   fn create(&self, kind: &Arc<EntityKind>, _id: i64) -> Entity {
      Entity::new(kind)
   }
}

/// Returns the live instance for a row while any handle to it exists, so
/// repeated retrievals of one row yield the same instance.
#[derive(Default)]
pub struct CachingFactory {
   instances: Mutex<HashMap<(String, i64), WeakEntity>>,
}

impl CachingFactory {
   pub fn new() -> Self {
      Self::default()
   }
}

impl Factory for CachingFactory {
   fn create(&self, kind: &Arc<EntityKind>, id: i64) -> Entity {
      let key = (kind.root().name().to_string(), id);
      let mut instances = self.instances.lock();
      if let Some(entity) = instances.get(&key).and_then(WeakEntity::upgrade)
         && entity.kind().name() == kind.name()
      {
         return entity;
      }
      instances.retain(|_, weak| weak.upgrade().is_some());
      let entity = Entity::new(kind);
      instances.insert(key, entity.downgrade());
      entity
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_caching_factory_reuses_live_instances() {
      let kind = EntityKind::builder("test.Item").build().unwrap();
      let factory = CachingFactory::new();

      let first = factory.create(&kind, 1);
      assert!(factory.create(&kind, 1).is(&first));
      assert!(!factory.create(&kind, 2).is(&first));

      drop(first);
      let again = factory.create(&kind, 1);
      assert!(factory.create(&kind, 1).is(&again));
   }

   #[test]
   fn test_new_factory_always_creates() {
      let kind = EntityKind::builder("test.Item").build().unwrap();
      let a = NewFactory.create(&kind, 1);
      let b = NewFactory.create(&kind, 1);
      assert!(!a.is(&b));
   }
}
