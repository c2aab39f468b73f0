//! Registry of the entity kinds a repository knows about.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::entity::EntityKind;
use crate::{Error, Result};

/// Entity kinds by qualified name, in registration order.
///
/// Relation targets, discriminators and references are resolved against the catalog,
/// so every kind that is stored, related to, or used as a subtype must be registered.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
   kinds: IndexMap<String, Arc<EntityKind>>,
}

impl Catalog {
   pub fn new() -> Self {
      Self::default()
   }

   /// Register `kind`, replacing any kind of the same name.
   pub fn with(mut self, kind: &Arc<EntityKind>) -> Self {
      self.register(kind);
      self
   }

   pub fn register(&mut self, kind: &Arc<EntityKind>) {
      self
         .kinds
         .insert(kind.name().to_string(), Arc::clone(kind));
   }

   pub fn kind(&self, name: &str) -> Result<Arc<EntityKind>> {
      self
         .kinds
         .get(name)
         .cloned()
         .ok_or_else(|| Error::UnknownKind(name.to_string()))
   }

   pub fn kinds(&self) -> impl Iterator<Item = &Arc<EntityKind>> {
      self.kinds.values()
   }

   /// `kind` and every registered descendant of it.
   pub fn descendants(&self, kind: &Arc<EntityKind>) -> Vec<Arc<EntityKind>> {
      let mut found = vec![Arc::clone(kind)];
      found.extend(
         self
            .kinds
            .values()
            .filter(|k| k.name() != kind.name() && k.is_a(kind))
            .cloned(),
      );
      found
   }

   /// Every registered kind stored in the same table as `kind`.
   pub fn family(&self, kind: &EntityKind) -> impl Iterator<Item = &Arc<EntityKind>> {
      let root = kind.root().name().to_string();
      self
         .kinds
         .values()
         .filter(move |k| k.root().name() == root)
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_descendants_and_family() {
      let animal = EntityKind::builder("zoo.Animal").build().unwrap();
      let dog = EntityKind::extends("zoo.Dog", &animal).build().unwrap();
      let puppy = EntityKind::extends("zoo.Puppy", &dog).build().unwrap();
      let keeper = EntityKind::builder("zoo.Keeper").build().unwrap();

      let catalog = Catalog::new()
         .with(&animal)
         .with(&dog)
         .with(&puppy)
         .with(&keeper);

      let names: Vec<_> = catalog
         .descendants(&dog)
         .iter()
         .map(|k| k.name().to_string())
         .collect();
      assert_eq!(names, ["zoo.Dog", "zoo.Puppy"]);
      assert_eq!(catalog.family(&puppy).count(), 3);
      assert_eq!(
         catalog.kind("zoo.Cat").unwrap_err().error_code(),
         "UNKNOWN_KIND"
      );
   }
}
