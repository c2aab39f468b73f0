//! Entities: instances of a kind holding one slot per property plus an aspect chain.

mod kind;

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

pub use kind::{EntityKind, EntityKindBuilder, EnumType, Property, PropertyMeta, PropertyType};

use crate::aspect::{self, Aspect, Next, Row};
use crate::reference::Reference;
use crate::value::PropertyValue;
use crate::{Result, Value};

struct Inner {
   kind: Arc<EntityKind>,
   slots: Mutex<Vec<Value>>,
   aspects: Mutex<Vec<Arc<dyn Aspect>>>,
}

/// Shared handle to one entity instance.
///
/// Cloning yields another handle to the same instance. Equality is instance
/// identity, never structural.
#[derive(Clone)]
pub struct Entity {
   inner: Arc<Inner>,
}

impl Entity {
   /// Create a transient instance with every slot set to its declared default.
   pub fn new(kind: &Arc<EntityKind>) -> Self {
      let slots = kind
         .properties()
         .iter()
         .map(|p| p.default_value().clone())
         .collect();
      Self {
         inner: Arc::new(Inner {
            kind: Arc::clone(kind),
            slots: Mutex::new(slots),
            aspects: Mutex::new(Vec::new()),
         }),
      }
   }

   pub fn kind(&self) -> &Arc<EntityKind> {
      &self.inner.kind
   }

   /// Returns true if both handles refer to the same instance.
   pub fn is(&self, other: &Entity) -> bool {
      Arc::ptr_eq(&self.inner, &other.inner)
   }

   pub fn downgrade(&self) -> WeakEntity {
      WeakEntity {
         inner: Arc::downgrade(&self.inner),
      }
   }

   /// Row id, or [`TRANSIENT`](crate::TRANSIENT) if never persisted.
   pub fn id(&self) -> i64 {
      Row::get_id(self)
   }

   pub fn is_transient(&self) -> bool {
      Row::is_transient(self)
   }

   /// Persistent reference to this instance.
   pub fn reference(&self) -> Result<Reference> {
      Reference::of(self)
   }

   /// Read a property through the aspect chain.
   pub async fn get<T: PropertyValue>(&self, property: &Property<T>) -> Result<T> {
      let value = self.get_value(property.meta()).await?;
      T::from_value(value)
   }

   /// Write a property through the aspect chain.
   pub async fn set<T: PropertyValue>(&self, property: &Property<T>, value: T) -> Result<()> {
      self.set_value(property.meta(), value.into_value()).await
   }

   /// Untyped read through the aspect chain.
   pub async fn get_value(&self, property: &PropertyMeta) -> Result<Value> {
      let raw = self.raw(property)?;
      let chain = self.chain();
      Next::new(self, &chain).get(property, raw).await
   }

   /// Untyped write through the aspect chain; the chain's result lands in the slot.
   pub async fn set_value(&self, property: &PropertyMeta, value: Value) -> Result<()> {
      self.inner.kind.index_of(property)?;
      let chain = self.chain();
      let stored = Next::new(self, &chain).set(property, value).await?;
      self.set_raw(property, stored)
   }

   /// Slot content, bypassing aspects.
   pub fn raw(&self, property: &PropertyMeta) -> Result<Value> {
      let index = self.inner.kind.index_of(property)?;
      Ok(self.inner.slots.lock()[index].clone())
   }

   /// Overwrite a slot, bypassing aspects.
   pub fn set_raw(&self, property: &PropertyMeta, value: Value) -> Result<()> {
      let index = self.inner.kind.index_of(property)?;
      self.inner.slots.lock()[index] = value;
      Ok(())
   }

   /// Iterate the slots in declaration order. Each call starts a fresh pass.
   pub fn properties(&self) -> Properties {
      Properties {
         entity: self.clone(),
         position: 0,
      }
   }

   pub fn slot(&self, property: &Arc<PropertyMeta>) -> Result<Slot> {
      self.inner.kind.index_of(property)?;
      Ok(Slot {
         entity: self.clone(),
         meta: Arc::clone(property),
      })
   }

   /// Attach `aspect` at the head of the chain.
   pub fn add_aspect(&self, aspect: Arc<dyn Aspect>) {
      self.inner.aspects.lock().insert(0, aspect);
   }

   /// Detach `aspect`, comparing by instance. Returns false if it was not attached.
   pub fn remove_aspect(&self, aspect: &Arc<dyn Aspect>) -> bool {
      let mut aspects = self.inner.aspects.lock();
      match aspects.iter().position(|a| Arc::ptr_eq(a, aspect)) {
         Some(position) => {
            aspects.remove(position);
            true
         }
         None => false,
      }
   }

   /// Iterate the attached aspects, head first.
   pub fn aspects(&self) -> Aspects {
      Aspects {
         entity: self.clone(),
         snapshot: self.chain(),
         position: 0,
      }
   }

   /// First attached aspect of type `A` accepted by `filter`.
   pub fn find_aspect<A: Aspect>(&self, filter: impl Fn(&A) -> bool) -> Option<Arc<A>> {
      self
         .chain()
         .into_iter()
         .filter_map(aspect::downcast::<A>)
         .find(|a| filter(&**a))
   }

   fn chain(&self) -> Vec<Arc<dyn Aspect>> {
      self.inner.aspects.lock().clone()
   }
}

impl PartialEq for Entity {
   fn eq(&self, other: &Self) -> bool {
      self.is(other)
   }
}

impl Eq for Entity {}

impl fmt::Debug for Entity {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("Entity")
         .field("kind", &self.inner.kind.name())
         .field("id", &self.id())
         .finish()
   }
}

/// Non-owning handle to an entity.
#[derive(Clone)]
pub struct WeakEntity {
   inner: Weak<Inner>,
}

impl WeakEntity {
   pub fn upgrade(&self) -> Option<Entity> {
      self.inner.upgrade().map(|inner| Entity { inner })
   }
}

/// One property of one entity instance.
///
/// Two slots are equal when they stand for the same declared property,
/// whichever instance they were taken from.
#[derive(Clone)]
pub struct Slot {
   entity: Entity,
   meta: Arc<PropertyMeta>,
}

impl Slot {
   pub fn meta(&self) -> &Arc<PropertyMeta> {
      &self.meta
   }

   pub fn name(&self) -> &str {
      self.meta.name()
   }

   pub fn entity(&self) -> &Entity {
      &self.entity
   }

   /// Current slot content, bypassing aspects.
   pub fn value(&self) -> Result<Value> {
      self.entity.raw(&self.meta)
   }

   pub async fn get(&self) -> Result<Value> {
      self.entity.get_value(&self.meta).await
   }

   pub async fn set(&self, value: Value) -> Result<()> {
      self.entity.set_value(&self.meta, value).await
   }
}

impl PartialEq for Slot {
   fn eq(&self, other: &Self) -> bool {
      self.meta == other.meta
   }
}

impl fmt::Debug for Slot {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      write!(f, "Slot({})", self.meta.qualified())
   }
}

/// Iterator over the slots of an entity.
pub struct Properties {
   entity: Entity,
   position: usize,
}

impl Iterator for Properties {
   type Item = Slot;

   fn next(&mut self) -> Option<Slot> {
      let meta = self.entity.kind().properties().get(self.position)?;
      self.position += 1;
      Some(Slot {
         entity: self.entity.clone(),
         meta: Arc::clone(meta),
      })
   }
}

/// Iterator over the aspect chain of an entity.
///
/// Works on a snapshot taken at creation; [`remove()`](Self::remove) detaches the
/// most recently yielded aspect from the live chain.
pub struct Aspects {
   entity: Entity,
   snapshot: Vec<Arc<dyn Aspect>>,
   position: usize,
}

impl Aspects {
   /// Detach the aspect last returned by `next()`.
   pub fn remove(&mut self) -> bool {
      match self.position.checked_sub(1).and_then(|i| self.snapshot.get(i)) {
         Some(aspect) => self.entity.remove_aspect(aspect),
         None => false,
      }
   }
}

impl Iterator for Aspects {
   type Item = Arc<dyn Aspect>;

   fn next(&mut self) -> Option<Arc<dyn Aspect>> {
      let aspect = self.snapshot.get(self.position)?.clone();
      self.position += 1;
      Some(aspect)
   }
}

#[cfg(test)]
mod tests {
   use futures::future::BoxFuture;

   use super::*;
   use crate::aspect::Aspect;

   struct Suffix(&'static str);

   impl Aspect for Suffix {
      fn on_get<'a>(
         &'a self,
         next: Next<'a>,
         property: &'a PropertyMeta,
         value: Value,
      ) -> BoxFuture<'a, Result<Value>> {
         Box::pin(async move {
            let value = match value {
               Value::Text(text) => Value::Text(format!("{text}{}", self.0)),
               other => other,
            };
            next.get(property, value).await
         })
      }
   }

   struct Upper;

   impl Aspect for Upper {
      fn on_set<'a>(
         &'a self,
         next: Next<'a>,
         property: &'a PropertyMeta,
         value: Value,
      ) -> BoxFuture<'a, Result<Value>> {
         let value = match value {
            Value::Text(text) => Value::Text(text.to_uppercase()),
            other => other,
         };
         next.set(property, value)
      }
   }

   fn person() -> (Arc<EntityKind>, Property<String>, Property<i32>) {
      let mut kind = EntityKind::builder("test.Person");
      let name = kind.property::<String>("name");
      let age = kind.property::<i32>("age");
      (kind.build().unwrap(), name, age)
   }

   #[tokio::test]
   async fn test_new_entity_holds_defaults() {
      let (kind, name, age) = person();
      let entity = Entity::new(&kind);
      assert!(entity.is_transient());
      assert_eq!(entity.get(&name).await.unwrap(), "");
      assert_eq!(entity.get(&age).await.unwrap(), 0);
   }

   #[tokio::test]
   async fn test_properties_iterate_in_declaration_order() {
      let (kind, name, _) = person();
      let entity = Entity::new(&kind);
      let names: Vec<_> = entity.properties().map(|s| s.name().to_string()).collect();
      assert_eq!(names, ["name", "age"]);

      // restartable, and slots from different instances compare by property
      let other = Entity::new(&kind);
      assert_eq!(entity.properties().next(), other.properties().next());
      assert_eq!(entity.slot(name.meta()).unwrap(), other.slot(name.meta()).unwrap());
   }

   #[tokio::test]
   async fn test_aspects_run_head_first() {
      let (kind, name, _) = person();
      let entity = Entity::new(&kind);
      entity.set(&name, "x".to_string()).await.unwrap();

      entity.add_aspect(Arc::new(Suffix("1")));
      entity.add_aspect(Arc::new(Suffix("2")));
      // head is the last added, so it decorates first
      assert_eq!(entity.get(&name).await.unwrap(), "x21");

      let mut aspects = entity.aspects();
      aspects.next();
      assert!(aspects.remove());
      assert_eq!(entity.get(&name).await.unwrap(), "x1");
   }

   #[tokio::test]
   async fn test_set_through_chain_stores_result() {
      let (kind, name, _) = person();
      let entity = Entity::new(&kind);
      entity.add_aspect(Arc::new(Upper));
      entity.set(&name, "ada".to_string()).await.unwrap();
      assert_eq!(entity.raw(&name).unwrap(), Value::Text("ADA".into()));
   }

   #[tokio::test]
   async fn test_foreign_property_is_rejected() {
      let (kind, _, _) = person();
      let mut other = EntityKind::builder("test.Other");
      let foreign = other.property::<i32>("age");
      other.build().unwrap();

      let entity = Entity::new(&kind);
      let err = entity.get(&foreign).await.unwrap_err();
      assert_eq!(err.error_code(), "UNKNOWN_PROPERTY");
   }

   #[test]
   fn test_identity_equality() {
      let (kind, _, _) = person();
      let a = Entity::new(&kind);
      let b = Entity::new(&kind);
      assert_eq!(a, a.clone());
      assert_ne!(a, b);
      let weak = a.downgrade();
      assert!(weak.upgrade().unwrap().is(&a));
      drop(a);
      assert!(weak.upgrade().is_none());
   }
}
