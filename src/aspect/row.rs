use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use super::{Aspect, downcast};
use crate::{Entity, Error, Result};

/// Id of an entity that has never been persisted.
pub const TRANSIENT: i64 = 0;

/// Binds an entity instance to its database row id.
#[derive(Debug)]
pub struct Row {
   id: AtomicI64,
}

impl Aspect for Row {}

impl Row {
   pub fn id(&self) -> i64 {
      self.id.load(Ordering::Acquire)
   }

   /// The row aspect attached to `entity`, if any.
   pub fn of(entity: &Entity) -> Option<Arc<Row>> {
      entity
         .aspects()
         .find_map(downcast::<Row>)
   }

   /// Row id of `entity`, or [`TRANSIENT`] if it was never persisted.
   pub fn get_id(entity: &Entity) -> i64 {
      Row::of(entity).map_or(TRANSIENT, |row| row.id())
   }

   pub fn is_transient(entity: &Entity) -> bool {
      Row::get_id(entity) == TRANSIENT
   }

   /// Bind `entity` to row `id`.
   ///
   /// Assigning the id the entity already has is a no-op; assigning a different one
   /// fails with [`Error::IdentityConflict`].
   pub fn set_id(entity: &Entity, id: i64) -> Result<()> {
      if id == TRANSIENT {
         return Err(Error::Transient(entity.kind().name().to_string()));
      }
      match Row::of(entity) {
         Some(row) if row.id() == id => Ok(()),
         Some(row) if row.id() != TRANSIENT => Err(Error::IdentityConflict {
            existing: row.id(),
            requested: id,
         }),
         Some(row) => {
            row.id.store(id, Ordering::Release);
            Ok(())
         }
         None => {
            entity.add_aspect(Arc::new(Row {
               id: AtomicI64::new(id),
            }));
            Ok(())
         }
      }
   }

   /// Detach `entity` from its row, making it transient again.
   pub fn reset(entity: &Entity) {
      let mut aspects = entity.aspects();
      while let Some(aspect) = aspects.next() {
         if downcast::<Row>(aspect).is_some() {
            aspects.remove();
         }
      }
   }
}
