//! Persistent references to stored entities.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::aspect::TRANSIENT;
use crate::catalog::Catalog;
use crate::entity::{Entity, EntityKind};
use crate::{Error, Result};

/// Kind plus row id, identifying one stored entity.
///
/// The string form is `entity://<qualified kind name>/<id>`.
#[derive(Clone)]
pub struct Reference {
   kind: Arc<EntityKind>,
   id: i64,
}

impl Reference {
   pub const SCHEME: &'static str = "entity";

   pub fn new(kind: Arc<EntityKind>, id: i64) -> Result<Self> {
      if id == TRANSIENT || id < 0 {
         return Err(Error::InvalidReference(format!(
            "{} has no row id {id}",
            kind.name()
         )));
      }
      Ok(Self { kind, id })
   }

   /// Reference to a persisted entity, failing for transient ones.
   pub fn of(entity: &Entity) -> Result<Self> {
      let id = entity.id();
      if id == TRANSIENT {
         return Err(Error::Transient(entity.kind().name().to_string()));
      }
      Self::new(Arc::clone(entity.kind()), id)
   }

   pub fn kind(&self) -> &Arc<EntityKind> {
      &self.kind
   }

   pub fn id(&self) -> i64 {
      self.id
   }

   /// Parse the string form, resolving the kind through `catalog`.
   pub fn parse(text: &str, catalog: &Catalog) -> Result<Self> {
      let invalid = || Error::InvalidReference(text.to_string());
      let rest = text
         .strip_prefix(Self::SCHEME)
         .and_then(|r| r.strip_prefix("://"))
         .ok_or_else(invalid)?;
      let (kind, id) = rest.rsplit_once('/').ok_or_else(invalid)?;
      let id = id.parse::<i64>().map_err(|_| invalid())?;
      Self::new(catalog.kind(kind)?, id)
   }
}

impl PartialEq for Reference {
   fn eq(&self, other: &Self) -> bool {
      self.id == other.id && self.kind.name() == other.kind.name()
   }
}

impl Eq for Reference {}

impl Hash for Reference {
   fn hash<H: Hasher>(&self, state: &mut H) {
      self.kind.name().hash(state);
      self.id.hash(state);
   }
}

impl fmt::Display for Reference {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      write!(f, "{}://{}/{}", Self::SCHEME, self.kind.name(), self.id)
   }
}

impl fmt::Debug for Reference {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      write!(f, "Reference({self})")
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_string_form() {
      let kind = EntityKind::builder("app.Person").build().unwrap();
      let catalog = Catalog::new().with(&kind);
      let reference = Reference::new(kind, 12).unwrap();
      assert_eq!(reference.to_string(), "entity://app.Person/12");
      assert_eq!(
         Reference::parse("entity://app.Person/12", &catalog).unwrap(),
         reference
      );
   }

   #[test]
   fn test_invalid_references() {
      let kind = EntityKind::builder("app.Person").build().unwrap();
      let catalog = Catalog::new().with(&kind);
      assert!(Reference::new(kind.clone(), TRANSIENT).is_err());
      assert!(Reference::parse("http://app.Person/1", &catalog).is_err());
      assert!(Reference::parse("entity://app.Person/x", &catalog).is_err());
      assert_eq!(
         Reference::parse("entity://app.Other/1", &catalog)
            .unwrap_err()
            .error_code(),
         "UNKNOWN_KIND"
      );
   }

   #[test]
   fn test_transient_entity_has_no_reference() {
      let kind = EntityKind::builder("app.Person").build().unwrap();
      assert_eq!(
         Entity::new(&kind).reference().unwrap_err().error_code(),
         "TRANSIENT"
      );
   }
}
