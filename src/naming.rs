//! Table, column and discriminator naming.

use std::sync::Arc;

use crate::catalog::Catalog;
use crate::entity::{EntityKind, PropertyMeta};
use crate::{Error, Result};

/// Derives SQL names from entity declarations.
///
/// A kind hierarchy shares one table named after its root. Rows of subtypes carry a
/// discriminator in the `_type` column; rows of the root kind carry none.
pub trait Naming: Send + Sync {
   fn table(&self, kind: &EntityKind) -> String {
      kind.root().simple_name().to_string()
   }

   fn column(&self, property: &PropertyMeta) -> String {
      property.name().to_string()
   }

   /// Discriminator stored for rows of `kind`, `None` for a root kind.
   fn discriminator(&self, kind: &EntityKind, catalog: &Catalog) -> Option<String>;

   /// Concrete kind of a row read through `base`, given its stored discriminator.
   fn resolve(
      &self,
      base: &Arc<EntityKind>,
      discriminator: Option<&str>,
      catalog: &Catalog,
   ) -> Result<Arc<EntityKind>> {
      if self.discriminator(base, catalog).as_deref() == discriminator {
         return Ok(Arc::clone(base));
      }
      catalog
         .descendants(base)
         .into_iter()
         .find(|kind| self.discriminator(kind, catalog).as_deref() == discriminator)
         .ok_or_else(|| Error::UnknownDiscriminator {
            table: self.table(base),
            discriminator: discriminator.unwrap_or("NULL").to_string(),
         })
   }
}

/// Tables named by the root kind's simple name, discriminators by the subtype's simple
/// name, qualified only when two kinds of one family share a simple name.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultNaming;

impl Naming for DefaultNaming {
   fn discriminator(&self, kind: &EntityKind, catalog: &Catalog) -> Option<String> {
      if kind.is_root() {
         return None;
      }
      let ambiguous = catalog
         .family(kind)
         .any(|other| other.name() != kind.name() && other.simple_name() == kind.simple_name());
      Some(if ambiguous {
         kind.name().to_string()
      } else {
         kind.simple_name().to_string()
      })
   }
}
