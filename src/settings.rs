//! Repository configuration.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cascading::Cascading;
use crate::catalog::Catalog;
use crate::factory::{Factory, NewFactory};
use crate::mapping::Mapping;
use crate::naming::{DefaultNaming, Naming};
use crate::versioning::Versioning;

/// Tunables that do not affect the stored format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
   /// Rows fetched per round trip by a query cursor.
   pub page_size: u64,
}

impl Default for RepositoryConfig {
   fn default() -> Self {
      Self { page_size: 64 }
   }
}

/// Everything a repository needs besides its database.
///
/// ```no_run
/// # use sqlx_sqlite_orm::{Catalog, Cascading, RepositoryConfig, Settings};
/// let settings = Settings::new(Catalog::new())
///    .with_cascading(Cascading::new())
///    .with_config(RepositoryConfig { page_size: 16 });
/// ```
#[derive(Clone)]
pub struct Settings {
   catalog: Arc<Catalog>,
   naming: Arc<dyn Naming>,
   mapping: Arc<Mapping>,
   factory: Arc<dyn Factory>,
   cascading: Arc<Cascading>,
   versioning: Arc<Versioning>,
   config: RepositoryConfig,
}

impl Settings {
   pub fn new(catalog: Catalog) -> Self {
      Self {
         catalog: Arc::new(catalog),
         naming: Arc::new(DefaultNaming),
         mapping: Arc::new(Mapping::default()),
         factory: Arc::new(NewFactory),
         cascading: Arc::new(Cascading::new()),
         versioning: Arc::new(Versioning::new()),
         config: RepositoryConfig::default(),
      }
   }

   pub fn with_naming(mut self, naming: impl Naming + 'static) -> Self {
      self.naming = Arc::new(naming);
      self
   }

   pub fn with_mapping(mut self, mapping: Mapping) -> Self {
      self.mapping = Arc::new(mapping);
      self
   }

   pub fn with_factory(mut self, factory: impl Factory + 'static) -> Self {
      self.factory = Arc::new(factory);
      self
   }

   pub fn with_cascading(mut self, cascading: Cascading) -> Self {
      self.cascading = Arc::new(cascading);
      self
   }

   pub fn with_versioning(mut self, versioning: Versioning) -> Self {
      self.versioning = Arc::new(versioning);
      self
   }

   pub fn with_config(mut self, config: RepositoryConfig) -> Self {
      self.config = config;
      self
   }

   pub fn catalog(&self) -> &Catalog {
      &self.catalog
   }

   pub fn naming(&self) -> &dyn Naming {
      self.naming.as_ref()
   }

   pub fn mapping(&self) -> &Mapping {
      &self.mapping
   }

   pub fn factory(&self) -> &dyn Factory {
      self.factory.as_ref()
   }

   pub fn cascading(&self) -> &Cascading {
      &self.cascading
   }

   pub fn versioning(&self) -> &Versioning {
      &self.versioning
   }

   pub fn config(&self) -> &RepositoryConfig {
      &self.config
   }
}

impl fmt::Debug for Settings {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("Settings")
         .field("catalog", &self.catalog)
         .field("mapping", &self.mapping)
         .field("cascading", &self.cascading)
         .field("versions", &self.versioning.len())
         .field("config", &self.config)
         .finish()
   }
}
