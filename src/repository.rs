//! The entry point: a database plus the settings entities are persisted with.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use sqlx_sqlite_conn_mgr::SqliteDatabase;
use tracing::{debug, info, warn};

use crate::catalog::Catalog;
use crate::entity::{Entity, EntityKind};
use crate::locator::Locator;
use crate::operations::{self, Index, Query, Session};
use crate::reference::Reference;
use crate::settings::Settings;
use crate::transaction::Transaction;
use crate::versioning::Versioning;
use crate::{Error, Result};

type WriteOp = for<'a> fn(&'a mut Session, &'a Entity) -> BoxFuture<'a, Result<()>>;

struct Shared {
   database: Arc<SqliteDatabase>,
   locator: Arc<dyn Locator>,
}

/// Persists entities in one database.
///
/// Cloning is cheap and clones share everything. A [derived](Self::derive) repository
/// shares the database but uses its own settings.
///
/// Every write runs in its own `BEGIN IMMEDIATE` transaction; cascaded writes join it.
/// Operations are serialized on the database's single connection.
///
/// ```no_run
/// # use sqlx_sqlite_orm::{Catalog, Entity, EntityKind, MemoryLocator, Repository, Result, Settings};
/// # async fn example() -> Result<()> {
/// let mut person = EntityKind::builder("app.Person");
/// let name = person.property::<String>("name");
/// let person = person.build()?;
///
/// let settings = Settings::new(Catalog::new().with(&person));
/// let repository = Repository::open(MemoryLocator::new(), settings).await?;
///
/// let ada = Entity::new(&person);
/// ada.set(&name, "Ada".to_string()).await?;
/// repository.insert(&ada).await?;
///
/// let loaded = repository.lookup(&ada.reference()?).await?;
/// assert_eq!(loaded.get(&name).await?, "Ada");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Repository {
   shared: Arc<Shared>,
   settings: Arc<Settings>,
   /// Kinds whose tables are in line with their declarations under these settings
   prepared: Arc<Mutex<HashSet<String>>>,
   derived: bool,
}

impl Repository {
   /// Open the database and apply pending schema upgrades.
   pub async fn open(locator: impl Locator + 'static, settings: Settings) -> Result<Self> {
      let locator: Arc<dyn Locator> = Arc::new(locator);
      let database = locator.open().await?;

      match settings.versioning().upgrade(&database).await {
         Ok(applied) => {
            info!(
               database = %locator.describe(),
               applied,
               version = settings.versioning().len(),
               "repository opened"
            );
         }
         Err(e) => {
            if let Err(close) = locator.close(database).await {
               warn!(error = %close, "closing database after failed upgrade");
            }
            return Err(e);
         }
      }

      Ok(Self {
         shared: Arc::new(Shared { database, locator }),
         settings: Arc::new(settings),
         prepared: Arc::new(Mutex::new(HashSet::new())),
         derived: false,
      })
   }

   /// A repository on the same database with settings changed by `configure`.
   ///
   /// Schema upgrades of the new settings are not applied.
   pub fn derive(&self, configure: impl FnOnce(Settings) -> Settings) -> Self {
      Self {
         shared: Arc::clone(&self.shared),
         settings: Arc::new(configure(Settings::clone(&self.settings))),
         prepared: Arc::new(Mutex::new(HashSet::new())),
         derived: true,
      }
   }

   pub fn settings(&self) -> &Settings {
      &self.settings
   }

   pub fn catalog(&self) -> &Catalog {
      self.settings.catalog()
   }

   pub fn database(&self) -> &Arc<SqliteDatabase> {
      &self.shared.database
   }

   pub fn is_derived(&self) -> bool {
      self.derived
   }

   pub(crate) fn describe(&self) -> String {
      self.shared.locator.describe()
   }

   pub(crate) fn is_prepared(&self, kind: &str) -> bool {
      self.prepared.lock().contains(kind)
   }

   pub(crate) fn mark_prepared(&self, kind: &str) {
      self.prepared.lock().insert(kind.to_string());
   }

   /// Create or extend the tables of `kind` and its registered descendants now
   /// rather than on first use.
   pub async fn prepare(&self, kind: &Arc<EntityKind>) -> Result<()> {
      let mut session = Session::open(self).await?;
      session.prepare_family(kind).await
   }

   /// Start an explicit transaction.
   pub async fn begin(&self) -> Result<Transaction> {
      Transaction::begin(self).await
   }

   /// Run `work` in a transaction, committing if it succeeds and rolling back if not.
   ///
   /// Transactions do not nest; `work` must use the given transaction rather than the
   /// repository.
   ///
   /// ```no_run
   /// # use sqlx_sqlite_orm::{Entity, Repository, Result};
   /// # async fn example(repository: &Repository, a: &Entity, b: &Entity) -> Result<()> {
   /// repository
   ///    .transactional(|tx| {
   ///       let (a, b) = (a.clone(), b.clone());
   ///       Box::pin(async move {
   ///          tx.insert(&a).await?;
   ///          tx.insert(&b).await
   ///       })
   ///    })
   ///    .await
   /// # }
   /// ```
   pub async fn transactional<T, F>(&self, work: F) -> Result<T>
   where
      F: for<'t> FnOnce(&'t mut Transaction) -> BoxFuture<'t, Result<T>>,
   {
      let mut tx = self.begin().await?;
      match work(&mut tx).await {
         Ok(value) => {
            tx.commit().await?;
            Ok(value)
         }
         Err(e) => {
            if let Err(rollback) = tx.rollback().await {
               warn!(error = %rollback, "rollback failed");
            }
            Err(e)
         }
      }
   }

   async fn write(&self, entity: &Entity, op: WriteOp) -> Result<()> {
      let mut session = Session::open(self).await?;
      session.begin_immediate().await?;
      let result = op(&mut session, entity).await;
      session.finish(result).await
   }

   /// Insert a transient entity, saving cascaded relations first.
   ///
   /// Fails with [`Error::AlreadyPersisted`] if the entity has an id.
   pub async fn insert(&self, entity: &Entity) -> Result<()> {
      self.write(entity, operations::insert).await
   }

   pub async fn update(&self, entity: &Entity) -> Result<()> {
      self.write(entity, operations::update).await
   }

   /// Insert `entity` if it is transient, update it otherwise.
   pub async fn merge(&self, entity: &Entity) -> Result<()> {
      self.write(entity, operations::merge).await
   }

   /// Delete the row of `entity` and its cascaded relations. The entity becomes
   /// transient again.
   pub async fn delete(&self, entity: &Entity) -> Result<()> {
      self.write(entity, operations::delete).await
   }

   /// Load the entity `reference` identifies; [`Error::NotFound`] if there is none.
   pub async fn lookup(&self, reference: &Reference) -> Result<Entity> {
      let mut session = Session::open(self).await?;
      operations::lookup(&mut session, reference).await
   }

   /// Overwrite the properties of a persisted entity with its stored row.
   pub async fn refresh(&self, entity: &Entity) -> Result<()> {
      let mut session = Session::open(self).await?;
      operations::refresh(&mut session, entity).await
   }

   /// Query entities of the prototype's kind and its subtypes.
   pub fn query(&self, prototype: &Entity) -> Query {
      Query::new(self.clone(), prototype)
   }

   /// Declare an index on the table of `kind`.
   pub fn index(&self, kind: &Arc<EntityKind>) -> Index {
      Index::new(self.clone(), kind)
   }

   /// The stored schema version.
   pub async fn version(&self) -> Result<i64> {
      let mut writer = self.shared.database.acquire_writer().await?;
      Versioning::version(&mut writer).await
   }

   /// Copy the database file to `destination`. Returns the number of bytes copied.
   pub async fn backup(&self, destination: impl AsRef<Path>) -> Result<u64> {
      let copied = self.shared.database.backup_to(destination.as_ref()).await?;
      debug!(database = %self.describe(), copied, "backup written");
      Ok(copied)
   }

   /// Close the database through the locator.
   ///
   /// Fails with [`Error::DerivedRepository`] on a derived repository; close the one it
   /// was derived from instead.
   pub async fn close(self) -> Result<()> {
      if self.derived {
         return Err(Error::DerivedRepository);
      }
      let database = Arc::clone(&self.shared.database);
      self.shared.locator.close(database).await?;
      info!(database = %self.describe(), "repository closed");
      Ok(())
   }
}

impl fmt::Debug for Repository {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("Repository")
         .field("database", &self.describe())
         .field("derived", &self.derived)
         .field("settings", &self.settings)
         .finish()
   }
}
