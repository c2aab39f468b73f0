//! Explicit transactions over a repository's connection.

use std::sync::{Arc, Weak};

use tokio::runtime::Handle;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::entity::Entity;
use crate::operations::{self, Session};
use crate::reference::Reference;
use crate::repository::Repository;
use crate::{Error, Result};

/// The session of an open transaction; `None` once it is finished.
pub(crate) type Scope = Mutex<Option<Session>>;

/// Where relation aspects load their targets from.
///
/// Entities read or written inside a [`Transaction`] load through it while it is
/// open, so they see its uncommitted rows and do not wait for the connection the
/// transaction holds. Afterwards, and for everything else, loads go through the
/// repository.
#[derive(Clone)]
pub struct Source {
   repository: Repository,
   scope: Weak<Scope>,
}

impl Source {
   pub(crate) fn new(repository: Repository, scope: Weak<Scope>) -> Self {
      Self { repository, scope }
   }

   pub fn repository(&self) -> &Repository {
      &self.repository
   }

   pub(crate) async fn lookup(&self, reference: &Reference) -> Result<Entity> {
      if let Some(scope) = self.scope.upgrade() {
         let mut session = scope.lock().await;
         if let Some(session) = session.as_mut() {
            return operations::lookup(session, reference).await;
         }
      }
      self.repository.lookup(reference).await
   }
}

impl From<Repository> for Source {
   fn from(repository: Repository) -> Self {
      Self::new(repository, Weak::new())
   }
}

/// An open `BEGIN IMMEDIATE` transaction.
///
/// Holds the repository's connection until [`commit()`](Self::commit) or
/// [`rollback()`](Self::rollback); other operations on the same database wait for it.
/// Relations of entities it returns load through it. Queries and repository calls
/// run on their own sessions and must not be started while a transaction is open on
/// the same task.
///
/// Dropping an unfinished transaction rolls it back.
#[must_use = "if unused, the transaction is immediately rolled back"]
pub struct Transaction {
   scope: Arc<Scope>,
}

impl Transaction {
   pub(crate) async fn begin(repository: &Repository) -> Result<Self> {
      let mut session = Session::open(repository).await?;
      session.begin_immediate().await?;
      debug!(database = %repository.describe(), "transaction started");
      let scope = Arc::new_cyclic(|scope: &Weak<Scope>| {
         session.bind(scope.clone());
         Mutex::new(Some(session))
      });
      Ok(Self { scope })
   }

   pub async fn insert(&mut self, entity: &Entity) -> Result<()> {
      let mut session = self.scope.lock().await;
      let session = session.as_mut().ok_or(Error::TransactionFinalized)?;
      operations::insert(session, entity).await
   }

   pub async fn update(&mut self, entity: &Entity) -> Result<()> {
      let mut session = self.scope.lock().await;
      let session = session.as_mut().ok_or(Error::TransactionFinalized)?;
      operations::update(session, entity).await
   }

   /// Insert `entity` if it is transient, update it otherwise.
   pub async fn merge(&mut self, entity: &Entity) -> Result<()> {
      let mut session = self.scope.lock().await;
      let session = session.as_mut().ok_or(Error::TransactionFinalized)?;
      operations::merge(session, entity).await
   }

   pub async fn delete(&mut self, entity: &Entity) -> Result<()> {
      let mut session = self.scope.lock().await;
      let session = session.as_mut().ok_or(Error::TransactionFinalized)?;
      operations::delete(session, entity).await
   }

   pub async fn lookup(&mut self, reference: &Reference) -> Result<Entity> {
      let mut session = self.scope.lock().await;
      let session = session.as_mut().ok_or(Error::TransactionFinalized)?;
      operations::lookup(session, reference).await
   }

   pub async fn refresh(&mut self, entity: &Entity) -> Result<()> {
      let mut session = self.scope.lock().await;
      let session = session.as_mut().ok_or(Error::TransactionFinalized)?;
      operations::refresh(session, entity).await
   }

   async fn take_session(&self) -> Result<Session> {
      self.scope.lock().await.take().ok_or(Error::TransactionFinalized)
   }

   /// Commit; a failed commit is rolled back.
   pub async fn commit(self) -> Result<()> {
      let mut session = self.take_session().await?;
      session.finish(Ok(())).await?;
      debug!("transaction committed");
      Ok(())
   }

   pub async fn rollback(self) -> Result<()> {
      let mut session = self.take_session().await?;
      session.rollback().await?;
      debug!("transaction rolled back");
      Ok(())
   }
}

impl Drop for Transaction {
   fn drop(&mut self) {
      // A relation still loading through the scope owns the session until it is
      // done; the session's own drop then discards the connection
      let Ok(mut scope) = self.scope.try_lock() else {
         warn!("transaction dropped while in use");
         return;
      };
      let Some(mut session) = scope.take() else {
         return;
      };
      warn!("transaction dropped without commit, rolling back");
      // Without a runtime the session's own drop discards the connection
      if let Ok(handle) = Handle::try_current() {
         handle.spawn(async move {
            if let Err(e) = session.rollback().await {
               warn!(error = %e, "rollback of dropped transaction failed");
            }
         });
      }
   }
}
