//! Statement builders and executors.
//!
//! Every operation runs on a [`Session`], which owns the database's single connection
//! for its lifetime. Operations are free functions over a session so that cascading
//! can recurse into them on the same connection and inside the same transaction.

mod cursor;
mod delete;
mod index;
mod insert;
mod lookup;
mod predicate;
mod query;
mod update;

use std::sync::{Arc, Weak};

use sqlx::sqlite::{SqliteConnection, SqliteQueryResult, SqliteRow};
use sqlx::{Row as _, query as sql_query};
use sqlx_sqlite_conn_mgr::WriteGuard;
use tracing::{trace, warn};

pub use cursor::{Cursor, CursorState};
pub use index::{Index, IndexOutcome};
pub use predicate::{Order, Where};
pub use query::Query;

pub(crate) use delete::delete;
pub(crate) use insert::insert;
pub(crate) use lookup::{lookup, refresh};
pub(crate) use update::{merge, update};

use crate::aspect::{Relation, Row, ToManyRelation};
use crate::decode::{bind_value, column};
use crate::entity::{Entity, EntityKind, PropertyType};
use crate::mapping::Target;
use crate::repository::Repository;
use crate::transaction::{Scope, Source};
use crate::{Result, SqlValue, Value, schema};

/// Quote an identifier.
pub(crate) fn quote(name: &str) -> String {
   format!("[{name}]")
}

/// Exclusive use of the database connection by one repository.
pub(crate) struct Session {
   repository: Repository,
   writer: WriteGuard,
   /// A transaction was begun and not yet finished
   in_transaction: bool,
   /// Kinds whose tables were created or extended by the open transaction
   prepared: Vec<String>,
   /// The explicit transaction this session belongs to, if any
   scope: Weak<Scope>,
   /// Entities whose write is in progress, so cascades do not revisit them
   visiting: Vec<Entity>,
}

impl Session {
   pub(crate) async fn open(repository: &Repository) -> Result<Self> {
      let writer = repository.database().acquire_writer().await?;
      Ok(Self {
         repository: repository.clone(),
         writer,
         in_transaction: false,
         prepared: Vec::new(),
         scope: Weak::new(),
         visiting: Vec::new(),
      })
   }

   pub(crate) fn repository(&self) -> &Repository {
      &self.repository
   }

   pub(crate) fn bind(&mut self, scope: Weak<Scope>) {
      self.scope = scope;
   }

   /// Where relations of entities read or written by this session load from.
   pub(crate) fn source(&self) -> Source {
      Source::new(self.repository.clone(), self.scope.clone())
   }

   pub(crate) fn is_prepared(&self, kind: &str) -> bool {
      self.repository.is_prepared(kind) || self.prepared.iter().any(|k| k == kind)
   }

   /// Record that the table of `kind` is in line with its declaration.
   ///
   /// Inside a transaction the record only reaches the repository on commit.
   pub(crate) fn mark_prepared(&mut self, kind: &str) {
      if self.in_transaction {
         self.prepared.push(kind.to_string());
      } else {
         self.repository.mark_prepared(kind);
      }
   }

   pub(crate) fn connection(&mut self) -> &mut SqliteConnection {
      &mut self.writer
   }

   pub(crate) async fn execute(
      &mut self,
      sql: &str,
      values: Vec<SqlValue>,
   ) -> Result<SqliteQueryResult> {
      trace!(%sql, args = values.len(), "execute");
      let mut q = sql_query(sql);
      for value in values {
         q = bind_value(q, value);
      }
      Ok(q.execute(&mut *self.writer).await?)
   }

   pub(crate) async fn fetch_all(
      &mut self,
      sql: &str,
      values: Vec<SqlValue>,
   ) -> Result<Vec<SqliteRow>> {
      trace!(%sql, args = values.len(), "fetch");
      let mut q = sql_query(sql);
      for value in values {
         q = bind_value(q, value);
      }
      Ok(q.fetch_all(&mut *self.writer).await?)
   }

   pub(crate) async fn begin_immediate(&mut self) -> Result<()> {
      self.execute("BEGIN IMMEDIATE", Vec::new()).await?;
      self.in_transaction = true;
      Ok(())
   }

   pub(crate) async fn commit(&mut self) -> Result<()> {
      self.execute("COMMIT", Vec::new()).await?;
      self.in_transaction = false;
      for kind in self.prepared.drain(..) {
         self.repository.mark_prepared(&kind);
      }
      Ok(())
   }

   pub(crate) async fn rollback(&mut self) -> Result<()> {
      self.prepared.clear();
      self.execute("ROLLBACK", Vec::new()).await?;
      self.in_transaction = false;
      Ok(())
   }

   /// Bring the table of `kind` in line with its declaration.
   pub(crate) async fn prepare(&mut self, kind: &EntityKind) -> Result<()> {
      schema::ensure(self, kind).await
   }

   /// Prepare `base` and every registered descendant, so rows of any of them can be read.
   pub(crate) async fn prepare_family(&mut self, base: &Arc<EntityKind>) -> Result<()> {
      for kind in self.repository.catalog().descendants(base) {
         self.prepare(&kind).await?;
      }
      Ok(())
   }

   /// Commit the open transaction if `result` is ok, roll it back otherwise.
   ///
   /// The first error wins; a connection whose rollback fails is discarded on drop.
   pub(crate) async fn finish<T>(&mut self, result: Result<T>) -> Result<T> {
      match result {
         Ok(value) => match self.commit().await {
            Ok(()) => Ok(value),
            Err(e) => {
               if let Err(rollback) = self.rollback().await {
                  warn!(error = %rollback, "rollback after failed commit");
               }
               Err(e)
            }
         },
         Err(e) => {
            if let Err(rollback) = self.rollback().await {
               warn!(error = %rollback, "rollback failed");
            }
            Err(e)
         }
      }
   }

   pub(crate) fn is_visiting(&self, entity: &Entity) -> bool {
      self.visiting.iter().any(|e| e.is(entity))
   }

   pub(crate) fn enter(&mut self, entity: &Entity) {
      self.visiting.push(entity.clone());
   }

   pub(crate) fn leave(&mut self, entity: &Entity) {
      self.visiting.retain(|e| !e.is(entity));
   }
}

impl Drop for Session {
   fn drop(&mut self) {
      if self.in_transaction {
         warn!("session dropped inside a transaction, discarding its connection");
         self.writer.close_on_drop();
      }
   }
}

/// `alias.[_type] in (...)` restricting rows to `kind` and its descendants.
///
/// Returns `None` for a root kind, whose table holds only its own family.
pub(crate) fn discriminator_filter(
   repository: &Repository,
   kind: &Arc<EntityKind>,
   alias: &str,
   args: &mut Vec<SqlValue>,
) -> Option<String> {
   if kind.is_root() {
      return None;
   }
   let naming = repository.settings().naming();
   let catalog = repository.catalog();
   let discriminators: Vec<String> = catalog
      .descendants(kind)
      .iter()
      .filter_map(|k| naming.discriminator(k, catalog))
      .collect();
   let placeholders = vec!["?"; discriminators.len()].join(", ");
   args.extend(discriminators.into_iter().map(SqlValue::Text));
   Some(format!("{alias}.[_type] in ({placeholders})"))
}

/// Build the entity a result row describes.
pub(crate) fn materialize(source: &Source, base: &Arc<EntityKind>, row: &SqliteRow) -> Result<Entity> {
   let repository = source.repository();
   let id: i64 = row.try_get("_id")?;
   let discriminator: Option<String> = row.try_get("_type")?;
   let kind = repository.settings().naming().resolve(
      base,
      discriminator.as_deref(),
      repository.catalog(),
   )?;
   let entity = repository.settings().factory().create(&kind, id);
   Row::set_id(&entity, id)?;
   retrieve(source, &entity, row)?;
   Ok(entity)
}

/// Load every mapped column of `row` into the slots of `entity`, bypassing aspects.
pub(crate) fn retrieve(source: &Source, entity: &Entity, row: &SqliteRow) -> Result<()> {
   let repository = source.repository();
   let naming = repository.settings().naming();
   let mapping = repository.settings().mapping();
   for property in entity.kind().properties() {
      let raw = column(row, &naming.column(property))?;
      mapping.mapper(property)?.retrieve(
         Target {
            entity,
            property,
            source,
         },
         raw,
      )?;
   }
   Ok(())
}

/// Point relation aspects at the ids just written for `entity`.
pub(crate) fn track_relations(source: &Source, entity: &Entity) -> Result<()> {
   for property in entity.kind().properties() {
      match (property.property_type(), entity.raw(property)?) {
         (PropertyType::Entity(_), Value::Entity(target)) => {
            Relation::track(entity, property, target.id(), source);
         }
         (PropertyType::EntityList(_) | PropertyType::EntitySet(_), Value::Entities(members)) => {
            let ids = members.iter().map(Entity::id).collect();
            ToManyRelation::track(entity, property, ids, source, true);
         }
         _ => {}
      }
   }
   Ok(())
}
