use std::sync::Arc;

use tracing::{debug, info};

use super::{Session, quote};
use crate::decode::first_column;
use crate::entity::{EntityKind, Property, PropertyMeta};
use crate::repository::Repository;
use crate::{Error, Result, SqlValue};

/// What [`Index::create()`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
   Created,
   /// An identical index already existed.
   Unchanged,
   /// An index of the same name but another definition was dropped first.
   Replaced,
}

/// Declaration of an index over properties of one kind.
///
/// The index name depends only on the table and the set of property names, so
/// changing the column order or uniqueness of a declaration replaces the index
/// created earlier.
pub struct Index {
   repository: Repository,
   kind: Arc<EntityKind>,
   properties: Vec<Arc<PropertyMeta>>,
   unique: bool,
}

impl Index {
   pub(crate) fn new(repository: Repository, kind: &Arc<EntityKind>) -> Self {
      Self {
         repository,
         kind: Arc::clone(kind),
         properties: Vec::new(),
         unique: false,
      }
   }

   /// Append a column to the index.
   pub fn on<T>(mut self, property: &Property<T>) -> Self {
      self.properties.push(Arc::clone(property.meta()));
      self
   }

   pub fn unique(mut self, unique: bool) -> Self {
      self.unique = unique;
      self
   }

   fn table(&self) -> String {
      self.repository.settings().naming().table(&self.kind)
   }

   fn columns(&self) -> Vec<String> {
      let naming = self.repository.settings().naming();
      self.properties.iter().map(|p| naming.column(p)).collect()
   }

   /// `idx_{table}_{columns}`, with the column names sorted.
   pub fn name(&self) -> String {
      let mut columns = self.columns();
      columns.sort();
      format!("idx_{}_{}", self.table(), columns.join("_"))
   }

   pub fn sql(&self) -> String {
      let columns: Vec<String> = self.columns().iter().map(|c| quote(c)).collect();
      format!(
         "CREATE {}INDEX {} ON {} ({})",
         if self.unique { "UNIQUE " } else { "" },
         quote(&self.name()),
         quote(&self.table()),
         columns.join(", ")
      )
   }

   /// Create the index, replacing a different one of the same name.
   pub async fn create(&self) -> Result<IndexOutcome> {
      if self.properties.is_empty() {
         return Err(Error::InvalidDeclaration {
            kind: self.kind.name().to_string(),
            reason: "index without columns".to_string(),
         });
      }
      for property in &self.properties {
         self.kind.index_of(property)?;
      }

      let name = self.name();
      let sql = self.sql();
      let mut session = Session::open(&self.repository).await?;
      session.prepare(&self.kind).await?;

      let rows = session
         .fetch_all(
            "SELECT sql FROM sqlite_master WHERE type = 'index' AND name = ?",
            vec![SqlValue::Text(name.clone())],
         )
         .await?;
      let existing = match rows.first().map(first_column).transpose()? {
         Some(SqlValue::Text(existing)) => Some(existing),
         _ => None,
      };

      match existing {
         Some(existing) if existing == sql => {
            debug!(index = %name, "index unchanged");
            Ok(IndexOutcome::Unchanged)
         }
         Some(_) => {
            session
               .execute(&format!("DROP INDEX {}", quote(&name)), Vec::new())
               .await?;
            session.execute(&sql, Vec::new()).await?;
            info!(index = %name, "replaced index");
            Ok(IndexOutcome::Replaced)
         }
         None => {
            session.execute(&sql, Vec::new()).await?;
            info!(index = %name, "created index");
            Ok(IndexOutcome::Created)
         }
      }
   }
}
