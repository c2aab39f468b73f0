//! Paged, forward-only query results.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::trace;

use super::{Session, materialize};
use crate::decode::first_column;
use crate::entity::{Entity, EntityKind};
use crate::repository::Repository;
use crate::{Error, Result, SqlValue};

/// Lifecycle of a [`Cursor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
   /// More rows may be fetched.
   Open,
   /// Every row has been fetched; buffered rows remain to be consumed.
   Exhausted,
   /// Released; any further use fails.
   Closed,
}

/// Result rows of a query, fetched page by page.
///
/// The cursor holds no connection between pages, so other repository operations may
/// run while it is open. Consuming the last row, or [`into_vec()`](Self::into_vec),
/// closes it; [`get()`](Self::get) and [`len()`](Self::len) leave it open. Call
/// [`close()`](Self::close) when abandoning a cursor early.
pub struct Cursor {
   repository: Repository,
   kind: Arc<EntityKind>,
   select: String,
   count: String,
   args: Vec<SqlValue>,
   limit: Option<u64>,
   offset: u64,
   page_size: u64,
   fetched: u64,
   buffer: VecDeque<Entity>,
   state: CursorState,
}

impl Cursor {
   #[allow(clippy::too_many_arguments)]
   pub(crate) fn new(
      repository: Repository,
      kind: Arc<EntityKind>,
      select: String,
      count: String,
      args: Vec<SqlValue>,
      limit: Option<u64>,
      offset: u64,
   ) -> Self {
      let page_size = repository.settings().config().page_size.max(1);
      Self {
         repository,
         kind,
         select,
         count,
         args,
         limit,
         offset,
         page_size,
         fetched: 0,
         buffer: VecDeque::new(),
         state: CursorState::Open,
      }
   }

   pub fn state(&self) -> CursorState {
      self.state
   }

   pub fn is_closed(&self) -> bool {
      self.state == CursorState::Closed
   }

   fn ensure_open(&self) -> Result<()> {
      if self.is_closed() {
         return Err(Error::CursorClosed);
      }
      Ok(())
   }

   /// Run the select for `count` rows starting `skip` rows past the query offset.
   async fn fetch(&self, skip: u64, count: u64) -> Result<Vec<Entity>> {
      let mut args = self.args.clone();
      args.push(SqlValue::Integer(count as i64));
      args.push(SqlValue::Integer((self.offset + skip) as i64));
      let sql = format!("{} LIMIT ? OFFSET ?", self.select);

      let mut session = Session::open(&self.repository).await?;
      let rows = session.fetch_all(&sql, args).await?;
      let source = session.source();
      drop(session);

      rows
         .iter()
         .map(|row| materialize(&source, &self.kind, row))
         .collect()
   }

   /// Rows left before the query limit, `None` if unlimited.
   fn remaining(&self) -> Option<u64> {
      self.limit.map(|limit| limit.saturating_sub(self.fetched))
   }

   /// Next entity, or `None` after the last one, which also closes the cursor.
   pub async fn next(&mut self) -> Result<Option<Entity>> {
      self.ensure_open()?;
      if self.buffer.is_empty() && self.state == CursorState::Open {
         let want = self
            .remaining()
            .map_or(self.page_size, |r| r.min(self.page_size));
         if want > 0 {
            let page = self.fetch(self.fetched, want).await?;
            trace!(rows = page.len(), at = self.fetched, "fetched page");
            if (page.len() as u64) < want {
               self.state = CursorState::Exhausted;
            }
            self.fetched += page.len() as u64;
            self.buffer.extend(page);
         }
         if self.remaining() == Some(0) {
            self.state = CursorState::Exhausted;
         }
      }
      match self.buffer.pop_front() {
         Some(entity) => Ok(Some(entity)),
         None => {
            self.close();
            Ok(None)
         }
      }
   }

   /// Entity at `index` in the result, without moving the cursor.
   pub async fn get(&self, index: u64) -> Result<Option<Entity>> {
      self.ensure_open()?;
      if self.limit.is_some_and(|limit| index >= limit) {
         return Ok(None);
      }
      Ok(self.fetch(index, 1).await?.into_iter().next())
   }

   /// Number of rows in the whole result.
   pub async fn len(&self) -> Result<u64> {
      self.ensure_open()?;
      let mut session = Session::open(&self.repository).await?;
      let rows = session.fetch_all(&self.count, self.args.clone()).await?;
      drop(session);

      let total = match rows.first().map(first_column).transpose()? {
         Some(SqlValue::Integer(n)) => n.max(0) as u64,
         _ => 0,
      };
      let available = total.saturating_sub(self.offset);
      Ok(self.limit.map_or(available, |limit| available.min(limit)))
   }

   pub async fn is_empty(&self) -> Result<bool> {
      Ok(self.len().await? == 0)
   }

   /// Consume the remaining rows and close the cursor.
   pub async fn into_vec(mut self) -> Result<Vec<Entity>> {
      let mut entities = Vec::new();
      while let Some(entity) = self.next().await? {
         entities.push(entity);
      }
      Ok(entities)
   }

   /// Release buffered rows. Further use fails with [`Error::CursorClosed`].
   pub fn close(&mut self) {
      self.buffer.clear();
      self.state = CursorState::Closed;
   }
}

impl Drop for Cursor {
   fn drop(&mut self) {
      if self.state != CursorState::Closed {
         trace!(kind = self.kind.name(), "cursor dropped before closing");
      }
   }
}
