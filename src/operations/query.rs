//! Prototype-based queries.

use tracing::debug;

use super::predicate::Render;
use super::{Cursor, Order, Session, Where, discriminator_filter, materialize, quote};
use crate::decode::first_column;
use crate::entity::{Entity, Property};
use crate::repository::Repository;
use crate::transaction::Source;
use crate::value::PropertyValue;
use crate::{Error, Result, SqlValue};

/// Statement pieces shared by every query form.
struct Rendered {
   table: String,
   clause: String,
   order_by: String,
   args: Vec<SqlValue>,
}

/// Query over the table of a prototype entity.
///
/// The prototype supplies the kind; rows of its descendants are included. Conditions
/// refer to the prototype's properties through [`Where`].
///
/// ```no_run
/// # use sqlx_sqlite_orm::{Entity, Order, Property, Repository, Result, Where};
/// # async fn example(repository: &Repository, person: &Entity, age: &Property<i32>) -> Result<()> {
/// let adults = repository
///    .query(person)
///    .filter(Where::greater_or_equal(person, age, 18))
///    .order(Order::descending(age))
///    .list()
///    .await?
///    .into_vec()
///    .await?;
/// # Ok(())
/// # }
/// ```
pub struct Query {
   repository: Repository,
   prototype: Entity,
   filter: Option<Where>,
   orders: Vec<Order>,
   limit: Option<u64>,
   offset: u64,
}

impl Query {
   pub(crate) fn new(repository: Repository, prototype: &Entity) -> Self {
      Self {
         repository,
         prototype: prototype.clone(),
         filter: None,
         orders: Vec::new(),
         limit: None,
         offset: 0,
      }
   }

   /// Restrict the result; repeated calls are combined with `and`.
   pub fn filter(mut self, condition: Where) -> Self {
      self.filter = Some(match self.filter.take() {
         Some(existing) => existing.and(condition),
         None => condition,
      });
      self
   }

   /// Add an ordering; earlier orderings take precedence.
   pub fn order(mut self, order: Order) -> Self {
      self.orders.push(order);
      self
   }

   pub fn limit(mut self, limit: u64) -> Self {
      self.limit = Some(limit);
      self
   }

   pub fn offset(mut self, offset: u64) -> Self {
      self.offset = offset;
      self
   }

   fn render(&self) -> Result<Rendered> {
      let kind = self.prototype.kind();
      let mut ctx = Render::new(&self.repository, &self.prototype);
      let mut parts = Vec::new();
      if let Some(filter) = discriminator_filter(&self.repository, kind, "a", &mut ctx.args) {
         parts.push(filter);
      }
      if let Some(filter) = &self.filter {
         parts.push(format!("({})", filter.render(&mut ctx)?));
      }
      let clause = if parts.is_empty() {
         "1 = 1".to_string()
      } else {
         parts.join(" and ")
      };

      let mut orders = Vec::with_capacity(self.orders.len() + 1);
      for order in &self.orders {
         orders.push(order.render(&self.repository, &self.prototype)?);
      }
      orders.push("a.[_id] asc".to_string());

      Ok(Rendered {
         table: quote(&self.repository.settings().naming().table(kind)),
         clause,
         order_by: orders.join(", "),
         args: ctx.args,
      })
   }

   async fn session(&self) -> Result<Session> {
      let mut session = Session::open(&self.repository).await?;
      session.prepare_family(self.prototype.kind()).await?;
      Ok(session)
   }

   async fn scalar(&self, sql: &str, args: Vec<SqlValue>) -> Result<SqlValue> {
      let mut session = self.session().await?;
      let rows = session.fetch_all(sql, args).await?;
      Ok(match rows.first() {
         Some(row) => first_column(row)?,
         None => SqlValue::Null,
      })
   }

   /// Open a cursor over the matching entities.
   pub async fn list(&self) -> Result<Cursor> {
      drop(self.session().await?);
      let rendered = self.render()?;
      Ok(Cursor::new(
         self.repository.clone(),
         self.prototype.kind().clone(),
         format!(
            "SELECT a.* FROM {} a WHERE {} ORDER BY {}",
            rendered.table, rendered.clause, rendered.order_by
         ),
         format!(
            "SELECT count(*) FROM {} a WHERE {}",
            rendered.table, rendered.clause
         ),
         rendered.args,
         self.limit,
         self.offset,
      ))
   }

   /// The only matching entity, `None` if there is none.
   ///
   /// Fails with [`Error::MultipleRows`] if more than one row matches.
   pub async fn single(&self) -> Result<Option<Entity>> {
      let rendered = self.render()?;
      let sql = format!(
         "SELECT a.* FROM {} a WHERE {} ORDER BY {} LIMIT 2 OFFSET ?",
         rendered.table, rendered.clause, rendered.order_by
      );
      let mut args = rendered.args;
      args.push(SqlValue::Integer(self.offset as i64));

      let mut session = self.session().await?;
      let rows = session.fetch_all(&sql, args).await?;
      drop(session);

      let kind = self.prototype.kind();
      let source = Source::from(self.repository.clone());
      match rows.as_slice() {
         [] => Ok(None),
         [row] => Ok(Some(materialize(&source, kind, row)?)),
         [first, ..] => {
            let first = materialize(&source, kind, first)?;
            Err(Error::MultipleRows {
               first: first.reference()?,
            })
         }
      }
   }

   /// Number of matching rows, ignoring limit and offset.
   pub async fn count(&self) -> Result<u64> {
      let rendered = self.render()?;
      let sql = format!(
         "SELECT count(*) FROM {} a WHERE {}",
         rendered.table, rendered.clause
      );
      Ok(self
         .scalar(&sql, rendered.args)
         .await?
         .as_i64()
         .map_or(0, |n| n.max(0) as u64))
   }

   pub async fn exists(&self) -> Result<bool> {
      Ok(self.count().await? > 0)
   }

   async fn aggregate<T: PropertyValue>(
      &self,
      function: &str,
      property: &Property<T>,
   ) -> Result<Option<T>> {
      self.prototype.kind().index_of(property)?;
      let rendered = self.render()?;
      let column = quote(&self.repository.settings().naming().column(property));
      let sql = format!(
         "SELECT {function}(a.{column}) FROM {} a WHERE {}",
         rendered.table, rendered.clause
      );
      let raw = self.scalar(&sql, rendered.args).await?;
      let value = self
         .repository
         .settings()
         .mapping()
         .mapper(property)?
         .decode(property, raw)?;
      if value.is_null() {
         return Ok(None);
      }
      T::from_value(value).map(Some)
   }

   /// Smallest value of `property` among the matching rows.
   pub async fn min<T: PropertyValue>(&self, property: &Property<T>) -> Result<Option<T>> {
      self.aggregate("MIN", property).await
   }

   pub async fn max<T: PropertyValue>(&self, property: &Property<T>) -> Result<Option<T>> {
      self.aggregate("MAX", property).await
   }

   /// Sum of `property`; zero when nothing matches.
   pub async fn sum<T: PropertyValue>(&self, property: &Property<T>) -> Result<Option<T>> {
      self.aggregate("TOTAL", property).await
   }

   /// Average of `property`, decoded as the property's type.
   pub async fn avg<T: PropertyValue>(&self, property: &Property<T>) -> Result<Option<T>> {
      self.aggregate("AVG", property).await
   }

   /// Set `property` to `value` on every matching row. Returns the number of rows changed.
   ///
   /// Bypasses aspects and cascading.
   pub async fn update<T: PropertyValue>(&self, property: &Property<T>, value: T) -> Result<u64> {
      self.prototype.kind().index_of(property)?;
      let rendered = self.render()?;
      let column = quote(&self.repository.settings().naming().column(property));
      let argument = self
         .repository
         .settings()
         .mapping()
         .mapper(property)?
         .argument(property, &value.into_value())?;
      let sql = format!(
         "UPDATE {table} SET {column} = ? WHERE [_id] IN (SELECT a.[_id] FROM {table} a WHERE {})",
         rendered.clause,
         table = rendered.table
      );
      let mut args = vec![argument];
      args.extend(rendered.args);

      let mut session = self.session().await?;
      let changed = session.execute(&sql, args).await?.rows_affected();
      debug!(%sql, changed, "bulk update");
      Ok(changed)
   }

   /// Delete every matching row. Returns the number of rows deleted.
   ///
   /// Bypasses cascading; in-memory instances of the deleted rows keep their ids.
   pub async fn delete(&self) -> Result<u64> {
      let rendered = self.render()?;
      let sql = format!(
         "DELETE FROM {table} WHERE [_id] IN (SELECT a.[_id] FROM {table} a WHERE {})",
         rendered.clause,
         table = rendered.table
      );
      let mut session = self.session().await?;
      let deleted = session.execute(&sql, rendered.args).await?.rows_affected();
      debug!(%sql, deleted, "bulk delete");
      Ok(deleted)
   }
}
