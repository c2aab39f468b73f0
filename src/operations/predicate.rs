//! Query conditions and orderings.

use std::sync::Arc;

use super::{discriminator_filter, quote};
use crate::entity::{Entity, Property, PropertyMeta};
use crate::repository::Repository;
use crate::value::PropertyValue;
use crate::{Error, Result, SqlValue, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comparison {
   Equal,
   NotEqual,
   Less,
   LessOrEqual,
   Greater,
   GreaterOrEqual,
}

impl Comparison {
   fn operator(&self) -> &'static str {
      match self {
         Comparison::Equal => "=",
         Comparison::NotEqual => "<>",
         Comparison::Less => "<",
         Comparison::LessOrEqual => "<=",
         Comparison::Greater => ">",
         Comparison::GreaterOrEqual => ">=",
      }
   }
}

/// Condition tree over the properties of query entities.
///
/// Leaves compare one property of a source entity against a value. The source is the
/// query's prototype, or the related prototype inside a [`has()`](Where::has)
/// sub-select. Each distinct entity instance gets its own table alias.
///
/// ```no_run
/// # use sqlx_sqlite_orm::{Entity, Property, Where};
/// # fn example(person: &Entity, address: &Entity, age: &Property<i32>,
/// #    home: &Property<Option<Entity>>, city: &Property<String>) {
/// let adults_in_paris = Where::greater_or_equal(person, age, 18).and(Where::has(
///    person,
///    home,
///    address,
///    Where::equal(address, city, "Paris".to_string()),
/// ));
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Where(Node);

#[derive(Debug, Clone)]
enum Node {
   Compare {
      source: Entity,
      property: Arc<PropertyMeta>,
      comparison: Comparison,
      value: Value,
   },
   All(Vec<Where>),
   Any(Vec<Where>),
   Has {
      source: Entity,
      property: Arc<PropertyMeta>,
      related: Entity,
      condition: Box<Where>,
      negated: bool,
   },
}

impl Where {
   fn compare<T: PropertyValue>(
      source: &Entity,
      property: &Property<T>,
      comparison: Comparison,
      value: T,
   ) -> Self {
      Where(Node::Compare {
         source: source.clone(),
         property: Arc::clone(property.meta()),
         comparison,
         value: value.into_value(),
      })
   }

   /// `property = value`; comparing with a null value tests `is null`.
   pub fn equal<T: PropertyValue>(source: &Entity, property: &Property<T>, value: T) -> Self {
      Self::compare(source, property, Comparison::Equal, value)
   }

   /// `property <> value`; comparing with a null value tests `is not null`.
   pub fn not_equal<T: PropertyValue>(source: &Entity, property: &Property<T>, value: T) -> Self {
      Self::compare(source, property, Comparison::NotEqual, value)
   }

   pub fn less<T: PropertyValue>(source: &Entity, property: &Property<T>, value: T) -> Self {
      Self::compare(source, property, Comparison::Less, value)
   }

   pub fn less_or_equal<T: PropertyValue>(source: &Entity, property: &Property<T>, value: T) -> Self {
      Self::compare(source, property, Comparison::LessOrEqual, value)
   }

   pub fn greater<T: PropertyValue>(source: &Entity, property: &Property<T>, value: T) -> Self {
      Self::compare(source, property, Comparison::Greater, value)
   }

   pub fn greater_or_equal<T: PropertyValue>(
      source: &Entity,
      property: &Property<T>,
      value: T,
   ) -> Self {
      Self::compare(source, property, Comparison::GreaterOrEqual, value)
   }

   /// Conjunction; true when empty.
   pub fn all(conditions: impl IntoIterator<Item = Where>) -> Self {
      Where(Node::All(conditions.into_iter().collect()))
   }

   /// Disjunction; true when empty.
   pub fn any(conditions: impl IntoIterator<Item = Where>) -> Self {
      Where(Node::Any(conditions.into_iter().collect()))
   }

   /// Some entity `related` refers to through `property` satisfies `condition`.
   ///
   /// Works for to-one relations and for collections.
   pub fn has<T>(source: &Entity, property: &Property<T>, related: &Entity, condition: Where) -> Self {
      Self::relation(source, property, related, condition, false)
   }

   /// No entity `source` refers to through `property` satisfies `condition`.
   pub fn has_not<T>(
      source: &Entity,
      property: &Property<T>,
      related: &Entity,
      condition: Where,
   ) -> Self {
      Self::relation(source, property, related, condition, true)
   }

   fn relation<T>(
      source: &Entity,
      property: &Property<T>,
      related: &Entity,
      condition: Where,
      negated: bool,
   ) -> Self {
      Where(Node::Has {
         source: source.clone(),
         property: Arc::clone(property.meta()),
         related: related.clone(),
         condition: Box::new(condition),
         negated,
      })
   }

   pub fn and(self, other: Where) -> Self {
      match self.0 {
         Node::All(mut conditions) => {
            conditions.push(other);
            Where(Node::All(conditions))
         }
         first => Where(Node::All(vec![Where(first), other])),
      }
   }

   pub fn or(self, other: Where) -> Self {
      match self.0 {
         Node::Any(mut conditions) => {
            conditions.push(other);
            Where(Node::Any(conditions))
         }
         first => Where(Node::Any(vec![Where(first), other])),
      }
   }

   pub(crate) fn render(&self, ctx: &mut Render<'_>) -> Result<String> {
      match &self.0 {
         Node::Compare {
            source,
            property,
            comparison,
            value,
         } => {
            source.kind().index_of(property)?;
            let alias = ctx.aliases.alias(source);
            let column = quote(&ctx.repository.settings().naming().column(property));
            match (comparison, value.is_null()) {
               (Comparison::Equal, true) => return Ok(format!("{alias}.{column} is null")),
               (Comparison::NotEqual, true) => {
                  return Ok(format!("{alias}.{column} is not null"));
               }
               _ => {}
            }
            let argument = ctx
               .repository
               .settings()
               .mapping()
               .mapper(property)?
               .argument(property, value)?;
            ctx.args.push(argument);
            Ok(format!("{alias}.{column} {} ?", comparison.operator()))
         }
         Node::All(conditions) => ctx.join(conditions, " and "),
         Node::Any(conditions) => ctx.join(conditions, " or "),
         Node::Has {
            source,
            property,
            related,
            condition,
            negated,
         } => {
            source.kind().index_of(property)?;
            let repository = ctx.repository;
            let target = property
               .property_type()
               .target()
               .ok_or_else(|| Error::conversion("relation", property.property_type()))?;
            let target = repository.catalog().kind(target)?;
            if !related.kind().is_a(&target) {
               return Err(Error::conversion(target.name(), related.kind().name()));
            }

            let outer = ctx.aliases.alias(source);
            let inner = ctx.aliases.alias(related);
            let naming = repository.settings().naming();
            let column = quote(&naming.column(property));
            let mut parts = vec![if property.property_type().is_relation() {
               format!("{inner}.[_id] = {outer}.{column}")
            } else {
               format!("instr({outer}.{column}, '{{' || {inner}.[_id] || '}}') > 0")
            }];
            if let Some(filter) = discriminator_filter(repository, related.kind(), &inner, &mut ctx.args)
            {
               parts.push(filter);
            }
            parts.push(format!("({})", condition.render(ctx)?));

            Ok(format!(
               "{}exists (select 1 from {} {inner} where {})",
               if *negated { "not " } else { "" },
               quote(&naming.table(related.kind())),
               parts.join(" and ")
            ))
         }
      }
   }
}

/// Result ordering on a property of the query's prototype.
#[derive(Debug, Clone)]
pub struct Order {
   property: Arc<PropertyMeta>,
   descending: bool,
}

impl Order {
   pub fn ascending<T>(property: &Property<T>) -> Self {
      Self {
         property: Arc::clone(property.meta()),
         descending: false,
      }
   }

   pub fn descending<T>(property: &Property<T>) -> Self {
      Self {
         property: Arc::clone(property.meta()),
         descending: true,
      }
   }

   pub(crate) fn render(&self, repository: &Repository, prototype: &Entity) -> Result<String> {
      prototype.kind().index_of(&self.property)?;
      Ok(format!(
         "a.{} {}",
         quote(&repository.settings().naming().column(&self.property)),
         if self.descending { "desc" } else { "asc" }
      ))
   }
}

/// Table aliases by entity instance: `a`..`z`, then `t26`, `t27`, ...
pub(crate) struct Aliases {
   entities: Vec<Entity>,
}

impl Aliases {
   /// Aliases with `prototype` as `a`.
   pub(crate) fn new(prototype: &Entity) -> Self {
      Self {
         entities: vec![prototype.clone()],
      }
   }

   pub(crate) fn alias(&mut self, entity: &Entity) -> String {
      let index = match self.entities.iter().position(|e| e.is(entity)) {
         Some(index) => index,
         None => {
            self.entities.push(entity.clone());
            self.entities.len() - 1
         }
      };
      match u8::try_from(index) {
         Ok(i) if i < 26 => char::from(b'a' + i).to_string(),
         _ => format!("t{index}"),
      }
   }
}

/// State of rendering one statement.
pub(crate) struct Render<'a> {
   pub(crate) repository: &'a Repository,
   pub(crate) aliases: Aliases,
   pub(crate) args: Vec<SqlValue>,
}

impl<'a> Render<'a> {
   pub(crate) fn new(repository: &'a Repository, prototype: &Entity) -> Self {
      Self {
         repository,
         aliases: Aliases::new(prototype),
         args: Vec::new(),
      }
   }

   fn join(&mut self, conditions: &[Where], separator: &str) -> Result<String> {
      if conditions.is_empty() {
         return Ok("1 = 1".to_string());
      }
      let mut rendered = Vec::with_capacity(conditions.len());
      for condition in conditions {
         rendered.push(format!("({})", condition.render(self)?));
      }
      Ok(rendered.join(separator))
   }
}
