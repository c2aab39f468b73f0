//! Mappers between property values and column storage.
//!
//! A [`Mapping`] is an ordered list of mappers; the first one whose
//! [`maps()`](Mapper::maps) accepts a property's declared type handles it.

mod relation;
mod scalar;

use std::fmt;
use std::sync::Arc;

pub use relation::{CollectionMapper, EntityMapper, format_ids, parse_ids};
pub use scalar::{
   BoolMapper, BytesMapper, CharMapper, DateMapper, EnumMapper, IntegerMapper, JsonMapper,
   LocaleMapper, RealMapper, TextMapper,
};

use crate::entity::{Entity, PropertyMeta, PropertyType};
use crate::transaction::Source;
use crate::{Error, Result, SqlValue, Value};

/// Column storage class a mapper writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
   Integer,
   Real,
   Text,
   Blob,
}

impl ColumnType {
   pub fn as_str(&self) -> &'static str {
      match self {
         ColumnType::Integer => "INTEGER",
         ColumnType::Real => "REAL",
         ColumnType::Text => "TEXT",
         ColumnType::Blob => "BLOB",
      }
   }

   /// Returns true if a declared column type names this storage class.
   pub fn matches(&self, declared: &str) -> bool {
      declared.trim().eq_ignore_ascii_case(self.as_str())
   }
}

impl fmt::Display for ColumnType {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str(self.as_str())
   }
}

/// Where a retrieved column value goes.
#[derive(Clone, Copy)]
pub struct Target<'a> {
   pub entity: &'a Entity,
   pub property: &'a Arc<PropertyMeta>,
   /// Relation aspects attached on retrieval load through this
   pub source: &'a Source,
}

/// Converts values of one family of property types to and from a column.
pub trait Mapper: Send + Sync {
   fn maps(&self, ty: &PropertyType) -> bool;

   fn column_type(&self) -> ColumnType;

   fn encode(&self, property: &PropertyMeta, value: &Value) -> Result<SqlValue>;

   fn decode(&self, property: &PropertyMeta, raw: SqlValue) -> Result<Value>;

   /// Column value for `property` of `entity` on insert and update.
   fn bind(&self, entity: &Entity, property: &PropertyMeta) -> Result<SqlValue> {
      self.encode(property, &entity.raw(property)?)
   }

   /// Store a retrieved column value into the target slot.
   fn retrieve(&self, target: Target<'_>, raw: SqlValue) -> Result<()> {
      let value = self.decode(target.property, raw)?;
      target.entity.set_raw(target.property, value)
   }

   /// Query argument comparing `property` against `value`.
   fn argument(&self, property: &PropertyMeta, value: &Value) -> Result<SqlValue> {
      self.encode(property, value)
   }
}

/// Ordered mapper list.
#[derive(Clone)]
pub struct Mapping {
   mappers: Vec<Arc<dyn Mapper>>,
}

impl Mapping {
   pub fn empty() -> Self {
      Self {
         mappers: Vec::new(),
      }
   }

   /// Add `mapper` ahead of every registered mapper.
   pub fn prepend(mut self, mapper: impl Mapper + 'static) -> Self {
      self.mappers.insert(0, Arc::new(mapper));
      self
   }

   /// Add `mapper` after every registered mapper.
   pub fn append(mut self, mapper: impl Mapper + 'static) -> Self {
      self.mappers.push(Arc::new(mapper));
      self
   }

   /// Mapper handling `property`.
   pub fn mapper(&self, property: &PropertyMeta) -> Result<&dyn Mapper> {
      self
         .mappers
         .iter()
         .find(|m| m.maps(property.property_type()))
         .map(|m| m.as_ref())
         .ok_or_else(|| Error::NoMapper {
            property: property.qualified(),
            ty: property.property_type().to_string(),
         })
   }
}

impl Default for Mapping {
   fn default() -> Self {
      Mapping::empty()
         .append(BoolMapper)
         .append(IntegerMapper)
         .append(RealMapper)
         .append(CharMapper)
         .append(TextMapper)
         .append(BytesMapper)
         .append(DateMapper)
         .append(EnumMapper)
         .append(LocaleMapper)
         .append(JsonMapper)
         .append(EntityMapper)
         .append(CollectionMapper)
   }
}

impl fmt::Debug for Mapping {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("Mapping")
         .field("mappers", &self.mappers.len())
         .finish()
   }
}
