//! Mappers for relation properties.
//!
//! To-one relations store the target's row id. To-many relations store the member ids
//! as TEXT of the form `{1}{2}{3}`, which keeps membership testable from SQL with
//! `instr`.

use std::fmt::Write as _;

use super::{ColumnType, Mapper, Target};
use crate::aspect::{Relation, ToManyRelation, TRANSIENT, VOID};
use crate::entity::{Entity, PropertyMeta, PropertyType};
use crate::{Error, Result, SqlValue, Value};

fn persisted_id(property: &PropertyMeta, entity: &Entity) -> Result<i64> {
   match entity.id() {
      TRANSIENT => Err(Error::TransientReference(property.qualified())),
      id => Ok(id),
   }
}

/// Render member ids in their stored form.
pub fn format_ids(ids: &[i64]) -> String {
   let mut text = String::with_capacity(ids.len() * 4);
   for id in ids {
      let _ = write!(text, "{{{id}}}");
   }
   text
}

/// Parse the stored form of member ids.
pub fn parse_ids(text: &str) -> Result<Vec<i64>> {
   let invalid = || Error::conversion("member ids", text);
   let mut ids = Vec::new();
   let mut rest = text.trim();
   while !rest.is_empty() {
      let inner = rest.strip_prefix('{').ok_or_else(invalid)?;
      let (id, tail) = inner.split_once('}').ok_or_else(invalid)?;
      ids.push(id.trim().parse::<i64>().map_err(|_| invalid())?);
      rest = tail;
   }
   Ok(ids)
}

/// To-one relations as the INTEGER id of the target row.
pub struct EntityMapper;

impl Mapper for EntityMapper {
   fn maps(&self, ty: &PropertyType) -> bool {
      ty.is_relation()
   }

   fn column_type(&self) -> ColumnType {
      ColumnType::Integer
   }

   fn encode(&self, property: &PropertyMeta, value: &Value) -> Result<SqlValue> {
      match value {
         Value::Null => Ok(SqlValue::Null),
         Value::Entity(target) => Ok(SqlValue::Integer(persisted_id(property, target)?)),
         Value::Long(id) => Ok(SqlValue::Integer(*id)),
         other => Err(Error::conversion(property.property_type().to_string(), other)),
      }
   }

   fn decode(&self, _property: &PropertyMeta, raw: SqlValue) -> Result<Value> {
      Ok(raw.as_i64().map_or(Value::Null, Value::Long))
   }

   fn bind(&self, entity: &Entity, property: &PropertyMeta) -> Result<SqlValue> {
      match entity.raw(property)? {
         Value::Null => {
            // not loaded, keep whatever the row points at
            match Relation::of(entity, property) {
               Some(relation) if relation.id() > 0 => Ok(SqlValue::Integer(relation.id())),
               _ => Ok(SqlValue::Null),
            }
         }
         value => self.encode(property, &value),
      }
   }

   fn retrieve(&self, target: Target<'_>, raw: SqlValue) -> Result<()> {
      let id = raw.as_i64().unwrap_or(VOID);
      target.entity.set_raw(target.property, Value::Null)?;
      Relation::track(target.entity, target.property, id, target.source);
      Ok(())
   }
}

/// To-many relations as TEXT lists of member ids.
pub struct CollectionMapper;

impl CollectionMapper {
   fn ids(property: &PropertyMeta, members: &[Entity]) -> Result<Vec<i64>> {
      members.iter().map(|m| persisted_id(property, m)).collect()
   }
}

impl Mapper for CollectionMapper {
   fn maps(&self, ty: &PropertyType) -> bool {
      ty.is_collection()
   }

   fn column_type(&self) -> ColumnType {
      ColumnType::Text
   }

   fn encode(&self, property: &PropertyMeta, value: &Value) -> Result<SqlValue> {
      match value {
         Value::Null => Ok(SqlValue::Null),
         Value::Entities(members) => Ok(SqlValue::Text(format_ids(&Self::ids(
            property, members,
         )?))),
         Value::Text(text) => Ok(SqlValue::Text(text.clone())),
         other => Err(Error::conversion(property.property_type().to_string(), other)),
      }
   }

   fn decode(&self, _property: &PropertyMeta, raw: SqlValue) -> Result<Value> {
      Ok(match raw {
         SqlValue::Text(text) => Value::Text(text),
         _ => Value::Null,
      })
   }

   fn bind(&self, entity: &Entity, property: &PropertyMeta) -> Result<SqlValue> {
      match entity.raw(property)? {
         Value::Null => match ToManyRelation::of(entity, property) {
            Some(relation) => Ok(SqlValue::Text(format_ids(&relation.ids()))),
            None => Ok(SqlValue::Null),
         },
         value => self.encode(property, &value),
      }
   }

   fn retrieve(&self, target: Target<'_>, raw: SqlValue) -> Result<()> {
      let ids = match raw.as_str() {
         Some(text) => parse_ids(text)?,
         None => Vec::new(),
      };
      target.entity.set_raw(target.property, Value::Null)?;
      ToManyRelation::track(target.entity, target.property, ids, target.source, false);
      Ok(())
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::EntityKind;
   use crate::aspect::Row;

   #[test]
   fn test_id_list_format() {
      assert_eq!(format_ids(&[1, 22, 3]), "{1}{22}{3}");
      assert_eq!(format_ids(&[]), "");
      assert_eq!(parse_ids("{1}{22}{3}").unwrap(), [1, 22, 3]);
      assert!(parse_ids("").unwrap().is_empty());
      assert!(parse_ids("{1}{x}").is_err());
      assert!(parse_ids("1,2").is_err());
   }

   #[test]
   fn test_transient_target_is_rejected() {
      let mut kind = EntityKind::builder("test.Node");
      let next = kind.relation("next", "test.Node");
      let children = kind.list("children", "test.Node");
      let kind = kind.build().unwrap();

      let owner = Entity::new(&kind);
      let target = Entity::new(&kind);
      owner.set_raw(&next, Value::Entity(target.clone())).unwrap();
      let err = EntityMapper.bind(&owner, &next).unwrap_err();
      assert_eq!(err.error_code(), "TRANSIENT_REFERENCE");

      Row::set_id(&target, 8).unwrap();
      assert_eq!(EntityMapper.bind(&owner, &next).unwrap(), SqlValue::Integer(8));

      owner
         .set_raw(&children, Value::Entities(vec![target.clone(), target]))
         .unwrap();
      assert_eq!(
         CollectionMapper.bind(&owner, &children).unwrap(),
         SqlValue::Text("{8}{8}".into())
      );
   }
}
