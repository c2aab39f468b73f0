//! Mappers for scalar property types.

use serde_json::Value as JsonValue;
use time::OffsetDateTime;

use super::{ColumnType, Mapper};
use crate::entity::{PropertyMeta, PropertyType};
use crate::value::Locale;
use crate::{Error, Result, SqlValue, Value};

fn mismatch(property: &PropertyMeta, found: impl std::fmt::Debug) -> Error {
   Error::conversion(property.property_type().to_string(), found)
}

/// `bool` as INTEGER 0/1.
pub struct BoolMapper;

impl Mapper for BoolMapper {
   fn maps(&self, ty: &PropertyType) -> bool {
      *ty == PropertyType::Bool
   }

   fn column_type(&self) -> ColumnType {
      ColumnType::Integer
   }

   fn encode(&self, property: &PropertyMeta, value: &Value) -> Result<SqlValue> {
      match value {
         Value::Null => Ok(SqlValue::Null),
         Value::Bool(v) => Ok(SqlValue::Integer(i64::from(*v))),
         other => Err(mismatch(property, other)),
      }
   }

   fn decode(&self, property: &PropertyMeta, raw: SqlValue) -> Result<Value> {
      match raw {
         SqlValue::Null => Ok(Value::Null),
         other => other
            .as_i64()
            .map(|v| Value::Bool(v != 0))
            .ok_or_else(|| mismatch(property, other)),
      }
   }
}

/// Signed integers of every width as INTEGER.
pub struct IntegerMapper;

impl Mapper for IntegerMapper {
   fn maps(&self, ty: &PropertyType) -> bool {
      matches!(
         ty,
         PropertyType::Byte | PropertyType::Short | PropertyType::Int | PropertyType::Long
      )
   }

   fn column_type(&self) -> ColumnType {
      ColumnType::Integer
   }

   fn encode(&self, property: &PropertyMeta, value: &Value) -> Result<SqlValue> {
      match value {
         Value::Null => Ok(SqlValue::Null),
         Value::Byte(v) => Ok(SqlValue::Integer(i64::from(*v))),
         Value::Short(v) => Ok(SqlValue::Integer(i64::from(*v))),
         Value::Int(v) => Ok(SqlValue::Integer(i64::from(*v))),
         Value::Long(v) => Ok(SqlValue::Integer(*v)),
         other => Err(mismatch(property, other)),
      }
   }

   fn decode(&self, property: &PropertyMeta, raw: SqlValue) -> Result<Value> {
      if raw.is_null() {
         return Ok(Value::Null);
      }
      let v = raw.as_i64().ok_or_else(|| mismatch(property, &raw))?;
      let out_of_range = |_| mismatch(property, v);
      Ok(match property.property_type() {
         PropertyType::Byte => Value::Byte(i8::try_from(v).map_err(out_of_range)?),
         PropertyType::Short => Value::Short(i16::try_from(v).map_err(out_of_range)?),
         PropertyType::Int => Value::Int(i32::try_from(v).map_err(out_of_range)?),
         _ => Value::Long(v),
      })
   }
}

/// `f32`/`f64` as REAL.
pub struct RealMapper;

impl Mapper for RealMapper {
   fn maps(&self, ty: &PropertyType) -> bool {
      matches!(ty, PropertyType::Float | PropertyType::Double)
   }

   fn column_type(&self) -> ColumnType {
      ColumnType::Real
   }

   fn encode(&self, property: &PropertyMeta, value: &Value) -> Result<SqlValue> {
      match value {
         Value::Null => Ok(SqlValue::Null),
         Value::Float(v) => Ok(SqlValue::Real(f64::from(*v))),
         Value::Double(v) => Ok(SqlValue::Real(*v)),
         other => Err(mismatch(property, other)),
      }
   }

   fn decode(&self, property: &PropertyMeta, raw: SqlValue) -> Result<Value> {
      if raw.is_null() {
         return Ok(Value::Null);
      }
      let v = raw.as_f64().ok_or_else(|| mismatch(property, &raw))?;
      Ok(match property.property_type() {
         PropertyType::Float => Value::Float(v as f32),
         _ => Value::Double(v),
      })
   }
}

/// `char` as one-character TEXT.
pub struct CharMapper;

impl Mapper for CharMapper {
   fn maps(&self, ty: &PropertyType) -> bool {
      *ty == PropertyType::Char
   }

   fn column_type(&self) -> ColumnType {
      ColumnType::Text
   }

   fn encode(&self, property: &PropertyMeta, value: &Value) -> Result<SqlValue> {
      match value {
         Value::Null => Ok(SqlValue::Null),
         Value::Char(c) => Ok(SqlValue::Text(c.to_string())),
         other => Err(mismatch(property, other)),
      }
   }

   fn decode(&self, property: &PropertyMeta, raw: SqlValue) -> Result<Value> {
      match raw {
         SqlValue::Null => Ok(Value::Null),
         SqlValue::Text(text) => Ok(Value::Char(text.chars().next().unwrap_or('\0'))),
         other => Err(mismatch(property, other)),
      }
   }
}

/// `String` as TEXT.
pub struct TextMapper;

impl Mapper for TextMapper {
   fn maps(&self, ty: &PropertyType) -> bool {
      *ty == PropertyType::Text
   }

   fn column_type(&self) -> ColumnType {
      ColumnType::Text
   }

   fn encode(&self, property: &PropertyMeta, value: &Value) -> Result<SqlValue> {
      match value {
         Value::Null => Ok(SqlValue::Null),
         Value::Text(v) => Ok(SqlValue::Text(v.clone())),
         other => Err(mismatch(property, other)),
      }
   }

   fn decode(&self, property: &PropertyMeta, raw: SqlValue) -> Result<Value> {
      match raw {
         SqlValue::Null => Ok(Value::Null),
         SqlValue::Text(text) => Ok(Value::Text(text)),
         SqlValue::Integer(v) => Ok(Value::Text(v.to_string())),
         SqlValue::Real(v) => Ok(Value::Text(v.to_string())),
         other => Err(mismatch(property, other)),
      }
   }
}

/// `Vec<u8>` as BLOB.
pub struct BytesMapper;

impl Mapper for BytesMapper {
   fn maps(&self, ty: &PropertyType) -> bool {
      *ty == PropertyType::Bytes
   }

   fn column_type(&self) -> ColumnType {
      ColumnType::Blob
   }

   fn encode(&self, property: &PropertyMeta, value: &Value) -> Result<SqlValue> {
      match value {
         Value::Null => Ok(SqlValue::Null),
         Value::Bytes(v) => Ok(SqlValue::Blob(v.clone())),
         other => Err(mismatch(property, other)),
      }
   }

   fn decode(&self, property: &PropertyMeta, raw: SqlValue) -> Result<Value> {
      match raw {
         SqlValue::Null => Ok(Value::Null),
         SqlValue::Blob(v) => Ok(Value::Bytes(v)),
         SqlValue::Text(v) => Ok(Value::Bytes(v.into_bytes())),
         other => Err(mismatch(property, other)),
      }
   }
}

/// Timestamps as INTEGER milliseconds since the Unix epoch, UTC.
pub struct DateMapper;

impl DateMapper {
   pub fn to_millis(date: &OffsetDateTime) -> i64 {
      (date.unix_timestamp_nanos() / 1_000_000) as i64
   }

   pub fn from_millis(millis: i64) -> Result<OffsetDateTime> {
      OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
         .map_err(|e| Error::conversion("Date", e))
   }
}

impl Mapper for DateMapper {
   fn maps(&self, ty: &PropertyType) -> bool {
      *ty == PropertyType::Date
   }

   fn column_type(&self) -> ColumnType {
      ColumnType::Integer
   }

   fn encode(&self, property: &PropertyMeta, value: &Value) -> Result<SqlValue> {
      match value {
         Value::Null => Ok(SqlValue::Null),
         Value::Date(date) => Ok(SqlValue::Integer(Self::to_millis(date))),
         other => Err(mismatch(property, other)),
      }
   }

   fn decode(&self, property: &PropertyMeta, raw: SqlValue) -> Result<Value> {
      match raw {
         SqlValue::Null => Ok(Value::Null),
         other => {
            let millis = other.as_i64().ok_or_else(|| mismatch(property, &other))?;
            Ok(Value::Date(Self::from_millis(millis)?))
         }
      }
   }
}

/// Enum variants as TEXT names.
pub struct EnumMapper;

impl Mapper for EnumMapper {
   fn maps(&self, ty: &PropertyType) -> bool {
      matches!(ty, PropertyType::Enum(_))
   }

   fn column_type(&self) -> ColumnType {
      ColumnType::Text
   }

   fn encode(&self, property: &PropertyMeta, value: &Value) -> Result<SqlValue> {
      match value {
         Value::Null => Ok(SqlValue::Null),
         Value::Enum(name) => Ok(SqlValue::Text(name.clone())),
         other => Err(mismatch(property, other)),
      }
   }

   fn decode(&self, property: &PropertyMeta, raw: SqlValue) -> Result<Value> {
      match (raw, property.property_type()) {
         (SqlValue::Null, _) => Ok(Value::Null),
         (SqlValue::Text(name), PropertyType::Enum(ty)) if ty.contains(&name) => {
            Ok(Value::Enum(name))
         }
         (other, _) => Err(mismatch(property, other)),
      }
   }
}

/// [`Locale`] as its TEXT form.
pub struct LocaleMapper;

impl Mapper for LocaleMapper {
   fn maps(&self, ty: &PropertyType) -> bool {
      *ty == PropertyType::Locale
   }

   fn column_type(&self) -> ColumnType {
      ColumnType::Text
   }

   fn encode(&self, property: &PropertyMeta, value: &Value) -> Result<SqlValue> {
      match value {
         Value::Null => Ok(SqlValue::Null),
         Value::Locale(locale) => Ok(SqlValue::Text(locale.to_string())),
         other => Err(mismatch(property, other)),
      }
   }

   fn decode(&self, property: &PropertyMeta, raw: SqlValue) -> Result<Value> {
      match raw {
         SqlValue::Null => Ok(Value::Null),
         SqlValue::Text(text) => Ok(Value::Locale(text.parse::<Locale>()?)),
         other => Err(mismatch(property, other)),
      }
   }
}

/// Arbitrary JSON documents as TEXT.
pub struct JsonMapper;

impl Mapper for JsonMapper {
   fn maps(&self, ty: &PropertyType) -> bool {
      *ty == PropertyType::Json
   }

   fn column_type(&self) -> ColumnType {
      ColumnType::Text
   }

   fn encode(&self, property: &PropertyMeta, value: &Value) -> Result<SqlValue> {
      match value {
         Value::Null => Ok(SqlValue::Null),
         Value::Json(json) => serde_json::to_string(json)
            .map(SqlValue::Text)
            .map_err(|e| mismatch(property, e)),
         other => Err(mismatch(property, other)),
      }
   }

   fn decode(&self, property: &PropertyMeta, raw: SqlValue) -> Result<Value> {
      match raw {
         SqlValue::Null => Ok(Value::Null),
         SqlValue::Text(text) => serde_json::from_str::<JsonValue>(&text)
            .map(Value::Json)
            .map_err(|e| mismatch(property, e)),
         other => Err(mismatch(property, other)),
      }
   }
}

#[cfg(test)]
mod tests {
   use time::macros::datetime;

   use super::*;
   use crate::EntityKind;

   #[test]
   fn test_integer_range_is_checked() {
      let mut kind = EntityKind::builder("test.Small");
      let byte = kind.property::<i8>("b");
      kind.build().unwrap();

      assert_eq!(
         IntegerMapper.decode(&byte, SqlValue::Integer(-5)).unwrap(),
         Value::Byte(-5)
      );
      assert!(IntegerMapper.decode(&byte, SqlValue::Integer(300)).is_err());
   }

   #[test]
   fn test_date_millis() {
      let date = datetime!(2024-02-29 12:30:15.250 UTC);
      let millis = DateMapper::to_millis(&date);
      assert_eq!(millis, 1_709_209_815_250);
      assert_eq!(DateMapper::from_millis(millis).unwrap(), date);
   }

   #[test]
   fn test_enum_rejects_unknown_variant() {
      crate::property_enum! {
         enum Color { Red, Green }
      }
      let mut kind = EntityKind::builder("test.Paint");
      let color = kind.property::<Color>("color");
      kind.build().unwrap();

      assert_eq!(
         EnumMapper.decode(&color, SqlValue::Text("Green".into())).unwrap(),
         Value::Enum("Green".into())
      );
      assert!(EnumMapper.decode(&color, SqlValue::Text("Blue".into())).is_err());
   }

   #[test]
   fn test_json_text() {
      let mut kind = EntityKind::builder("test.Doc");
      let body = kind.property::<JsonValue>("body");
      kind.build().unwrap();

      let value = Value::Json(serde_json::json!({"a": [1, 2]}));
      let raw = JsonMapper.encode(&body, &value).unwrap();
      assert_eq!(raw, SqlValue::Text(r#"{"a":[1,2]}"#.into()));
      assert!(JsonMapper.decode(&body, SqlValue::Text("{".into())).is_err());
   }
}
