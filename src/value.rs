//! In-memory and storage value representations.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use time::OffsetDateTime;

use crate::entity::PropertyType;
use crate::{Entity, Error, Result};

/// Storage representation of one column value, following SQLite's storage classes.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
   Null,
   Integer(i64),
   Real(f64),
   Text(String),
   Blob(Vec<u8>),
}

impl SqlValue {
   pub fn is_null(&self) -> bool {
      matches!(self, SqlValue::Null)
   }

   /// Integer view of the value; REAL values are truncated.
   pub fn as_i64(&self) -> Option<i64> {
      match self {
         SqlValue::Integer(v) => Some(*v),
         SqlValue::Real(v) => Some(*v as i64),
         _ => None,
      }
   }

   pub fn as_f64(&self) -> Option<f64> {
      match self {
         SqlValue::Integer(v) => Some(*v as f64),
         SqlValue::Real(v) => Some(*v),
         _ => None,
      }
   }

   pub fn as_str(&self) -> Option<&str> {
      match self {
         SqlValue::Text(v) => Some(v),
         _ => None,
      }
   }
}

/// Value held by a property slot.
///
/// Relation slots hold `Entity`/`Entities` once materialized and `Null` while the
/// related rows are only tracked by id.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
   Null,
   Bool(bool),
   Byte(i8),
   Short(i16),
   Int(i32),
   Long(i64),
   Float(f32),
   Double(f64),
   Char(char),
   Text(String),
   Bytes(Vec<u8>),
   Date(OffsetDateTime),
   Enum(String),
   Locale(Locale),
   Json(JsonValue),
   Entity(Entity),
   Entities(Vec<Entity>),
}

impl Value {
   pub fn is_null(&self) -> bool {
      matches!(self, Value::Null)
   }
}

/// Conversion between a Rust type and a property slot value.
pub trait PropertyValue: Sized + Send + Sync + 'static {
   fn into_value(self) -> Value;
   fn from_value(value: Value) -> Result<Self>;
}

/// A value type that can be declared directly as a property.
///
/// Relations are declared through the dedicated builder methods instead, since
/// their property type names the related kind.
pub trait ScalarValue: PropertyValue {
   fn property_type() -> PropertyType;
   fn default_value() -> Value;
}

macro_rules! scalar_value {
   ($ty:ty, $variant:ident, $property_type:expr, $default:expr) => {
      impl PropertyValue for $ty {
         fn into_value(self) -> Value {
            Value::$variant(self)
         }

         fn from_value(value: Value) -> Result<Self> {
            match value {
               Value::$variant(v) => Ok(v),
               Value::Null => Ok($default),
               other => Err(Error::conversion(stringify!($ty), other)),
            }
         }
      }

      impl ScalarValue for $ty {
         fn property_type() -> PropertyType {
            $property_type
         }

         fn default_value() -> Value {
            Value::$variant($default)
         }
      }
   };
}

scalar_value!(bool, Bool, PropertyType::Bool, false);
scalar_value!(i8, Byte, PropertyType::Byte, 0);
scalar_value!(i16, Short, PropertyType::Short, 0);
scalar_value!(i32, Int, PropertyType::Int, 0);
scalar_value!(i64, Long, PropertyType::Long, 0);
scalar_value!(f32, Float, PropertyType::Float, 0.0);
scalar_value!(f64, Double, PropertyType::Double, 0.0);
scalar_value!(char, Char, PropertyType::Char, '\0');
scalar_value!(String, Text, PropertyType::Text, String::new());
scalar_value!(Vec<u8>, Bytes, PropertyType::Bytes, Vec::new());
scalar_value!(
   OffsetDateTime,
   Date,
   PropertyType::Date,
   OffsetDateTime::UNIX_EPOCH
);
scalar_value!(Locale, Locale, PropertyType::Locale, Locale::default());
scalar_value!(JsonValue, Json, PropertyType::Json, JsonValue::Null);

impl<T: PropertyValue> PropertyValue for Option<T> {
   fn into_value(self) -> Value {
      self.map_or(Value::Null, T::into_value)
   }

   fn from_value(value: Value) -> Result<Self> {
      match value {
         Value::Null => Ok(None),
         other => T::from_value(other).map(Some),
      }
   }
}

impl<T: ScalarValue> ScalarValue for Option<T> {
   fn property_type() -> PropertyType {
      T::property_type()
   }

   fn default_value() -> Value {
      Value::Null
   }
}

impl PropertyValue for Entity {
   fn into_value(self) -> Value {
      Value::Entity(self)
   }

   fn from_value(value: Value) -> Result<Self> {
      match value {
         Value::Entity(entity) => Ok(entity),
         other => Err(Error::conversion("Entity", other)),
      }
   }
}

impl PropertyValue for Vec<Entity> {
   fn into_value(self) -> Value {
      Value::Entities(self)
   }

   fn from_value(value: Value) -> Result<Self> {
      match value {
         Value::Entities(entities) => Ok(entities),
         Value::Null => Ok(Vec::new()),
         other => Err(Error::conversion("Vec<Entity>", other)),
      }
   }
}

/// Language, country and variant triple, stored in its `ll_CC_variant` text form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Locale {
   language: String,
   country: String,
   variant: String,
}

impl Locale {
   pub fn new(language: impl Into<String>, country: impl Into<String>) -> Self {
      Self {
         language: language.into().to_lowercase(),
         country: country.into().to_uppercase(),
         variant: String::new(),
      }
   }

   pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
      self.variant = variant.into();
      self
   }

   pub fn language(&self) -> &str {
      &self.language
   }

   pub fn country(&self) -> &str {
      &self.country
   }

   pub fn variant(&self) -> &str {
      &self.variant
   }
}

impl fmt::Display for Locale {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str(&self.language)?;
      if !self.country.is_empty() || !self.variant.is_empty() {
         write!(f, "_{}", self.country)?;
      }
      if !self.variant.is_empty() {
         write!(f, "_{}", self.variant)?;
      }
      Ok(())
   }
}

impl FromStr for Locale {
   type Err = Error;

   fn from_str(s: &str) -> Result<Self> {
      let mut parts = s.splitn(3, '_');
      let language = parts.next().unwrap_or_default();
      let country = parts.next().unwrap_or_default();
      let variant = parts.next().unwrap_or_default();
      if !language.chars().all(|c| c.is_ascii_alphabetic()) {
         return Err(Error::conversion("Locale", s));
      }
      Ok(Locale::new(language, country).with_variant(variant))
   }
}

/// Declare an enum usable as a property type.
///
/// The enum is stored by variant name. Its first variant is the default value.
/// The macro derives `Debug`, `Clone`, `Copy`, `PartialEq`, `Eq` and `Hash`.
///
/// ```
/// sqlx_sqlite_orm::property_enum! {
///    pub enum Status { Draft, Published, Archived }
/// }
///
/// assert_eq!(Status::Published.name(), "Published");
/// ```
#[macro_export]
macro_rules! property_enum {
   ($(#[$meta:meta])* $vis:vis enum $name:ident { $first:ident $(, $rest:ident)* $(,)? }) => {
      $(#[$meta])*
      #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
      $vis enum $name {
         $first,
         $($rest,)*
      }

      impl $name {
         pub const VARIANTS: &'static [&'static str] =
            &[stringify!($first) $(, stringify!($rest))*];

         pub fn name(&self) -> &'static str {
            match self {
               Self::$first => stringify!($first),
               $(Self::$rest => stringify!($rest),)*
            }
         }
      }

      impl $crate::PropertyValue for $name {
         fn into_value(self) -> $crate::Value {
            $crate::Value::Enum(self.name().to_string())
         }

         fn from_value(value: $crate::Value) -> $crate::Result<Self> {
            match value {
               $crate::Value::Null => Ok(Self::$first),
               $crate::Value::Enum(ref name) | $crate::Value::Text(ref name) => {
                  match name.as_str() {
                     stringify!($first) => Ok(Self::$first),
                     $(stringify!($rest) => Ok(Self::$rest),)*
                     _ => Err($crate::Error::Conversion {
                        expected: stringify!($name).to_string(),
                        found: name.clone(),
                     }),
                  }
               }
               other => Err($crate::Error::Conversion {
                  expected: stringify!($name).to_string(),
                  found: format!("{other:?}"),
               }),
            }
         }
      }

      impl $crate::ScalarValue for $name {
         fn property_type() -> $crate::PropertyType {
            $crate::PropertyType::Enum($crate::EnumType::new(stringify!($name), Self::VARIANTS))
         }

         fn default_value() -> $crate::Value {
            $crate::Value::Enum(stringify!($first).to_string())
         }
      }
   };
}
