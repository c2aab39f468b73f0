//! Registration-time entity declarations.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::Arc;

use crate::value::{PropertyValue, ScalarValue};
use crate::{Entity, Error, Result, Value};

/// Name and variants of an enum property type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnumType {
   name: &'static str,
   variants: &'static [&'static str],
}

impl EnumType {
   pub const fn new(name: &'static str, variants: &'static [&'static str]) -> Self {
      Self { name, variants }
   }

   pub fn name(&self) -> &'static str {
      self.name
   }

   pub fn variants(&self) -> &'static [&'static str] {
      self.variants
   }

   /// Returns true if `name` is one of the declared variants.
   pub fn contains(&self, name: &str) -> bool {
      self.variants.contains(&name)
   }
}

/// Declared static type of a property; mappers are selected by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropertyType {
   Bool,
   Byte,
   Short,
   Int,
   Long,
   Float,
   Double,
   Char,
   Text,
   Bytes,
   Date,
   Enum(EnumType),
   Locale,
   Json,
   /// To-one relation to the named entity kind
   Entity(String),
   /// Ordered to-many relation to the named entity kind
   EntityList(String),
   /// Unordered to-many relation without duplicates
   EntitySet(String),
   /// User type handled by a user-registered mapper
   Custom(String),
}

impl PropertyType {
   /// Name of the related kind for relation types.
   pub fn target(&self) -> Option<&str> {
      match self {
         PropertyType::Entity(target)
         | PropertyType::EntityList(target)
         | PropertyType::EntitySet(target) => Some(target),
         _ => None,
      }
   }

   pub fn is_relation(&self) -> bool {
      matches!(self, PropertyType::Entity(_))
   }

   pub fn is_collection(&self) -> bool {
      matches!(
         self,
         PropertyType::EntityList(_) | PropertyType::EntitySet(_)
      )
   }
}

impl fmt::Display for PropertyType {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      match self {
         PropertyType::Enum(e) => write!(f, "Enum({})", e.name()),
         PropertyType::Entity(target) => write!(f, "Entity({target})"),
         PropertyType::EntityList(target) => write!(f, "List({target})"),
         PropertyType::EntitySet(target) => write!(f, "Set({target})"),
         PropertyType::Custom(name) => write!(f, "Custom({name})"),
         other => write!(f, "{other:?}"),
      }
   }
}

/// Per-field metadata, shared by every instance of the declaring kind and its subtypes.
///
/// Identity is the declaring kind plus the field name, so properties taken from
/// different instances of the same declared field compare equal.
#[derive(Debug)]
pub struct PropertyMeta {
   owner: String,
   name: String,
   ty: PropertyType,
   index: usize,
   default: Value,
}

impl PropertyMeta {
   /// Qualified name of the kind that declared this property.
   pub fn owner(&self) -> &str {
      &self.owner
   }

   pub fn name(&self) -> &str {
      &self.name
   }

   pub fn property_type(&self) -> &PropertyType {
      &self.ty
   }

   /// Position in the slot sequence of every kind that carries this property.
   pub fn index(&self) -> usize {
      self.index
   }

   pub fn default_value(&self) -> &Value {
      &self.default
   }

   /// `Owner.name`, for diagnostics.
   pub fn qualified(&self) -> String {
      format!("{}.{}", self.owner, self.name)
   }
}

impl PartialEq for PropertyMeta {
   fn eq(&self, other: &Self) -> bool {
      self.owner == other.owner && self.name == other.name
   }
}

impl Eq for PropertyMeta {}

impl Hash for PropertyMeta {
   fn hash<H: Hasher>(&self, state: &mut H) {
      self.owner.hash(state);
      self.name.hash(state);
   }
}

/// Typed handle to a declared property.
pub struct Property<T> {
   meta: Arc<PropertyMeta>,
   _type: PhantomData<fn() -> T>,
}

impl<T> Property<T> {
   fn new(meta: Arc<PropertyMeta>) -> Self {
      Self {
         meta,
         _type: PhantomData,
      }
   }

   pub fn meta(&self) -> &Arc<PropertyMeta> {
      &self.meta
   }
}

impl<T> Clone for Property<T> {
   fn clone(&self) -> Self {
      Self::new(Arc::clone(&self.meta))
   }
}

impl<T> Deref for Property<T> {
   type Target = PropertyMeta;

   fn deref(&self) -> &PropertyMeta {
      &self.meta
   }
}

impl<T> PartialEq for Property<T> {
   fn eq(&self, other: &Self) -> bool {
      self.meta == other.meta
   }
}

impl<T> fmt::Debug for Property<T> {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      write!(f, "Property({})", self.meta.qualified())
   }
}

/// Metadata of one entity type: its name, ancestry and ordered properties.
///
/// Inherited properties come first, followed by the ones the kind declares itself,
/// so a property keeps its slot index in every subtype.
#[derive(Debug)]
pub struct EntityKind {
   name: String,
   parent: Option<Arc<EntityKind>>,
   properties: Vec<Arc<PropertyMeta>>,
}

impl EntityKind {
   /// Start declaring a root kind. `name` is the fully qualified name, e.g. `app.model.Person`.
   pub fn builder(name: impl Into<String>) -> EntityKindBuilder {
      EntityKindBuilder {
         name: name.into(),
         parent: None,
         properties: Vec::new(),
      }
   }

   /// Start declaring a subtype of `parent`, sharing its table.
   pub fn extends(name: impl Into<String>, parent: &Arc<EntityKind>) -> EntityKindBuilder {
      EntityKindBuilder {
         name: name.into(),
         parent: Some(Arc::clone(parent)),
         properties: parent.properties.clone(),
      }
   }

   /// Fully qualified name.
   pub fn name(&self) -> &str {
      &self.name
   }

   /// Last segment of the qualified name.
   pub fn simple_name(&self) -> &str {
      self.name.rsplit('.').next().unwrap_or(&self.name)
   }

   pub fn parent(&self) -> Option<&Arc<EntityKind>> {
      self.parent.as_ref()
   }

   /// Furthest ancestor, i.e. the kind that names the shared table.
   pub fn root(&self) -> &EntityKind {
      let mut kind = self;
      while let Some(parent) = &kind.parent {
         kind = parent;
      }
      kind
   }

   pub fn is_root(&self) -> bool {
      self.parent.is_none()
   }

   /// Returns true if this kind is `other` or one of its descendants.
   pub fn is_a(&self, other: &EntityKind) -> bool {
      let mut kind = Some(self);
      while let Some(current) = kind {
         if current.name == other.name {
            return true;
         }
         kind = current.parent.as_deref();
      }
      false
   }

   /// Properties in declaration order.
   pub fn properties(&self) -> &[Arc<PropertyMeta>] {
      &self.properties
   }

   pub fn property(&self, name: &str) -> Option<&Arc<PropertyMeta>> {
      self.properties.iter().find(|p| p.name == name)
   }

   /// Slot index of `property`, failing if this kind does not carry it.
   pub fn index_of(&self, property: &PropertyMeta) -> Result<usize> {
      match self.properties.get(property.index) {
         Some(candidate) if **candidate == *property => Ok(property.index),
         _ => Err(Error::UnknownProperty {
            kind: self.name.clone(),
            property: property.qualified(),
         }),
      }
   }
}

/// Builder declaring the properties of an [`EntityKind`].
///
/// Each declaration allocates the next slot and returns a typed handle. Problems are
/// reported by [`build()`](Self::build).
pub struct EntityKindBuilder {
   name: String,
   parent: Option<Arc<EntityKind>>,
   properties: Vec<Arc<PropertyMeta>>,
}

impl EntityKindBuilder {
   fn declare<T>(&mut self, name: &str, ty: PropertyType, default: Value) -> Property<T> {
      let meta = Arc::new(PropertyMeta {
         owner: self.name.clone(),
         name: name.to_string(),
         ty,
         index: self.properties.len(),
         default,
      });
      self.properties.push(Arc::clone(&meta));
      Property::new(meta)
   }

   /// Declare a scalar property initialised to the type's default value.
   pub fn property<T: ScalarValue>(&mut self, name: &str) -> Property<T> {
      self.declare(name, T::property_type(), T::default_value())
   }

   /// Declare a scalar property with an explicit initial value.
   pub fn property_with_default<T: ScalarValue>(&mut self, name: &str, default: T) -> Property<T> {
      self.declare(name, T::property_type(), default.into_value())
   }

   /// Declare a to-one relation to the kind named `target`.
   pub fn relation(&mut self, name: &str, target: &str) -> Property<Option<Entity>> {
      self.declare(name, PropertyType::Entity(target.to_string()), Value::Null)
   }

   /// Declare an ordered to-many relation.
   pub fn list(&mut self, name: &str, target: &str) -> Property<Vec<Entity>> {
      self.declare(
         name,
         PropertyType::EntityList(target.to_string()),
         Value::Null,
      )
   }

   /// Declare an unordered to-many relation without duplicates.
   pub fn set(&mut self, name: &str, target: &str) -> Property<Vec<Entity>> {
      self.declare(
         name,
         PropertyType::EntitySet(target.to_string()),
         Value::Null,
      )
   }

   /// Declare a property of a user type; a mapper for `ty` must be registered.
   pub fn custom<T: PropertyValue>(&mut self, name: &str, ty: PropertyType, default: Value) -> Property<T> {
      self.declare(name, ty, default)
   }

   pub fn build(self) -> Result<Arc<EntityKind>> {
      let invalid = |reason: String| Error::InvalidDeclaration {
         kind: self.name.clone(),
         reason,
      };

      if self.name.is_empty() || !self.name.split('.').all(is_identifier) {
         return Err(invalid(format!("'{}' is not a qualified name", self.name)));
      }

      for (position, property) in self.properties.iter().enumerate() {
         if !is_identifier(&property.name) {
            return Err(invalid(format!(
               "'{}' is not a valid property name",
               property.name
            )));
         }
         if property.name.starts_with('_') {
            return Err(invalid(format!(
               "'{}' is reserved for row bookkeeping",
               property.name
            )));
         }
         if self.properties[..position]
            .iter()
            .any(|earlier| earlier.name.eq_ignore_ascii_case(&property.name))
         {
            return Err(invalid(format!(
               "property '{}' is declared twice",
               property.name
            )));
         }
      }

      Ok(Arc::new(EntityKind {
         name: self.name,
         parent: self.parent,
         properties: self.properties,
      }))
   }
}

fn is_identifier(name: &str) -> bool {
   let mut chars = name.chars();
   matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
      && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
