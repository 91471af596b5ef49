//! Typed field metadata and values.
//!
//! Every model type declares its fields as [`FieldDefinition`]s in a
//! [`ModelSchema`](crate::schema::ModelSchema). Values travel as [`FieldValue`]
//! and are checked against the declared [`FieldType`] before they are stored.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::NodeId;

/// Identifies a field across all model types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FieldId {
    // Shared by every model
    Id,
    Parent,
    Children,
    ChildTypes,

    // Calendar
    Owner,
    Uri,
    Timezone,
    DisplayName,

    // Event and Variation
    Name,
    Identifier,
    Rrule,
    Start,
    IsVariation,

    /// Non-standard `X-` properties or parameters carried through untouched
    Extensions,
}

impl FieldId {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldId::Id => "id",
            FieldId::Parent => "parent",
            FieldId::Children => "children",
            FieldId::ChildTypes => "child_types",
            FieldId::Owner => "owner",
            FieldId::Uri => "uri",
            FieldId::Timezone => "timezone",
            FieldId::DisplayName => "display_name",
            FieldId::Name => "name",
            FieldId::Identifier => "identifier",
            FieldId::Rrule => "rrule",
            FieldId::Start => "start",
            FieldId::IsVariation => "is_variation",
            FieldId::Extensions => "extensions",
        }
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    Null,
    Int,
    String,
    Bool,
    Date,
    Object,
    Array,
    ModelIterator,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::Null => "null",
            FieldType::Int => "int",
            FieldType::String => "string",
            FieldType::Bool => "bool",
            FieldType::Date => "date",
            FieldType::Object => "object",
            FieldType::Array => "array",
            FieldType::ModelIterator => "model iterator",
        };
        f.write_str(name)
    }
}

/// A field value. The variant determines its [`FieldType`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Null,
    Int(i64),
    String(String),
    Bool(bool),
    Date(DateTime<Utc>),
    /// Ordered key/value pairs (e.g. `X-` extensions)
    Object(Vec<(String, String)>),
    Array(Vec<FieldValue>),
    ModelIterator(Vec<NodeId>),
}

impl FieldValue {
    pub fn field_type(&self) -> FieldType {
        match self {
            FieldValue::Null => FieldType::Null,
            FieldValue::Int(_) => FieldType::Int,
            FieldValue::String(_) => FieldType::String,
            FieldValue::Bool(_) => FieldType::Bool,
            FieldValue::Date(_) => FieldType::Date,
            FieldValue::Object(_) => FieldType::Object,
            FieldValue::Array(_) => FieldType::Array,
            FieldValue::ModelIterator(_) => FieldType::ModelIterator,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            FieldValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&[(String, String)]> {
        match self {
            FieldValue::Object(pairs) => Some(pairs),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::Date(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldMode {
    ReadWrite,
    ReadOnly,
}

/// Declared shape of one field on one model type.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDefinition {
    pub id: FieldId,
    /// Storage/serialization key. `None` marks the field as transient.
    pub name: Option<&'static str>,
    pub kind: FieldType,
    pub mode: FieldMode,
    pub optional: bool,
    /// Value a fresh model starts with
    pub default: FieldValue,
    /// Bit index assigned when the field is registered in a schema
    pub(crate) bit: u32,
}

impl FieldDefinition {
    /// A named, writable, required field defaulting to null.
    pub fn new(id: FieldId, kind: FieldType) -> Self {
        FieldDefinition {
            id,
            name: Some(id.as_str()),
            kind,
            mode: FieldMode::ReadWrite,
            optional: false,
            default: FieldValue::Null,
            bit: 0,
        }
    }

    pub fn read_only(mut self) -> Self {
        self.mode = FieldMode::ReadOnly;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn transient(mut self) -> Self {
        self.name = None;
        self
    }

    pub fn default_value(mut self, value: impl Into<FieldValue>) -> Self {
        self.default = value.into();
        self
    }

    pub fn is_read_only(&self) -> bool {
        self.mode == FieldMode::ReadOnly
    }

    pub fn bit(&self) -> u32 {
        self.bit
    }
}

/// A set of fields selected by their schema bit index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FieldMask(u64);

impl FieldMask {
    pub const NONE: FieldMask = FieldMask(0);
    pub const ALL: FieldMask = FieldMask(u64::MAX);

    pub fn from_bits(bits: u64) -> Self {
        FieldMask(bits)
    }

    pub fn bits(&self) -> u64 {
        self.0
    }

    pub fn with_bit(self, bit: u32) -> Self {
        FieldMask(self.0 | (1u64 << bit))
    }

    pub fn contains_bit(&self, bit: u32) -> bool {
        self.0 & (1u64 << bit) != 0
    }

    pub fn union(self, other: FieldMask) -> Self {
        FieldMask(self.0 | other.0)
    }
}

impl std::ops::BitOr for FieldMask {
    type Output = FieldMask;

    fn bitor(self, rhs: FieldMask) -> FieldMask {
        self.union(rhs)
    }
}
