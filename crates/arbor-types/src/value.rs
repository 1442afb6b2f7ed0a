use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::FormatError;

/// A document tree.
///
/// Mapping keys are kept in a `BTreeMap`, so reading a document back always
/// yields keys in sorted order regardless of insertion order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum Value {
    #[default]
    Null,
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Build a mapping from `(key, value)` pairs.
    pub fn map<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Build a list from anything convertible into values.
    pub fn list<V, I>(items: I) -> Self
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        Value::List(items.into_iter().map(Into::into).collect())
    }

    /// An empty mapping.
    pub fn empty_map() -> Self {
        Value::Map(BTreeMap::new())
    }

    /// An empty list.
    pub fn empty_list() -> Self {
        Value::List(Vec::new())
    }

    /// Returns `true` for lists and mappings.
    pub fn is_container(&self) -> bool {
        matches!(self, Value::List(_) | Value::Map(_))
    }

    /// Short human-readable name of the node kind, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(v: BTreeMap<String, Value>) -> Self {
        Value::Map(v)
    }
}

impl From<Scalar> for Value {
    fn from(s: Scalar) -> Self {
        match s {
            Scalar::Null => Value::Null,
            Scalar::Int(v) => Value::Int(v),
            Scalar::Float(v) => Value::Float(v),
            Scalar::Str(v) => Value::Str(v),
            Scalar::Bytes(v) => Value::Bytes(v),
            Scalar::MapPointer => Value::empty_map(),
            Scalar::ListPointer => Value::empty_list(),
        }
    }
}

/// JSON has no byte strings and no separate boolean kind in the document
/// model: booleans become `0` / `1`, and unsigned integers beyond `i64`
/// become floats.
impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Int(i64::from(b)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(entries) => Value::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

/// A leaf value as stored in a field table.
///
/// The two pointer variants are sentinels recording that a path holds an
/// empty mapping or an empty list. They are stored as integer `0` in the
/// value column.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    Null,
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    MapPointer,
    ListPointer,
}

impl Scalar {
    /// The storage type tag of this scalar.
    pub fn type_tag(&self) -> TypeTag {
        match self {
            Scalar::Null => TypeTag::Null,
            Scalar::Int(_) => TypeTag::Int,
            Scalar::Float(_) => TypeTag::Float,
            Scalar::Str(_) => TypeTag::Text,
            Scalar::Bytes(_) => TypeTag::Bytes,
            Scalar::MapPointer => TypeTag::Map,
            Scalar::ListPointer => TypeTag::List,
        }
    }

    /// Returns `true` for the container sentinels.
    pub fn is_pointer(&self) -> bool {
        matches!(self, Scalar::MapPointer | Scalar::ListPointer)
    }

    /// Convert a non-container document node into a scalar.
    ///
    /// Empty containers become pointers; non-empty containers are rejected
    /// because they are not leaves.
    pub fn from_value(value: &Value) -> Result<Self, FormatError> {
        Ok(match value {
            Value::Null => Scalar::Null,
            Value::Int(v) => Scalar::Int(*v),
            Value::Float(v) => Scalar::Float(*v),
            Value::Str(v) => Scalar::Str(v.clone()),
            Value::Bytes(v) => Scalar::Bytes(v.clone()),
            Value::List(items) if items.is_empty() => Scalar::ListPointer,
            Value::Map(entries) if entries.is_empty() => Scalar::MapPointer,
            other => {
                return Err(FormatError::UnsupportedValue(format!(
                    "non-empty {} is not a leaf value",
                    other.kind_name()
                )))
            }
        })
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Int(v)
    }
}

impl From<i32> for Scalar {
    fn from(v: i32) -> Self {
        Scalar::Int(i64::from(v))
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Float(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::Str(v.to_string())
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Scalar::Str(v)
    }
}

/// Storage type of a leaf. Each (path, type) pair has its own field table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TypeTag {
    Int,
    Float,
    Text,
    Bytes,
    Null,
    Map,
    List,
}

impl TypeTag {
    pub const ALL: [TypeTag; 7] = [
        TypeTag::Int,
        TypeTag::Float,
        TypeTag::Text,
        TypeTag::Bytes,
        TypeTag::Null,
        TypeTag::Map,
        TypeTag::List,
    ];

    /// The name used in table names and in the catalog `type` column.
    pub fn as_str(self) -> &'static str {
        match self {
            TypeTag::Int => "int",
            TypeTag::Float => "float",
            TypeTag::Text => "text",
            TypeTag::Bytes => "bytes",
            TypeTag::Null => "null",
            TypeTag::Map => "map",
            TypeTag::List => "list",
        }
    }

    /// Null fields store no value column; every other type does.
    pub fn has_value_column(self) -> bool {
        !matches!(self, TypeTag::Null)
    }

    /// Container sentinel types.
    pub fn is_pointer(self) -> bool {
        matches!(self, TypeTag::Map | TypeTag::List)
    }

    /// Types that support `<`, `<=`, `>` and `>=`.
    pub fn is_orderable(self) -> bool {
        matches!(
            self,
            TypeTag::Int | TypeTag::Float | TypeTag::Text | TypeTag::Bytes
        )
    }

    /// Types that support regex matching.
    pub fn is_matchable(self) -> bool {
        matches!(self, TypeTag::Text | TypeTag::Bytes)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TypeTag {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TypeTag::ALL
            .into_iter()
            .find(|tag| tag.as_str() == s)
            .ok_or_else(|| FormatError::UnknownTypeTag(s.to_string()))
    }
}
