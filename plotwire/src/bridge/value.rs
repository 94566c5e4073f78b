//! Transport value model.
//!
//! Everything that crosses the RPC boundary is a [`Value`]. Variants are
//! adjacently tagged so that byte blobs, typed nulls and arrays stay distinct
//! from strings and plain nulls after a JSON round trip.

use std::path::PathBuf;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::dataset::Dataset;

/// A null carrying a declared type name.
///
/// Lets a caller pick between same-named remote procedures that differ only in
/// the declared type of one parameter. Two typed nulls are equal iff their
/// type names are equal; a typed null never equals [`Value::Null`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypedNull {
    pub declared_type: String,
}

impl TypedNull {
    pub const OBJECT: &'static str = "java.lang.Object";

    pub fn new(declared_type: impl Into<String>) -> Self {
        Self {
            declared_type: declared_type.into(),
        }
    }
}

impl Default for TypedNull {
    fn default() -> Self {
        Self::new(Self::OBJECT)
    }
}

impl std::fmt::Display for TypedNull {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({})null", self.declared_type)
    }
}

/// Opaque bytes, kept apart from text on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Binary(pub Vec<u8>);

impl Binary {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for Binary {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl Serialize for Binary {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for Binary {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64
            .decode(encoded.as_bytes())
            .map(Binary)
            .map_err(serde::de::Error::custom)
    }
}

/// Ordered string-keyed mapping, used for beans and keyword-style payloads.
pub type ValueMap = IndexMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    #[default]
    Null,
    TypedNull(TypedNull),
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Binary(Binary),
    List(Vec<Value>),
    Map(ValueMap),
    Array(Dataset),
    /// Array spooled to a `.dsr` file. Transport-only: receivers resolve it
    /// back into [`Value::Array`] before handlers or callers see it.
    Staged(PathBuf),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&ValueMap> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut ValueMap> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Dataset> {
        match self {
            Self::Array(ds) => Some(ds),
            _ => None,
        }
    }

    /// Name of the variant, used in type-check error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::TypedNull(_) => "typed_null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Binary(_) => "binary",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Array(_) => "array",
            Self::Staged(_) => "staged",
        }
    }

    /// Depth-first visit of every value, this one included.
    pub fn walk_mut<E>(&mut self, f: &mut impl FnMut(&mut Value) -> Result<(), E>) -> Result<(), E> {
        f(self)?;
        match self {
            Self::List(items) => items.iter_mut().try_for_each(|v| v.walk_mut(f)),
            Self::Map(map) => map.values_mut().try_for_each(|v| v.walk_mut(f)),
            _ => Ok(()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<TypedNull> for Value {
    fn from(n: TypedNull) -> Self {
        Self::TypedNull(n)
    }
}

impl From<Binary> for Value {
    fn from(b: Binary) -> Self {
        Self::Binary(b)
    }
}

impl From<Dataset> for Value {
    fn from(ds: Dataset) -> Self {
        Self::Array(ds)
    }
}

impl From<ValueMap> for Value {
    fn from(map: ValueMap) -> Self {
        Self::Map(map)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Self::Null, Into::into)
    }
}
