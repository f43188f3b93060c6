//! Value types carried by triggers, notifications and document fields.
//!
//! Values are JSON-like with one domain-specific identifier type, `ObjectId`.
//! Structural equality is the derived `PartialEq` and deep cloning is the
//! derived `Clone`; nothing in a `Value` is shared between copies.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Document fields keyed by field name.
pub type Fields = BTreeMap<String, Value>;

/// Field updates for a `changed` event. `None` clears the field.
pub type FieldChanges = BTreeMap<String, Option<Value>>;

/// Error parsing an `ObjectId` from its hex form.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid ObjectId '{input}': expected 24 hex characters")]
pub struct ParseObjectIdError {
    input: String,
}

/// A 12-byte document identifier, written as 24 lowercase hex characters.
///
/// # Examples
///
/// ```
/// use livemux::ObjectId;
///
/// let id: ObjectId = "5f1d7a3b9c8e4d2a1b0c9f8e".parse().unwrap();
/// assert_eq!(id.to_hex(), "5f1d7a3b9c8e4d2a1b0c9f8e");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 12]);

impl ObjectId {
    /// Wraps raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes.
    #[must_use]
    pub const fn bytes(&self) -> &[u8; 12] {
        &self.0
    }

    /// Lowercase hex form.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// True if `s` has the textual shape of an ObjectId.
    #[must_use]
    pub fn looks_like(s: &str) -> bool {
        s.len() == 24 && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    }
}

impl FromStr for ObjectId {
    type Err = ParseObjectIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseObjectIdError {
            input: s.to_string(),
        };
        if s.len() != 24 {
            return Err(err());
        }
        let mut bytes = [0u8; 12];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| err())?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for ObjectId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A document identifier as supplied by a change producer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DocumentId {
    ObjectId(ObjectId),
    String(String),
}

impl DocumentId {
    /// Canonical string form used as the cache and delivery key.
    ///
    /// ObjectIds become their hex form. Strings that could be mistaken for an
    /// escaped id (leading `-`, `~` or `{`, or ObjectId-shaped) get a `-`
    /// prefix. Everything else passes through unchanged.
    #[must_use]
    pub fn stringify(&self) -> String {
        match self {
            Self::ObjectId(oid) => oid.to_hex(),
            Self::String(s) if s.is_empty() => String::new(),
            Self::String(s) => {
                if s.starts_with(['-', '~', '{']) || ObjectId::looks_like(s) {
                    format!("-{s}")
                } else {
                    s.clone()
                }
            }
        }
    }

    /// Inverse of [`DocumentId::stringify`].
    #[must_use]
    pub fn parse(s: &str) -> Self {
        if let Some(rest) = s.strip_prefix('-') {
            return Self::String(rest.to_string());
        }
        match s.parse::<ObjectId>() {
            Ok(oid) if ObjectId::looks_like(s) => Self::ObjectId(oid),
            _ => Self::String(s.to_string()),
        }
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ObjectId(oid) => write!(f, "ObjectId({oid})"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for DocumentId {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for DocumentId {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<ObjectId> for DocumentId {
    fn from(v: ObjectId) -> Self {
        Self::ObjectId(v)
    }
}

/// JSON-like value with an `ObjectId` extension.
///
/// # Examples
///
/// ```
/// use livemux::Value;
///
/// let s = Value::from("orders");
/// assert!(s.is_string());
/// assert_eq!(s.as_str(), Some("orders"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    ObjectId(ObjectId),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

#[allow(missing_docs)]
impl Value {
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub const fn is_string(&self) -> bool {
        matches!(self, Self::String(_))
    }

    pub const fn is_object_id(&self) -> bool {
        matches!(self, Self::ObjectId(_))
    }

    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    pub const fn as_object_id(&self) -> Option<&ObjectId> {
        match self {
            Self::ObjectId(v) => Some(v),
            _ => None,
        }
    }

    /// Returns a human-readable type name.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::ObjectId(_) => "object_id",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v:?}"),
            Self::ObjectId(v) => write!(f, "ObjectId({v})"),
            Self::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Self::Object(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{k:?}:{v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<ObjectId> for Value {
    fn from(v: ObjectId) -> Self {
        Self::ObjectId(v)
    }
}

impl From<DocumentId> for Value {
    fn from(v: DocumentId) -> Self {
        match v {
            DocumentId::ObjectId(oid) => Self::ObjectId(oid),
            DocumentId::String(s) => Self::String(s),
        }
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::Array(v)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(v: BTreeMap<String, Value>) -> Self {
        Self::Object(v)
    }
}

/// Plain JSON converts structurally. An object of the form `{"$oid": "<hex>"}`
/// becomes an `ObjectId`.
impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            serde_json::Value::Object(map) => {
                if map.len() == 1 {
                    if let Some(oid) = map
                        .get("$oid")
                        .and_then(serde_json::Value::as_str)
                        .and_then(|s| s.parse::<ObjectId>().ok())
                    {
                        return Self::ObjectId(oid);
                    }
                }
                Self::Object(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}
