//! Trigger and notification messages.
//!
//! Both sides of a crossbar match are the same shape: a map from key to
//! `Value`. The `collection` key selects the bucket a message belongs to.

use std::collections::btree_map;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{MuxResult, ValidationError};
use crate::value::{DocumentId, Value};

/// Key naming the bucket of a message.
pub const COLLECTION_KEY: &str = "collection";
/// Key carrying a document identifier.
pub const ID_KEY: &str = "id";

/// A trigger (listener pattern) or a notification (concrete write).
///
/// # Examples
///
/// ```
/// use livemux::Message;
///
/// let n = Message::for_collection("orders").with_id("o-1");
/// assert_eq!(n.bucket().unwrap(), "orders");
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Message(BTreeMap<String, Value>);

impl Message {
    /// Creates an empty message (bucket `""`).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a message targeting a collection.
    #[must_use]
    pub fn for_collection(collection: impl Into<String>) -> Self {
        Self::new().with(COLLECTION_KEY, Value::String(collection.into()))
    }

    /// Sets `key` to `value`.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Sets the document identifier.
    #[must_use]
    pub fn with_id(self, id: impl Into<DocumentId>) -> Self {
        let id: DocumentId = id.into();
        self.with(ID_KEY, Value::from(id))
    }

    /// Inserts `key`, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    #[must_use]
    #[allow(missing_docs)]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// The `id` entry, if any.
    #[must_use]
    pub fn id(&self) -> Option<&Value> {
        self.0.get(ID_KEY)
    }

    /// Entries in key order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
        self.0.iter()
    }

    #[must_use]
    #[allow(missing_docs)]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    #[allow(missing_docs)]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Resolves the bucket this message is filed under.
    ///
    /// A missing `collection` key means the `""` bucket. A present key must
    /// hold a non-empty string.
    pub fn bucket(&self) -> MuxResult<&str> {
        match self.0.get(COLLECTION_KEY) {
            None => Ok(""),
            Some(Value::String(name)) if name.is_empty() => Err(ValidationError::EmptyCollection.into()),
            Some(Value::String(name)) => Ok(name),
            Some(other) => Err(ValidationError::NonStringCollection {
                found: other.type_name(),
            }
            .into()),
        }
    }
}

impl From<BTreeMap<String, Value>> for Message {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Value)> for Message {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Message {
    type Item = (&'a String, &'a Value);
    type IntoIter = btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
