//! Materialized current state of a live query.
//!
//! The cache is fed the same events the multiplexer delivers and is replayed
//! to handles that join later. Document order is insertion order, or the
//! explicit positions given by `added_before` / `moved_before` events.

use indexmap::IndexMap;

use crate::error::{ExecutionError, MuxResult};
use crate::value::Fields;

use super::event::ChangeEvent;

/// Field name that is never part of a document's field set.
pub const ID_FIELD: &str = "_id";

/// Ordered id-keyed document store.
#[derive(Debug, Clone, Default)]
pub struct ChangeCache {
    docs: IndexMap<String, Fields>,
}

impl ChangeCache {
    /// An empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one change event.
    ///
    /// Adding a document that exists, or touching one that does not, leaves
    /// the cache unchanged and returns an integrity error.
    pub fn apply(&mut self, event: &ChangeEvent) -> MuxResult<()> {
        match event {
            ChangeEvent::Added { id, fields } => self.insert_at(id, fields, None),
            ChangeEvent::AddedBefore { id, fields, before } => self.insert_at(id, fields, before.as_deref()),
            ChangeEvent::Changed { id, fields } => {
                let doc = self.docs.get_mut(id).ok_or_else(|| unknown(id))?;
                for (key, change) in fields {
                    if key == ID_FIELD {
                        continue;
                    }
                    match change {
                        Some(value) => {
                            doc.insert(key.clone(), value.clone());
                        }
                        None => {
                            doc.remove(key);
                        }
                    }
                }
                Ok(())
            }
            ChangeEvent::MovedBefore { id, before } => {
                if let Some(before) = before {
                    if !self.docs.contains_key(before.as_str()) {
                        return Err(unknown(before));
                    }
                }
                let (_, key, fields) = self.docs.shift_remove_full(id).ok_or_else(|| unknown(id))?;
                let index = self.position_of(before.as_deref());
                self.docs.shift_insert(index, key, fields);
                Ok(())
            }
            ChangeEvent::Removed { id } => {
                self.docs.shift_remove(id).ok_or_else(|| unknown(id))?;
                Ok(())
            }
        }
    }

    fn insert_at(&mut self, id: &str, fields: &Fields, before: Option<&str>) -> MuxResult<()> {
        if self.docs.contains_key(id) {
            return Err(ExecutionError::DuplicateDocument { id: id.to_string() }.into());
        }
        if let Some(before) = before {
            if !self.docs.contains_key(before) {
                return Err(unknown(before));
            }
        }
        let mut doc = fields.clone();
        doc.remove(ID_FIELD);
        let index = self.position_of(before);
        self.docs.shift_insert(index, id.to_string(), doc);
        Ok(())
    }

    fn position_of(&self, before: Option<&str>) -> usize {
        before
            .and_then(|b| self.docs.get_index_of(b))
            .unwrap_or(self.docs.len())
    }

    /// Cached fields of `id`, without the id field.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Fields> {
        self.docs.get(id)
    }

    #[must_use]
    #[allow(missing_docs)]
    pub fn contains(&self, id: &str) -> bool {
        self.docs.contains_key(id)
    }

    /// Number of cached documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    #[must_use]
    #[allow(missing_docs)]
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Ids in document order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.docs.keys().map(String::as_str)
    }

    /// Iterates `(id, fields)` in document order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Fields)> {
        self.docs.iter().map(|(id, fields)| (id.as_str(), fields))
    }

    /// Owned copy of every document in order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(String, Fields)> {
        self.docs
            .iter()
            .map(|(id, fields)| (id.clone(), fields.clone()))
            .collect()
    }
}

fn unknown(id: &str) -> crate::error::MuxError {
    ExecutionError::UnknownDocument { id: id.to_string() }.into()
}
