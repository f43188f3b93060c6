//! Change events flowing through a multiplexer.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::{FieldChanges, Fields};

/// The kind of a change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeEventKind {
    Added,
    AddedBefore,
    Changed,
    MovedBefore,
    Removed,
}

impl ChangeEventKind {
    /// True for `added` and `added_before`.
    #[must_use]
    pub const fn is_add(self) -> bool {
        matches!(self, Self::Added | Self::AddedBefore)
    }

    /// True for kinds that only make sense with ordered results.
    #[must_use]
    pub const fn is_positional(self) -> bool {
        matches!(self, Self::AddedBefore | Self::MovedBefore)
    }

    /// Callback name of this kind, as used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::AddedBefore => "added_before",
            Self::Changed => "changed",
            Self::MovedBefore => "moved_before",
            Self::Removed => "removed",
        }
    }
}

impl fmt::Display for ChangeEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One document-level change.
///
/// Ids are in canonical string form (see [`crate::DocumentId::stringify`]).
/// `before: None` means "at the end".
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "msg", rename_all = "snake_case")]
pub enum ChangeEvent {
    Added {
        id: String,
        fields: Fields,
    },
    AddedBefore {
        id: String,
        fields: Fields,
        before: Option<String>,
    },
    Changed {
        id: String,
        fields: FieldChanges,
    },
    MovedBefore {
        id: String,
        before: Option<String>,
    },
    Removed {
        id: String,
    },
}

impl ChangeEvent {
    /// Which callback this event is delivered to.
    #[must_use]
    pub const fn kind(&self) -> ChangeEventKind {
        match self {
            Self::Added { .. } => ChangeEventKind::Added,
            Self::AddedBefore { .. } => ChangeEventKind::AddedBefore,
            Self::Changed { .. } => ChangeEventKind::Changed,
            Self::MovedBefore { .. } => ChangeEventKind::MovedBefore,
            Self::Removed { .. } => ChangeEventKind::Removed,
        }
    }

    /// The document this event is about.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Added { id, .. }
            | Self::AddedBefore { id, .. }
            | Self::Changed { id, .. }
            | Self::MovedBefore { id, .. }
            | Self::Removed { id } => id,
        }
    }

    /// Rewrites an unordered add as an append for ordered consumers.
    #[must_use]
    pub(crate) fn into_positional(self) -> Self {
        match self {
            Self::Added { id, fields } => Self::AddedBefore {
                id,
                fields,
                before: None,
            },
            other => other,
        }
    }
}
