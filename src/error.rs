//! Error types for livemux.
//!
//! All errors are strongly typed using thiserror. Input-shape problems,
//! protocol misuse and execution failures live in separate enums so callers
//! can tell a malformed message from a caller bug from a failed query.

use std::sync::Arc;

use thiserror::Error;

use crate::observe::ChangeEventKind;

/// The error an upstream change producer reports through `query_error`.
///
/// Shared so that every blocked and future join attempt can receive the
/// original error.
pub type QueryError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Input-shape errors raised synchronously to the caller.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Message has empty collection")]
    EmptyCollection,

    #[error("Message has non-string collection (found {found})")]
    NonStringCollection {
        found: &'static str,
    },

    #[error("Multiplexer batching={batching} requires {expected} callbacks")]
    BatchingModeMismatch {
        batching: bool,
        expected: &'static str,
    },

    #[error("Event '{kind}' is not supported by an {} multiplexer", mode_name(.ordered))]
    UnsupportedEvent {
        kind: ChangeEventKind,
        ordered: bool,
    },
}

impl ValidationError {
    /// Returns true if this error describes a malformed trigger or notification.
    #[must_use]
    pub const fn is_invalid_message_shape(&self) -> bool {
        matches!(self, Self::EmptyCollection | Self::NonStringCollection { .. })
    }
}

const fn mode_name(ordered: &bool) -> &'static str {
    if *ordered {
        "ordered"
    } else {
        "unordered"
    }
}

/// Protocol misuse: an operation was called out of state order.
///
/// These indicate a programming error in the caller and are never retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Can't make a multiplexer ready twice")]
    DoubleReady,

    #[error("Can't report a query error after the query became ready")]
    PostReadyError,

    #[error("Only call on_flush on a multiplexer that will be ready")]
    NotReadyFlush,

    #[error("Can't remove handles until the multiplexer is ready")]
    NotReadyRemoval,

    #[error("Got '{kind}' during initial adds")]
    PrematureEvent {
        kind: ChangeEventKind,
    },

    #[error("Can't observe from an observe callback on the same query")]
    ReentrantObserve,

    #[error("{operation} may only be called from within a task")]
    ConcurrencyMisuse {
        operation: &'static str,
    },

    #[error("Handle {handle} got removed before sending initial adds")]
    VanishedHandle {
        handle: u64,
    },

    #[error("Handle {handle} belongs to a different multiplexer")]
    ForeignHandle {
        handle: u64,
    },

    #[error("Multiplexer is stopped")]
    Stopped,
}

/// Execution errors raised while running queued work.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("Task queue '{queue}' is disconnected")]
    Disconnected {
        queue: String,
    },

    #[error("Task on queue '{queue}' panicked: {message}")]
    TaskPanicked {
        queue: String,
        message: String,
    },

    #[error("Unknown document: {id}")]
    UnknownDocument {
        id: String,
    },

    #[error("Duplicate document: {id}")]
    DuplicateDocument {
        id: String,
    },
}

/// Top-level error type for livemux.
#[derive(Debug, Error)]
pub enum MuxError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Query failed: {0}")]
    QueryFailed(#[source] QueryError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl MuxError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a protocol misuse error.
    #[must_use]
    pub const fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol(_))
    }

    /// Returns true if this is an execution error.
    #[must_use]
    pub const fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// Returns true if this error carries an upstream query failure.
    #[must_use]
    pub const fn is_query_failure(&self) -> bool {
        matches!(self, Self::QueryFailed(_))
    }

    /// Returns true if this is an internal error.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }

    /// The original upstream error, if this is a query failure.
    #[must_use]
    pub fn query_error(&self) -> Option<&QueryError> {
        match self {
            Self::QueryFailed(err) => Some(err),
            _ => None,
        }
    }
}

/// Result type alias for livemux operations.
pub type MuxResult<T> = Result<T, MuxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_collection_shape() {
        let err = ValidationError::NonStringCollection { found: "int" };
        assert!(err.is_invalid_message_shape());
        assert!(format!("{err}").contains("non-string collection"));
        assert!(ValidationError::EmptyCollection.is_invalid_message_shape());
        assert!(!ValidationError::BatchingModeMismatch {
            batching: true,
            expected: "a single batch",
        }
        .is_invalid_message_shape());
    }

    #[test]
    fn test_unsupported_event_message() {
        let err = ValidationError::UnsupportedEvent {
            kind: ChangeEventKind::MovedBefore,
            ordered: false,
        };
        let msg = format!("{err}");
        assert!(msg.contains("moved_before"));
        assert!(msg.contains("unordered"));
    }

    #[test]
    fn test_protocol_error_premature_event() {
        let err = ProtocolError::PrematureEvent {
            kind: ChangeEventKind::Changed,
        };
        assert!(format!("{err}").contains("'changed' during initial adds"));
    }

    #[test]
    fn test_execution_error_disconnected() {
        let err = ExecutionError::Disconnected {
            queue: "observe".to_string(),
        };
        assert!(format!("{err}").contains("'observe'"));
    }

    #[test]
    fn test_mux_error_from_conversions() {
        let err: MuxError = ValidationError::EmptyCollection.into();
        assert!(err.is_validation());

        let err: MuxError = ProtocolError::DoubleReady.into();
        assert!(err.is_protocol());

        let err: MuxError = ExecutionError::UnknownDocument { id: "x".into() }.into();
        assert!(err.is_execution());
    }

    #[test]
    fn test_query_failed_keeps_original_source() {
        let upstream: QueryError = Arc::from(Box::<dyn std::error::Error + Send + Sync>::from(
            "collection dropped",
        ));
        let err = MuxError::QueryFailed(Arc::clone(&upstream));
        assert!(err.is_query_failure());
        assert!(Arc::ptr_eq(err.query_error().unwrap(), &upstream));

        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "collection dropped");
    }

    #[test]
    fn test_mux_error_internal() {
        let err = MuxError::internal("poisoned lock");
        assert!(err.is_internal());
        assert!(format!("{err}").contains("poisoned lock"));
    }
}
