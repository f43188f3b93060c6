//! # livemux - reactive change notification for live queries
//!
//! livemux is the in-process core of a live-query layer. Writers describe
//! what changed; subscribers learn about exactly the changes that concern
//! them, in order, without blocking each other.
//!
//! ## Core Concepts
//!
//! - **Crossbar**: pub/sub keyed by structured triggers. A notification wakes
//!   every listener whose trigger it matches.
//! - **ObserveMultiplexer**: fans one query's change stream out to many
//!   subscribers, caching the current result set so late joiners first see
//!   it as adds, optionally coalescing events into latency-bounded batches.
//! - **ObserveHandle**: one subscriber's registration with a multiplexer.
//!
//! ## Usage
//!
//! ```rust
//! use livemux::{ChangeCallbacks, Fields, MultiplexerConfig, ObserveMultiplexer};
//!
//! let mux = ObserveMultiplexer::new(MultiplexerConfig::unordered(), || {})?;
//! mux.added("a", Fields::new())?;
//! mux.ready()?;
//!
//! let handle = mux.observe(ChangeCallbacks::new().on_added(|id, _| println!("added {id}")))?;
//! handle.stop()?;
//! # Ok::<(), livemux::MuxError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod facts;
pub mod value;

/// Trigger-matching pub/sub.
pub mod crossbar;
/// Per-query fan-out to observe handles.
pub mod observe;

pub use crossbar::{Crossbar, CrossbarConfig, ListenHandle, ListenerId, Message};
pub use error::{ExecutionError, MuxError, MuxResult, ProtocolError, QueryError, ValidationError};
pub use facts::Facts;
pub use observe::{
    ChangeCallbacks, ChangeEvent, ChangeEventKind, HandleId, MultiplexerConfig, MultiplexerId,
    MultiplexerState, ObserveCallbacks, ObserveHandle, ObserveMultiplexer,
};
pub use value::{DocumentId, FieldChanges, Fields, ObjectId, Value};
