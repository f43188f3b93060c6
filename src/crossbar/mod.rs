//! Crossbar: structured notification registration.
//!
//! Listeners register a trigger under a collection bucket. Notifications
//! fired into the crossbar are matched against every trigger in their bucket
//! and matching listeners are invoked synchronously, on the firing thread,
//! before `fire` returns. Producers use this to decide which live queries
//! should be told about a raw write.

/// Subset matching between notifications and triggers.
pub mod matcher;
/// Trigger / notification message type.
pub mod message;
/// Listener registry and fan-out.
pub mod registry;

pub use matcher::matches;
pub use message::{Message, COLLECTION_KEY, ID_KEY};
pub use registry::{Crossbar, CrossbarConfig, ListenHandle, ListenerCallback, ListenerId};
