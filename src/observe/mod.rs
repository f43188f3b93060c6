//! Observe subsystem: per-query change fan-out.
//!
//! An [`ObserveMultiplexer`] sits between one upstream change producer and
//! any number of [`ObserveHandle`]s. It owns a serialized task queue, a cache
//! of the current result set for late joiners, and optional batching. Handles
//! created from callbacks join through `add_handle_and_send_initial_adds` and
//! leave through `stop()`; the multiplexer stops itself once the last handle
//! has left.

mod batch;
/// Ordered document cache replayed to late joiners.
pub mod cache;
/// Change event types.
pub mod event;
/// Subscriber handles and callbacks.
pub mod handle;
/// The multiplexer and its configuration.
pub mod multiplexer;
/// Single-worker FIFO task executor.
pub mod queue;
/// One-shot readiness signal.
pub mod signal;

pub use cache::{ChangeCache, ID_FIELD};
pub use event::{ChangeEvent, ChangeEventKind};
pub use handle::{
    AddedBeforeCallback, AddedCallback, BatchCallback, ChangeCallbacks, ChangedCallback, HandleId,
    MovedBeforeCallback, ObserveCallbacks, ObserveHandle, RemovedCallback,
};
pub use multiplexer::{MultiplexerConfig, MultiplexerId, MultiplexerState, ObserveMultiplexer};
pub use queue::SerializedTaskQueue;
pub use signal::ReadySignal;
