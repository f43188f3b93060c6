//! Subscriber handles and their callbacks.
//!
//! A handle is bound to one multiplexer and one callback shape: named
//! per-event callbacks, or a single batch callback when the multiplexer
//! batches. Every callback receives its own copy of the event data.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{MuxResult, ValidationError};
use crate::value::{FieldChanges, Fields};

use super::event::ChangeEvent;
use super::multiplexer::{MuxInner, ObserveMultiplexer};

/// Receives `(id, fields)` for an unordered add.
pub type AddedCallback = Arc<dyn Fn(String, Fields) + Send + Sync + 'static>;
/// Receives `(id, fields, before)` for an ordered add.
pub type AddedBeforeCallback = Arc<dyn Fn(String, Fields, Option<String>) + Send + Sync + 'static>;
/// Receives `(id, changes)`; a `None` change removes the field.
pub type ChangedCallback = Arc<dyn Fn(String, FieldChanges) + Send + Sync + 'static>;
/// Receives `(id, before)` for a reposition.
pub type MovedBeforeCallback = Arc<dyn Fn(String, Option<String>) + Send + Sync + 'static>;
#[allow(missing_docs)]
pub type RemovedCallback = Arc<dyn Fn(String) + Send + Sync + 'static>;
/// Receives every event of one flushed batch, in order.
pub type BatchCallback = Arc<dyn Fn(Vec<ChangeEvent>) + Send + Sync + 'static>;

/// Identifier of a handle, unique within one multiplexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandleId(pub(crate) u64);

impl HandleId {
    /// The raw counter value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Named per-event callbacks. Unset callbacks are skipped.
///
/// # Examples
///
/// ```
/// use livemux::ChangeCallbacks;
///
/// let callbacks = ChangeCallbacks::new()
///     .on_added(|id, fields| println!("+ {id} {fields:?}"))
///     .on_removed(|id| println!("- {id}"));
/// # let _ = callbacks;
/// ```
#[derive(Clone, Default)]
pub struct ChangeCallbacks {
    added: Option<AddedCallback>,
    added_before: Option<AddedBeforeCallback>,
    changed: Option<ChangedCallback>,
    moved_before: Option<MovedBeforeCallback>,
    removed: Option<RemovedCallback>,
}

impl ChangeCallbacks {
    /// No callbacks set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Called for unordered adds. On an ordered multiplexer it stands in for
    /// `on_added_before` when that is unset.
    #[must_use]
    pub fn on_added(mut self, f: impl Fn(String, Fields) + Send + Sync + 'static) -> Self {
        self.added = Some(Arc::new(f));
        self
    }

    /// Called for ordered adds.
    #[must_use]
    pub fn on_added_before(mut self, f: impl Fn(String, Fields, Option<String>) + Send + Sync + 'static) -> Self {
        self.added_before = Some(Arc::new(f));
        self
    }

    #[must_use]
    #[allow(missing_docs)]
    pub fn on_changed(mut self, f: impl Fn(String, FieldChanges) + Send + Sync + 'static) -> Self {
        self.changed = Some(Arc::new(f));
        self
    }

    /// Called for repositions. Ignored by unordered multiplexers.
    #[must_use]
    pub fn on_moved_before(mut self, f: impl Fn(String, Option<String>) + Send + Sync + 'static) -> Self {
        self.moved_before = Some(Arc::new(f));
        self
    }

    #[must_use]
    #[allow(missing_docs)]
    pub fn on_removed(mut self, f: impl Fn(String) + Send + Sync + 'static) -> Self {
        self.removed = Some(Arc::new(f));
        self
    }

    /// Keeps only the callbacks that exist for the given ordered-ness.
    ///
    /// Ordered: `added_before`, `changed`, `moved_before`, `removed`, where a
    /// lone `added` stands in for `added_before` and loses the position.
    /// Unordered: `added`, `changed`, `removed`.
    fn for_mode(self, ordered: bool) -> Self {
        if ordered {
            let added_before = self.added_before.or_else(|| {
                self.added.map(|added| -> AddedBeforeCallback {
                    Arc::new(move |id, fields, _before| added(id, fields))
                })
            });
            Self {
                added: None,
                added_before,
                ..self
            }
        } else {
            Self {
                added_before: None,
                moved_before: None,
                ..self
            }
        }
    }

    fn call(&self, event: ChangeEvent) {
        match event {
            ChangeEvent::Added { id, fields } => {
                if let Some(cb) = &self.added {
                    cb(id, fields);
                }
            }
            ChangeEvent::AddedBefore { id, fields, before } => {
                if let Some(cb) = &self.added_before {
                    cb(id, fields, before);
                }
            }
            ChangeEvent::Changed { id, fields } => {
                if let Some(cb) = &self.changed {
                    cb(id, fields);
                }
            }
            ChangeEvent::MovedBefore { id, before } => {
                if let Some(cb) = &self.moved_before {
                    cb(id, before);
                }
            }
            ChangeEvent::Removed { id } => {
                if let Some(cb) = &self.removed {
                    cb(id);
                }
            }
        }
    }
}

impl fmt::Debug for ChangeCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeCallbacks")
            .field("added", &self.added.is_some())
            .field("added_before", &self.added_before.is_some())
            .field("changed", &self.changed.is_some())
            .field("moved_before", &self.moved_before.is_some())
            .field("removed", &self.removed.is_some())
            .finish()
    }
}

/// Callback configuration supplied when a handle is created.
#[derive(Clone)]
pub enum ObserveCallbacks {
    /// One callback per event kind. Required by non-batching multiplexers.
    PerEvent(ChangeCallbacks),
    /// One callback per flushed batch. Required by batching multiplexers.
    Batched(BatchCallback),
}

impl ObserveCallbacks {
    /// Wraps a batch callback.
    pub fn batched(f: impl Fn(Vec<ChangeEvent>) + Send + Sync + 'static) -> Self {
        Self::Batched(Arc::new(f))
    }
}

impl From<ChangeCallbacks> for ObserveCallbacks {
    fn from(callbacks: ChangeCallbacks) -> Self {
        Self::PerEvent(callbacks)
    }
}

impl fmt::Debug for ObserveCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PerEvent(cbs) => f.debug_tuple("PerEvent").field(cbs).finish(),
            Self::Batched(_) => f.write_str("Batched"),
        }
    }
}

/// Callbacks resolved against a multiplexer's mode.
pub(crate) enum Dispatch {
    PerEvent(ChangeCallbacks),
    Batched(BatchCallback),
}

impl Dispatch {
    fn resolve(callbacks: ObserveCallbacks, ordered: bool, batching: bool) -> MuxResult<Self> {
        match (callbacks, batching) {
            (ObserveCallbacks::PerEvent(cbs), false) => Ok(Self::PerEvent(cbs.for_mode(ordered))),
            (ObserveCallbacks::Batched(cb), true) => Ok(Self::Batched(cb)),
            (ObserveCallbacks::PerEvent(_), true) => Err(ValidationError::BatchingModeMismatch {
                batching: true,
                expected: "a single batch",
            }
            .into()),
            (ObserveCallbacks::Batched(_), false) => Err(ValidationError::BatchingModeMismatch {
                batching: false,
                expected: "per-event",
            }
            .into()),
        }
    }

    pub(crate) fn deliver(&self, event: ChangeEvent) {
        match self {
            Self::PerEvent(cbs) => cbs.call(event),
            Self::Batched(cb) => cb(vec![event]),
        }
    }

    pub(crate) fn deliver_batch(&self, events: Vec<ChangeEvent>) {
        match self {
            Self::PerEvent(cbs) => {
                for event in events {
                    cbs.call(event);
                }
            }
            Self::Batched(cb) => cb(events),
        }
    }
}

/// The part of a handle the multiplexer keeps in its registry.
pub(crate) struct HandleShared {
    pub(crate) id: HandleId,
    pub(crate) dispatch: Dispatch,
    stopped: AtomicBool,
    joined: AtomicBool,
}

impl HandleShared {
    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub(crate) fn mark_joined(&self) {
        self.joined.store(true, Ordering::Release);
    }

    pub(crate) fn is_joined(&self) -> bool {
        self.joined.load(Ordering::Acquire)
    }
}

/// A subscriber's registration with one multiplexer.
///
/// Stopping is idempotent. Dropping the handle stops it.
#[must_use = "dropping an ObserveHandle stops the subscription"]
pub struct ObserveHandle {
    shared: Arc<HandleShared>,
    mux: Arc<MuxInner>,
}

impl ObserveHandle {
    /// Binds `callbacks` to `multiplexer` without joining it yet.
    ///
    /// Fails with `BatchingModeMismatch` when the callback shape does not fit
    /// the multiplexer's batching mode.
    pub fn new(multiplexer: &ObserveMultiplexer, callbacks: ObserveCallbacks) -> MuxResult<Self> {
        let mux = Arc::clone(multiplexer.inner());
        let dispatch = Dispatch::resolve(callbacks, mux.is_ordered(), mux.is_batching())?;
        let shared = Arc::new(HandleShared {
            id: mux.next_handle_id(),
            dispatch,
            stopped: AtomicBool::new(false),
            joined: AtomicBool::new(false),
        });
        Ok(Self { shared, mux })
    }

    /// Identifier used by `remove_handle`.
    #[must_use]
    pub fn id(&self) -> HandleId {
        self.shared.id
    }

    /// True once `stop` succeeded or the handle was dropped.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.shared.is_stopped()
    }

    pub(crate) fn shared(&self) -> &Arc<HandleShared> {
        &self.shared
    }

    pub(crate) fn multiplexer(&self) -> &Arc<MuxInner> {
        &self.mux
    }

    /// Stop receiving events. The first call unregisters from the
    /// multiplexer; later calls do nothing.
    pub fn stop(&self) -> MuxResult<()> {
        if self.shared.stopped.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let removed = self.mux.remove_handle(self.shared.id);
        if removed.is_err() {
            // A refused removal leaves the handle registered; keep it stoppable.
            self.shared.stopped.store(false, Ordering::Release);
        }
        removed
    }
}

impl fmt::Debug for ObserveHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserveHandle")
            .field("id", &self.shared.id)
            .field("multiplexer", &self.mux.id())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

impl Drop for ObserveHandle {
    fn drop(&mut self) {
        // Best-effort: a handle dropped before its multiplexer was ready has
        // nothing to unregister.
        let _ = self.stop();
    }
}
