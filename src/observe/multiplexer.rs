//! Per-query fan-out of change events to observe handles.
//!
//! A multiplexer receives `added` / `changed` / ... calls from one upstream
//! change producer and delivers them to every registered handle. It keeps a
//! cache of the current result set so that handles joining late first receive
//! the existing documents as adds.
//!
//! All cache mutation and delivery happen on the multiplexer's serialized
//! task queue, so every handle sees events in the order the producer issued
//! them. Locks are never held while a callback runs: delivery snapshots the
//! handle ids and re-checks each handle's registration just before calling it.
//!
//! Lifecycle: `NotReady` until the producer reports `ready()` (only adds are
//! accepted before that), then `Ready` until the last handle leaves with no
//! join pending, then `Stopped` for good. A failed query goes straight from
//! `NotReady` to `Stopped` and every join attempt sees the query's error.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::error::{MuxError, MuxResult, ProtocolError, QueryError, ValidationError};
use crate::facts::{Facts, HANDLES_FACT, MULTIPLEXERS_FACT, OBSERVE_PACKAGE};
use crate::value::{DocumentId, FieldChanges, Fields};

use super::batch::{BatchBuffer, BatchTimer};
use super::cache::{ChangeCache, ID_FIELD};
use super::event::ChangeEvent;
use super::handle::{HandleId, HandleShared, ObserveCallbacks, ObserveHandle};
use super::queue::SerializedTaskQueue;
use super::signal::ReadySignal;

/// Unique identifier for a multiplexer, used to correlate log lines.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MultiplexerId(Uuid);

impl MultiplexerId {
    /// Create a new random multiplexer id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    #[must_use]
    #[allow(missing_docs)]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MultiplexerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MultiplexerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Multiplexer configuration.
///
/// Durations are (de)serialized as integer milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiplexerConfig {
    /// Deliver positional events (`added_before`, `moved_before`).
    pub ordered: bool,
    /// Coalesce events into batches delivered through one batch callback.
    pub allow_batching: bool,
    /// Flush after this long without a new event.
    #[serde(with = "duration_ms")]
    pub batch_interval: Duration,
    /// Upper bound on how long the first event of a batch may wait.
    #[serde(with = "duration_ms")]
    pub batch_max_age: Duration,
}

impl Default for MultiplexerConfig {
    fn default() -> Self {
        Self {
            ordered: false,
            allow_batching: false,
            batch_interval: Duration::from_millis(10),
            batch_max_age: Duration::from_millis(500),
        }
    }
}

impl MultiplexerConfig {
    /// Default settings with positional events enabled.
    #[must_use]
    pub fn ordered() -> Self {
        Self {
            ordered: true,
            ..Self::default()
        }
    }

    /// Default settings: unordered, no batching.
    #[must_use]
    pub fn unordered() -> Self {
        Self::default()
    }

    /// Requires handles to take a single batch callback.
    #[must_use]
    pub fn with_batching(mut self) -> Self {
        self.allow_batching = true;
        self
    }

    /// Sets the inactivity period after which a batch is flushed.
    #[must_use]
    pub fn with_batch_interval(mut self, interval: Duration) -> Self {
        self.batch_interval = interval;
        self
    }

    /// Sets how long the oldest buffered event may wait. A duration too large
    /// to add to the clock means no upper bound.
    #[must_use]
    pub fn with_batch_max_age(mut self, max_age: Duration) -> Self {
        self.batch_max_age = max_age;
        self
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Observable lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MultiplexerState {
    /// Waiting for `ready` or `query_error`; joins block.
    NotReady,
    /// Live events flow to registered handles.
    Ready,
    /// The stop callback ran. Terminal.
    Stopped,
}

type StopCallback = Box<dyn FnOnce() + Send + 'static>;

/// What the producer has reported so far. Checked and updated together with
/// enqueueing, so the checks agree with the order tasks run in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reported {
    Nothing,
    Ready,
    Failed,
}

struct MuxState {
    /// `None` once stopped.
    handles: Option<BTreeMap<HandleId, Arc<HandleShared>>>,
    cache: ChangeCache,
    pending_add_tasks: usize,
    batch: BatchBuffer,
    on_stop: Option<StopCallback>,
}

impl MuxState {
    fn handle_ids(&self) -> Vec<HandleId> {
        self.handles
            .as_ref()
            .map(|handles| handles.keys().copied().collect())
            .unwrap_or_default()
    }

    fn live_handle(&self, id: HandleId) -> Option<Arc<HandleShared>> {
        self.handles
            .as_ref()
            .and_then(|handles| handles.get(&id))
            .filter(|handle| !handle.is_stopped())
            .cloned()
    }
}

pub(crate) struct MuxInner {
    id: MultiplexerId,
    config: MultiplexerConfig,
    queue: SerializedTaskQueue,
    ready: ReadySignal,
    reported: Mutex<Reported>,
    state: Mutex<MuxState>,
    next_handle_id: AtomicU64,
    timer: Option<BatchTimer>,
    facts: Option<Arc<Facts>>,
}

impl MuxInner {
    pub(crate) fn id(&self) -> MultiplexerId {
        self.id
    }

    pub(crate) fn is_ordered(&self) -> bool {
        self.config.ordered
    }

    pub(crate) fn is_batching(&self) -> bool {
        self.config.allow_batching
    }

    pub(crate) fn next_handle_id(&self) -> HandleId {
        HandleId(self.next_handle_id.fetch_add(1, Ordering::Relaxed))
    }

    fn lock_state(&self) -> MuxResult<MutexGuard<'_, MuxState>> {
        self.state
            .lock()
            .map_err(|_| MuxError::internal("multiplexer state lock poisoned"))
    }

    fn lock_reported(&self) -> MuxResult<MutexGuard<'_, Reported>> {
        self.reported
            .lock()
            .map_err(|_| MuxError::internal("multiplexer readiness lock poisoned"))
    }

    fn bump(&self, name: &str, delta: i64) {
        if let Some(facts) = &self.facts {
            facts.increment(OBSERVE_PACKAGE, name, delta);
        }
    }

    fn add_handle(self: &Arc<Self>, handle: &Arc<HandleShared>) -> MuxResult<()> {
        if !self.queue.safe_to_run_task() {
            return Err(ProtocolError::ReentrantObserve.into());
        }

        self.lock_state()?.pending_add_tasks += 1;

        let this = Arc::clone(self);
        let joining = Arc::clone(handle);
        self.queue.run_task(move || this.join(&joining))?;

        // Waiting happens outside the task so the queue keeps running and
        // `ready()` can get through.
        self.ready.wait()?;

        if handle.is_joined() {
            Ok(())
        } else {
            Err(ProtocolError::Stopped.into())
        }
    }

    /// Join task: register, replay the cache, then settle the pending count.
    fn join(self: &Arc<Self>, handle: &Arc<HandleShared>) -> MuxResult<()> {
        let registered = {
            let mut st = self.lock_state()?;
            match st.handles.as_mut() {
                Some(handles) if !handle.is_stopped() => {
                    handles.insert(handle.id, Arc::clone(handle));
                    handle.mark_joined();
                    true
                }
                _ => false,
            }
        };

        let replayed = if registered {
            self.bump(HANDLES_FACT, 1);
            debug!(mux = %self.id, handle = handle.id.get(), "handle joined");
            self.send_initial_adds(handle)
        } else {
            Ok(())
        };

        let on_stop = {
            let mut st = self.lock_state()?;
            st.pending_add_tasks = st.pending_add_tasks.saturating_sub(1);
            self.take_stop_if_idle(&mut st)
        };
        if let Some(on_stop) = on_stop {
            self.finish_stop(on_stop);
        }

        replayed
    }

    fn send_initial_adds(&self, handle: &HandleShared) -> MuxResult<()> {
        if self.queue.safe_to_run_task() {
            return Err(ProtocolError::ConcurrencyMisuse {
                operation: "send_initial_adds",
            }
            .into());
        }

        let docs = self.lock_state()?.cache.snapshot();
        let adds = docs.into_iter().map(|(id, fields)| self.initial_add(id, fields));

        if self.is_batching() {
            let events: Vec<ChangeEvent> = adds.collect();
            if events.is_empty() {
                return Ok(());
            }
            self.ensure_registered(handle.id)?;
            handle.dispatch.deliver_batch(events);
        } else {
            for event in adds {
                self.ensure_registered(handle.id)?;
                handle.dispatch.deliver(event);
            }
        }
        Ok(())
    }

    fn initial_add(&self, id: String, mut fields: Fields) -> ChangeEvent {
        fields.remove(ID_FIELD);
        if self.is_ordered() {
            ChangeEvent::AddedBefore {
                id,
                fields,
                before: None,
            }
        } else {
            ChangeEvent::Added { id, fields }
        }
    }

    fn ensure_registered(&self, id: HandleId) -> MuxResult<()> {
        let present = self
            .lock_state()?
            .handles
            .as_ref()
            .is_some_and(|handles| handles.contains_key(&id));
        if present {
            Ok(())
        } else {
            Err(ProtocolError::VanishedHandle { handle: id.get() }.into())
        }
    }

    /// Closes the handle set if nothing is left to serve.
    fn take_stop_if_idle(&self, st: &mut MuxState) -> Option<StopCallback> {
        let idle = st.pending_add_tasks == 0
            && st.handles.as_ref().is_some_and(BTreeMap::is_empty)
            && self.ready.is_resolved();
        if !idle {
            return None;
        }
        self.close(st)
    }

    fn close(&self, st: &mut MuxState) -> Option<StopCallback> {
        st.handles = None;
        st.batch.take();
        st.on_stop.take()
    }

    /// Runs the stop callback. Called once, with no lock held.
    fn finish_stop(&self, on_stop: StopCallback) {
        if let Some(timer) = &self.timer {
            timer.disarm();
        }
        self.bump(MULTIPLEXERS_FACT, -1);
        debug!(mux = %self.id, "multiplexer stopped");
        on_stop();
    }

    pub(crate) fn remove_handle(&self, id: HandleId) -> MuxResult<()> {
        if !self.ready.is_settled() {
            return Err(ProtocolError::NotReadyRemoval.into());
        }

        let on_stop = {
            let mut st = self.lock_state()?;
            let removed = match st.handles.as_mut() {
                Some(handles) => handles.remove(&id).is_some(),
                None => return Ok(()),
            };
            if !removed {
                return Ok(());
            }
            self.bump(HANDLES_FACT, -1);
            debug!(mux = %self.id, handle = id.get(), "handle removed");
            self.take_stop_if_idle(&mut st)
        };

        if let Some(on_stop) = on_stop {
            self.finish_stop(on_stop);
        }
        Ok(())
    }

    fn ready(self: &Arc<Self>) -> MuxResult<()> {
        let mut reported = self.lock_reported()?;
        match *reported {
            Reported::Ready => return Err(ProtocolError::DoubleReady.into()),
            Reported::Failed => return Err(ProtocolError::Stopped.into()),
            Reported::Nothing => {}
        }

        let this = Arc::clone(self);
        self.queue.queue_task(move || {
            this.ready.resolve();
            debug!(mux = %this.id, "multiplexer ready");
            Ok(())
        })?;
        *reported = Reported::Ready;
        Ok(())
    }

    fn query_error(self: &Arc<Self>, err: QueryError) -> MuxResult<()> {
        let mut reported = self.lock_reported()?;
        match *reported {
            Reported::Ready => return Err(ProtocolError::PostReadyError.into()),
            Reported::Failed => return Err(ProtocolError::Stopped.into()),
            Reported::Nothing => {}
        }

        let this = Arc::clone(self);
        self.queue.queue_task(move || this.fail(err))?;
        *reported = Reported::Failed;
        Ok(())
    }

    fn fail(&self, err: QueryError) -> MuxResult<()> {
        let on_stop = {
            let mut st = self.lock_state()?;
            self.close(&mut st)
        };
        debug!(mux = %self.id, error = %err, "query failed");
        if let Some(on_stop) = on_stop {
            self.finish_stop(on_stop);
        }
        self.ready.reject(err);
        Ok(())
    }

    fn on_flush<F>(self: &Arc<Self>, callback: F) -> MuxResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let reported = self.lock_reported()?;
        if *reported != Reported::Ready {
            return Err(ProtocolError::NotReadyFlush.into());
        }

        let this = Arc::clone(self);
        self.queue.queue_task(move || {
            if this.is_batching() {
                this.flush_buffered()?;
            }
            callback();
            Ok(())
        })
    }

    fn enqueue_event(self: &Arc<Self>, event: ChangeEvent) -> MuxResult<()> {
        let kind = event.kind();
        let ordered = self.is_ordered();
        if !ordered && kind.is_positional() {
            return Err(ValidationError::UnsupportedEvent { kind, ordered }.into());
        }
        let event = if ordered { event.into_positional() } else { event };

        let reported = self.lock_reported()?;
        match *reported {
            Reported::Failed => return Err(ProtocolError::Stopped.into()),
            Reported::Nothing if !kind.is_add() => {
                return Err(ProtocolError::PrematureEvent { kind }.into());
            }
            _ => {}
        }

        let this = Arc::clone(self);
        self.queue.queue_task(move || this.ingest(event))
    }

    fn ingest(self: &Arc<Self>, event: ChangeEvent) -> MuxResult<()> {
        if self.is_batching() {
            return self.buffer(event);
        }

        let recipients = {
            let mut st = self.lock_state()?;
            if st.handles.is_none() {
                return Ok(());
            }
            if let Err(err) = st.cache.apply(&event) {
                warn!(mux = %self.id, error = %err, event = event.kind().as_str(), "cache rejected event");
            }
            st.handle_ids()
        };
        self.for_each_live_handle(&recipients, |handle| handle.dispatch.deliver(event.clone()))
    }

    fn buffer(&self, event: ChangeEvent) -> MuxResult<()> {
        let overdue = {
            let mut st = self.lock_state()?;
            if st.handles.is_none() {
                return Ok(());
            }
            let overdue = st.batch.push(event, Instant::now(), self.config.batch_max_age);
            trace!(mux = %self.id, buffered = st.batch.len(), deadline = ?st.batch.deadline(), "event buffered");
            overdue
        };
        if let Some(events) = overdue {
            self.flush_events(events)?;
        }
        if let Some(timer) = &self.timer {
            timer.arm(self.config.batch_interval);
        }
        Ok(())
    }

    fn flush_buffered(&self) -> MuxResult<()> {
        let events = {
            let mut st = self.lock_state()?;
            if st.handles.is_none() || st.batch.is_empty() {
                return Ok(());
            }
            st.batch.take()
        };
        if let Some(timer) = &self.timer {
            timer.disarm();
        }
        self.flush_events(events)
    }

    fn flush_events(&self, events: Vec<ChangeEvent>) -> MuxResult<()> {
        let recipients = {
            let mut st = self.lock_state()?;
            if st.handles.is_none() {
                return Ok(());
            }
            for event in &events {
                if let Err(err) = st.cache.apply(event) {
                    warn!(mux = %self.id, error = %err, event = event.kind().as_str(), "cache rejected batched event");
                }
            }
            st.handle_ids()
        };

        debug!(mux = %self.id, events = events.len(), handles = recipients.len(), "flushing batch");
        self.for_each_live_handle(&recipients, |handle| handle.dispatch.deliver_batch(events.clone()))
    }

    /// Calls `f` for every id still registered at the moment of its turn.
    fn for_each_live_handle<F>(&self, ids: &[HandleId], mut f: F) -> MuxResult<()>
    where
        F: FnMut(&HandleShared),
    {
        for &id in ids {
            let handle = self.lock_state()?.live_handle(id);
            if let Some(handle) = handle {
                f(&handle);
            }
        }
        Ok(())
    }

    fn state(&self) -> MultiplexerState {
        let closed = self.lock_state().map_or(true, |st| st.handles.is_none());
        if closed {
            MultiplexerState::Stopped
        } else if self.ready.is_resolved() {
            MultiplexerState::Ready
        } else {
            MultiplexerState::NotReady
        }
    }
}

fn flush_when_fired(mux: Weak<MuxInner>) -> impl FnMut() -> bool + Send + 'static {
    move || {
        let Some(inner) = mux.upgrade() else {
            return false;
        };
        let this = Arc::clone(&inner);
        inner.queue.queue_task(move || this.flush_buffered()).is_ok()
    }
}

/// Fan-out engine for one live query.
///
/// Cloning yields another reference to the same multiplexer.
#[derive(Clone)]
pub struct ObserveMultiplexer {
    inner: Arc<MuxInner>,
}

impl ObserveMultiplexer {
    /// Creates a multiplexer. `on_stop` runs exactly once, when the
    /// multiplexer stops.
    pub fn new<F>(config: MultiplexerConfig, on_stop: F) -> MuxResult<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        Self::build(config, None, Box::new(on_stop))
    }

    /// Like [`ObserveMultiplexer::new`], reporting counts to `facts`.
    pub fn with_facts<F>(config: MultiplexerConfig, facts: Arc<Facts>, on_stop: F) -> MuxResult<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        Self::build(config, Some(facts), Box::new(on_stop))
    }

    fn build(config: MultiplexerConfig, facts: Option<Arc<Facts>>, on_stop: StopCallback) -> MuxResult<Self> {
        let id = MultiplexerId::new();
        let tag: String = id.to_string().chars().take(8).collect();
        let queue = SerializedTaskQueue::start(format!("mux-{tag}"))?;
        let batching = config.allow_batching;

        let mut timer_err = None;
        let inner = Arc::new_cyclic(|weak: &Weak<MuxInner>| {
            let timer = if batching {
                BatchTimer::start(queue.name(), flush_when_fired(weak.clone()))
                    .map_err(|e| timer_err = Some(e))
                    .ok()
            } else {
                None
            };
            MuxInner {
                id,
                config,
                queue,
                ready: ReadySignal::new(),
                reported: Mutex::new(Reported::Nothing),
                state: Mutex::new(MuxState {
                    handles: Some(BTreeMap::new()),
                    cache: ChangeCache::new(),
                    pending_add_tasks: 0,
                    batch: BatchBuffer::default(),
                    on_stop: Some(on_stop),
                }),
                next_handle_id: AtomicU64::new(1),
                timer,
                facts,
            }
        });
        if let Some(err) = timer_err {
            return Err(err);
        }

        inner.bump(MULTIPLEXERS_FACT, 1);
        debug!(mux = %id, ordered = inner.is_ordered(), batching, "multiplexer created");
        Ok(Self { inner })
    }

    pub(crate) fn inner(&self) -> &Arc<MuxInner> {
        &self.inner
    }

    #[must_use]
    #[allow(missing_docs)]
    pub fn id(&self) -> MultiplexerId {
        self.inner.id
    }

    /// Whether positional events are delivered.
    #[must_use]
    pub fn is_ordered(&self) -> bool {
        self.inner.is_ordered()
    }

    /// Whether handles receive batches instead of per-event callbacks.
    #[must_use]
    pub fn is_batching(&self) -> bool {
        self.inner.is_batching()
    }

    /// Current lifecycle state, as seen from the producer side.
    #[must_use]
    pub fn state(&self) -> MultiplexerState {
        self.inner.state()
    }

    /// Registered handles; zero once stopped.
    #[must_use]
    pub fn handle_count(&self) -> usize {
        self.inner
            .lock_state()
            .map(|st| st.handles.as_ref().map_or(0, BTreeMap::len))
            .unwrap_or(0)
    }

    /// Documents currently in the cache.
    #[must_use]
    pub fn cached_len(&self) -> usize {
        self.inner.lock_state().map(|st| st.cache.len()).unwrap_or(0)
    }

    /// Creates a handle with `callbacks` and joins it.
    pub fn observe(&self, callbacks: impl Into<ObserveCallbacks>) -> MuxResult<ObserveHandle> {
        let handle = ObserveHandle::new(self, callbacks.into())?;
        self.add_handle_and_send_initial_adds(&handle)?;
        Ok(handle)
    }

    /// Registers `handle`, replays the cached documents to it, and waits
    /// until the multiplexer is ready.
    ///
    /// Blocks. Must not be called from one of this multiplexer's callbacks.
    /// If the query failed, returns `QueryFailed` with the producer's error.
    pub fn add_handle_and_send_initial_adds(&self, handle: &ObserveHandle) -> MuxResult<()> {
        if !Arc::ptr_eq(handle.multiplexer(), &self.inner) {
            return Err(ProtocolError::ForeignHandle {
                handle: handle.id().get(),
            }
            .into());
        }
        self.inner.add_handle(handle.shared())
    }

    /// Unregisters a handle. Safe to call from inside a callback.
    pub fn remove_handle(&self, id: HandleId) -> MuxResult<()> {
        self.inner.remove_handle(id)
    }

    /// Reports that the initial result set has been delivered.
    pub fn ready(&self) -> MuxResult<()> {
        self.inner.ready()
    }

    /// Reports that the query failed before becoming ready.
    pub fn query_error(&self, err: QueryError) -> MuxResult<()> {
        self.inner.query_error(err)
    }

    /// Runs `callback` once everything enqueued before this call has been
    /// delivered, including buffered batches.
    pub fn on_flush<F>(&self, callback: F) -> MuxResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.on_flush(callback)
    }

    /// Reports a new document. Allowed before `ready`.
    pub fn added(&self, id: impl Into<DocumentId>, fields: Fields) -> MuxResult<()> {
        self.apply(ChangeEvent::Added {
            id: id.into().stringify(),
            fields,
        })
    }

    /// Reports a new document placed before `before`, or last when `None`.
    /// Ordered multiplexers only; allowed before `ready`.
    pub fn added_before(&self, id: impl Into<DocumentId>, fields: Fields, before: Option<DocumentId>) -> MuxResult<()> {
        self.apply(ChangeEvent::AddedBefore {
            id: id.into().stringify(),
            fields,
            before: before.as_ref().map(DocumentId::stringify),
        })
    }

    /// Reports field changes. A `None` value removes the field.
    pub fn changed(&self, id: impl Into<DocumentId>, fields: FieldChanges) -> MuxResult<()> {
        self.apply(ChangeEvent::Changed {
            id: id.into().stringify(),
            fields,
        })
    }

    /// Reports a reposition. Ordered multiplexers only.
    pub fn moved_before(&self, id: impl Into<DocumentId>, before: Option<DocumentId>) -> MuxResult<()> {
        self.apply(ChangeEvent::MovedBefore {
            id: id.into().stringify(),
            before: before.as_ref().map(DocumentId::stringify),
        })
    }

    /// Reports a removed document.
    pub fn removed(&self, id: impl Into<DocumentId>) -> MuxResult<()> {
        self.apply(ChangeEvent::Removed {
            id: id.into().stringify(),
        })
    }

    /// Enqueues an event whose ids are already in canonical string form.
    pub fn apply(&self, event: ChangeEvent) -> MuxResult<()> {
        self.inner.enqueue_event(event)
    }
}

impl fmt::Debug for ObserveMultiplexer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserveMultiplexer")
            .field("id", &self.inner.id)
            .field("ordered", &self.is_ordered())
            .field("batching", &self.is_batching())
            .field("state", &self.state())
            .finish()
    }
}
