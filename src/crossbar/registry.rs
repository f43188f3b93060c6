//! Listener registry and synchronous fan-out.
//!
//! Listeners are filed by bucket (collection name). `fire` never holds the
//! registry lock while a callback runs, so callbacks may listen, stop or
//! fire again on the same crossbar.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::error::{MuxError, MuxResult};
use crate::facts::Facts;

use super::matcher::matches;
use super::message::Message;

/// Callback invoked with each matching notification.
pub type ListenerCallback = Arc<dyn Fn(&Message) + Send + Sync + 'static>;

/// Identifier of a listener, unique within one crossbar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListenerId(u64);

impl ListenerId {
    /// The raw counter value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrossbarConfig {
    /// Facts package the listener counter is reported under.
    pub fact_package: String,
    /// Facts counter name. No counter is kept when unset.
    pub fact_name: Option<String>,
}

impl Default for CrossbarConfig {
    fn default() -> Self {
        Self {
            fact_package: "livedata".to_string(),
            fact_name: None,
        }
    }
}

struct ListenerEntry {
    trigger: Message,
    callback: ListenerCallback,
}

#[derive(Default)]
struct Registry {
    buckets: HashMap<String, BTreeMap<ListenerId, ListenerEntry>>,
}

impl Registry {
    fn listener_count(&self) -> usize {
        self.buckets.values().map(BTreeMap::len).sum()
    }
}

struct CrossbarInner {
    cfg: CrossbarConfig,
    facts: Option<Arc<Facts>>,
    next_listener_id: AtomicU64,
    registry: Mutex<Registry>,
}

impl CrossbarInner {
    fn registry(&self) -> MuxResult<MutexGuard<'_, Registry>> {
        self.registry
            .lock()
            .map_err(|_| MuxError::internal("poisoned lock: crossbar registry"))
    }

    fn report(&self, delta: i64) {
        if let (Some(facts), Some(name)) = (&self.facts, &self.cfg.fact_name) {
            facts.increment(&self.cfg.fact_package, name, delta);
        }
    }
}

/// Structured notification registry.
///
/// Cloning a `Crossbar` yields another handle to the same registry.
///
/// # Examples
///
/// ```
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// use livemux::{Crossbar, Message};
///
/// let crossbar = Crossbar::default();
/// let hits = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&hits);
/// let _listener = crossbar
///     .listen(Message::for_collection("orders"), move |_| {
///         counter.fetch_add(1, Ordering::SeqCst);
///     })
///     .unwrap();
///
/// crossbar.fire(&Message::for_collection("orders").with_id("o-1")).unwrap();
/// assert_eq!(hits.load(Ordering::SeqCst), 1);
/// ```
#[derive(Clone)]
pub struct Crossbar {
    inner: Arc<CrossbarInner>,
}

impl Default for Crossbar {
    fn default() -> Self {
        Self::new(CrossbarConfig::default(), None)
    }
}

impl fmt::Debug for Crossbar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Crossbar")
            .field("cfg", &self.inner.cfg)
            .field("listeners", &self.listener_count())
            .finish_non_exhaustive()
    }
}

impl Crossbar {
    /// Creates a crossbar, optionally reporting its listener count to `facts`.
    #[must_use]
    pub fn new(cfg: CrossbarConfig, facts: Option<Arc<Facts>>) -> Self {
        Self {
            inner: Arc::new(CrossbarInner {
                cfg,
                facts,
                next_listener_id: AtomicU64::new(1),
                registry: Mutex::new(Registry::default()),
            }),
        }
    }

    /// Listen for notifications matching `trigger`.
    ///
    /// The trigger is copied; later changes to the caller's value have no
    /// effect. Dropping the returned handle stops the listener.
    pub fn listen<F>(&self, trigger: Message, callback: F) -> MuxResult<ListenHandle>
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        let bucket = trigger.bucket()?.to_string();
        let id = ListenerId(self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed));

        self.inner.registry()?.buckets.entry(bucket.clone()).or_default().insert(
            id,
            ListenerEntry {
                trigger,
                callback: Arc::new(callback),
            },
        );
        self.inner.report(1);
        tracing::trace!(bucket = %bucket, listener = id.0, "crossbar listener registered");

        Ok(ListenHandle {
            inner: Arc::clone(&self.inner),
            bucket,
            id,
            stopped: AtomicBool::new(false),
        })
    }

    /// Inform every listener whose trigger matches `notification`.
    ///
    /// All callbacks have returned by the time this returns. A listener
    /// stopped by an earlier callback in the same fire is skipped.
    pub fn fire(&self, notification: &Message) -> MuxResult<()> {
        let bucket = notification.bucket()?;

        // First pass: decide who matches without calling anything.
        let matched: Vec<ListenerId> = {
            let registry = self.inner.registry()?;
            let Some(listeners) = registry.buckets.get(bucket) else {
                return Ok(());
            };
            listeners
                .iter()
                .filter(|(_, entry)| matches(notification, &entry.trigger))
                .map(|(id, _)| *id)
                .collect()
        };

        // Second pass: re-check liveness right before each call.
        for id in matched {
            let callback = self
                .inner
                .registry()?
                .buckets
                .get(bucket)
                .and_then(|listeners| listeners.get(&id))
                .map(|entry| Arc::clone(&entry.callback));
            if let Some(callback) = callback {
                callback(notification);
            }
        }

        Ok(())
    }

    /// Number of registered listeners across all buckets.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner
            .registry()
            .map(|registry| registry.listener_count())
            .unwrap_or(0)
    }

    /// Number of buckets holding at least one listener.
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.inner
            .registry()
            .map(|registry| registry.buckets.len())
            .unwrap_or(0)
    }
}

/// Registration returned by [`Crossbar::listen`].
///
/// Stopping is idempotent. Dropping the handle stops the listener.
#[must_use = "dropping a ListenHandle stops the listener"]
pub struct ListenHandle {
    inner: Arc<CrossbarInner>,
    bucket: String,
    id: ListenerId,
    stopped: AtomicBool,
}

impl fmt::Debug for ListenHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenHandle")
            .field("bucket", &self.bucket)
            .field("id", &self.id)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

#[allow(missing_docs)]
impl ListenHandle {
    #[must_use]
    pub const fn id(&self) -> ListenerId {
        self.id
    }

    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Stop listening. Later calls do nothing.
    pub fn stop(&self) -> MuxResult<()> {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let mut registry = self.inner.registry()?;
        if let Some(listeners) = registry.buckets.get_mut(&self.bucket) {
            listeners.remove(&self.id);
            if listeners.is_empty() {
                registry.buckets.remove(&self.bucket);
            }
        }
        drop(registry);

        self.inner.report(-1);
        tracing::trace!(bucket = %self.bucket, listener = self.id.0, "crossbar listener stopped");
        Ok(())
    }
}

impl Drop for ListenHandle {
    fn drop(&mut self) {
        // Best-effort: a poisoned registry has nothing left to unregister from.
        let _ = self.stop();
    }
}
