//! Named counters for live registrations.
//!
//! Components report how many listeners, multiplexers and handles they hold
//! by bumping `(package, name)` counters. A `Facts` instance is shared via
//! `Arc` between the components of one host so the numbers can be exported
//! together.

use std::collections::BTreeMap;
use std::sync::Mutex;

/// Package used by the observe multiplexer counters.
pub const OBSERVE_PACKAGE: &str = "observe";
/// Live multiplexers.
pub const MULTIPLEXERS_FACT: &str = "multiplexers";
/// Live observe handles.
pub const HANDLES_FACT: &str = "handles";

/// Signed counters keyed by `(package, name)`.
#[derive(Debug, Default)]
pub struct Facts {
    counters: Mutex<BTreeMap<(String, String), i64>>,
}

impl Facts {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `delta` to the counter, creating it at zero.
    pub fn increment(&self, package: &str, name: &str, delta: i64) {
        let mut guard = match self.counters.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard
            .entry((package.to_string(), name.to_string()))
            .or_insert(0) += delta;
    }

    /// Current value, zero if never touched.
    #[must_use]
    pub fn get(&self, package: &str, name: &str) -> i64 {
        self.counters
            .lock()
            .map(|guard| {
                guard
                    .get(&(package.to_string(), name.to_string()))
                    .copied()
                    .unwrap_or(0)
            })
            .unwrap_or(0)
    }

    /// Copy of every counter.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<(String, String), i64> {
        self.counters.lock().map(|guard| guard.clone()).unwrap_or_default()
    }
}
