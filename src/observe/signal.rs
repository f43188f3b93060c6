//! One-shot readiness signal.
//!
//! Settled exactly once, either resolved or rejected with the upstream query
//! error. Any number of threads may wait on it.

use std::sync::{Condvar, Mutex, MutexGuard};

use crate::error::{MuxError, MuxResult, QueryError};

#[derive(Debug, Clone)]
enum Outcome {
    Pending,
    Resolved,
    Rejected(QueryError),
}

/// One-shot future shared between the readiness task and blocked joiners.
#[derive(Debug)]
pub struct ReadySignal {
    outcome: Mutex<Outcome>,
    settled: Condvar,
}

impl Default for ReadySignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadySignal {
    /// An unresolved signal.
    #[must_use]
    pub fn new() -> Self {
        Self {
            outcome: Mutex::new(Outcome::Pending),
            settled: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Outcome> {
        // The outcome is a plain enum; a poisoned guard still holds a valid value.
        self.outcome.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Resolves the signal. Returns false if it was already settled.
    pub fn resolve(&self) -> bool {
        self.settle(Outcome::Resolved)
    }

    /// Rejects the signal with `err`. Returns false if it was already settled.
    pub fn reject(&self, err: QueryError) -> bool {
        self.settle(Outcome::Rejected(err))
    }

    fn settle(&self, outcome: Outcome) -> bool {
        let mut guard = self.lock();
        if !matches!(*guard, Outcome::Pending) {
            return false;
        }
        *guard = outcome;
        drop(guard);
        self.settled.notify_all();
        true
    }

    /// True once resolved. A rejected signal is not resolved.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        matches!(*self.lock(), Outcome::Resolved)
    }

    /// True once resolved or rejected.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        !matches!(*self.lock(), Outcome::Pending)
    }

    /// Blocks until settled; a rejection is re-raised as `QueryFailed`.
    pub fn wait(&self) -> MuxResult<()> {
        let guard = self.lock();
        let guard = self
            .settled
            .wait_while(guard, |outcome| matches!(outcome, Outcome::Pending))
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        match &*guard {
            Outcome::Resolved => Ok(()),
            Outcome::Rejected(err) => Err(MuxError::QueryFailed(err.clone())),
            Outcome::Pending => Err(MuxError::internal("ready signal woke while pending")),
        }
    }
}
