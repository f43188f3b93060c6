//! Latency-bounded event batching.
//!
//! Buffered events flush when no new event arrived for `batch_interval`, or,
//! at the latest, when the next event shows up after `batch_max_age` has
//! passed since the first event of the window.

use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};

use crate::error::{MuxError, MuxResult};

use super::event::ChangeEvent;

/// Events waiting to be flushed, plus the window's hard deadline.
#[derive(Debug, Default)]
pub(crate) struct BatchBuffer {
    events: Vec<ChangeEvent>,
    flush_at: Option<Instant>,
}

impl BatchBuffer {
    /// Buffers `event` received at `now`.
    ///
    /// If the current window's deadline already elapsed, the events buffered
    /// so far are returned for an immediate flush and `event` opens a new
    /// window.
    pub(crate) fn push(&mut self, event: ChangeEvent, now: Instant, max_age: Duration) -> Option<Vec<ChangeEvent>> {
        let overdue = match self.flush_at {
            Some(deadline) if deadline <= now => Some(self.take()),
            _ => None,
        };
        if self.events.is_empty() {
            // An unrepresentable deadline means the window never expires.
            self.flush_at = now.checked_add(max_age);
        }
        self.events.push(event);
        overdue.filter(|events| !events.is_empty())
    }

    /// Empties the buffer and clears the deadline.
    pub(crate) fn take(&mut self) -> Vec<ChangeEvent> {
        self.flush_at = None;
        std::mem::take(&mut self.events)
    }

    pub(crate) fn len(&self) -> usize {
        self.events.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.flush_at
    }
}

enum TimerCommand {
    Arm(Instant),
    Disarm,
}

/// Inactivity timer driving batch flushes.
///
/// Re-arming replaces the pending deadline. The thread exits when the timer
/// is dropped or the fire callback reports that its owner is gone.
#[derive(Debug)]
pub(crate) struct BatchTimer {
    tx: Sender<TimerCommand>,
}

impl BatchTimer {
    /// Spawns the timer thread. `on_fire` returns false to stop the thread.
    pub(crate) fn start<F>(name: &str, on_fire: F) -> MuxResult<Self>
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let (tx, rx) = unbounded::<TimerCommand>();
        thread::Builder::new()
            .name(format!("livemux-{name}-batch"))
            .spawn(move || timer_loop(&rx, on_fire))
            .map_err(|e| MuxError::internal(format!("failed to spawn batch timer: {e}")))?;
        Ok(Self { tx })
    }

    /// Fires `delay` from now unless re-armed or disarmed first.
    pub(crate) fn arm(&self, delay: Duration) {
        // A closed channel means the thread already exited; nothing to arm.
        let command = match Instant::now().checked_add(delay) {
            Some(at) => TimerCommand::Arm(at),
            None => TimerCommand::Disarm,
        };
        let _ = self.tx.send(command);
    }

    pub(crate) fn disarm(&self) {
        let _ = self.tx.send(TimerCommand::Disarm);
    }
}

fn timer_loop<F>(rx: &Receiver<TimerCommand>, mut on_fire: F)
where
    F: FnMut() -> bool,
{
    let mut due: Option<Instant> = None;
    loop {
        let command = match due {
            None => match rx.recv() {
                Ok(command) => Some(command),
                Err(_) => return,
            },
            Some(at) => match rx.recv_deadline(at) {
                Ok(command) => Some(command),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => return,
            },
        };

        match command {
            Some(TimerCommand::Arm(at)) => due = Some(at),
            Some(TimerCommand::Disarm) => due = None,
            None => {
                due = None;
                if !on_fire() {
                    return;
                }
            }
        }
    }
}
