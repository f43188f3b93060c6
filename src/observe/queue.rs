//! Serialized task queue.
//!
//! One worker thread drains an unbounded FIFO, so at most one task runs at a
//! time and tasks run in admission order. A task may block; nothing else on
//! the same queue starts until it returns. Other queues are unaffected.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, ThreadId};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};

use crate::error::{ExecutionError, MuxError, MuxResult, ProtocolError};

type Task = Box<dyn FnOnce() -> MuxResult<()> + Send + 'static>;

enum Job {
    Run {
        task: Task,
        reply: Option<Sender<MuxResult<()>>>,
    },
}

/// Single-consumer FIFO executor.
pub struct SerializedTaskQueue {
    name: String,
    tx: Sender<Job>,
    worker: ThreadId,
}

impl std::fmt::Debug for SerializedTaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerializedTaskQueue")
            .field("name", &self.name)
            .field("pending", &self.tx.len())
            .finish()
    }
}

impl SerializedTaskQueue {
    /// Starts the worker thread.
    pub fn start(name: impl Into<String>) -> MuxResult<Self> {
        let name = name.into();
        let (tx, rx) = unbounded::<Job>();

        let thread_name = format!("livemux-{name}");
        let worker_name = name.clone();
        let handle = thread::Builder::new()
            .name(thread_name)
            .spawn(move || worker_loop(&worker_name, &rx))
            .map_err(|e| MuxError::internal(format!("failed to spawn task queue worker: {e}")))?;
        let worker = handle.thread().id();
        // Detached: the worker exits once the last sender is dropped. Joining
        // here could deadlock when the queue is dropped from its own worker.
        drop(handle);

        Ok(Self { name, tx, worker })
    }

    /// Name given at spawn, also used for the worker thread.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// False iff called from a task currently running on this queue.
    #[must_use]
    pub fn safe_to_run_task(&self) -> bool {
        thread::current().id() != self.worker
    }

    /// Runs `task` on the queue and waits for it to finish.
    ///
    /// Calling this from inside one of this queue's own tasks would wait on
    /// itself, so it is rejected.
    pub fn run_task<F>(&self, task: F) -> MuxResult<()>
    where
        F: FnOnce() -> MuxResult<()> + Send + 'static,
    {
        if !self.safe_to_run_task() {
            return Err(ProtocolError::ConcurrencyMisuse {
                operation: "run_task",
            }
            .into());
        }

        let (reply_tx, reply_rx) = bounded::<MuxResult<()>>(1);
        self.submit(Job::Run {
            task: Box::new(task),
            reply: Some(reply_tx),
        })?;
        reply_rx.recv().map_err(|_| self.disconnected())?
    }

    /// Enqueues `task` without waiting. Safe to call from inside a task.
    pub fn queue_task<F>(&self, task: F) -> MuxResult<()>
    where
        F: FnOnce() -> MuxResult<()> + Send + 'static,
    {
        self.submit(Job::Run {
            task: Box::new(task),
            reply: None,
        })
    }

    fn submit(&self, job: Job) -> MuxResult<()> {
        self.tx.send(job).map_err(|_| self.disconnected())
    }

    fn disconnected(&self) -> MuxError {
        ExecutionError::Disconnected {
            queue: self.name.clone(),
        }
        .into()
    }
}

fn worker_loop(name: &str, rx: &Receiver<Job>) {
    while let Ok(Job::Run { task, reply }) = rx.recv() {
        let result = panic::catch_unwind(AssertUnwindSafe(task)).unwrap_or_else(|payload| {
            Err(ExecutionError::TaskPanicked {
                queue: name.to_string(),
                message: panic_message(payload.as_ref()),
            }
            .into())
        });

        match reply {
            Some(reply) => {
                let _ = reply.send(result);
            }
            None => {
                if let Err(err) = result {
                    tracing::error!(queue = name, error = %err, "queued task failed");
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
