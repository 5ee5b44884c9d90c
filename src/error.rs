//! Error types for pool usage, task failures and batch outcomes.

use std::{any::Any, io};

use crate::thread_pool::Status;

/// Errors reported synchronously to the code driving the pool.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// A pool needs at least one worker thread.
    #[error("a thread pool needs at least one worker thread")]
    NoThreads,

    /// The pending workload cannot change while a batch is in flight.
    #[error("cannot modify the workload while the pool is {status}")]
    Busy { status: Status },

    /// The pool has been terminated and accepts no more work.
    #[error("the thread pool has been terminated")]
    Terminated,

    /// The operating system refused to start a worker thread.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] io::Error),
}

/// A failure captured from a panicking task.
///
/// The message is extracted from the panic payload once, when the failure is
/// captured. Payloads that are neither `&str` nor `String` are opaque.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "task on worker {worker} panicked: {}",
    .message.as_deref().unwrap_or("<opaque panic payload>")
)]
pub struct TaskError {
    worker: usize,
    message: Option<String>,
}

impl TaskError {
    /// Captures the payload of a panic that unwound out of a task run by `worker`.
    pub fn from_panic(worker: usize, payload: &(dyn Any + Send)) -> TaskError {
        let message = payload
            .downcast_ref::<&str>()
            .map(|message| message.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned());
        TaskError { worker, message }
    }

    /// Index of the worker that was running the task.
    pub fn worker(&self) -> usize {
        self.worker
    }

    /// The panic message, when the payload carried one.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

/// The ways a workload can fail to complete successfully.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BatchError {
    /// A task panicked. Carries the first failure captured for the workload.
    #[error(transparent)]
    Task(TaskError),

    /// The pool shut down before the workload finished.
    #[error("the thread pool terminated before the workload finished")]
    Terminated,

    /// The workload was dropped without ever being resolved.
    #[error("the workload was abandoned without completing")]
    Abandoned,

    /// The handle came from a submission the pool rejected.
    #[error("the completion handle is not attached to a workload")]
    Invalid,
}
