//! Construction-time configuration for a [`ThreadPool`](crate::thread_pool::ThreadPool).

use std::{fmt, thread};

/// Decides when a workload that has been fully consumed is discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClearMode {
    /// The stale workload is dropped lazily, right before the next append or
    /// the next call to process the pending workload.
    #[default]
    AtNextWorkload,
    /// The worker that finishes a workload drops it before resolving the
    /// completion handle.
    UponCompletion,
}

/// Decides how a worker reacts when a task panics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorHandling {
    /// The panic is not swallowed. It is recorded so the batch can resolve,
    /// then resumed, ending the worker's thread.
    None,
    /// The panic is logged and recorded, and the worker keeps working.
    #[default]
    Ignore,
    /// The panic is logged and recorded, and the whole pool is driven to
    /// [`Status::Terminating`](crate::thread_pool::Status::Terminating).
    Terminate,
}

impl fmt::Display for ErrorHandling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorHandling::None => "none",
            ErrorHandling::Ignore => "ignore",
            ErrorHandling::Terminate => "terminate",
        };
        f.write_str(name)
    }
}

/// Thread pool configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of persistent worker threads
    pub threads: usize,

    /// When consumed workloads are discarded
    pub clear_mode: ClearMode,

    /// How workers react to panicking tasks
    pub error_handling: ErrorHandling,

    /// Prefix for worker thread names; worker `i` is named `{prefix}-{i}`
    pub thread_name: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        let threads = thread::available_parallelism()
            .map(|num_threads| num_threads.get())
            .unwrap_or(1);
        Self {
            threads,
            clear_mode: ClearMode::default(),
            error_handling: ErrorHandling::default(),
            thread_name: "batchpool-worker".to_string(),
        }
    }
}

impl PoolConfig {
    /// Create a configuration for a pool of `threads` workers
    pub fn new(threads: usize) -> Self {
        Self {
            threads,
            ..Default::default()
        }
    }

    /// Set the number of worker threads
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Set the clear mode
    pub fn with_clear_mode(mut self, mode: ClearMode) -> Self {
        self.clear_mode = mode;
        self
    }

    /// Set the error handling mode
    pub fn with_error_handling(mut self, mode: ErrorHandling) -> Self {
        self.error_handling = mode;
        self
    }

    /// Set the worker thread name prefix
    pub fn with_thread_name(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name = prefix.into();
        self
    }

    pub(crate) fn worker_name(&self, index: usize) -> String {
        format!("{}-{}", self.thread_name, index)
    }
}
