//! A fixed-size worker pool for processing batches of independent tasks.
//!
//! A [`ThreadPool`](thread_pool::ThreadPool) owns a set of persistent worker
//! threads and one pending *workload*: an ordered batch of tasks. Processing a
//! workload wakes every worker, which claim and run tasks until the workload is
//! exhausted. The caller gets a [`Completion`](completion::Completion) handle
//! back immediately and can block on it, poll it or `.await` it to learn
//! whether the whole batch succeeded.
//!
//! How tasks are handed out is pluggable through the
//! [`Distribution`](strategy::Distribution) trait. The crate ships a dynamic
//! pull strategy, a static stride partition, and a variant that registers each
//! worker thread with an external resource while it works.
//!
//! Two policies complete the picture:
//! + [`ClearMode`](config::ClearMode) decides when a consumed workload is
//!   discarded.
//! + [`ErrorHandling`](config::ErrorHandling) decides what a panicking task
//!   does to its worker and to the pool.
//!
//! The pool is not an async runtime and does not steal work between threads.
//! There are no per-task results and no cancellation of running tasks; only
//! whole-batch completion is reported.

pub mod completion;
pub mod config;
pub mod error;
pub mod strategy;
pub mod task;
pub mod thread_pool;
pub mod worker;

mod util;

pub mod prelude {
    pub use crate::{
        completion::{Completion, Outcome},
        config::{ClearMode, ErrorHandling, PoolConfig},
        error::{BatchError, PoolError, TaskError},
        strategy::{Batch, Distribution, MultiQueue, ResourceAware, SingleQueue, ThreadRegistration},
        task::{task, Task, Workload},
        thread_pool::{Status, ThreadPool},
    };
}
