//! Tasks are the unit of work executed by the pool. A task is an opaque
//! closure taking no arguments and returning nothing; it is run exactly once,
//! by whichever worker claims it. A task reports failure by panicking.
//!
//! A `Workload` is an ordered batch of tasks submitted together.

use crate::util::Slot;

/// A boxed task closure.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// An ordered batch of tasks.
pub type Workload = Vec<Task>;

/// Boxes a closure into a [`Task`].
///
/// ```
/// # use batchpool::task::{task, Workload};
/// let workload: Workload = (0..4).map(|i| task(move || println!("task {i}"))).collect();
/// assert_eq!(workload.len(), 4);
/// ```
pub fn task<F>(f: F) -> Task
where
    F: FnOnce() + Send + 'static,
{
    Box::new(f)
}

/// A queued task, waiting in its slot for a worker to take it.
pub(crate) type QueuedTask = Slot<Task>;

/// Wraps tasks into slots so they can be claimed concurrently.
pub(crate) fn enqueue<I>(tasks: I) -> Vec<QueuedTask>
where
    I: IntoIterator<Item = Task>,
{
    tasks.into_iter().map(Slot::new).collect()
}

/// Runs the task stored in `slot`, if nobody ran it yet.
#[inline]
pub(crate) fn execute(slot: &QueuedTask) {
    if let Some(task) = slot.take() {
        task();
    }
}
