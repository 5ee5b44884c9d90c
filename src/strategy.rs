//! Distribution strategies decide which tasks of a workload each worker runs.
//!
//! Every worker owns one strategy instance. When a workload is armed the pool
//! calls [`Distribution::prepare`] on each live worker's strategy, then wakes
//! the workers, each of which calls [`Distribution::do_work`] once. `do_work`
//! claims and runs tasks through the [`Batch`] view until there is nothing
//! left for it, or until the pool stops processing.
//!
//! Three strategies are provided:
//! + [`SingleQueue`] pulls tasks through a shared cursor. Fast workers simply
//!   claim more tasks, which balances uneven task costs.
//! + [`MultiQueue`] statically partitions the workload into interleaved
//!   slices. There is no contention on a shared counter, but an expensive
//!   slice stalls the whole batch.
//! + [`ResourceAware`] behaves like `SingleQueue`, but registers the worker
//!   thread with an external resource (typically a native client library)
//!   around the work loop.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use crate::{
    task::{self, QueuedTask},
    thread_pool::{Registry, Status},
    util::CallOnDrop,
};

// -----------------------------------------------------------------------------
// Distribution

/// The pluggable half of a worker: how it claims tasks from a workload.
pub trait Distribution: Send + Sync + 'static {
    /// Arms the strategy for a new workload. `rank` is the position of this
    /// worker among the live workers of the pool, in `0..batch.stride()`.
    ///
    /// This is called by the thread submitting the workload, while the worker
    /// is parked.
    fn prepare(&self, rank: usize) {
        let _ = rank;
    }

    /// Claims and runs tasks from `batch` until there is no more work for
    /// this worker. Called on the worker thread.
    fn do_work(&self, batch: &Batch<'_>);
}

// -----------------------------------------------------------------------------
// Batch

/// A view of the workload currently being processed, handed to
/// [`Distribution::do_work`].
pub struct Batch<'a> {
    tasks: &'a [QueuedTask],
    registry: &'a Registry,
}

impl<'a> Batch<'a> {
    pub(crate) fn new(tasks: &'a [QueuedTask], registry: &'a Registry) -> Batch<'a> {
        Batch { tasks, registry }
    }

    /// Number of tasks in the workload.
    #[inline]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns `true` if the workload has no tasks.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Returns `true` while the pool is still processing this workload.
    /// Workers stop claiming tasks as soon as this turns false.
    #[inline]
    pub fn is_processing(&self) -> bool {
        self.registry.status() == Status::Processing
    }

    /// Number of workers sharing this workload.
    #[inline]
    pub fn stride(&self) -> usize {
        self.registry.stride()
    }

    /// Claims the next unclaimed index from the shared cursor. The returned
    /// index may be past the end of the workload.
    #[inline]
    pub fn claim(&self) -> usize {
        self.registry.claim()
    }

    /// Runs the task at `index`. Out-of-range indices and tasks that already
    /// ran are ignored.
    #[inline]
    pub fn execute(&self, index: usize) {
        if let Some(slot) = self.tasks.get(index) {
            task::execute(slot);
        }
    }
}

// -----------------------------------------------------------------------------
// Single queue

/// Dynamic pull: every worker claims the next task from a cursor shared by
/// the whole pool.
#[derive(Debug, Default)]
pub struct SingleQueue;

impl SingleQueue {
    pub fn new() -> SingleQueue {
        SingleQueue
    }
}

impl Distribution for SingleQueue {
    fn do_work(&self, batch: &Batch<'_>) {
        let mut index = batch.claim();
        while index < batch.len() && batch.is_processing() {
            batch.execute(index);
            index = batch.claim();
        }
    }
}

// -----------------------------------------------------------------------------
// Multi queue

/// Static partition: the worker ranked `r` runs the tasks at `r`, `r + n`,
/// `r + 2n`, ... where `n` is the number of workers sharing the workload.
#[derive(Debug, Default)]
pub struct MultiQueue {
    /// The next index this worker will run. Only touched by `prepare` (while
    /// the worker is parked) and by the worker itself.
    cursor: AtomicUsize,
}

impl MultiQueue {
    pub fn new() -> MultiQueue {
        MultiQueue::default()
    }
}

impl Distribution for MultiQueue {
    fn prepare(&self, rank: usize) {
        self.cursor.store(rank, Ordering::Relaxed);
    }

    fn do_work(&self, batch: &Batch<'_>) {
        let stride = batch.stride();
        loop {
            let index = self.cursor.load(Ordering::Relaxed);
            if index >= batch.len() || !batch.is_processing() {
                break;
            }
            // Step past the task before running it. If it panics, a restarted
            // worker resumes at the next index in its slice.
            self.cursor.store(index + stride, Ordering::Relaxed);
            batch.execute(index);
        }
    }
}

// -----------------------------------------------------------------------------
// Resource aware

/// An external resource that requires every thread using it to register
/// before use and unregister afterwards, e.g. a native database client.
pub trait ThreadRegistration: Send + Sync + 'static {
    /// Registers the calling thread.
    fn register(&self);

    /// Unregisters the calling thread.
    fn unregister(&self);
}

/// A [`SingleQueue`] that keeps the worker thread registered with an
/// external resource while it claims and runs tasks.
///
/// The thread is unregistered whenever the work loop exits, including when a
/// task panics, so a worker restarted after an ignored failure registers
/// again from a clean state.
pub struct ResourceAware<R> {
    queue: SingleQueue,
    resource: Arc<R>,
}

impl<R> ResourceAware<R>
where
    R: ThreadRegistration,
{
    pub fn new(resource: Arc<R>) -> ResourceAware<R> {
        ResourceAware {
            queue: SingleQueue::new(),
            resource,
        }
    }
}

impl<R> Distribution for ResourceAware<R>
where
    R: ThreadRegistration,
{
    fn prepare(&self, rank: usize) {
        self.queue.prepare(rank);
    }

    fn do_work(&self, batch: &Batch<'_>) {
        self.resource.register();
        let _unregister = CallOnDrop(|| self.resource.unregister());
        self.queue.do_work(batch);
    }
}
