use std::{
    fmt,
    sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering},
    sync::Arc,
    thread::{self, JoinHandle},
};

use crossbeam_utils::CachePadded;
use parking_lot::{Condvar, Mutex, RwLock, RwLockReadGuard};
use tracing::{debug, info, trace, warn};

use crate::{
    completion::{self, Completion, Resolver},
    config::{ClearMode, ErrorHandling, PoolConfig},
    error::{BatchError, PoolError, TaskError},
    strategy::{Distribution, MultiQueue, ResourceAware, SingleQueue, ThreadRegistration},
    task::{self, QueuedTask, Task},
    util::Slot,
    worker::{self, Worker},
};

// -----------------------------------------------------------------------------
// Status

/// The lifecycle state of a thread pool.
///
/// ```text
/// Ready ──submit──> Processing ──done──> Ready
///                   Processing ──worker lost──> Error ──done──> Ready
/// any ──shutdown / terminate-on-failure──> Terminating   (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Status {
    /// Idle. The pending workload can be modified and processed.
    Ready = 0,
    /// A workload is being processed.
    Processing = 1,
    /// A worker died from an unhandled task failure while processing. The
    /// workload finishes with that failure and the pool returns to `Ready`.
    Error = 2,
    /// The pool is shutting down. Workers exit and all submissions are
    /// rejected. This state is never left.
    Terminating = 3,
}

impl Status {
    fn from_u8(value: u8) -> Status {
        match value {
            0 => Status::Ready,
            1 => Status::Processing,
            2 => Status::Error,
            _ => Status::Terminating,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Ready => "ready",
            Status::Processing => "processing",
            Status::Error => "in error",
            Status::Terminating => "terminating",
        };
        f.write_str(name)
    }
}

// -----------------------------------------------------------------------------
// Thread pool

/// A fixed-size pool of worker threads that processes one workload at a time.
///
/// Tasks are queued into the *pending workload*, either one at a time with
/// [`ThreadPool::append`] or wholesale with [`ThreadPool::submit`]. Processing
/// the workload wakes every worker; each claims tasks according to the pool's
/// [`Distribution`] strategy. The returned [`Completion`] resolves once every
/// task has run, or with the first failure.
///
/// ```
/// # use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
/// # use batchpool::prelude::*;
/// let mut pool = ThreadPool::new(PoolConfig::new(4)).unwrap();
/// let counter = Arc::new(AtomicUsize::new(0));
///
/// let workload: Workload = (0..16)
///     .map(|_| {
///         let counter = Arc::clone(&counter);
///         task(move || {
///             counter.fetch_add(1, Ordering::Relaxed);
///         })
///     })
///     .collect();
///
/// pool.submit(workload).wait().unwrap();
/// assert_eq!(counter.load(Ordering::Relaxed), 16);
/// ```
///
/// # Failures
///
/// Tasks fail by panicking. What happens next depends on the configured
/// [`ErrorHandling`]: the failure can take its worker down with it (`None`),
/// be logged and skipped (`Ignore`), or shut the whole pool down
/// (`Terminate`). Failures are never raised on the submitting thread; they are
/// reported through the completion handle and [`ThreadPool::errors`].
///
/// # Shutdown
///
/// Dropping the pool moves it to [`Status::Terminating`] and joins every
/// worker. Tasks that are already running are allowed to finish, but no new
/// tasks are started.
pub struct ThreadPool {
    registry: Arc<Registry>,
    threads: Vec<JoinHandle<()>>,
}

/// The state shared between the pool and its workers.
pub(crate) struct Registry {
    clear_mode: ClearMode,
    error_handling: ErrorHandling,
    /// The current `Status`, stored as its discriminant.
    status: AtomicU8,
    workers: Vec<Worker>,
    /// Number of workers whose thread is still running.
    live_workers: AtomicUsize,
    /// Number of armed workers that have not finished the current workload.
    /// Reaches zero exactly once per processed workload.
    active: CachePadded<AtomicUsize>,
    /// The shared cursor used by `SingleQueue` to hand out task indices.
    cursor: CachePadded<AtomicUsize>,
    /// Number of workers sharing the current workload.
    stride: AtomicUsize,
    /// The pending workload. Workers hold a read lock while processing it;
    /// the pool only writes to it while `Ready`.
    workload: RwLock<Vec<QueuedTask>>,
    /// Set once the pending workload has been processed and not yet cleared.
    dirty: AtomicBool,
    /// Failures captured while processing the current workload.
    errors: Mutex<Vec<TaskError>>,
    /// Write-side of the current workload's completion handle.
    resolver: Mutex<Option<Resolver>>,
    /// Guards the wait/wake rendezvous between the pool and parked workers.
    sleep: Mutex<()>,
    /// Used to wake parked workers on submission or termination.
    wake: Condvar,
}

impl ThreadPool {
    /// Creates a pool whose workers pull tasks through a shared cursor
    /// ([`SingleQueue`]).
    pub fn new(config: PoolConfig) -> Result<ThreadPool, PoolError> {
        ThreadPool::with_distribution(config, |_| SingleQueue::new())
    }

    /// Creates a pool whose workers run fixed interleaved slices of each
    /// workload ([`MultiQueue`]).
    pub fn multi_queue(config: PoolConfig) -> Result<ThreadPool, PoolError> {
        ThreadPool::with_distribution(config, |_| MultiQueue::new())
    }

    /// Creates a pool whose workers register with `resource` around their
    /// work loop ([`ResourceAware`]).
    pub fn resource_aware<R>(config: PoolConfig, resource: Arc<R>) -> Result<ThreadPool, PoolError>
    where
        R: ThreadRegistration,
    {
        ThreadPool::with_distribution(config, |_| ResourceAware::new(Arc::clone(&resource)))
    }

    /// Creates a pool with a custom distribution strategy. `strategy` is
    /// called once per worker with the worker's index.
    pub fn with_distribution<D, F>(
        config: PoolConfig,
        mut strategy: F,
    ) -> Result<ThreadPool, PoolError>
    where
        D: Distribution,
        F: FnMut(usize) -> D,
    {
        if config.threads == 0 {
            return Err(PoolError::NoThreads);
        }

        let workers = (0..config.threads)
            .map(|index| Worker::new(Box::new(strategy(index))))
            .collect();

        let registry = Arc::new(Registry {
            clear_mode: config.clear_mode,
            error_handling: config.error_handling,
            status: AtomicU8::new(Status::Ready as u8),
            workers,
            live_workers: AtomicUsize::new(config.threads),
            active: CachePadded::new(AtomicUsize::new(0)),
            cursor: CachePadded::new(AtomicUsize::new(0)),
            stride: AtomicUsize::new(config.threads),
            workload: RwLock::new(Vec::new()),
            dirty: AtomicBool::new(false),
            errors: Mutex::new(Vec::new()),
            resolver: Mutex::new(None),
            sleep: Mutex::new(()),
            wake: Condvar::new(),
        });

        // If a spawn fails, dropping the partially built pool terminates and
        // joins the threads started so far.
        let mut pool = ThreadPool {
            registry,
            threads: Vec::with_capacity(config.threads),
        };
        for index in 0..config.threads {
            let registry = Arc::clone(&pool.registry);
            let handle = thread::Builder::new()
                .name(config.worker_name(index))
                .spawn(move || worker::main_loop(registry, index))?;
            pool.threads.push(handle);
        }

        info!(
            threads = config.threads,
            clear_mode = ?config.clear_mode,
            error_handling = %config.error_handling,
            "thread pool started"
        );
        Ok(pool)
    }

    /// Appends a task to the pending workload.
    ///
    /// Fails while a workload is being processed. Under
    /// [`ClearMode::AtNextWorkload`], appending after a processed workload
    /// first discards it, so the task starts a fresh workload.
    pub fn append<F>(&mut self, f: F) -> Result<&mut ThreadPool, PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.check_mutable()?;
        let registry = &self.registry;
        if registry.clear_mode == ClearMode::AtNextWorkload && registry.is_dirty() {
            registry.clear_workload();
        }
        registry.workload.write().push(Slot::new(task::task(f)));
        Ok(self)
    }

    /// Replaces the pending workload with `workload` and processes it.
    ///
    /// Returns an invalid handle if the pool is not `Ready` or the workload is
    /// empty; in the first case the pending workload is left untouched.
    pub fn submit<I>(&mut self, workload: I) -> Completion
    where
        I: IntoIterator<Item = Task>,
    {
        if self.status() != Status::Ready {
            return Completion::invalid();
        }
        *self.registry.workload.write() = task::enqueue(workload);
        self.registry.dirty.store(false, Ordering::Relaxed);
        self.process()
    }

    /// Processes the pending workload, returning immediately with a handle
    /// to its outcome.
    ///
    /// Returns an invalid handle if the pool is not `Ready` or there is
    /// nothing to process.
    pub fn process(&mut self) -> Completion {
        let registry = &self.registry;
        if registry.status() != Status::Ready {
            return Completion::invalid();
        }
        if registry.clear_mode == ClearMode::AtNextWorkload && registry.is_dirty() {
            registry.clear_workload();
        }

        let tasks = registry.workload.read().len();
        if tasks == 0 {
            return Completion::invalid();
        }

        let (resolver, completion) = completion::signal();
        *registry.resolver.lock() = Some(resolver);
        registry.errors.lock().clear();
        registry.dirty.store(true, Ordering::Relaxed);

        let live = registry.live_workers.load(Ordering::Acquire);
        registry.active.store(live, Ordering::Release);
        registry.cursor.store(0, Ordering::Relaxed);
        registry.stride.store(live, Ordering::Relaxed);
        registry.set_status(Status::Processing);
        debug!(tasks, workers = live, "processing workload");

        // Arm and wake the workers under the sleep lock, so none of them can
        // check its busy flag between the two.
        let _sleep = registry.sleep.lock();
        registry
            .workers
            .iter()
            .filter(|worker| worker.is_alive())
            .enumerate()
            .for_each(|(rank, worker)| worker.prepare(rank));
        registry.wake.notify_all();

        completion
    }

    /// Drops every task of the pending workload. Fails while a workload is
    /// being processed, so running tasks are never affected.
    pub fn clear(&mut self) -> Result<(), PoolError> {
        self.check_mutable()?;
        self.registry.clear_workload();
        Ok(())
    }

    /// The current status of the pool.
    pub fn status(&self) -> Status {
        self.registry.status()
    }

    /// The configured number of worker threads.
    pub fn size(&self) -> usize {
        self.registry.workers.len()
    }

    /// The number of workers still running. This is less than
    /// [`ThreadPool::size`] only after workers were lost under
    /// [`ErrorHandling::None`].
    pub fn live_workers(&self) -> usize {
        self.registry.live_workers.load(Ordering::Acquire)
    }

    /// The number of tasks in the pending workload, including tasks of a
    /// processed workload that has not been cleared yet.
    pub fn workload_len(&self) -> usize {
        self.registry.workload.read().len()
    }

    /// The failures captured while processing the most recent workload, in
    /// the order they were captured.
    pub fn errors(&self) -> Vec<TaskError> {
        self.registry.errors.lock().clone()
    }

    fn check_mutable(&self) -> Result<(), PoolError> {
        match self.status() {
            Status::Ready => Ok(()),
            Status::Terminating => Err(PoolError::Terminated),
            status => Err(PoolError::Busy { status }),
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.registry.terminate();
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                debug!("joined a worker that died from a task failure");
            }
        }
        info!("thread pool stopped");
    }
}

impl fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPool")
            .field("status", &self.status())
            .field("size", &self.size())
            .field("live_workers", &self.live_workers())
            .finish_non_exhaustive()
    }
}

// -----------------------------------------------------------------------------
// Registry

impl Registry {
    #[inline]
    pub(crate) fn status(&self) -> Status {
        Status::from_u8(self.status.load(Ordering::Acquire))
    }

    fn set_status(&self, status: Status) {
        self.status.store(status as u8, Ordering::Release);
    }

    fn transition(&self, from: Status, to: Status) -> bool {
        self.status
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn error_handling(&self) -> ErrorHandling {
        self.error_handling
    }

    pub(crate) fn worker(&self, index: usize) -> &Worker {
        &self.workers[index]
    }

    pub(crate) fn workload(&self) -> RwLockReadGuard<'_, Vec<QueuedTask>> {
        self.workload.read()
    }

    #[inline]
    pub(crate) fn stride(&self) -> usize {
        self.stride.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn claim(&self) -> usize {
        self.cursor.fetch_add(1, Ordering::Relaxed)
    }

    fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Relaxed)
    }

    fn clear_workload(&self) {
        self.dirty.store(false, Ordering::Relaxed);
        self.workload.write().clear();
    }

    /// Parks the calling worker until it is armed or the pool terminates.
    pub(crate) fn wait_for_work(&self, worker: &Worker) {
        let mut sleep = self.sleep.lock();
        while !worker.is_busy() && self.status() != Status::Terminating {
            self.wake.wait(&mut sleep);
        }
    }

    /// Moves the pool to `Terminating` and wakes every parked worker.
    pub(crate) fn terminate(&self) {
        let _sleep = self.sleep.lock();
        self.set_status(Status::Terminating);
        self.wake.notify_all();
    }

    pub(crate) fn record(&self, failure: TaskError) {
        self.errors.lock().push(failure);
    }

    /// Accounts for a worker whose thread is about to die. The current
    /// workload ends in `Error`, and later workloads are shared among the
    /// survivors.
    pub(crate) fn lose_worker(&self, worker: &Worker) {
        worker.mark_lost();
        self.transition(Status::Processing, Status::Error);
        if self.live_workers.fetch_sub(1, Ordering::AcqRel) == 1 {
            warn!("every worker was lost, terminating thread pool");
            self.terminate();
        }
    }

    /// Called once by every armed worker when it is done with the current
    /// workload. The last one performs the completion bookkeeping.
    pub(crate) fn finish_share(&self) {
        if self.active.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }

        if self.clear_mode == ClearMode::UponCompletion {
            self.clear_workload();
        }

        // Take the resolver before leaving `Processing`: once the pool is
        // `Ready` the next workload may install its own.
        let resolver = self.resolver.lock().take();
        let failure = || match self.errors.lock().first() {
            Some(error) => BatchError::Task(error.clone()),
            None => BatchError::Terminated,
        };

        let outcome = loop {
            match self.status() {
                Status::Processing => {
                    if self.transition(Status::Processing, Status::Ready) {
                        break Ok(());
                    }
                }
                Status::Error => {
                    let error = failure();
                    if self.transition(Status::Error, Status::Ready) {
                        break Err(error);
                    }
                }
                Status::Terminating => break Err(failure()),
                Status::Ready => break Ok(()),
            }
        };

        trace!(?outcome, "workload finished");
        if let Some(resolver) = resolver {
            resolver.resolve(outcome);
        }
    }
}
