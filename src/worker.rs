//! Workers are the persistent threads of a pool. Each worker parks until the
//! pool arms it with a workload, runs its share of the workload through its
//! [`Distribution`] strategy, reports back, and parks again. The error
//! handling policy of the pool is applied around that loop.

use std::{
    cell::Cell,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use tracing::{debug, error, warn};

use crate::{
    config::ErrorHandling,
    error::TaskError,
    strategy::{Batch, Distribution},
    thread_pool::{Registry, Status},
};

thread_local! {
    static WORKER_INDEX: Cell<Option<usize>> = const { Cell::new(None) };
}

/// Returns the index of the pool worker running on the current thread, or
/// `None` when called from a thread that is not a pool worker.
pub fn current_index() -> Option<usize> {
    WORKER_INDEX.with(Cell::get)
}

// -----------------------------------------------------------------------------
// Worker

/// The per-worker state shared between the worker thread and the pool.
pub(crate) struct Worker {
    /// Set when the worker is armed with a workload, cleared when it has
    /// finished its share of it.
    busy: AtomicBool,
    /// Cleared when the worker's thread died from an unhandled task failure.
    alive: AtomicBool,
    strategy: Box<dyn Distribution>,
}

impl Worker {
    pub(crate) fn new(strategy: Box<dyn Distribution>) -> Worker {
        Worker {
            busy: AtomicBool::new(false),
            alive: AtomicBool::new(true),
            strategy,
        }
    }

    #[inline]
    pub(crate) fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub(crate) fn mark_lost(&self) {
        self.alive.store(false, Ordering::Release);
    }

    /// Arms the worker for a new workload. Must be called with the pool's
    /// sleep lock held, so the worker cannot miss the wakeup.
    pub(crate) fn prepare(&self, rank: usize) {
        self.strategy.prepare(rank);
        self.busy.store(true, Ordering::Release);
    }

    /// The wait/execute loop. Returns once the pool is terminating.
    fn run(&self, registry: &Registry) {
        loop {
            registry.wait_for_work(self);
            if registry.status() == Status::Terminating {
                self.finish_share(registry);
                return;
            }

            {
                let workload = registry.workload();
                self.strategy.do_work(&Batch::new(&workload, registry));
            }

            self.finish_share(registry);
        }
    }

    /// Reports that this worker is done with the current workload, if it was
    /// armed with one.
    fn finish_share(&self, registry: &Registry) {
        if self.busy.swap(false, Ordering::AcqRel) {
            registry.finish_share();
        }
    }
}

// -----------------------------------------------------------------------------
// Main worker loop

/// This is the main loop for a worker thread. It runs the wait/execute loop
/// and applies the pool's error handling policy whenever a task panic unwinds
/// out of it.
pub(crate) fn main_loop(registry: Arc<Registry>, index: usize) {
    WORKER_INDEX.with(|cell| cell.set(Some(index)));
    let worker = registry.worker(index);
    debug!(worker = index, "worker started");

    loop {
        let result = panic::catch_unwind(AssertUnwindSafe(|| worker.run(&registry)));
        let Err(payload) = result else {
            break;
        };
        let failure = TaskError::from_panic(index, payload.as_ref());

        match registry.error_handling() {
            ErrorHandling::None => {
                warn!(worker = index, error = %failure, "worker lost to an unhandled task failure");
                registry.record(failure);
                registry.lose_worker(worker);
                worker.finish_share(&registry);
                panic::resume_unwind(payload);
            }
            ErrorHandling::Ignore => {
                error!(worker = index, error = %failure, "pool task failed");
                registry.record(failure);
                // Still armed, so the restarted loop resumes the workload
                // (or reports back if the pool is terminating).
            }
            ErrorHandling::Terminate => {
                error!(worker = index, error = %failure, "pool task failed");
                registry.record(failure);
                warn!(worker = index, "terminating thread pool after task failure");
                registry.terminate();
                worker.finish_share(&registry);
                break;
            }
        }
    }

    debug!(worker = index, "worker exited");
}
