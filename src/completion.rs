//! This module provides the completion signal handed back for every processed
//! workload.
//!
//! A signal starts out "pending" and is resolved exactly once, either with
//! success or with a [`BatchError`]. The write-side is the crate-private
//! [`Resolver`], owned by the pool while the workload runs and consumed by the
//! worker that finishes the workload last. The read-side is the public
//! [`Completion`] handle, which can be cloned freely: every clone observes the
//! same outcome.
//!
//! Readers can block on the handle (optionally with a timeout), poll it, or
//! `.await` it from any executor.

use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll, Waker},
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};

use crate::error::BatchError;

/// The result a workload resolves with.
pub type Outcome = Result<(), BatchError>;

/// Creates a new pending signal, returning its write and read sides.
pub(crate) fn signal() -> (Resolver, Completion) {
    let signal = Arc::new(Signal::new());
    let resolver = Resolver {
        signal: Some(Arc::clone(&signal)),
    };
    let completion = Completion {
        signal: Some(signal),
    };
    (resolver, completion)
}

// -----------------------------------------------------------------------------
// Shared signal state

/// A latch that can be used to block a thread, implemented using a mutex.
struct Signal {
    state: Mutex<State>,
    cond: Condvar,
}

enum State {
    /// Not resolved yet. Holds the wakers of tasks awaiting the handle.
    Pending(Vec<Waker>),
    /// Resolved. This is terminal.
    Resolved(Outcome),
}

impl Signal {
    fn new() -> Signal {
        Signal {
            state: Mutex::new(State::Pending(Vec::new())),
            cond: Condvar::new(),
        }
    }

    /// Resolves the signal. Only the first call has an effect.
    fn resolve(&self, outcome: Outcome) {
        let mut state = self.state.lock();
        let wakers = match &mut *state {
            State::Resolved(_) => return,
            State::Pending(wakers) => std::mem::take(wakers),
        };
        *state = State::Resolved(outcome);
        self.cond.notify_all();
        drop(state);

        // Wake outside the lock; wakers may poll the handle right away.
        for waker in wakers {
            waker.wake();
        }
    }

    fn outcome(&self) -> Option<Outcome> {
        match &*self.state.lock() {
            State::Pending(_) => None,
            State::Resolved(outcome) => Some(outcome.clone()),
        }
    }

    fn wait(&self) -> Outcome {
        let mut state = self.state.lock();
        loop {
            if let State::Resolved(outcome) = &*state {
                return outcome.clone();
            }
            self.cond.wait(&mut state);
        }
    }

    fn wait_until(&self, deadline: Instant) -> Option<Outcome> {
        let mut state = self.state.lock();
        loop {
            if let State::Resolved(outcome) = &*state {
                return Some(outcome.clone());
            }
            if self.cond.wait_until(&mut state, deadline).timed_out() {
                return match &*state {
                    State::Pending(_) => None,
                    State::Resolved(outcome) => Some(outcome.clone()),
                };
            }
        }
    }
}

// -----------------------------------------------------------------------------
// Resolver

/// The write-side of a completion signal.
///
/// Dropping a resolver without calling [`Resolver::resolve`] resolves the
/// signal with [`BatchError::Abandoned`], so readers never block forever on a
/// workload nobody is going to finish.
pub(crate) struct Resolver {
    signal: Option<Arc<Signal>>,
}

impl Resolver {
    pub(crate) fn resolve(mut self, outcome: Outcome) {
        if let Some(signal) = self.signal.take() {
            signal.resolve(outcome);
        }
    }
}

impl Drop for Resolver {
    fn drop(&mut self) {
        if let Some(signal) = self.signal.take() {
            signal.resolve(Err(BatchError::Abandoned));
        }
    }
}

// -----------------------------------------------------------------------------
// Completion handle

/// A handle to the outcome of a processed workload.
///
/// Returned by [`ThreadPool::process`](crate::thread_pool::ThreadPool::process)
/// and [`ThreadPool::submit`](crate::thread_pool::ThreadPool::submit). When the
/// pool rejects a submission the handle is *invalid*: it is not attached to any
/// workload and resolves immediately with [`BatchError::Invalid`].
///
/// The pool offers no timeouts of its own. A caller that needs one can use
/// [`Completion::wait_timeout`] or race the handle against a timer.
#[derive(Clone)]
pub struct Completion {
    signal: Option<Arc<Signal>>,
}

impl Completion {
    /// Creates a handle that is not attached to any workload.
    pub fn invalid() -> Completion {
        Completion { signal: None }
    }

    /// Returns `true` if the handle is attached to a workload.
    pub fn is_valid(&self) -> bool {
        self.signal.is_some()
    }

    /// Returns `true` once the outcome is available. Invalid handles are
    /// always ready.
    pub fn is_ready(&self) -> bool {
        self.try_outcome().is_some()
    }

    /// Returns the outcome if it is available, without blocking.
    pub fn try_outcome(&self) -> Option<Outcome> {
        match &self.signal {
            None => Some(Err(BatchError::Invalid)),
            Some(signal) => signal.outcome(),
        }
    }

    /// Blocks the calling thread until the workload resolves.
    pub fn wait(&self) -> Outcome {
        match &self.signal {
            None => Err(BatchError::Invalid),
            Some(signal) => signal.wait(),
        }
    }

    /// Blocks the calling thread until the workload resolves or `timeout`
    /// elapses. Returns `None` on timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Outcome> {
        match &self.signal {
            None => Some(Err(BatchError::Invalid)),
            Some(signal) => signal.wait_until(Instant::now() + timeout),
        }
    }
}

impl Future for Completion {
    type Output = Outcome;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Outcome> {
        let Some(signal) = &self.signal else {
            return Poll::Ready(Err(BatchError::Invalid));
        };
        let mut state = signal.state.lock();
        match &mut *state {
            State::Resolved(outcome) => Poll::Ready(outcome.clone()),
            State::Pending(wakers) => {
                if !wakers.iter().any(|waker| waker.will_wake(cx.waker())) {
                    wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("valid", &self.is_valid())
            .field("outcome", &self.try_outcome())
            .finish()
    }
}
