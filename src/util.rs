use std::{
    cell::UnsafeCell,
    mem::{needs_drop, MaybeUninit},
    sync::atomic::{AtomicUsize, Ordering},
};

// -----------------------------------------------------------------------------
// Call on drop guard

// A guard that calls the specified closure when it is dropped. This is used
// internally to run cleanup logic whether a scope exits normally or unwinds.
pub struct CallOnDrop<F: FnMut()>(pub F);

impl<F: FnMut()> Drop for CallOnDrop<F> {
    fn drop(&mut self) {
        (self.0)();
    }
}

// -----------------------------------------------------------------------------
// Slot

/// A slot is a simple atomic store. Like `Option`, slots are either empty or
/// contain a single value. But unlike `Option`, slots are opaque: the only way
/// to tell if a slot contains a value is to remove it.
///
/// Every queued task in a workload lives in its own slot. A worker that claims
/// an index takes the task out of the slot, which transfers ownership of the
/// closure (and everything it captured) to that worker. A second `take` on the
/// same slot returns `None`, so a task can never run twice.
///
/// `take` is lock-free. The failing path costs only an atomic read. The
/// success path costs an atomic read and two quick writes. It never spins.
pub struct Slot<T> {
    slot: UnsafeCell<MaybeUninit<T>>,
    flag: AtomicUsize,
}

// A flag state indicating the slot is empty.
const NONE: usize = 0;

// A flag state indicating a `take` is in progress.
const LOCK: usize = 1;

// A flag state indicating the slot is occupied. This allows `take`.
const SOME: usize = 2;

impl<T> Slot<T> {
    /// Creates a slot holding `value`.
    pub const fn new(value: T) -> Slot<T> {
        Slot {
            slot: UnsafeCell::new(MaybeUninit::new(value)),
            flag: AtomicUsize::new(SOME),
        }
    }

    /// Takes the value from the slot. Returns none if the slot is empty.
    pub fn take(&self) -> Option<T> {
        match self
            .flag
            .compare_exchange(SOME, LOCK, Ordering::Acquire, Ordering::Relaxed)
        {
            Err(_) => None,
            Ok(_) => {
                let value;
                unsafe {
                    let slot = &mut *(self.slot.get());
                    value = slot.assume_init_read();
                };
                self.flag.store(NONE, Ordering::Release);
                Some(value)
            }
        }
    }
}

impl<T> Drop for Slot<T> {
    fn drop(&mut self) {
        // If `T` dosn't need to be dropped then neither does `Slot`.
        if needs_drop::<T>() {
            let Slot { flag, slot } = self;
            // SAFETY: The flag value is always set to either `NONE` or `SOME`.
            // Slots are never dropped when the flag is `LOCK`. If the flag is
            // `NONE` then the slot is empty and nothing needs to be dropped.
            // If it is `SOME` then the value is initalized and we must
            // manually drop it.
            unsafe {
                if *flag.get_mut() == SOME {
                    slot.get_mut().as_mut_ptr().drop_in_place();
                }
            }
        }
    }
}

/// SAFETY: A `Slot<T>` contains `T` so is `Send` iff `T` is send.
unsafe impl<T> Send for Slot<T> where T: Send {}

/// SAFETY: A `&Slot<T>` lets you get a `T` via `Slot::take()`. If `Slot<T>` is
/// `Sync` this could cause `T` to be sent to another thread. So `Slot<T>` is
/// `Sync` iff `T` is `Send`.
unsafe impl<T> Sync for Slot<T> where T: Send {}
