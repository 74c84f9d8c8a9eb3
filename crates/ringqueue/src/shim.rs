//! Switches the lock-free containers between `std` and `loom` primitives.
//!
//! Only the atomics, `Arc` and the spin-wait hint go through here. The monitor
//! collections use `parking_lot` directly and are not modelled under loom.

#[cfg(not(feature = "loom"))]
pub(crate) mod atomic {
    pub(crate) use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU64, AtomicUsize, Ordering};
}

#[cfg(feature = "loom")]
pub(crate) mod atomic {
    pub(crate) use loom::sync::atomic::{AtomicBool, AtomicPtr, AtomicU64, AtomicUsize, Ordering};
}

#[cfg(not(feature = "loom"))]
pub(crate) mod sync {
    pub(crate) use std::sync::Arc;
}

#[cfg(feature = "loom")]
pub(crate) mod sync {
    pub(crate) use loom::sync::Arc;
}

/// One step of a busy-wait loop.
///
/// Under loom the scheduler must be told that the thread is spinning, otherwise
/// the model never lets the lock holder make progress.
#[inline]
pub(crate) fn spin_wait(backoff: &crossbeam_utils::Backoff) {
    #[cfg(feature = "loom")]
    {
        let _ = backoff;
        loom::thread::yield_now();
    }
    #[cfg(not(feature = "loom"))]
    backoff.snooze();
}
