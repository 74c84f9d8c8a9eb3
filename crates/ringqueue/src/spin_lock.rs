use crate::shim::{self, atomic::AtomicBool, atomic::Ordering};
use crossbeam_utils::Backoff;
use std::time::{Duration, Instant};

/// Busy-wait mutual exclusion on a single atomic flag.
///
/// Meant for very short critical sections such as one ring enqueue inside an
/// MPSC shard. The lock is released when the returned guard is dropped.
#[derive(Debug)]
pub struct SpinLock {
    locked: AtomicBool,
}

/// Releases the [`SpinLock`] on drop.
#[derive(Debug)]
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct SpinLockGuard<'a> {
    lock: &'a SpinLock,
}

impl SpinLock {
    /// Creates an unlocked spin lock.
    pub fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
        }
    }

    /// Returns `true` if some thread currently holds the lock.
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }

    /// Takes the lock if it is free, without waiting.
    #[inline]
    pub fn try_lock(&self) -> Option<SpinLockGuard<'_>> {
        if self.locked.swap(true, Ordering::Acquire) {
            None
        } else {
            Some(SpinLockGuard { lock: self })
        }
    }

    /// Retries [`try_lock`](Self::try_lock) up to `spins` extra times.
    pub fn try_lock_spin(&self, spins: usize) -> Option<SpinLockGuard<'_>> {
        for _ in 0..=spins {
            if let Some(guard) = self.try_lock() {
                return Some(guard);
            }
            std::hint::spin_loop();
        }
        None
    }

    /// Keeps retrying until the lock is taken or `timeout` elapses.
    pub fn try_lock_for(&self, timeout: Duration) -> Option<SpinLockGuard<'_>> {
        let deadline = Instant::now() + timeout;
        let backoff = Backoff::new();
        loop {
            if let Some(guard) = self.try_lock() {
                return Some(guard);
            }
            if Instant::now() >= deadline {
                return None;
            }
            shim::spin_wait(&backoff);
        }
    }

    /// Spins until the lock is taken.
    #[inline]
    pub fn lock(&self) -> SpinLockGuard<'_> {
        let backoff = Backoff::new();
        loop {
            // Test before swapping so waiters spin on a shared cache line.
            if !self.locked.load(Ordering::Relaxed) {
                if let Some(guard) = self.try_lock() {
                    return guard;
                }
            }
            shim::spin_wait(&backoff);
        }
    }

    #[inline]
    fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }
}

impl Default for SpinLock {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SpinLockGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        self.lock.unlock();
    }
}
