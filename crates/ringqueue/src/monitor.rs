//! Mutex and condition-variable monitor shared by the wait collections.
//!
//! The monitor owns the collection's storage together with the `closed` flag.
//! Producers wait on `not_full`, consumers on `not_empty`. Once closed,
//! producers are refused right away while consumers keep draining until the
//! storage is empty.

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Storage kept behind a [`Monitor`].
pub(crate) trait Storage {
    fn len(&self) -> usize;
}

pub(crate) struct State<S> {
    pub(crate) items: S,
    closed: bool,
}

/// How long a wait may last.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Deadline {
    Never,
    /// Check once, do not wait.
    Now,
    At(Instant),
}

impl Deadline {
    pub(crate) fn after(timeout: Duration) -> Self {
        Instant::now()
            .checked_add(timeout)
            .map_or(Self::Never, Self::At)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Ready,
    Closed,
    TimedOut,
}

pub(crate) struct Monitor<S> {
    state: Mutex<State<S>>,
    not_full: Condvar,
    not_empty: Condvar,
}

impl<S: Storage> Monitor<S> {
    pub(crate) fn new(items: S) -> Self {
        Self {
            state: Mutex::new(State {
                items,
                closed: false,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
        }
    }

    #[inline]
    pub(crate) fn lock(&self) -> MutexGuard<'_, State<S>> {
        self.state.lock()
    }

    /// Waits until `has_room` holds or the monitor is closed.
    ///
    /// Closed wins over room: a closed collection never accepts items.
    pub(crate) fn wait_for_room<F>(
        &self,
        guard: &mut MutexGuard<'_, State<S>>,
        deadline: Deadline,
        has_room: F,
    ) -> Outcome
    where
        F: Fn(&S) -> bool,
    {
        Self::wait_on(&self.not_full, guard, deadline, |state| {
            if state.closed {
                Some(Outcome::Closed)
            } else if has_room(&state.items) {
                Some(Outcome::Ready)
            } else {
                None
            }
        })
    }

    /// Waits until at least one item is queued or the monitor is closed.
    ///
    /// Items win over closed, so a closed collection still drains.
    pub(crate) fn wait_for_items(
        &self,
        guard: &mut MutexGuard<'_, State<S>>,
        deadline: Deadline,
    ) -> Outcome {
        Self::wait_on(&self.not_empty, guard, deadline, |state| {
            if state.items.len() > 0 {
                Some(Outcome::Ready)
            } else if state.closed {
                Some(Outcome::Closed)
            } else {
                None
            }
        })
    }

    fn wait_on<F>(
        cond: &Condvar,
        guard: &mut MutexGuard<'_, State<S>>,
        deadline: Deadline,
        check: F,
    ) -> Outcome
    where
        F: Fn(&State<S>) -> Option<Outcome>,
    {
        let mut expired = false;
        loop {
            if let Some(outcome) = check(guard) {
                return outcome;
            }
            if expired {
                return Outcome::TimedOut;
            }
            expired = match deadline {
                Deadline::Never => {
                    cond.wait(guard);
                    false
                }
                Deadline::Now => true,
                Deadline::At(at) => cond.wait_until(guard, at).timed_out(),
            };
        }
    }

    /// Wakes one consumer, or all of them after a multi-item insert.
    #[inline]
    pub(crate) fn notify_items(&self, many: bool) {
        if many {
            self.not_empty.notify_all();
        } else {
            self.not_empty.notify_one();
        }
    }

    /// Wakes one producer, or all of them after a multi-item removal.
    #[inline]
    pub(crate) fn notify_room(&self, many: bool) {
        if many {
            self.not_full.notify_all();
        } else {
            self.not_full.notify_one();
        }
    }

    /// Moves to the closed state and wakes every waiter.
    ///
    /// Returns false if the monitor was already closed.
    pub(crate) fn close(&self) -> bool {
        let mut state = self.lock();
        if state.closed {
            tracing::trace!("wait collection already closed");
            return false;
        }
        state.closed = true;
        tracing::debug!(pending = state.items.len(), "wait collection closed");
        drop(state);

        self.not_full.notify_all();
        self.not_empty.notify_all();
        true
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().items.len()
    }
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    impl Storage for Vec<u32> {
        fn len(&self) -> usize {
            Vec::len(self)
        }
    }

    #[test]
    fn test_wait_now_does_not_block() {
        let monitor = Monitor::new(Vec::<u32>::new());
        let mut guard = monitor.lock();
        assert_eq!(
            monitor.wait_for_items(&mut guard, Deadline::Now),
            Outcome::TimedOut
        );
        assert_eq!(
            monitor.wait_for_room(&mut guard, Deadline::Now, |v| v.is_empty()),
            Outcome::Ready
        );
        guard.items.push(1);
        assert_eq!(
            monitor.wait_for_items(&mut guard, Deadline::Now),
            Outcome::Ready
        );
    }

    #[test]
    fn test_deadline_expires() {
        let monitor = Monitor::new(Vec::<u32>::new());
        let mut guard = monitor.lock();
        let start = Instant::now();
        let outcome =
            monitor.wait_for_items(&mut guard, Deadline::after(Duration::from_millis(20)));
        assert_eq!(outcome, Outcome::TimedOut);
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_close_wins_for_producers_items_win_for_consumers() {
        let monitor = Monitor::new(vec![7u32]);
        assert!(monitor.close());
        assert!(!monitor.close());
        assert!(monitor.is_closed());

        let mut guard = monitor.lock();
        assert_eq!(
            monitor.wait_for_room(&mut guard, Deadline::Never, |_| true),
            Outcome::Closed
        );
        assert_eq!(
            monitor.wait_for_items(&mut guard, Deadline::Never),
            Outcome::Ready
        );
        guard.items.clear();
        assert_eq!(
            monitor.wait_for_items(&mut guard, Deadline::Never),
            Outcome::Closed
        );
    }

    #[test]
    fn test_close_wakes_blocked_waiter() {
        let monitor = Arc::new(Monitor::new(Vec::<u32>::new()));
        let waiter = {
            let monitor = Arc::clone(&monitor);
            thread::spawn(move || {
                let mut guard = monitor.lock();
                monitor.wait_for_items(&mut guard, Deadline::Never)
            })
        };
        thread::sleep(Duration::from_millis(20));
        monitor.close();
        assert_eq!(waiter.join().unwrap(), Outcome::Closed);
        assert_eq!(monitor.len(), 0);
    }
}
