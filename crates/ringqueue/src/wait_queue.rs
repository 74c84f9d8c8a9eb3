use crate::error::{TryDequeueError, TryEnqueueError};
use crate::monitor::{Deadline, Monitor, Outcome, Storage};
use std::collections::VecDeque;
use std::time::Duration;

struct Bounded<T> {
    items: VecDeque<T>,
    /// 0 means unbounded.
    capacity: usize,
}

impl<T> Bounded<T> {
    #[inline]
    fn has_room(&self) -> bool {
        self.capacity == 0 || self.items.len() < self.capacity
    }
}

impl<T> Storage for Bounded<T> {
    fn len(&self) -> usize {
        self.items.len()
    }
}

/// Blocking MPMC FIFO queue with optional bound and a close signal.
///
/// Share it between threads with an `Arc`. Producers block while the queue is
/// full, consumers while it is empty. After [`close`](Self::close) producers
/// are refused and consumers drain what is left.
pub struct WaitQueue<T> {
    monitor: Monitor<Bounded<T>>,
}

impl<T> WaitQueue<T> {
    /// Creates a queue holding at most `capacity` items; 0 is unbounded.
    pub fn new(capacity: usize) -> Self {
        tracing::debug!(capacity, "wait queue created");
        Self {
            monitor: Monitor::new(Bounded {
                items: VecDeque::new(),
                capacity,
            }),
        }
    }

    /// Creates an unbounded queue.
    pub fn unbounded() -> Self {
        Self::new(0)
    }

    /// Maximum number of items, 0 if unbounded.
    pub fn capacity(&self) -> usize {
        self.monitor.lock().items.capacity
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.monitor.len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true once [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.monitor.is_closed()
    }

    /// Closes the queue and wakes all blocked threads. Idempotent.
    pub fn close(&self) {
        self.monitor.close();
    }

    /// Appends `item`, blocking while the queue is full.
    ///
    /// Returns the item back if the queue is or becomes closed.
    pub fn enqueue(&self, item: T) -> Result<(), T> {
        self.enqueue_until(item, Deadline::Never)
            .map_err(TryEnqueueError::into_inner)
    }

    /// Appends `item` only if there is room right now.
    pub fn try_enqueue(&self, item: T) -> Result<(), TryEnqueueError<T>> {
        self.enqueue_until(item, Deadline::Now)
    }

    /// Appends `item`, waiting at most `timeout` for room.
    pub fn enqueue_timeout(&self, item: T, timeout: Duration) -> Result<(), TryEnqueueError<T>> {
        self.enqueue_until(item, Deadline::after(timeout))
    }

    fn enqueue_until(&self, item: T, deadline: Deadline) -> Result<(), TryEnqueueError<T>> {
        let mut state = self.monitor.lock();
        match self
            .monitor
            .wait_for_room(&mut state, deadline, Bounded::has_room)
        {
            Outcome::Ready => {
                state.items.items.push_back(item);
                drop(state);
                self.monitor.notify_items(false);
                Ok(())
            }
            Outcome::Closed => Err(TryEnqueueError::Closed(item)),
            Outcome::TimedOut => Err(TryEnqueueError::Full(item)),
        }
    }

    /// Removes the oldest item, blocking while the queue is empty.
    ///
    /// Returns `None` once the queue is closed and drained.
    pub fn dequeue(&self) -> Option<T> {
        self.dequeue_until(Deadline::Never).ok()
    }

    /// Removes the oldest item if one is queued right now.
    pub fn try_dequeue(&self) -> Result<T, TryDequeueError> {
        self.dequeue_until(Deadline::Now).map_err(|err| match err {
            TryDequeueError::Timeout => TryDequeueError::Empty,
            other => other,
        })
    }

    /// Removes the oldest item, waiting at most `timeout` for one.
    pub fn dequeue_timeout(&self, timeout: Duration) -> Result<T, TryDequeueError> {
        self.dequeue_until(Deadline::after(timeout))
    }

    fn dequeue_until(&self, deadline: Deadline) -> Result<T, TryDequeueError> {
        let mut state = self.monitor.lock();
        match self.monitor.wait_for_items(&mut state, deadline) {
            Outcome::Ready => {
                let item = state.items.items.pop_front();
                drop(state);
                self.monitor.notify_room(false);
                item.ok_or(TryDequeueError::Empty)
            }
            Outcome::Closed => Err(TryDequeueError::Closed),
            Outcome::TimedOut => Err(TryDequeueError::Timeout),
        }
    }
}

impl<T> Default for WaitQueue<T> {
    fn default() -> Self {
        Self::unbounded()
    }
}
