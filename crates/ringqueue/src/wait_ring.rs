use crate::config::{validate_capacity, Config};
use crate::error::{TryDequeueError, TryEnqueueError};
use crate::monitor::{Deadline, Monitor, Outcome, Storage};
use crate::QueueError;
use std::time::Duration;

/// Plain power-of-two ring; all access happens under the monitor lock.
struct Ring<T> {
    slots: Box<[Option<T>]>,
    head: u64,
    tail: u64,
    mask: usize,
}

impl<T> Ring<T> {
    fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            head: 0,
            tail: 0,
            mask: capacity - 1,
        }
    }

    #[inline]
    fn usable(&self) -> usize {
        self.mask
    }

    #[inline]
    fn has_room(&self) -> bool {
        self.len() < self.usable()
    }

    fn push(&mut self, item: T) {
        let idx = (self.tail as usize) & self.mask;
        debug_assert!(self.slots[idx].is_none());
        self.slots[idx] = Some(item);
        self.tail = self.tail.wrapping_add(1);
    }

    fn pop(&mut self) -> Option<T> {
        if self.head == self.tail {
            return None;
        }
        let idx = (self.head as usize) & self.mask;
        self.head = self.head.wrapping_add(1);
        self.slots[idx].take()
    }
}

impl<T> Storage for Ring<T> {
    fn len(&self) -> usize {
        self.tail.wrapping_sub(self.head) as usize
    }
}

/// Blocking bounded MPMC ring with a close signal.
///
/// Same contract as [`WaitQueue`](crate::WaitQueue), backed by a fixed
/// power-of-two ring that never reallocates. Like the other rings it holds
/// `capacity - 1` items.
pub struct WaitRing<T> {
    monitor: Monitor<Ring<T>>,
}

impl<T> WaitRing<T> {
    /// Creates a ring of `capacity` slots (a power of two, at least 2).
    pub fn new(capacity: usize) -> Result<Self, QueueError> {
        validate_capacity(capacity)?;
        tracing::debug!(capacity, "wait ring created");
        Ok(Self {
            monitor: Monitor::new(Ring::new(capacity)),
        })
    }

    /// Creates a ring from `config`; the shard count is ignored.
    pub fn with_config(config: Config) -> Result<Self, QueueError> {
        Self::new(config.capacity)
    }

    /// Number of items the ring can hold at once.
    pub fn capacity(&self) -> usize {
        self.monitor.lock().items.usable()
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

    /// Closes the ring and wakes all blocked threads. Idempotent.
    pub fn close(&self) {
        self.monitor.close();
    }

    /// Appends `item`, blocking while the ring is full. Hands the item back
    /// if the ring is or becomes closed.
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
        match self.monitor.wait_for_room(&mut state, deadline, Ring::has_room) {
            Outcome::Ready => {
                state.items.push(item);
                drop(state);
                self.monitor.notify_items(false);
                Ok(())
            }
            Outcome::Closed => Err(TryEnqueueError::Closed(item)),
            Outcome::TimedOut => Err(TryEnqueueError::Full(item)),
        }
    }

    /// Removes the oldest item, blocking while the ring is empty. `None`
    /// once the ring is closed and drained.
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
                let item = state.items.pop();
                drop(state);
                self.monitor.notify_room(false);
                item.ok_or(TryDequeueError::Empty)
            }
            Outcome::Closed => Err(TryDequeueError::Closed),
            Outcome::TimedOut => Err(TryDequeueError::Timeout),
        }
    }
}
