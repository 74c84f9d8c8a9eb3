use crate::error::{TryDequeueError, TryEnqueueError};
use crate::monitor::{Deadline, Monitor, Outcome, Storage};
use std::mem;
use std::time::Duration;

struct Batch<T> {
    items: Vec<T>,
    /// Empty buffer that becomes `items` on the next dequeue.
    spare: Vec<T>,
    /// 0 means unbounded.
    capacity: usize,
}

impl<T> Batch<T> {
    /// A batch larger than the capacity is let in once everything is drained.
    #[inline]
    fn has_room_for(&self, count: usize) -> bool {
        self.capacity == 0 || self.items.is_empty() || self.items.len() + count <= self.capacity
    }
}

impl<T> Storage for Batch<T> {
    fn len(&self) -> usize {
        self.items.len()
    }
}

/// Blocking MPMC batcher: producers append single items or whole batches,
/// a consumer takes everything queued so far in one call.
///
/// Queued items live in one of two internal buffers. A dequeue makes the
/// empty one active, hands the filled one to the consumer and keeps the
/// consumer's old vector as the next spare, so allocations are recycled.
pub struct WaitBatcher<T> {
    monitor: Monitor<Batch<T>>,
}

impl<T> WaitBatcher<T> {
    /// Creates a batcher holding at most `capacity` items; 0 is unbounded.
    pub fn new(capacity: usize) -> Self {
        Self::with_capacity(capacity, 0)
    }

    /// Like [`new`](Self::new), reserving room for `initial` items in both
    /// internal buffers up front.
    pub fn with_capacity(capacity: usize, initial: usize) -> Self {
        tracing::debug!(capacity, initial, "wait batcher created");
        Self {
            monitor: Monitor::new(Batch {
                items: Vec::with_capacity(initial),
                spare: Vec::with_capacity(initial),
                capacity,
            }),
        }
    }

    /// Creates an unbounded batcher.
    pub fn unbounded() -> Self {
        Self::new(0)
    }

    /// Maximum number of queued items, 0 if unbounded.
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

    /// Closes the batcher and wakes all blocked threads. Idempotent.
    pub fn close(&self) {
        self.monitor.close();
    }

    /// Appends `item`, blocking while the batcher is full. Hands the item
    /// back if the batcher is or becomes closed.
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
            .wait_for_room(&mut state, deadline, |batch| batch.has_room_for(1))
        {
            Outcome::Ready => {
                state.items.items.push(item);
                drop(state);
                self.monitor.notify_items(false);
                Ok(())
            }
            Outcome::Closed => Err(TryEnqueueError::Closed(item)),
            Outcome::TimedOut => Err(TryEnqueueError::Full(item)),
        }
    }

    /// Appends every item of `items` under one lock, so no other producer's
    /// items end up in between. Blocks until the whole batch fits.
    ///
    /// Returns the collected items if the batcher is or becomes closed.
    pub fn enqueue_all<I>(&self, items: I) -> Result<(), Vec<T>>
    where
        I: IntoIterator<Item = T>,
    {
        let mut items: Vec<T> = items.into_iter().collect();
        let count = items.len();

        let mut state = self.monitor.lock();
        match self
            .monitor
            .wait_for_room(&mut state, Deadline::Never, |batch| batch.has_room_for(count))
        {
            Outcome::Ready => {
                state.items.items.append(&mut items);
                drop(state);
                if count > 0 {
                    self.monitor.notify_items(false);
                }
                Ok(())
            }
            Outcome::Closed | Outcome::TimedOut => Err(items),
        }
    }

    /// Takes every queued item into `out`, blocking while the batcher is
    /// empty. `out` is cleared first.
    ///
    /// Returns false once the batcher is closed and drained.
    pub fn dequeue(&self, out: &mut Vec<T>) -> bool {
        self.dequeue_until(out, Deadline::Never).is_ok()
    }

    /// Takes every queued item into `out` if there is any right now.
    pub fn try_dequeue(&self, out: &mut Vec<T>) -> Result<(), TryDequeueError> {
        self.dequeue_until(out, Deadline::Now).map_err(|err| match err {
            TryDequeueError::Timeout => TryDequeueError::Empty,
            other => other,
        })
    }

    /// Takes every queued item into `out`, waiting at most `timeout`.
    pub fn dequeue_timeout(&self, out: &mut Vec<T>, timeout: Duration) -> Result<(), TryDequeueError> {
        self.dequeue_until(out, Deadline::after(timeout))
    }

    fn dequeue_until(&self, out: &mut Vec<T>, deadline: Deadline) -> Result<(), TryDequeueError> {
        out.clear();
        let mut state = self.monitor.lock();
        match self.monitor.wait_for_items(&mut state, deadline) {
            Outcome::Ready => {
                let batch = &mut state.items;
                mem::swap(&mut batch.items, &mut batch.spare);
                mem::swap(&mut batch.spare, out);
                drop(state);
                self.monitor.notify_room(true);
                Ok(())
            }
            Outcome::Closed => Err(TryDequeueError::Closed),
            Outcome::TimedOut => Err(TryDequeueError::Timeout),
        }
    }
}

impl<T> Default for WaitBatcher<T> {
    fn default() -> Self {
        Self::unbounded()
    }
}
