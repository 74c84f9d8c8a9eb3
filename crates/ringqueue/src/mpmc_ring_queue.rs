use crate::config::{validate_capacity, Config};
use crate::shim::atomic::{AtomicUsize, Ordering};
use crate::QueueError;
use crossbeam_utils::CachePadded;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;

struct Slot<T> {
    /// `pos` when free for the producer of `pos`, `pos + 1` once filled.
    sequence: AtomicUsize,
    value: UnsafeCell<MaybeUninit<T>>,
}

/// Bounded lock-free MPMC ring queue.
///
/// Every slot carries a sequence number, so producers and consumers only race
/// on claiming a position with a CAS and never on the slot itself. All
/// `capacity` slots are usable.
pub struct MpmcRingQueue<T> {
    /// Next position to dequeue.
    head: CachePadded<AtomicUsize>,
    /// Next position to enqueue.
    tail: CachePadded<AtomicUsize>,
    mask: usize,
    buffer: Box<[Slot<T>]>,
}

// SAFETY: a slot is accessed only by the thread that claimed its position;
// the slot's sequence Release/Acquire pair hands the value over.
unsafe impl<T: Send> Send for MpmcRingQueue<T> {}
unsafe impl<T: Send> Sync for MpmcRingQueue<T> {}

impl<T> MpmcRingQueue<T> {
    /// Creates a queue of `capacity` slots (a power of two, at least 2).
    pub fn new(capacity: usize) -> Result<Self, QueueError> {
        validate_capacity(capacity)?;
        let buffer = (0..capacity)
            .map(|i| Slot {
                sequence: AtomicUsize::new(i),
                value: UnsafeCell::new(MaybeUninit::uninit()),
            })
            .collect();
        tracing::debug!(capacity, "mpmc ring queue created");
        Ok(Self {
            head: CachePadded::new(AtomicUsize::new(0)),
            tail: CachePadded::new(AtomicUsize::new(0)),
            mask: capacity - 1,
            buffer,
        })
    }

    /// Creates a queue from `config`; the shard count is ignored.
    pub fn with_config(config: Config) -> Result<Self, QueueError> {
        Self::new(config.capacity)
    }

    /// Number of items the queue can hold.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.mask + 1
    }

    /// Current number of items. Approximate under concurrent use.
    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        // head is read first, so the difference can only overshoot.
        (tail.wrapping_sub(head) as isize).clamp(0, self.capacity() as isize) as usize
    }

    /// Returns true if no items are queued.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Enqueues `item`, or returns it when the queue is full.
    pub fn enqueue(&self, item: T) -> Result<(), T> {
        let mut pos = self.tail.load(Ordering::Relaxed);
        loop {
            let slot = &self.buffer[pos & self.mask];
            let seq = slot.sequence.load(Ordering::Acquire);
            let diff = seq.wrapping_sub(pos) as isize;

            if diff == 0 {
                match self.tail.compare_exchange_weak(
                    pos,
                    pos.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        // SAFETY: the CAS gave this thread exclusive use of the slot.
                        unsafe { (*slot.value.get()).write(item) };
                        slot.sequence.store(pos.wrapping_add(1), Ordering::Release);
                        return Ok(());
                    }
                    Err(current) => pos = current,
                }
            } else if diff < 0 {
                // Slot still holds the item from one lap ago.
                return Err(item);
            } else {
                pos = self.tail.load(Ordering::Relaxed);
            }
        }
    }

    /// Dequeues the oldest item, or `None` when the queue is empty.
    pub fn dequeue(&self) -> Option<T> {
        let mut pos = self.head.load(Ordering::Relaxed);
        loop {
            let slot = &self.buffer[pos & self.mask];
            let seq = slot.sequence.load(Ordering::Acquire);
            let diff = seq.wrapping_sub(pos.wrapping_add(1)) as isize;

            if diff == 0 {
                match self.head.compare_exchange_weak(
                    pos,
                    pos.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        // SAFETY: the slot was filled (seq == pos + 1) and the
                        // CAS gave this thread exclusive use of it.
                        let item = unsafe { (*slot.value.get()).assume_init_read() };
                        slot.sequence
                            .store(pos.wrapping_add(self.capacity()), Ordering::Release);
                        return Some(item);
                    }
                    Err(current) => pos = current,
                }
            } else if diff < 0 {
                return None;
            } else {
                pos = self.head.load(Ordering::Relaxed);
            }
        }
    }
}

impl<T> Drop for MpmcRingQueue<T> {
    fn drop(&mut self) {
        while self.dequeue().is_some() {}
    }
}
