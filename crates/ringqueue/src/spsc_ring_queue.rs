use crate::config::validate_capacity;
use crate::invariants::{
    debug_assert_bounded_count, debug_assert_head_not_past_tail, debug_assert_initialized_read,
    debug_assert_monotonic,
};
use crate::shim::atomic::{AtomicU64, Ordering};
use crate::shim::sync::Arc;
use crate::{Config, QueueError};
use crossbeam_utils::CachePadded;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;

// =============================================================================
// MEMORY ORDERING
// =============================================================================
//
// `head` and `tail` are unbounded u64 sequence numbers; the slot of a sequence
// is `seq & mask`. One slot is always left empty, so the ring is full when
// `tail - head == capacity - 1`.
//
// Producer: load `tail` Relaxed (own counter), check space against the cached
// head and refresh it with an Acquire load of `head` only when the cache says
// full, write the slot, then store `tail + 1` with Release.
//
// Consumer: mirror image. Load `head` Relaxed, check the cached tail and
// refresh with an Acquire load of `tail`, move the value out of the slot, then
// store `head + 1` with Release so the producer may reuse it.
//
// `cached_head` is touched by the producer only, `cached_tail` by the consumer
// only. The handles (or the shard spin lock for MPSC) guarantee there is one of
// each at a time.
//
// =============================================================================

/// Wait-free bounded SPSC ring of typed items.
///
/// Built as a [`QueueProducer`]/[`QueueConsumer`] pair by [`SpscRingQueue::new`].
/// Neither handle is `Clone` and both operate through `&mut self`, so a second
/// producer or consumer thread cannot exist.
pub struct SpscRingQueue<T> {
    // === PRODUCER HOT ===
    tail: CachePadded<AtomicU64>,
    cached_head: CachePadded<UnsafeCell<u64>>,

    // === CONSUMER HOT ===
    head: CachePadded<AtomicU64>,
    cached_tail: CachePadded<UnsafeCell<u64>>,

    mask: usize,
    buffer: Box<[UnsafeCell<MaybeUninit<T>>]>,
}

// SAFETY: slots are handed from the single producer to the single consumer
// through the Release/Acquire pair on tail; T only has to be Send.
unsafe impl<T: Send> Send for SpscRingQueue<T> {}
unsafe impl<T: Send> Sync for SpscRingQueue<T> {}

impl<T> SpscRingQueue<T> {
    /// Creates a ring of `capacity` slots (a power of two, at least 2) and
    /// returns its two ends. `capacity - 1` items fit at once.
    #[allow(clippy::new_ret_no_self)]
    pub fn new(capacity: usize) -> Result<(QueueProducer<T>, QueueConsumer<T>), QueueError> {
        let ring = Arc::new(Self::with_capacity(capacity)?);
        tracing::debug!(capacity, "spsc ring queue created");
        Ok((
            QueueProducer {
                ring: Arc::clone(&ring),
            },
            QueueConsumer { ring },
        ))
    }

    /// Same as [`new`](Self::new), sized by `config.capacity`.
    pub fn with_config(config: Config) -> Result<(QueueProducer<T>, QueueConsumer<T>), QueueError> {
        Self::new(config.capacity)
    }

    pub(crate) fn with_capacity(capacity: usize) -> Result<Self, QueueError> {
        validate_capacity(capacity)?;

        let buffer = (0..capacity)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Ok(Self {
            tail: CachePadded::new(AtomicU64::new(0)),
            cached_head: CachePadded::new(UnsafeCell::new(0)),
            head: CachePadded::new(AtomicU64::new(0)),
            cached_tail: CachePadded::new(UnsafeCell::new(0)),
            mask: capacity - 1,
            buffer,
        })
    }

    /// Number of items the ring can hold at once.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.mask
    }

    /// Current number of items. Approximate while both sides are running.
    #[inline]
    pub fn len(&self) -> usize {
        // head first: tail read afterwards can only be larger.
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        (tail.wrapping_sub(head) as usize).min(self.capacity())
    }

    /// Returns true if the ring holds no items.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Moves `item` into the next free slot, or hands it back when full.
    ///
    /// # Safety
    ///
    /// Only one thread may act as producer at a time.
    pub(crate) unsafe fn push(&self, item: T) -> Result<(), T> {
        let tail = self.tail.load(Ordering::Relaxed);
        let usable = self.capacity() as u64;

        // SAFETY: cached_head belongs to the producer, see the caller contract.
        let cached_head = unsafe { &mut *self.cached_head.get() };
        if tail.wrapping_sub(*cached_head) >= usable {
            *cached_head = self.head.load(Ordering::Acquire);
            if tail.wrapping_sub(*cached_head) >= usable {
                return Err(item);
            }
        }

        let idx = (tail as usize) & self.mask;
        // SAFETY: slot tail is outside [head, tail), so the consumer is not
        // reading it, and it stays unpublished until the store below.
        unsafe { (*self.buffer[idx].get()).write(item) };

        let new_tail = tail.wrapping_add(1);
        debug_assert_bounded_count!(new_tail.wrapping_sub(*cached_head) as usize, self.capacity());
        debug_assert_monotonic!("tail", tail, new_tail);
        self.tail.store(new_tail, Ordering::Release);
        Ok(())
    }

    /// Moves the oldest item out of the ring.
    ///
    /// # Safety
    ///
    /// Only one thread may act as consumer at a time.
    pub(crate) unsafe fn pop(&self) -> Option<T> {
        let head = self.head.load(Ordering::Relaxed);
        let tail = unsafe { self.refresh_tail(head) }?;

        debug_assert_initialized_read!(head, head, tail);
        let idx = (head as usize) & self.mask;
        // SAFETY: head < tail, so the slot was written and published by the
        // producer; the Acquire in refresh_tail makes the write visible.
        let item = unsafe { (*self.buffer[idx].get()).assume_init_read() };

        let new_head = head.wrapping_add(1);
        debug_assert_head_not_past_tail!(new_head, tail);
        self.head.store(new_head, Ordering::Release);
        Some(item)
    }

    /// Hands up to `max_items` items to `handler` with a single head update.
    ///
    /// # Safety
    ///
    /// Only one thread may act as consumer at a time.
    pub(crate) unsafe fn pop_up_to<F>(&self, max_items: usize, mut handler: F) -> usize
    where
        F: FnMut(T),
    {
        if max_items == 0 {
            return 0;
        }
        let head = self.head.load(Ordering::Relaxed);
        let Some(tail) = (unsafe { self.refresh_tail(head) }) else {
            return 0;
        };

        let count = (tail.wrapping_sub(head) as usize).min(max_items);
        // Publishes the slots already moved out even if `handler` unwinds.
        let mut read = HeadGuard {
            head: &self.head,
            pos: head,
        };
        for _ in 0..count {
            let pos = read.pos;
            debug_assert_initialized_read!(pos, head, tail);
            let idx = (pos as usize) & self.mask;
            // SAFETY: pos lies in [head, tail), published by the producer.
            let item = unsafe { (*self.buffer[idx].get()).assume_init_read() };
            read.pos = pos.wrapping_add(1);
            handler(item);
        }

        debug_assert_head_not_past_tail!(read.pos, tail);
        count
    }

    /// Returns the producer's tail if at least one item is readable.
    ///
    /// # Safety
    ///
    /// Consumer side only.
    #[inline]
    unsafe fn refresh_tail(&self, head: u64) -> Option<u64> {
        // SAFETY: cached_tail belongs to the consumer, see the caller contract.
        let cached_tail = unsafe { &mut *self.cached_tail.get() };
        if *cached_tail == head {
            *cached_tail = self.tail.load(Ordering::Acquire);
            if *cached_tail == head {
                return None;
            }
        }
        Some(*cached_tail)
    }
}

/// Stores the consumer position on drop.
struct HeadGuard<'a> {
    head: &'a AtomicU64,
    pos: u64,
}

impl Drop for HeadGuard<'_> {
    fn drop(&mut self) {
        self.head.store(self.pos, Ordering::Release);
    }
}

impl<T> Drop for SpscRingQueue<T> {
    fn drop(&mut self) {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Relaxed);
        let mut pos = head;
        while pos != tail {
            let idx = (pos as usize) & self.mask;
            // SAFETY: exclusive access; every slot in [head, tail) is initialized.
            unsafe { (*self.buffer[idx].get()).assume_init_drop() };
            pos = pos.wrapping_add(1);
        }
    }
}

/// Producing end of an [`SpscRingQueue`].
pub struct QueueProducer<T> {
    ring: Arc<SpscRingQueue<T>>,
}

impl<T> QueueProducer<T> {
    /// Enqueues `item`, or returns it when the ring is full. Never blocks.
    #[inline]
    pub fn enqueue(&mut self, item: T) -> Result<(), T> {
        // SAFETY: &mut self on the only producer handle.
        unsafe { self.ring.push(item) }
    }

    /// Number of items the ring can hold at once.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Current number of queued items.
    #[inline]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Returns true if nothing is queued.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Returns true if the next enqueue would fail.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.ring.len() >= self.ring.capacity()
    }
}

/// Consuming end of an [`SpscRingQueue`].
pub struct QueueConsumer<T> {
    ring: Arc<SpscRingQueue<T>>,
}

impl<T> QueueConsumer<T> {
    /// Dequeues the oldest item, or `None` when the ring is empty. Never blocks.
    #[inline]
    pub fn dequeue(&mut self) -> Option<T> {
        // SAFETY: &mut self on the only consumer handle.
        unsafe { self.ring.pop() }
    }

    /// Hands every readable item to `handler`, publishing the new head once.
    pub fn dequeue_with<F>(&mut self, handler: F) -> usize
    where
        F: FnMut(T),
    {
        self.dequeue_up_to(usize::MAX, handler)
    }

    /// Like [`dequeue_with`](Self::dequeue_with), stopping after `max_items`.
    pub fn dequeue_up_to<F>(&mut self, max_items: usize, handler: F) -> usize
    where
        F: FnMut(T),
    {
        // SAFETY: &mut self on the only consumer handle.
        unsafe { self.ring.pop_up_to(max_items, handler) }
    }

    /// Number of items the ring can hold at once.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Current number of queued items.
    #[inline]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Returns true if nothing is queued.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}
