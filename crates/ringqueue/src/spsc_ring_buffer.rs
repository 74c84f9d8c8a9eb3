use crate::config::validate_capacity;
use crate::invariants::{
    debug_assert_bounded_count, debug_assert_head_not_past_tail, debug_assert_monotonic,
};
use crate::shim::atomic::{AtomicU64, Ordering};
use crate::shim::sync::Arc;
use crate::{Config, QueueError};
use crossbeam_utils::CachePadded;
use std::cell::UnsafeCell;
use std::ptr;

/// Wait-free bounded SPSC ring of bytes.
///
/// Same head/tail protocol as [`SpscRingQueue`](crate::SpscRingQueue), but a
/// single call moves a whole chunk and publishes it with one Release store.
/// Chunks that cross the physical end of the ring are split into two copies,
/// so any chunk up to the current free space is accepted.
pub struct SpscRingBuffer {
    tail: CachePadded<AtomicU64>,
    head: CachePadded<AtomicU64>,
    mask: usize,
    buffer: Box<[UnsafeCell<u8>]>,
}

// SAFETY: the producer writes only free bytes and the consumer reads only
// published bytes; the two regions never overlap.
unsafe impl Send for SpscRingBuffer {}
unsafe impl Sync for SpscRingBuffer {}

impl SpscRingBuffer {
    /// Creates a ring of `capacity` bytes (a power of two, at least 2) and
    /// returns its two ends. `capacity - 1` bytes fit at once.
    #[allow(clippy::new_ret_no_self)]
    pub fn new(capacity: usize) -> Result<(BufferProducer, BufferConsumer), QueueError> {
        let ring = Arc::new(Self::with_capacity(capacity)?);
        tracing::debug!(capacity, "spsc ring buffer created");
        Ok((
            BufferProducer {
                ring: Arc::clone(&ring),
            },
            BufferConsumer { ring },
        ))
    }

    /// Same as [`new`](Self::new), sized by `config.capacity`.
    pub fn with_config(config: Config) -> Result<(BufferProducer, BufferConsumer), QueueError> {
        Self::new(config.capacity)
    }

    pub(crate) fn with_capacity(capacity: usize) -> Result<Self, QueueError> {
        validate_capacity(capacity)?;
        let buffer = (0..capacity).map(|_| UnsafeCell::new(0)).collect();
        Ok(Self {
            tail: CachePadded::new(AtomicU64::new(0)),
            head: CachePadded::new(AtomicU64::new(0)),
            mask: capacity - 1,
            buffer,
        })
    }

    /// Number of bytes the ring can hold at once.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.mask
    }

    /// Current number of queued bytes. Approximate while both sides run.
    #[inline]
    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        (tail.wrapping_sub(head) as usize).min(self.capacity())
    }

    /// Returns true if no bytes are queued.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    fn base(&self) -> *mut u8 {
        UnsafeCell::raw_get(self.buffer.as_ptr())
    }

    /// Copies `chunk` in as one unit. Returns false if it does not fit.
    ///
    /// # Safety
    ///
    /// Only one thread may act as producer at a time.
    pub(crate) unsafe fn push_chunk(&self, chunk: &[u8]) -> bool {
        let len = chunk.len();
        if len == 0 || len > self.capacity() {
            return false;
        }

        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);
        let used = tail.wrapping_sub(head) as usize;
        if len > self.capacity() - used {
            return false;
        }

        let idx = (tail as usize) & self.mask;
        let first = len.min(self.buffer.len() - idx);
        // SAFETY: [tail, tail + len) is free space, it is not visible to the
        // consumer until the Release store below. Both copies stay in bounds:
        // idx + first <= buffer.len() and len - first < idx.
        unsafe {
            ptr::copy_nonoverlapping(chunk.as_ptr(), self.base().add(idx), first);
            ptr::copy_nonoverlapping(chunk.as_ptr().add(first), self.base(), len - first);
        }

        let new_tail = tail.wrapping_add(len as u64);
        debug_assert_bounded_count!(new_tail.wrapping_sub(head) as usize, self.capacity());
        debug_assert_monotonic!("tail", tail, new_tail);
        self.tail.store(new_tail, Ordering::Release);
        true
    }

    /// Copies as many queued bytes as fit into `out`.
    ///
    /// # Safety
    ///
    /// Only one thread may act as consumer at a time.
    pub(crate) unsafe fn pop_chunk(&self, out: &mut [u8]) -> Option<usize> {
        if out.is_empty() {
            return None;
        }

        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        let len = (tail.wrapping_sub(head) as usize).min(out.len());
        if len == 0 {
            return None;
        }

        let idx = (head as usize) & self.mask;
        let first = len.min(self.buffer.len() - idx);
        // SAFETY: [head, head + len) was published by the producer's Release
        // store on tail, and the producer won't reuse it before head moves.
        unsafe {
            ptr::copy_nonoverlapping(self.base().add(idx), out.as_mut_ptr(), first);
            ptr::copy_nonoverlapping(self.base(), out.as_mut_ptr().add(first), len - first);
        }

        let new_head = head.wrapping_add(len as u64);
        debug_assert_head_not_past_tail!(new_head, tail);
        self.head.store(new_head, Ordering::Release);
        Some(len)
    }
}

/// Producing end of an [`SpscRingBuffer`].
pub struct BufferProducer {
    ring: Arc<SpscRingBuffer>,
}

impl BufferProducer {
    /// Enqueues the whole chunk, or nothing. Returns false if the chunk is
    /// empty or larger than the current free space. Never blocks.
    #[inline]
    pub fn enqueue(&mut self, chunk: &[u8]) -> bool {
        // SAFETY: &mut self on the only producer handle.
        unsafe { self.ring.push_chunk(chunk) }
    }

    /// Like [`enqueue`](Self::enqueue), but reports a chunk that can never fit.
    ///
    /// `Ok(false)` means "full right now, retry later".
    pub fn try_enqueue(&mut self, chunk: &[u8]) -> Result<bool, QueueError> {
        if chunk.len() > self.ring.capacity() {
            return Err(QueueError::ChunkTooLarge {
                len: chunk.len(),
                capacity: self.ring.capacity(),
            });
        }
        Ok(self.enqueue(chunk))
    }

    /// Number of bytes the ring can hold at once.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Current number of queued bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Returns true if no bytes are queued.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}

/// Consuming end of an [`SpscRingBuffer`].
pub struct BufferConsumer {
    ring: Arc<SpscRingBuffer>,
}

impl BufferConsumer {
    /// Dequeues up to `out.len()` bytes and returns how many were copied.
    /// `None` if the ring (or `out`) is empty. Never blocks.
    #[inline]
    pub fn dequeue(&mut self, out: &mut [u8]) -> Option<usize> {
        // SAFETY: &mut self on the only consumer handle.
        unsafe { self.ring.pop_chunk(out) }
    }

    /// Number of bytes the ring can hold at once.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Current number of queued bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Returns true if no bytes are queued.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_capacity_boundary() {
        let (mut tx, mut rx) = SpscRingBuffer::new(4).unwrap();
        assert_eq!(tx.capacity(), 3);
        assert_eq!(tx.len(), 0);

        assert!(tx.enqueue(&[1]));
        assert!(tx.enqueue(&[2]));
        assert!(tx.enqueue(&[3]));
        assert!(!tx.enqueue(&[4]));
        assert_eq!(tx.len(), 3);

        let mut out = [0u8; 1];
        assert_eq!(rx.dequeue(&mut out), Some(1));
        assert_eq!(out, [1]);
        assert!(tx.enqueue(&[4]));
    }

    #[test]
    fn test_chunk_sizes() {
        let (mut tx, mut rx) = SpscRingBuffer::new(8).unwrap();
        let mut out = [0u8; 16];

        assert_eq!(rx.dequeue(&mut out), None);
        assert!(!tx.enqueue(&[]));
        assert!(!tx.enqueue(&[0; 8]));
        assert!(matches!(
            tx.try_enqueue(&[0; 8]),
            Err(QueueError::ChunkTooLarge { len: 8, capacity: 7 })
        ));

        assert!(tx.enqueue(&[1, 2, 3, 4, 5]));
        assert_eq!(tx.try_enqueue(&[6, 7, 8]), Ok(false));
        assert!(tx.enqueue(&[6, 7]));
        assert_eq!(rx.len(), 7);

        assert_eq!(rx.dequeue(&mut out), Some(7));
        assert_eq!(&out[..7], &[1, 2, 3, 4, 5, 6, 7]);
        assert!(rx.is_empty());
        assert_eq!(rx.dequeue(&mut []), None);
    }

    #[test]
    fn test_chunk_wraps_ring_end() {
        let (mut tx, mut rx) = SpscRingBuffer::new(8).unwrap();
        let mut out = [0u8; 8];

        // Move head/tail to offset 6.
        assert!(tx.enqueue(&[0; 6]));
        assert_eq!(rx.dequeue(&mut out), Some(6));

        // 5 bytes: 2 before the physical end, 3 after it.
        assert!(tx.enqueue(&[10, 11, 12, 13, 14]));
        assert_eq!(rx.len(), 5);

        let mut small = [0u8; 3];
        assert_eq!(rx.dequeue(&mut small), Some(3));
        assert_eq!(small, [10, 11, 12]);
        assert_eq!(rx.dequeue(&mut out), Some(2));
        assert_eq!(&out[..2], &[13, 14]);
    }

    #[test]
    fn test_two_threads_byte_stream() {
        const TOTAL: usize = 200_000;
        let (mut tx, mut rx) = SpscRingBuffer::new(256).unwrap();

        let producer = thread::spawn(move || {
            let mut next = 0usize;
            while next < TOTAL {
                let len = 13.min(TOTAL - next);
                let chunk: Vec<u8> = (next..next + len).map(|i| i as u8).collect();
                if tx.enqueue(&chunk) {
                    next += len;
                } else {
                    thread::yield_now();
                }
            }
        });

        let mut received = 0usize;
        let mut out = [0u8; 64];
        while received < TOTAL {
            match rx.dequeue(&mut out) {
                Some(n) => {
                    for (offset, byte) in out[..n].iter().enumerate() {
                        assert_eq!(*byte, (received + offset) as u8, "byte stream corrupted");
                    }
                    received += n;
                }
                None => thread::yield_now(),
            }
        }

        producer.join().unwrap();
        assert_eq!(received, TOTAL);
    }
}
