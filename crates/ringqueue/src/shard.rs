//! Sharding shared by the MPSC compositions.
//!
//! A shard is a [`SpinLock`] paired with one SPSC ring. Producers serialize on
//! the lock of the shard they map to; the single consumer polls every shard
//! without taking any lock.

use crate::spin_lock::SpinLock;
use crate::QueueError;
use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Global round-robin counter for per-thread shard slots.
static NEXT_THREAD_SLOT: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    /// Assigned once, on the first enqueue the thread performs.
    static THREAD_SLOT: usize = NEXT_THREAD_SLOT.fetch_add(1, Ordering::Relaxed);
}

/// The slot of the calling thread, stable for its whole life.
#[inline]
pub(crate) fn thread_slot() -> usize {
    THREAD_SLOT.with(|slot| *slot)
}

/// How a producer handle picks its shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardSelector {
    /// Each thread gets its own slot, handed out round-robin at first use.
    PerThread,
    /// Always the given shard.
    Pinned(usize),
}

impl ShardSelector {
    #[inline]
    pub(crate) fn pick(self, shards: usize) -> usize {
        match self {
            Self::PerThread => thread_slot() % shards,
            Self::Pinned(shard) => shard,
        }
    }
}

struct Shard<R> {
    lock: SpinLock,
    ring: R,
}

/// Fixed set of lock-guarded rings.
pub(crate) struct ShardSet<R> {
    shards: Box<[CachePadded<Shard<R>>]>,
}

impl<R> ShardSet<R> {
    pub(crate) fn new<F>(count: usize, mut make: F) -> Result<Self, QueueError>
    where
        F: FnMut() -> Result<R, QueueError>,
    {
        let shards = (0..count.max(1))
            .map(|_| {
                Ok(CachePadded::new(Shard {
                    lock: SpinLock::new(),
                    ring: make()?,
                }))
            })
            .collect::<Result<Box<[_]>, QueueError>>()?;
        Ok(Self { shards })
    }

    /// Number of shards.
    #[inline]
    pub(crate) fn count(&self) -> usize {
        self.shards.len()
    }

    /// Checks an explicit shard id.
    pub(crate) fn check(&self, shard: usize) -> Result<usize, QueueError> {
        if shard < self.count() {
            Ok(shard)
        } else {
            Err(QueueError::ShardOutOfRange {
                shard,
                shards: self.count(),
            })
        }
    }

    /// Runs the producer-side `f` on `shard` while holding its spin lock.
    #[inline]
    pub(crate) fn produce<X>(&self, shard: usize, f: impl FnOnce(&R) -> X) -> X {
        let shard = &self.shards[shard];
        let _guard = shard.lock.lock();
        f(&shard.ring)
    }

    /// Consumer-side access to one ring. No lock: there is a single consumer.
    #[inline]
    pub(crate) fn ring(&self, shard: usize) -> &R {
        &self.shards[shard].ring
    }

    pub(crate) fn rings(&self) -> impl Iterator<Item = &R> {
        self.shards.iter().map(|shard| &shard.ring)
    }
}

/// Rotating start position of the consumer's shard scan.
#[derive(Debug, Default)]
pub(crate) struct Cursor {
    next: usize,
}

impl Cursor {
    /// Takes the next shard index and advances past it.
    #[inline]
    pub(crate) fn advance(&mut self, shards: usize) -> usize {
        let shard = self.next % shards;
        self.next = shard + 1;
        shard
    }
}
