use crate::shard::{Cursor, ShardSelector, ShardSet};
use crate::shim::sync::Arc;
use crate::{Config, QueueError, SpscRingQueue};

/// Multi-producer single-consumer ring queue built from SPSC shards.
///
/// Each shard is an [`SpscRingQueue`] behind a spin lock. Producers map to a
/// shard per thread, so contention is bounded by the number of producers that
/// share one shard. The consumer scans shards round-robin.
///
/// FIFO holds per shard only; items from different producers may be
/// delivered in any order.
pub struct MpscRingQueue<T> {
    shards: ShardSet<SpscRingQueue<T>>,
}

impl<T> MpscRingQueue<T> {
    /// Creates `concurrency` shards of `capacity` slots each (a power of two,
    /// at least 2). `concurrency == 0` uses the hardware thread count.
    #[allow(clippy::new_ret_no_self)]
    pub fn new(
        capacity: usize,
        concurrency: usize,
    ) -> Result<(MpscQueueProducer<T>, MpscQueueConsumer<T>), QueueError> {
        Self::with_config(Config::new(capacity, concurrency))
    }

    /// Same as [`new`](Self::new), taking both values from `config`.
    pub fn with_config(
        config: Config,
    ) -> Result<(MpscQueueProducer<T>, MpscQueueConsumer<T>), QueueError> {
        config.validate()?;
        let shards = config.shards();
        let queue = Arc::new(Self {
            shards: ShardSet::new(shards, || SpscRingQueue::with_capacity(config.capacity))?,
        });
        tracing::debug!(capacity = config.capacity, shards, "mpsc ring queue created");

        Ok((
            MpscQueueProducer {
                queue: Arc::clone(&queue),
                selector: ShardSelector::PerThread,
            },
            MpscQueueConsumer {
                queue,
                cursor: Cursor::default(),
            },
        ))
    }

    /// Usable capacity of one shard.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.shards.ring(0).capacity()
    }

    /// Usable capacity summed over all shards.
    #[inline]
    pub fn total_capacity(&self) -> usize {
        self.capacity() * self.shards.count()
    }

    /// Number of shards.
    #[inline]
    pub fn shards(&self) -> usize {
        self.shards.count()
    }

    /// Items queued over all shards. Approximate under concurrent producers.
    pub fn len(&self) -> usize {
        self.shards.rings().map(SpscRingQueue::len).sum()
    }

    /// Returns true if every shard is empty.
    pub fn is_empty(&self) -> bool {
        self.shards.rings().all(SpscRingQueue::is_empty)
    }
}

/// Producing end of an [`MpscRingQueue`]. Clone it for every producer thread.
pub struct MpscQueueProducer<T> {
    queue: Arc<MpscRingQueue<T>>,
    selector: ShardSelector,
}

impl<T> MpscQueueProducer<T> {
    /// Enqueues `item` into the calling thread's shard, or returns it when
    /// that shard is full. Only spins on the shard lock, never blocks.
    #[inline]
    pub fn enqueue(&self, item: T) -> Result<(), T> {
        let shard = self.selector.pick(self.queue.shards.count());
        // SAFETY: the shard lock makes this thread the shard's only producer.
        self.queue.shards.produce(shard, |ring| unsafe { ring.push(item) })
    }

    /// How this handle picks its shard.
    #[inline]
    pub fn selector(&self) -> ShardSelector {
        self.selector
    }

    /// A producer handle that always uses `shard`.
    pub fn pin_to_shard(&self, shard: usize) -> Result<Self, QueueError> {
        let shard = self.queue.shards.check(shard)?;
        Ok(Self {
            queue: Arc::clone(&self.queue),
            selector: ShardSelector::Pinned(shard),
        })
    }

    /// The shard the next [`enqueue`](Self::enqueue) from this thread targets.
    #[inline]
    pub fn shard(&self) -> usize {
        self.selector.pick(self.queue.shards.count())
    }

    /// The shared queue.
    #[inline]
    pub fn queue(&self) -> &MpscRingQueue<T> {
        &self.queue
    }
}

impl<T> Clone for MpscQueueProducer<T> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
            selector: self.selector,
        }
    }
}

/// Consuming end of an [`MpscRingQueue`]. There is exactly one.
pub struct MpscQueueConsumer<T> {
    queue: Arc<MpscRingQueue<T>>,
    cursor: Cursor,
}

impl<T> MpscQueueConsumer<T> {
    /// Dequeues one item from the first non-empty shard, starting after the
    /// shard served last. `None` only if every shard is empty.
    pub fn dequeue(&mut self) -> Option<T> {
        let shards = self.queue.shards.count();
        for _ in 0..shards {
            let shard = self.cursor.advance(shards);
            // SAFETY: &mut self on the only consumer handle.
            if let Some(item) = unsafe { self.queue.shards.ring(shard).pop() } {
                return Some(item);
            }
        }
        None
    }

    /// Drains every shard once, handing each item to `handler`.
    ///
    /// Returns the number of items delivered; 0 means all shards were empty.
    pub fn dequeue_with<F>(&mut self, handler: F) -> usize
    where
        F: FnMut(T),
    {
        self.dequeue_up_to(usize::MAX, handler)
    }

    /// Like [`dequeue_with`](Self::dequeue_with), stopping after `max_items`.
    pub fn dequeue_up_to<F>(&mut self, max_items: usize, mut handler: F) -> usize
    where
        F: FnMut(T),
    {
        let shards = self.queue.shards.count();
        let mut total = 0;
        for _ in 0..shards {
            if total >= max_items {
                break;
            }
            let shard = self.cursor.advance(shards);
            // SAFETY: &mut self on the only consumer handle.
            total += unsafe {
                self.queue
                    .shards
                    .ring(shard)
                    .pop_up_to(max_items - total, &mut handler)
            };
        }
        total
    }

    /// The shared queue.
    #[inline]
    pub fn queue(&self) -> &MpscRingQueue<T> {
        &self.queue
    }
}
