use crate::shard::{Cursor, ShardSelector, ShardSet};
use crate::shim::sync::Arc;
use crate::{Config, QueueError, SpscRingBuffer};

/// Multi-producer single-consumer byte ring built from [`SpscRingBuffer`]
/// shards, one spin lock per shard.
///
/// A chunk is always written to a single shard, so bytes of one chunk are
/// never interleaved with another producer's. A dequeue takes bytes from one
/// shard only.
pub struct MpscRingBuffer {
    shards: ShardSet<SpscRingBuffer>,
}

impl MpscRingBuffer {
    /// Creates `concurrency` shards of `capacity` bytes each (a power of two,
    /// at least 2). `concurrency == 0` uses the hardware thread count.
    #[allow(clippy::new_ret_no_self)]
    pub fn new(
        capacity: usize,
        concurrency: usize,
    ) -> Result<(MpscBufferProducer, MpscBufferConsumer), QueueError> {
        Self::with_config(Config::new(capacity, concurrency))
    }

    /// Same as [`new`](Self::new), taking both values from `config`.
    pub fn with_config(
        config: Config,
    ) -> Result<(MpscBufferProducer, MpscBufferConsumer), QueueError> {
        config.validate()?;
        let shards = config.shards();
        let buffer = Arc::new(Self {
            shards: ShardSet::new(shards, || SpscRingBuffer::with_capacity(config.capacity))?,
        });
        tracing::debug!(capacity = config.capacity, shards, "mpsc ring buffer created");

        Ok((
            MpscBufferProducer {
                buffer: Arc::clone(&buffer),
                selector: ShardSelector::PerThread,
            },
            MpscBufferConsumer {
                buffer,
                cursor: Cursor::default(),
            },
        ))
    }

    /// Usable bytes of one shard, and so the largest chunk accepted.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.shards.ring(0).capacity()
    }

    /// Usable bytes summed over all shards.
    #[inline]
    pub fn total_capacity(&self) -> usize {
        self.capacity() * self.shards.count()
    }

    /// Number of shards.
    #[inline]
    pub fn shards(&self) -> usize {
        self.shards.count()
    }

    /// Bytes queued over all shards. Approximate under concurrent producers.
    pub fn len(&self) -> usize {
        self.shards.rings().map(SpscRingBuffer::len).sum()
    }

    /// Returns true if every shard is empty.
    pub fn is_empty(&self) -> bool {
        self.shards.rings().all(SpscRingBuffer::is_empty)
    }
}

/// Producing end of an [`MpscRingBuffer`]. Clone it for every producer thread.
#[derive(Clone)]
pub struct MpscBufferProducer {
    buffer: Arc<MpscRingBuffer>,
    selector: ShardSelector,
}

impl MpscBufferProducer {
    /// Enqueues the whole chunk into the calling thread's shard, or nothing.
    /// Returns false if the chunk is empty or does not fit right now.
    #[inline]
    pub fn enqueue(&self, chunk: &[u8]) -> bool {
        let shard = self.selector.pick(self.buffer.shards.count());
        // SAFETY: the shard lock makes this thread the shard's only producer.
        self.buffer
            .shards
            .produce(shard, |ring| unsafe { ring.push_chunk(chunk) })
    }

    /// Like [`enqueue`](Self::enqueue), but reports a chunk that can never fit.
    pub fn try_enqueue(&self, chunk: &[u8]) -> Result<bool, QueueError> {
        let capacity = self.buffer.capacity();
        if chunk.len() > capacity {
            return Err(QueueError::ChunkTooLarge {
                len: chunk.len(),
                capacity,
            });
        }
        Ok(self.enqueue(chunk))
    }

    /// How this handle picks its shard.
    #[inline]
    pub fn selector(&self) -> ShardSelector {
        self.selector
    }

    /// A producer handle that always uses `shard`.
    pub fn pin_to_shard(&self, shard: usize) -> Result<Self, QueueError> {
        let shard = self.buffer.shards.check(shard)?;
        Ok(Self {
            buffer: Arc::clone(&self.buffer),
            selector: ShardSelector::Pinned(shard),
        })
    }

    /// The shared buffer.
    #[inline]
    pub fn buffer(&self) -> &MpscRingBuffer {
        &self.buffer
    }
}

/// Consuming end of an [`MpscRingBuffer`]. There is exactly one.
pub struct MpscBufferConsumer {
    buffer: Arc<MpscRingBuffer>,
    cursor: Cursor,
}

impl MpscBufferConsumer {
    /// Copies up to `out.len()` bytes from the first non-empty shard, starting
    /// after the shard served last. `None` if every shard is empty.
    pub fn dequeue(&mut self, out: &mut [u8]) -> Option<usize> {
        let shards = self.buffer.shards.count();
        for _ in 0..shards {
            let shard = self.cursor.advance(shards);
            // SAFETY: &mut self on the only consumer handle.
            if let Some(n) = unsafe { self.buffer.shards.ring(shard).pop_chunk(out) } {
                return Some(n);
            }
        }
        None
    }

    /// The shared buffer.
    #[inline]
    pub fn buffer(&self) -> &MpscRingBuffer {
        &self.buffer
    }
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_chunk_limits() {
        let (tx, mut rx) = MpscRingBuffer::new(4, 4).unwrap();
        assert_eq!(tx.buffer().capacity(), 3);
        assert_eq!(tx.buffer().total_capacity(), 12);

        let mut out = [0u8; 4];
        assert_eq!(rx.dequeue(&mut out), None);
        assert!(!tx.enqueue(&[]));
        assert!(!tx.enqueue(&[1, 2, 3, 4]));
        assert!(tx.try_enqueue(&[1, 2, 3, 4]).is_err());

        assert!(tx.enqueue(&[1, 2, 3]));
        assert!(!tx.enqueue(&[4]));
        assert_eq!(rx.buffer().len(), 3);

        assert_eq!(rx.dequeue(&mut out), Some(3));
        assert_eq!(&out[..3], &[1, 2, 3]);
        assert!(rx.buffer().is_empty());
    }

    #[test]
    fn test_dequeue_reads_one_shard() {
        let (tx, mut rx) = MpscRingBuffer::new(8, 2).unwrap();
        let a = tx.pin_to_shard(0).unwrap();
        let b = tx.pin_to_shard(1).unwrap();
        assert!(a.enqueue(b"abc"));
        assert!(b.enqueue(b"xy"));

        let mut out = [0u8; 8];
        assert_eq!(rx.dequeue(&mut out), Some(3));
        assert_eq!(&out[..3], b"abc");
        assert_eq!(rx.dequeue(&mut out), Some(2));
        assert_eq!(&out[..2], b"xy");
        assert_eq!(rx.dequeue(&mut out), None);
    }

    #[test]
    fn test_producers_chunks_stay_intact() {
        const PRODUCERS: u8 = 4;
        const CHUNKS: usize = 5_000;
        const CHUNK: usize = 8;

        let (tx, mut rx) = MpscRingBuffer::new(64, 4).unwrap();
        let handles: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let tx = tx.clone();
                thread::spawn(move || {
                    let chunk = [p; CHUNK];
                    for _ in 0..CHUNKS {
                        while !tx.enqueue(&chunk) {
                            thread::yield_now();
                        }
                    }
                })
            })
            .collect();

        // Read exactly one chunk at a time: chunks from one shard are
        // contiguous, so every read must be uniform.
        let mut out = [0u8; CHUNK];
        let mut counts = [0usize; PRODUCERS as usize];
        let total = PRODUCERS as usize * CHUNKS;
        let mut received = 0;
        while received < total {
            match rx.dequeue(&mut out) {
                Some(n) => {
                    assert_eq!(n, CHUNK);
                    assert!(out.iter().all(|b| *b == out[0]), "chunk torn: {out:?}");
                    counts[out[0] as usize] += 1;
                    received += 1;
                }
                None => thread::yield_now(),
            }
        }

        for h in handles {
            h.join().unwrap();
        }
        assert!(counts.iter().all(|c| *c == CHUNKS));
    }
}
