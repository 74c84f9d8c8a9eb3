use crate::error::AllocError;
use crate::shim::atomic::{AtomicPtr, Ordering};
use crate::shim::sync::Arc;
use crate::wf_link_queue::try_alloc;
use std::ptr;

struct Node<T> {
    value: T,
    next: *mut Node<T>,
}

/// Unbounded MPSC batcher: producers push onto a lock-free stack, the
/// consumer detaches the whole stack at once and replays it oldest first.
pub struct MpscLinkedBatcher<T> {
    head: AtomicPtr<Node<T>>,
}

// SAFETY: nodes are published with Release and taken with an Acquire swap.
unsafe impl<T: Send> Send for MpscLinkedBatcher<T> {}
unsafe impl<T: Send> Sync for MpscLinkedBatcher<T> {}

impl<T> MpscLinkedBatcher<T> {
    /// Creates an empty batcher and returns its two ends.
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (BatchProducer<T>, BatchConsumer<T>) {
        let batcher = Arc::new(Self {
            head: AtomicPtr::new(ptr::null_mut()),
        });
        tracing::debug!("linked batcher created");
        (
            BatchProducer {
                batcher: Arc::clone(&batcher),
            },
            BatchConsumer { batcher },
        )
    }

    fn push(&self, item: T) -> Result<(), AllocError<T>> {
        let node = try_alloc(Node {
            value: item,
            next: ptr::null_mut(),
        })
        .map_err(|node| AllocError(node.value))?
        .as_ptr();

        let mut prev = self.head.load(Ordering::Relaxed);
        loop {
            // SAFETY: node is not shared until the CAS succeeds.
            unsafe { (*node).next = prev };
            match self
                .head
                .compare_exchange_weak(prev, node, Ordering::Release, Ordering::Relaxed)
            {
                Ok(_) => return Ok(()),
                Err(current) => prev = current,
            }
        }
    }

    /// Detaches every node and returns the list in FIFO order.
    fn take_all(&self) -> Detached<T> {
        let mut last = self.head.swap(ptr::null_mut(), Ordering::AcqRel);
        let mut first = ptr::null_mut();
        while !last.is_null() {
            // SAFETY: the swap made the detached list private to this thread.
            unsafe {
                let next = (*last).next;
                (*last).next = first;
                first = last;
                last = next;
            }
        }
        Detached { first }
    }
}

/// A list taken off the stack, oldest node first. Nodes not yet yielded are
/// freed with their values on drop.
struct Detached<T> {
    first: *mut Node<T>,
}

impl<T> Iterator for Detached<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.first.is_null() {
            return None;
        }
        // SAFETY: every node was allocated by try_alloc and is owned by this
        // list alone.
        let node = unsafe { Box::from_raw(self.first) };
        self.first = node.next;
        Some(node.value)
    }
}

impl<T> Drop for Detached<T> {
    fn drop(&mut self) {
        self.for_each(drop);
    }
}

impl<T> Drop for MpscLinkedBatcher<T> {
    fn drop(&mut self) {
        drop(self.take_all());
    }
}

/// Producing end of an [`MpscLinkedBatcher`]. Clone it for every producer.
pub struct BatchProducer<T> {
    batcher: Arc<MpscLinkedBatcher<T>>,
}

impl<T> BatchProducer<T> {
    /// Pushes `item`. Fails only when node allocation fails.
    #[inline]
    pub fn enqueue(&self, item: T) -> Result<(), AllocError<T>> {
        self.batcher.push(item)
    }
}

impl<T> Clone for BatchProducer<T> {
    fn clone(&self) -> Self {
        Self {
            batcher: Arc::clone(&self.batcher),
        }
    }
}

/// Consuming end of an [`MpscLinkedBatcher`].
pub struct BatchConsumer<T> {
    batcher: Arc<MpscLinkedBatcher<T>>,
}

impl<T> BatchConsumer<T> {
    /// Takes everything enqueued so far and hands it to `handler` in the
    /// order it was pushed. Returns the batch size; 0 means nothing was
    /// pending.
    pub fn dequeue_with<F>(&mut self, mut handler: F) -> usize
    where
        F: FnMut(T),
    {
        let mut count = 0;
        for item in self.batcher.take_all() {
            handler(item);
            count += 1;
        }
        count
    }

    /// Same as [`dequeue_with`](Self::dequeue_with), collecting into a `Vec`.
    pub fn dequeue_all(&mut self) -> Vec<T> {
        let mut batch = Vec::new();
        self.dequeue_with(|item| batch.push(item));
        batch
    }

    /// Returns true if nothing is pending.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.batcher.head.load(Ordering::Acquire).is_null()
    }
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_panicking_handler_frees_rest_of_batch() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        static DROP_COUNT: AtomicUsize = AtomicUsize::new(0);

        struct DropTracker;
        impl Drop for DropTracker {
            fn drop(&mut self) {
                DROP_COUNT.fetch_add(1, Ordering::SeqCst);
            }
        }

        let (tx, mut rx) = MpscLinkedBatcher::new();
        for _ in 0..4 {
            tx.enqueue(DropTracker).unwrap();
        }

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            rx.dequeue_with(|_item| panic!("handler failed"))
        }));
        assert!(result.is_err());
        // The whole batch was detached, so all four are gone.
        assert_eq!(DROP_COUNT.load(Ordering::SeqCst), 4);
        assert!(rx.is_empty());
    }

    #[test]
    fn test_batch_order() {
        let (tx, mut rx) = MpscLinkedBatcher::<i32>::new();
        assert!(rx.is_empty());
        assert_eq!(rx.dequeue_with(|_| {}), 0);

        for v in 0..5 {
            tx.enqueue(v).unwrap();
        }
        assert!(!rx.is_empty());
        assert_eq!(rx.dequeue_all(), vec![0, 1, 2, 3, 4]);
        assert!(rx.is_empty());

        tx.enqueue(5).unwrap();
        assert_eq!(rx.dequeue_all(), vec![5]);
    }

    #[test]
    fn test_drop_with_pending_items() {
        let (tx, rx) = MpscLinkedBatcher::new();
        for v in 0..100 {
            tx.enqueue(vec![v; 4]).unwrap();
        }
        drop(rx);
        drop(tx);
    }

    #[test]
    fn test_concurrent_producers() {
        const PRODUCERS: usize = 4;
        const PER_PRODUCER: usize = 5_000;

        let (tx, mut rx) = MpscLinkedBatcher::<(usize, usize)>::new();
        let handles: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let tx = tx.clone();
                thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        tx.enqueue((p, i)).unwrap();
                    }
                })
            })
            .collect();

        let mut next = [0usize; PRODUCERS];
        let mut received = 0;
        while received < PRODUCERS * PER_PRODUCER {
            let n = rx.dequeue_with(|(p, i)| {
                assert_eq!(i, next[p]);
                next[p] += 1;
            });
            if n == 0 {
                thread::yield_now();
            }
            received += n;
        }

        for h in handles {
            h.join().unwrap();
        }
    }
}
