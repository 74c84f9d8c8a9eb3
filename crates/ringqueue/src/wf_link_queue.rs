use crate::error::AllocError;
use crate::shim::atomic::{AtomicPtr, Ordering};
use crate::shim::sync::Arc;
use crossbeam_utils::CachePadded;
use std::alloc::{self, Layout};
use std::mem::MaybeUninit;
use std::ptr::{self, NonNull};

/// Moves `node` to the heap, handing it back if the allocator fails.
///
/// The result is compatible with `Box::from_raw`.
pub(crate) fn try_alloc<N>(node: N) -> Result<NonNull<N>, N> {
    let layout = Layout::new::<N>();
    if layout.size() == 0 {
        return Ok(NonNull::dangling());
    }
    // SAFETY: layout has non-zero size.
    let raw = unsafe { alloc::alloc(layout) }.cast::<N>();
    match NonNull::new(raw) {
        Some(ptr) => {
            // SAFETY: freshly allocated with N's layout.
            unsafe { ptr.as_ptr().write(node) };
            Ok(ptr)
        }
        None => {
            tracing::warn!(size = layout.size(), "queue node allocation failed");
            Err(node)
        }
    }
}

struct Node<T> {
    next: AtomicPtr<Node<T>>,
    /// Uninit in the stub node, init everywhere else.
    value: MaybeUninit<T>,
}

impl<T> Node<T> {
    fn new(value: MaybeUninit<T>) -> Self {
        Self {
            next: AtomicPtr::new(ptr::null_mut()),
            value,
        }
    }
}

/// Unbounded wait-free MPSC linked queue.
///
/// `head` is the stub node whose successor holds the oldest item; `tail` is
/// the newest node. Enqueue is one atomic swap on `tail` followed by linking
/// the previous tail, so it never retries. A dequeue that overlaps an enqueue
/// between those two steps reports empty.
pub struct WfLinkQueue<T> {
    head: CachePadded<AtomicPtr<Node<T>>>,
    tail: CachePadded<AtomicPtr<Node<T>>>,
}

// SAFETY: values are moved from producers to the single consumer through the
// Release store on `next` and the matching Acquire load.
unsafe impl<T: Send> Send for WfLinkQueue<T> {}
unsafe impl<T: Send> Sync for WfLinkQueue<T> {}

impl<T> WfLinkQueue<T> {
    /// Creates an empty queue and returns its two ends.
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (LinkProducer<T>, LinkConsumer<T>) {
        let stub = Box::into_raw(Box::new(Node::new(MaybeUninit::uninit())));
        let queue = Arc::new(Self {
            head: CachePadded::new(AtomicPtr::new(stub)),
            tail: CachePadded::new(AtomicPtr::new(stub)),
        });
        tracing::debug!("wait-free link queue created");
        (
            LinkProducer {
                queue: Arc::clone(&queue),
            },
            LinkConsumer { queue },
        )
    }

    fn push(&self, item: T) -> Result<(), AllocError<T>> {
        let node = try_alloc(Node::new(MaybeUninit::new(item)))
            // SAFETY: the value was initialized just above.
            .map_err(|node| AllocError(unsafe { node.value.assume_init() }))?
            .as_ptr();

        let prev = self.tail.swap(node, Ordering::AcqRel);
        // SAFETY: prev stays alive until the consumer moves past it, which
        // needs prev.next to be set first.
        unsafe { (*prev).next.store(node, Ordering::Release) };
        Ok(())
    }

    /// # Safety
    ///
    /// Only one thread may act as consumer at a time.
    unsafe fn pop(&self) -> Option<T> {
        let head = self.head.load(Ordering::Relaxed);
        // SAFETY: head is the live stub node, owned by the consumer.
        let next = unsafe { (*head).next.load(Ordering::Acquire) };
        if next.is_null() {
            return None;
        }

        // SAFETY: next is linked, so its value was written before the Release
        // store we acquired. It becomes the new stub and its value is moved out.
        let item = unsafe { (*next).value.assume_init_read() };
        self.head.store(next, Ordering::Relaxed);
        // SAFETY: no producer references the old stub any more.
        drop(unsafe { Box::from_raw(head) });
        Some(item)
    }

    fn is_empty(&self) -> bool {
        let head = self.head.load(Ordering::Relaxed);
        // SAFETY: the stub is freed only by the consumer.
        unsafe { (*head).next.load(Ordering::Acquire).is_null() }
    }
}

impl<T> Drop for WfLinkQueue<T> {
    fn drop(&mut self) {
        let stub = self.head.load(Ordering::Relaxed);
        // SAFETY: exclusive access. The stub's value is uninit, every node
        // after it holds an item.
        unsafe {
            let mut next = (*stub).next.load(Ordering::Relaxed);
            drop(Box::from_raw(stub));
            while !next.is_null() {
                let node = next;
                next = (*node).next.load(Ordering::Relaxed);
                (*node).value.assume_init_drop();
                drop(Box::from_raw(node));
            }
        }
    }
}

/// Producing end of a [`WfLinkQueue`]. Clone it for every producer thread.
pub struct LinkProducer<T> {
    queue: Arc<WfLinkQueue<T>>,
}

impl<T> LinkProducer<T> {
    /// Appends `item`. Fails only when node allocation fails, in which case
    /// the item is returned inside the error.
    #[inline]
    pub fn enqueue(&self, item: T) -> Result<(), AllocError<T>> {
        self.queue.push(item)
    }
}

impl<T> Clone for LinkProducer<T> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
        }
    }
}

/// Consuming end of a [`WfLinkQueue`]. There is exactly one.
pub struct LinkConsumer<T> {
    queue: Arc<WfLinkQueue<T>>,
}

impl<T> LinkConsumer<T> {
    /// Removes the oldest item, or `None` when the queue is empty.
    #[inline]
    pub fn dequeue(&mut self) -> Option<T> {
        // SAFETY: &mut self on the only consumer handle.
        unsafe { self.queue.pop() }
    }

    /// Hands `handler` every item enqueued before the call. Items that
    /// producers add while it runs are left for the next call. Returns the
    /// count.
    pub fn dequeue_with<F>(&mut self, mut handler: F) -> usize
    where
        F: FnMut(T),
    {
        // The newest node stays alive until the consumer moves past it, so
        // its address cannot be reused before the loop reaches it.
        let last = self.queue.tail.load(Ordering::Acquire);
        let mut count = 0;
        while self.queue.head.load(Ordering::Relaxed) != last {
            let Some(item) = self.dequeue() else {
                break;
            };
            handler(item);
            count += 1;
        }
        count
    }

    /// Returns true if no linked item is waiting.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
