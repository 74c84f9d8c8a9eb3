//! ringqueue - Wait-Free Rings, Sharded MPSC Queues and Blocking Monitor Collections
//!
//! Three families of in-process queues for producer/consumer threads:
//!
//! - **SPSC rings** ([`SpscRingQueue`], [`SpscRingBuffer`]): bounded and
//!   wait-free, one producer and one consumer, enforced by non-`Clone` handles.
//! - **MPSC compositions** ([`MpscRingQueue`], [`MpscRingBuffer`]): one SPSC
//!   ring per shard, each shard guarded by a [`SpinLock`] on the producer side.
//!   Plus the unbounded linked [`WfLinkQueue`] and [`MpscLinkedBatcher`], and
//!   the bounded lock-free [`MpmcRingQueue`].
//! - **Wait collections** ([`WaitQueue`], [`WaitRing`], [`WaitBatcher`]):
//!   blocking, built on a mutex and two condition variables, with a
//!   [`close`](WaitQueue::close) signal that lets consumers drain and then stop.
//!
//! # Key Features
//!
//! - Cache-line padded head/tail counters with cached opposite indices
//! - Full, empty and closed are plain return values, never panics
//! - Batch drain with a single head update (`dequeue_with`)
//! - Timed and non-blocking variants on every wait collection
//!
//! # Example
//!
//! ```
//! use ringqueue_rs::{MpscRingQueue, WaitQueue};
//! use std::sync::Arc;
//! use std::thread;
//!
//! let (producer, mut consumer) = MpscRingQueue::<u64>::new(1024, 4).unwrap();
//! let handles: Vec<_> = (0..4)
//!     .map(|p| {
//!         let producer = producer.clone();
//!         thread::spawn(move || {
//!             let mut item = p;
//!             while let Err(back) = producer.enqueue(item) {
//!                 item = back;
//!                 thread::yield_now();
//!             }
//!         })
//!     })
//!     .collect();
//! for h in handles {
//!     h.join().unwrap();
//! }
//! let mut sum = 0;
//! consumer.dequeue_with(|v| sum += v);
//! assert_eq!(sum, 6);
//!
//! let queue = Arc::new(WaitQueue::new(16));
//! queue.enqueue("job").unwrap();
//! queue.close();
//! assert_eq!(queue.dequeue(), Some("job"));
//! assert_eq!(queue.dequeue(), None);
//! ```

mod config;
mod error;
mod invariants;
mod linked_batcher;
mod monitor;
mod mpmc_ring_queue;
mod mpsc_ring_buffer;
mod mpsc_ring_queue;
mod shard;
mod shim;
mod spin_lock;
mod spsc_ring_buffer;
mod spsc_ring_queue;
mod wait_batcher;
mod wait_queue;
mod wait_ring;
mod wf_link_queue;

pub use config::{Config, HIGH_THROUGHPUT_CONFIG, LOW_LATENCY_CONFIG};
pub use error::{AllocError, QueueError, TryDequeueError, TryEnqueueError};
pub use linked_batcher::{BatchConsumer, BatchProducer, MpscLinkedBatcher};
pub use mpmc_ring_queue::MpmcRingQueue;
pub use mpsc_ring_buffer::{MpscBufferConsumer, MpscBufferProducer, MpscRingBuffer};
pub use mpsc_ring_queue::{MpscQueueConsumer, MpscQueueProducer, MpscRingQueue};
pub use shard::ShardSelector;
pub use spin_lock::{SpinLock, SpinLockGuard};
pub use spsc_ring_buffer::{BufferConsumer, BufferProducer, SpscRingBuffer};
pub use spsc_ring_queue::{QueueConsumer, QueueProducer, SpscRingQueue};
pub use wait_batcher::WaitBatcher;
pub use wait_queue::WaitQueue;
pub use wait_ring::WaitRing;
pub use wf_link_queue::{LinkConsumer, LinkProducer, WfLinkQueue};
