#![cfg(not(feature = "loom"))]

use ringqueue_rs::{
    Config, MpmcRingQueue, MpscLinkedBatcher, MpscRingBuffer, MpscRingQueue, SpscRingBuffer,
    SpscRingQueue, TryDequeueError, WaitBatcher, WaitQueue, WaitRing, WfLinkQueue,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn test_spsc_queue_fifo_across_threads() {
    const N: u64 = 50_000;
    let (mut producer, mut consumer) = SpscRingQueue::<u64>::new(128).unwrap();

    let handle = thread::spawn(move || {
        for i in 0..N {
            let mut item = i;
            while let Err(back) = producer.enqueue(item) {
                item = back;
                thread::yield_now();
            }
        }
    });

    let mut expected = 0;
    while expected < N {
        let consumed = consumer.dequeue_with(|item| {
            assert_eq!(item, expected, "FIFO violation: expected {}, got {}", expected, item);
            expected += 1;
        });
        if consumed == 0 {
            thread::yield_now();
        }
    }

    handle.join().unwrap();
    assert!(consumer.is_empty());
}

#[test]
fn test_spsc_buffer_capacity_boundary() {
    let (mut producer, mut consumer) = SpscRingBuffer::new(4).unwrap();
    assert_eq!(producer.capacity(), 3);

    assert!(producer.enqueue(b"a"));
    assert!(producer.enqueue(b"b"));
    assert!(producer.enqueue(b"c"));
    assert!(!producer.enqueue(b"d"));

    let mut out = [0u8; 1];
    assert_eq!(consumer.dequeue(&mut out), Some(1));
    assert_eq!(&out, b"a");
    assert!(producer.enqueue(b"d"));
}

#[test]
fn test_mpsc_queue_no_loss() {
    const N_PRODUCERS: u64 = 6;
    const ITEMS_PER_PRODUCER: u64 = 10_000;

    // Fewer shards than producers: some shards are shared.
    let (producer, mut consumer) = MpscRingQueue::<u64>::with_config(Config::new(64, 3)).unwrap();
    assert_eq!(consumer.queue().shards(), 3);

    let handles: Vec<_> = (0..N_PRODUCERS)
        .map(|id| {
            let producer = producer.clone();
            thread::spawn(move || {
                for i in 0..ITEMS_PER_PRODUCER {
                    let mut item = id * ITEMS_PER_PRODUCER + i;
                    while let Err(back) = producer.enqueue(item) {
                        item = back;
                        thread::yield_now();
                    }
                }
            })
        })
        .collect();

    let total = (N_PRODUCERS * ITEMS_PER_PRODUCER) as usize;
    let mut received = Vec::with_capacity(total);
    while received.len() < total {
        if consumer.dequeue_with(|item| received.push(item)) == 0 {
            thread::yield_now();
        }
    }

    for handle in handles {
        handle.join().unwrap();
    }

    received.sort_unstable();
    let expected: Vec<u64> = (0..N_PRODUCERS * ITEMS_PER_PRODUCER).collect();
    assert_eq!(received, expected);
}

#[test]
fn test_mpsc_queue_per_producer_order() {
    const N_PRODUCERS: usize = 4;
    const ITEMS_PER_PRODUCER: u64 = 5_000;

    let (producer, mut consumer) = MpscRingQueue::<(usize, u64)>::new(256, 4).unwrap();
    let handles: Vec<_> = (0..N_PRODUCERS)
        .map(|id| {
            let producer = producer.pin_to_shard(id).unwrap();
            thread::spawn(move || {
                for i in 0..ITEMS_PER_PRODUCER {
                    let mut item = (id, i);
                    while let Err(back) = producer.enqueue(item) {
                        item = back;
                        thread::yield_now();
                    }
                }
            })
        })
        .collect();

    let mut last_seen = vec![0u64; N_PRODUCERS];
    let mut total = 0;
    while total < N_PRODUCERS * ITEMS_PER_PRODUCER as usize {
        match consumer.dequeue() {
            Some((id, seq)) => {
                assert_eq!(seq, last_seen[id], "producer {} reordered", id);
                last_seen[id] += 1;
                total += 1;
            }
            None => thread::yield_now(),
        }
    }

    for handle in handles {
        handle.join().unwrap();
    }
    assert!(last_seen.iter().all(|&n| n == ITEMS_PER_PRODUCER));
}

#[test]
fn test_mpsc_buffer_byte_totals() {
    const N_PRODUCERS: u8 = 3;
    const CHUNKS: usize = 2_000;

    let (producer, mut consumer) = MpscRingBuffer::new(128, 0).unwrap();
    assert!(consumer.buffer().shards() >= 1);

    let handles: Vec<_> = (1..=N_PRODUCERS)
        .map(|id| {
            let producer = producer.clone();
            thread::spawn(move || {
                let chunk = vec![id; id as usize * 3];
                for _ in 0..CHUNKS {
                    while !producer.enqueue(&chunk) {
                        thread::yield_now();
                    }
                }
            })
        })
        .collect();

    let expected: HashMap<u8, usize> = (1..=N_PRODUCERS)
        .map(|id| (id, id as usize * 3 * CHUNKS))
        .collect();
    let total: usize = expected.values().sum();

    let mut counts: HashMap<u8, usize> = HashMap::new();
    let mut out = [0u8; 32];
    let mut received = 0;
    while received < total {
        match consumer.dequeue(&mut out) {
            Some(n) => {
                for byte in &out[..n] {
                    *counts.entry(*byte).or_default() += 1;
                }
                received += n;
            }
            None => thread::yield_now(),
        }
    }

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(counts, expected);
}

#[test]
fn test_link_queue_many_producers() {
    const N_PRODUCERS: usize = 8;
    const ITEMS_PER_PRODUCER: usize = 5_000;

    let (producer, mut consumer) = WfLinkQueue::<usize>::new();
    let handles: Vec<_> = (0..N_PRODUCERS)
        .map(|id| {
            let producer = producer.clone();
            thread::spawn(move || {
                for i in 0..ITEMS_PER_PRODUCER {
                    producer.enqueue(id * ITEMS_PER_PRODUCER + i).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let mut received = Vec::new();
    consumer.dequeue_with(|item| received.push(item));
    received.sort_unstable();
    assert_eq!(received, (0..N_PRODUCERS * ITEMS_PER_PRODUCER).collect::<Vec<_>>());
    assert!(consumer.dequeue().is_none());
}

#[test]
fn test_linked_batcher_and_mpmc_ring() {
    let (producer, mut consumer) = MpscLinkedBatcher::new();
    for i in 0..10 {
        producer.enqueue(i).unwrap();
    }
    assert_eq!(consumer.dequeue_all(), (0..10).collect::<Vec<_>>());

    let queue = MpmcRingQueue::new(8).unwrap();
    for i in 0..8 {
        assert!(queue.enqueue(i).is_ok());
    }
    assert!(queue.enqueue(8).is_err());
    assert_eq!(queue.dequeue(), Some(0));
}

#[test]
fn test_wait_queue_close_draining() {
    let queue = WaitQueue::new(0);
    queue.enqueue(0).unwrap();
    queue.enqueue(1).unwrap();
    queue.enqueue(2).unwrap();

    queue.close();
    assert_eq!(queue.dequeue(), Some(0));
    assert_eq!(queue.dequeue(), Some(1));
    assert_eq!(queue.dequeue(), Some(2));
    assert_eq!(queue.dequeue(), None);
    assert_eq!(queue.enqueue(3), Err(3));
}

#[test]
fn test_wait_queue_close_wakes_consumers() {
    const CONSUMERS: usize = 4;
    let queue = Arc::new(WaitQueue::<u32>::new(8));

    let handles: Vec<_> = (0..CONSUMERS)
        .map(|_| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let mut count = 0;
                while queue.dequeue().is_some() {
                    count += 1;
                }
                count
            })
        })
        .collect();

    for i in 0..100 {
        queue.enqueue(i).unwrap();
    }
    queue.close();

    let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(total, 100);
    assert!(queue.is_empty());
}

#[test]
fn test_wait_ring_producers_consumers() {
    const PRODUCERS: u64 = 3;
    const CONSUMERS: usize = 3;
    const PER_PRODUCER: u64 = 2_000;

    let ring = Arc::new(WaitRing::<u64>::new(16).unwrap());
    let producers: Vec<_> = (0..PRODUCERS)
        .map(|id| {
            let ring = Arc::clone(&ring);
            thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    ring.enqueue(id * PER_PRODUCER + i).unwrap();
                }
            })
        })
        .collect();
    let consumers: Vec<_> = (0..CONSUMERS)
        .map(|_| {
            let ring = Arc::clone(&ring);
            thread::spawn(move || {
                let mut seen = Vec::new();
                while let Some(v) = ring.dequeue() {
                    seen.push(v);
                }
                seen
            })
        })
        .collect();

    for handle in producers {
        handle.join().unwrap();
    }
    ring.close();

    let mut all: Vec<u64> = consumers
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    all.sort_unstable();
    assert_eq!(all, (0..PRODUCERS * PER_PRODUCER).collect::<Vec<_>>());
}

#[test]
fn test_wait_batcher_batch_delivery() {
    let batcher = WaitBatcher::new(0);
    batcher.enqueue(0).unwrap();
    batcher.enqueue(1).unwrap();
    batcher.enqueue(2).unwrap();

    let mut batch = Vec::new();
    assert!(batcher.dequeue(&mut batch));
    assert_eq!(batch, vec![0, 1, 2]);
    assert_eq!(batcher.len(), 0);
}

#[test]
fn test_wait_batcher_timed_consumer() {
    let batcher = Arc::new(WaitBatcher::<u32>::unbounded());
    let consumer = {
        let batcher = Arc::clone(&batcher);
        thread::spawn(move || {
            let mut batch = Vec::new();
            let mut total = 0;
            loop {
                match batcher.dequeue_timeout(&mut batch, Duration::from_millis(5)) {
                    Ok(()) => total += batch.len(),
                    Err(TryDequeueError::Timeout) => continue,
                    Err(err) => {
                        assert!(err.is_terminal());
                        return total;
                    }
                }
            }
        })
    };

    for chunk in 0..10 {
        batcher.enqueue_all(chunk * 10..chunk * 10 + 10).unwrap();
        thread::sleep(Duration::from_millis(1));
    }
    batcher.close();
    assert_eq!(consumer.join().unwrap(), 100);
}
