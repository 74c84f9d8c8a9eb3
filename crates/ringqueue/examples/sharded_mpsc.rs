use ringqueue_rs::{Config, MpscRingQueue};
use std::thread;
use std::time::Instant;

/// Construction and close events are logged at debug level:
/// `RUST_LOG=ringqueue_rs=debug cargo run --example sharded_mpsc`
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ringqueue_rs=info"));
    fmt().with_env_filter(filter).with_thread_names(true).init();
}

fn main() {
    init_tracing();
    println!("Sharded MPSC Queue Example");
    println!("==========================\n");

    const N_PRODUCERS: u64 = 4;
    const ITEMS_PER_PRODUCER: u64 = 1_000_000;

    let config = Config::new(
        1 << 12, // 4K slots per shard
        0,       // one shard per hardware thread
    );
    let (producer, mut consumer) = MpscRingQueue::<u64>::with_config(config).unwrap();

    println!("Configuration:");
    println!("  Shards: {}", consumer.queue().shards());
    println!("  Per-shard capacity: {} items", consumer.queue().capacity());
    println!("  Total capacity: {} items", consumer.queue().total_capacity());
    println!("  Producers: {}", N_PRODUCERS);
    println!("  Total items: {}\n", N_PRODUCERS * ITEMS_PER_PRODUCER);

    let start = Instant::now();

    let handles: Vec<_> = (0..N_PRODUCERS)
        .map(|id| {
            let producer = producer.clone();
            thread::spawn(move || {
                for i in 0..ITEMS_PER_PRODUCER {
                    let mut item = id * ITEMS_PER_PRODUCER + i;
                    // Rings never block; back off and retry when our shard is full.
                    while let Err(back) = producer.enqueue(item) {
                        item = back;
                        thread::yield_now();
                    }
                }
            })
        })
        .collect();

    let total = N_PRODUCERS * ITEMS_PER_PRODUCER;
    let mut received = 0u64;
    let mut checksum = 0u64;
    while received < total {
        let n = consumer.dequeue_with(|item| checksum = checksum.wrapping_add(item));
        if n == 0 {
            thread::yield_now();
        }
        received += n as u64;
    }

    for handle in handles {
        handle.join().unwrap();
    }

    let elapsed = start.elapsed();
    let expected: u64 = (0..total).sum();
    println!("Results:");
    println!("  Received: {} items", received);
    println!("  Checksum ok: {}", checksum == expected);
    println!("  Duration: {:?}", elapsed);
    println!(
        "  Throughput: {:.2} M items/sec",
        received as f64 / elapsed.as_secs_f64() / 1_000_000.0
    );
}
