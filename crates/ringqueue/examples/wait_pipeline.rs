use ringqueue_rs::{WaitBatcher, WaitQueue};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Construction and close events are logged at debug level:
/// `RUST_LOG=ringqueue_rs=debug cargo run --example wait_pipeline`
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ringqueue_rs=info"));
    fmt().with_env_filter(filter).with_thread_names(true).init();
}

fn main() {
    init_tracing();
    println!("Wait Collections Pipeline Example");
    println!("=================================\n");

    const JOBS: u32 = 1_000;
    const WORKERS: usize = 4;

    // Stage 1: bounded job queue, several workers.
    let jobs = Arc::new(WaitQueue::<u32>::new(64));
    // Stage 2: workers publish results, a collector takes them in batches.
    let results = Arc::new(WaitBatcher::<u64>::unbounded());

    let workers: Vec<_> = (0..WORKERS)
        .map(|_| {
            let jobs = Arc::clone(&jobs);
            let results = Arc::clone(&results);
            thread::spawn(move || {
                let mut done = 0;
                // Returns None once the queue is closed and drained.
                while let Some(job) = jobs.dequeue() {
                    let squared = u64::from(job) * u64::from(job);
                    if results.enqueue(squared).is_err() {
                        break;
                    }
                    done += 1;
                }
                done
            })
        })
        .collect();

    let collector = {
        let results = Arc::clone(&results);
        thread::spawn(move || {
            let mut batch = Vec::new();
            let mut batches = 0;
            let mut sum = 0u64;
            while results.dequeue(&mut batch) {
                batches += 1;
                sum += batch.iter().sum::<u64>();
            }
            (batches, sum)
        })
    };

    for job in 0..JOBS {
        jobs.enqueue(job).unwrap();
    }
    jobs.close();

    let per_worker: Vec<usize> = workers.into_iter().map(|h| h.join().unwrap()).collect();
    results.close();
    let (batches, sum) = collector.join().unwrap();

    let expected: u64 = (0..u64::from(JOBS)).map(|j| j * j).sum();
    println!("Results:");
    println!("  Jobs per worker: {:?}", per_worker);
    println!("  Result batches: {}", batches);
    println!("  Sum of squares ok: {}", sum == expected);

    // A timed dequeue on a closed, drained queue reports the terminal state.
    match jobs.dequeue_timeout(Duration::from_millis(10)) {
        Ok(job) => println!("  Unexpected leftover job {}", job),
        Err(err) => println!("  Job queue: {}", err),
    }
}
