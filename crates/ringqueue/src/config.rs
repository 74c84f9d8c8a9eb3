use crate::QueueError;

/// Configuration for the ring and sharded containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Ring size in slots (bytes for the byte rings). Must be a power of two >= 2.
    pub capacity: usize,
    /// Number of MPSC shards. 0 selects the hardware thread count.
    pub concurrency: usize,
}

impl Config {
    /// Smallest ring that still has one usable slot after the reserved one.
    pub const MIN_CAPACITY: usize = 2;

    /// Creates a new configuration with custom settings.
    pub const fn new(capacity: usize, concurrency: usize) -> Self {
        Self {
            capacity,
            concurrency,
        }
    }

    /// Returns the mask for index wrapping.
    #[inline]
    pub const fn mask(&self) -> usize {
        self.capacity.wrapping_sub(1)
    }

    /// Slots a ring can hold at once; one slot tells "full" from "empty".
    #[inline]
    pub const fn usable_capacity(&self) -> usize {
        self.capacity.saturating_sub(1)
    }

    /// Checks the ring capacity.
    pub fn validate(&self) -> Result<(), QueueError> {
        validate_capacity(self.capacity)
    }

    /// Shard count with 0 resolved to the hardware thread count.
    pub fn shards(&self) -> usize {
        if self.concurrency != 0 {
            return self.concurrency;
        }
        match std::thread::available_parallelism() {
            Ok(n) => n.get(),
            Err(err) => {
                tracing::warn!(error = %err, "hardware concurrency unknown, using a single shard");
                1
            }
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capacity: 1 << 16, // 64K slots
            concurrency: 0,
        }
    }
}

/// Low latency configuration (4K slots, fits in L1 cache)
pub const LOW_LATENCY_CONFIG: Config = Config::new(1 << 12, 0);

/// High throughput configuration (256K slots)
pub const HIGH_THROUGHPUT_CONFIG: Config = Config::new(1 << 18, 0);

/// Shared capacity check for every power-of-two ring.
pub(crate) fn validate_capacity(capacity: usize) -> Result<(), QueueError> {
    if capacity < Config::MIN_CAPACITY {
        return Err(QueueError::CapacityTooSmall {
            capacity,
            min: Config::MIN_CAPACITY,
        });
    }
    if !capacity.is_power_of_two() {
        return Err(QueueError::CapacityNotPowerOfTwo { capacity });
    }
    Ok(())
}
