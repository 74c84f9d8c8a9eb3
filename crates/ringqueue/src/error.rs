//! Error types for queue construction and the few fallible operations.
//!
//! Full, empty and closed are not errors: ring operations report them with
//! `bool`/`Option`/`Result<(), T>` returns that the caller checks every time.

use std::fmt;
use thiserror::Error;

/// Misuse detected while building a container or addressing one of its parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    /// Ring capacity must be a power of two.
    #[error("capacity {capacity} is not a power of two")]
    CapacityNotPowerOfTwo {
        /// The rejected capacity.
        capacity: usize,
    },
    /// Ring capacity is below the minimum of the container.
    #[error("capacity {capacity} is too small (min: {min})")]
    CapacityTooSmall {
        /// The rejected capacity.
        capacity: usize,
        /// Smallest accepted capacity.
        min: usize,
    },
    /// Byte chunk can never fit into the ring, not even when it is empty.
    #[error("chunk of {len} bytes exceeds ring capacity {capacity}")]
    ChunkTooLarge {
        /// Length of the rejected chunk.
        len: usize,
        /// Usable capacity of the ring.
        capacity: usize,
    },
    /// Explicit shard id does not name a shard of the container.
    #[error("shard {shard} out of range (shards: {shards})")]
    ShardOutOfRange {
        /// The requested shard.
        shard: usize,
        /// Number of shards in the container.
        shards: usize,
    },
}

impl QueueError {
    /// Returns `true` for errors raised by constructors.
    #[inline]
    pub fn is_construction_error(&self) -> bool {
        matches!(
            self,
            Self::CapacityNotPowerOfTwo { .. } | Self::CapacityTooSmall { .. }
        )
    }
}

/// Node allocation failed; the item is handed back to the caller.
///
/// Returned by the linked queues instead of silently losing the item.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct AllocError<T>(pub T);

impl<T> AllocError<T> {
    /// Recovers the item that could not be enqueued.
    #[inline]
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for AllocError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad("AllocError(..)")
    }
}

impl<T> fmt::Display for AllocError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("failed to allocate a queue node")
    }
}

impl<T> std::error::Error for AllocError<T> {}

/// Non-blocking or timed enqueue into a wait collection did not happen.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum TryEnqueueError<T> {
    /// No free slot before the deadline (or immediately, for `try_enqueue`).
    Full(T),
    /// The collection is closed; it will never accept the item.
    Closed(T),
}

impl<T> TryEnqueueError<T> {
    /// Recovers the rejected item.
    #[inline]
    pub fn into_inner(self) -> T {
        match self {
            Self::Full(item) | Self::Closed(item) => item,
        }
    }

    /// Returns `true` if the collection was closed.
    #[inline]
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed(_))
    }
}

impl<T> fmt::Debug for TryEnqueueError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(_) => f.pad("Full(..)"),
            Self::Closed(_) => f.pad("Closed(..)"),
        }
    }
}

impl<T> fmt::Display for TryEnqueueError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(_) => f.write_str("collection is full"),
            Self::Closed(_) => f.write_str("collection is closed"),
        }
    }
}

impl<T> std::error::Error for TryEnqueueError<T> {}

/// Non-blocking or timed dequeue from a wait collection returned nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TryDequeueError {
    /// Nothing queued right now.
    #[error("collection is empty")]
    Empty,
    /// Nothing arrived before the deadline.
    #[error("timed out waiting for an item")]
    Timeout,
    /// Closed and fully drained; no item will ever arrive.
    #[error("collection is closed and drained")]
    Closed,
}

impl TryDequeueError {
    /// Returns `true` if retrying later may succeed.
    #[inline]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Empty | Self::Timeout)
    }

    /// Returns `true` if the collection is permanently drained.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }
}
