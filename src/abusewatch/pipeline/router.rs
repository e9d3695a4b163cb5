//! Hash-based event routing for partitioned execution
//!
//! Routes keyed events to partitions by hashing the detector key, so every
//! event for one key lands on the same partition regardless of detector.
//! Per-key ordering then follows from the partition's FIFO queue.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Routes keys to partitions using consistent hashing
#[derive(Debug, Clone)]
pub struct HashRouter {
    num_partitions: usize,
}

impl HashRouter {
    /// Create a router over `num_partitions` partitions (at least one)
    pub fn new(num_partitions: usize) -> Self {
        Self {
            num_partitions: num_partitions.max(1),
        }
    }

    /// Partition for a key, in range [0, num_partitions)
    pub fn route(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.num_partitions as u64) as usize
    }

    pub fn num_partitions(&self) -> usize {
        self.num_partitions
    }
}
