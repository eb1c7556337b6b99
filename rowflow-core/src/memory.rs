//! Pooled buffer allocation shared by every stage thread

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::buffer::PooledBuffer;

/// Configuration for a [`BufferAllocator`]
#[derive(Debug, Clone, Copy)]
pub struct AllocatorConfig {
    /// Smallest capacity the allocator hands out; larger requests double
    /// this until they fit
    pub base_size: usize,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            base_size: 32 * 1024,
        }
    }
}

/// Usage statistics for a [`BufferAllocator`]
#[derive(Debug, Clone, Default)]
pub struct AllocatorStats {
    /// Number of fresh storage allocations (pool misses)
    pub allocations: u64,

    /// Number of requests served from pooled storage
    pub reuses: u64,

    /// Number of buffers returned to the pool
    pub releases: u64,

    /// Bytes currently held by live buffers
    pub outstanding_bytes: usize,

    /// Peak bytes ever held by live buffers
    pub peak_bytes: usize,

    /// Bytes currently idle in the pool's free lists
    pub pooled_bytes: usize,
}

struct PoolState {
    free_lists: HashMap<usize, Vec<Box<[u8]>>>,
    stats: AllocatorStats,
}

/// Shared pool bookkeeping behind a mutex; buffers hold an `Arc` to this so
/// they can return storage from whichever thread drops them.
pub(crate) struct PoolShared {
    state: Mutex<PoolState>,
}

impl PoolShared {
    pub(crate) fn recycle(&self, storage: Box<[u8]>) {
        // Runs from Drop; recover the lock rather than panic during unwind.
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let capacity = storage.len();
        state.stats.releases += 1;
        state.stats.outstanding_bytes = state.stats.outstanding_bytes.saturating_sub(capacity);
        state.stats.pooled_bytes += capacity;
        state.free_lists.entry(capacity).or_default().push(storage);
    }
}

/// Pool of reusable byte buffers keyed by power-of-two-of-base capacities
///
/// An allocator is constructed explicitly by the pipeline configuration and
/// passed down to the stages that need it; cloning shares the underlying
/// pool. Every buffer it returns has capacity `base_size * 2^k` for the
/// smallest `k` that satisfies the request, so released storage can be
/// reused for any request of the same size class.
#[derive(Clone)]
pub struct BufferAllocator {
    shared: Arc<PoolShared>,
    base_size: usize,
}

impl BufferAllocator {
    /// Create an allocator with the default configuration
    pub fn new() -> Self {
        Self::with_config(AllocatorConfig::default())
    }

    /// Create an allocator with the given configuration
    pub fn with_config(config: AllocatorConfig) -> Self {
        assert!(config.base_size > 0, "allocator base size must be nonzero");
        Self {
            shared: Arc::new(PoolShared {
                state: Mutex::new(PoolState {
                    free_lists: HashMap::new(),
                    stats: AllocatorStats::default(),
                }),
            }),
            base_size: config.base_size,
        }
    }

    /// Get the configured base size
    pub fn base_size(&self) -> usize {
        self.base_size
    }

    /// Get the capacity that would be allocated for a request: the base
    /// size doubled until it is at least `min_capacity`
    pub fn capacity_for(&self, min_capacity: usize) -> usize {
        let mut capacity = self.base_size;
        while capacity < min_capacity {
            capacity = capacity.saturating_mul(2);
        }
        capacity
    }

    /// Obtain a buffer with capacity at least `min_capacity`, reusing
    /// pooled storage when a matching size class is available
    pub fn allocate(&self, min_capacity: usize) -> PooledBuffer {
        let capacity = self.capacity_for(min_capacity);

        let mut state = self.shared.state.lock().unwrap();
        let storage = state
            .free_lists
            .get_mut(&capacity)
            .and_then(|list| list.pop());

        let storage = match storage {
            Some(storage) => {
                state.stats.reuses += 1;
                state.stats.pooled_bytes = state.stats.pooled_bytes.saturating_sub(capacity);
                storage
            }
            None => {
                state.stats.allocations += 1;
                tracing::debug!(capacity, "pool miss, allocating fresh storage");
                vec![0u8; capacity].into_boxed_slice()
            }
        };
        state.stats.outstanding_bytes += capacity;
        state.stats.peak_bytes = state.stats.peak_bytes.max(state.stats.outstanding_bytes);
        drop(state);

        PooledBuffer::from_pool(storage, Arc::clone(&self.shared))
    }

    /// Get a snapshot of the allocator's usage statistics
    pub fn stats(&self) -> AllocatorStats {
        self.shared.state.lock().unwrap().stats.clone()
    }
}

impl Default for BufferAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    fn small_allocator() -> BufferAllocator {
        BufferAllocator::with_config(AllocatorConfig { base_size: 1024 })
    }

    #[test_case(0, 1024)]
    #[test_case(1, 1024)]
    #[test_case(1024, 1024)]
    #[test_case(1025, 2048)]
    #[test_case(5000, 8192)]
    #[test_case(8192, 8192)]
    fn capacity_doubles_from_base(requested: usize, expected: usize) {
        let allocator = small_allocator();
        assert_eq!(allocator.capacity_for(requested), expected);
        assert_eq!(allocator.allocate(requested).capacity(), expected);
    }

    #[test]
    fn released_storage_is_reused() {
        let allocator = small_allocator();

        let mut buffer = allocator.allocate(100);
        buffer.release();

        let again = allocator.allocate(100);
        assert_eq!(again.capacity(), 1024);

        let stats = allocator.stats();
        assert_eq!(stats.allocations, 1);
        assert_eq!(stats.reuses, 1);
        assert_eq!(stats.releases, 1);
    }

    #[test]
    fn drop_returns_storage_to_pool() {
        let allocator = small_allocator();
        {
            let _buffer = allocator.allocate(10);
        }
        let stats = allocator.stats();
        assert_eq!(stats.releases, 1);
        assert_eq!(stats.pooled_bytes, 1024);
        assert_eq!(stats.outstanding_bytes, 0);
    }

    #[test]
    fn size_classes_do_not_mix() {
        let allocator = small_allocator();

        let mut small = allocator.allocate(1);
        small.release();

        // A larger request must not be served by the pooled 1 KiB storage.
        let large = allocator.allocate(3000);
        assert_eq!(large.capacity(), 4096);
        assert_eq!(allocator.stats().allocations, 2);
    }

    #[test]
    fn double_release_does_not_corrupt_pool() {
        let allocator = small_allocator();

        let mut buffer = allocator.allocate(1);
        buffer.release();
        buffer.release();

        // Only one pooled copy of the storage may exist.
        let _a = allocator.allocate(1);
        let _b = allocator.allocate(1);
        let stats = allocator.stats();
        assert_eq!(stats.reuses, 1);
        assert_eq!(stats.allocations, 2);
    }

    #[test]
    fn stats_track_peak_usage() {
        let allocator = small_allocator();

        let a = allocator.allocate(1024);
        let b = allocator.allocate(2048);
        assert_eq!(allocator.stats().peak_bytes, 1024 + 2048);
        drop(a);
        drop(b);

        let _c = allocator.allocate(1);
        assert_eq!(allocator.stats().peak_bytes, 1024 + 2048);
    }

    proptest! {
        #[test]
        fn capacity_is_minimal_power_of_two_of_base(min in 0usize..1_000_000) {
            let allocator = small_allocator();
            let capacity = allocator.capacity_for(min);
            prop_assert!(capacity >= min);
            prop_assert!(capacity == 1024 || capacity / 2 < min);
            // base * 2^k shape
            prop_assert_eq!(capacity % 1024, 0);
            prop_assert!((capacity / 1024).is_power_of_two());
        }
    }
}
