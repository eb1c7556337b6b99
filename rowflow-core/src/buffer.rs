//! Pooled byte buffers with position bookkeeping and a release-once contract

use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use crate::memory::PoolShared;

/// A reusable region of bytes owned exclusively by one stage at a time
///
/// Buffers come from a [`BufferAllocator`](crate::memory::BufferAllocator)
/// and travel by ownership transfer: allocator to producer, producer to
/// channel, channel to consumer. The consumer returns the storage to the
/// pool with [`release`](PooledBuffer::release); dropping an unreleased
/// buffer returns it as well, so abrupt shutdown cannot leak pool storage.
///
/// Position bookkeeping follows the invariant
/// `0 <= offset <= limit <= capacity`, where `limit` marks the end of the
/// written region and `capacity` is the pooled storage size.
pub struct PooledBuffer {
    /// Backing storage; taken on release
    storage: Option<Box<[u8]>>,

    /// Size of the backing storage in bytes
    capacity: usize,

    /// Start of the readable region
    offset: usize,

    /// End of the written region
    limit: usize,

    /// Pool the storage returns to; detached buffers have none
    pool: Option<Arc<PoolShared>>,

    /// Call site of the first release, for double-release diagnostics
    released_at: Option<&'static Location<'static>>,
}

impl PooledBuffer {
    pub(crate) fn from_pool(storage: Box<[u8]>, pool: Arc<PoolShared>) -> Self {
        let capacity = storage.len();
        Self {
            storage: Some(storage),
            capacity,
            offset: 0,
            limit: 0,
            pool: Some(pool),
            released_at: None,
        }
    }

    /// Create a detached zero-capacity buffer
    ///
    /// Used as the end-of-file sentinel in file-segmented streams and as a
    /// placeholder in tests; it is not connected to any pool.
    pub fn empty() -> Self {
        Self {
            storage: Some(Box::new([])),
            capacity: 0,
            offset: 0,
            limit: 0,
            pool: None,
            released_at: None,
        }
    }

    /// Get the capacity of the backing storage in bytes
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get the start of the readable region
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Get the end of the written region
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Set the start of the readable region
    pub fn set_offset(&mut self, offset: usize) {
        assert!(
            offset <= self.limit,
            "offset {} exceeds limit {}",
            offset,
            self.limit
        );
        self.offset = offset;
    }

    /// Set the end of the written region
    pub fn set_limit(&mut self, limit: usize) {
        assert!(
            self.offset <= limit && limit <= self.capacity,
            "limit {} outside {}..={}",
            limit,
            self.offset,
            self.capacity
        );
        self.limit = limit;
    }

    /// Check whether this buffer has been explicitly released
    pub fn is_released(&self) -> bool {
        self.released_at.is_some()
    }

    fn data(&self) -> &[u8] {
        self.storage
            .as_deref()
            .expect("buffer accessed after release")
    }

    fn data_mut(&mut self) -> &mut [u8] {
        self.storage
            .as_deref_mut()
            .expect("buffer accessed after release")
    }

    /// Read one byte at an absolute position
    pub fn get_u8(&self, at: usize) -> u8 {
        self.data()[at]
    }

    /// Write one byte at an absolute position
    pub fn put_u8(&mut self, at: usize, value: u8) {
        self.data_mut()[at] = value;
    }

    /// Read a 64-bit signed integer at an absolute position
    pub fn get_i64(&self, at: usize) -> i64 {
        bytemuck::pod_read_unaligned(&self.data()[at..at + 8])
    }

    /// Write a 64-bit signed integer at an absolute position
    pub fn put_i64(&mut self, at: usize, value: i64) {
        self.data_mut()[at..at + 8].copy_from_slice(bytemuck::bytes_of(&value));
    }

    /// Read a 64-bit float at an absolute position
    pub fn get_f64(&self, at: usize) -> f64 {
        bytemuck::pod_read_unaligned(&self.data()[at..at + 8])
    }

    /// Write a 64-bit float at an absolute position
    pub fn put_f64(&mut self, at: usize, value: f64) {
        self.data_mut()[at..at + 8].copy_from_slice(bytemuck::bytes_of(&value));
    }

    /// Read a 32-bit unsigned integer at an absolute position
    pub fn get_u32(&self, at: usize) -> u32 {
        bytemuck::pod_read_unaligned(&self.data()[at..at + 4])
    }

    /// Write a 32-bit unsigned integer at an absolute position
    pub fn put_u32(&mut self, at: usize, value: u32) {
        self.data_mut()[at..at + 4].copy_from_slice(bytemuck::bytes_of(&value));
    }

    /// Borrow `len` bytes starting at an absolute position
    pub fn read_slice(&self, at: usize, len: usize) -> &[u8] {
        &self.data()[at..at + len]
    }

    /// Copy bytes into the buffer at an absolute position
    pub fn write_slice(&mut self, at: usize, src: &[u8]) {
        self.data_mut()[at..at + src.len()].copy_from_slice(src);
    }

    /// Fill `len` bytes starting at an absolute position
    pub fn fill(&mut self, at: usize, len: usize, value: u8) {
        self.data_mut()[at..at + len].fill(value);
    }

    /// Return the backing storage to its pool
    ///
    /// Must be called exactly once by the final owner. A second release is
    /// detected, reported with the site of the first release, and otherwise
    /// ignored; the storage was already safely pooled.
    #[track_caller]
    pub fn release(&mut self) {
        if let Some(first) = self.released_at {
            tracing::warn!(
                first_release = %first,
                second_release = %Location::caller(),
                "buffer released twice"
            );
            return;
        }
        self.released_at = Some(Location::caller());
        if let Some(storage) = self.storage.take() {
            if let Some(pool) = &self.pool {
                pool.recycle(storage);
            }
        }
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(storage) = self.storage.take() {
            if let Some(pool) = &self.pool {
                pool.recycle(storage);
            }
        }
    }
}

impl fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("capacity", &self.capacity)
            .field("offset", &self.offset)
            .field("limit", &self.limit)
            .field("released", &self.is_released())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::BufferAllocator;

    #[test]
    fn scalar_round_trip() {
        let allocator = BufferAllocator::new();
        let mut buffer = allocator.allocate(64);

        buffer.put_u8(0, 0x7F);
        buffer.put_i64(1, -42);
        buffer.put_f64(9, 2.5);
        buffer.put_u32(17, 123_456);

        assert_eq!(buffer.get_u8(0), 0x7F);
        assert_eq!(buffer.get_i64(1), -42);
        assert_eq!(buffer.get_f64(9), 2.5);
        assert_eq!(buffer.get_u32(17), 123_456);
    }

    #[test]
    fn slice_round_trip() {
        let allocator = BufferAllocator::new();
        let mut buffer = allocator.allocate(16);

        buffer.write_slice(3, b"hello");
        assert_eq!(buffer.read_slice(3, 5), b"hello");

        buffer.fill(3, 5, 0);
        assert_eq!(buffer.read_slice(3, 5), &[0; 5]);
    }

    #[test]
    fn limit_tracks_written_region() {
        let allocator = BufferAllocator::new();
        let mut buffer = allocator.allocate(16);

        assert_eq!(buffer.limit(), 0);
        buffer.set_limit(10);
        buffer.set_offset(4);
        assert_eq!(buffer.offset(), 4);
        assert_eq!(buffer.limit(), 10);
    }

    #[test]
    #[should_panic(expected = "exceeds limit")]
    fn offset_beyond_limit_panics() {
        let allocator = BufferAllocator::new();
        let mut buffer = allocator.allocate(16);
        buffer.set_offset(1);
    }

    #[test]
    fn empty_buffer_has_no_capacity() {
        let buffer = PooledBuffer::empty();
        assert_eq!(buffer.capacity(), 0);
        assert_eq!(buffer.limit(), 0);
    }

    #[test]
    fn double_release_is_reported_not_fatal() {
        let allocator = BufferAllocator::new();
        let mut buffer = allocator.allocate(8);

        buffer.release();
        assert!(buffer.is_released());
        // Second release must neither panic nor disturb the pool.
        buffer.release();
        assert_eq!(allocator.stats().releases, 1);
    }
}
