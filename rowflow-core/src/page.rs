//! The binary page layout carrying a batch of records

use std::sync::Arc;

use crate::buffer::PooledBuffer;
use crate::error::{Error, Result};
use crate::schema::Schema;

/// Layout arithmetic for one page shape: `[null map][slot array][heap]`
///
/// The null map holds one bit per column per record (bit set means null),
/// the slot array holds one fixed-width row per record, and the heap holds
/// variable-length payloads addressed by absolute `(offset, length)` pairs
/// written into the slots.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PageFormat {
    null_width: usize,
    row_width: usize,
    record_capacity: usize,
}

impl PageFormat {
    pub(crate) fn new(schema: &Schema, record_capacity: usize) -> Self {
        Self {
            null_width: schema.null_map_width(),
            row_width: schema.row_width(),
            record_capacity,
        }
    }

    pub(crate) fn record_capacity(&self) -> usize {
        self.record_capacity
    }

    /// Absolute offset of a record's null-map bytes
    pub(crate) fn null_map_offset(&self, record: usize) -> usize {
        record * self.null_width
    }

    /// Absolute offset of a record's slot row
    pub(crate) fn slot_row_offset(&self, record: usize) -> usize {
        self.record_capacity * self.null_width + record * self.row_width
    }

    /// Absolute offset where the variable heap begins
    pub(crate) fn heap_start(&self) -> usize {
        self.record_capacity * (self.null_width + self.row_width)
    }
}

/// A batch of records encoded against one schema, backed by a pooled buffer
///
/// A page is immutable once built. It is owned by the producer stage until
/// handed to a channel, after which ownership passes to the consumer, which
/// must eventually release it (explicitly or by dropping it).
pub struct Page {
    buffer: PooledBuffer,
    schema: Arc<Schema>,
    record_count: usize,
    format: PageFormat,
}

impl Page {
    pub(crate) fn from_parts(
        buffer: PooledBuffer,
        schema: Arc<Schema>,
        record_count: usize,
        format: PageFormat,
    ) -> Self {
        Self {
            buffer,
            schema,
            record_count,
            format,
        }
    }

    /// Get the schema this page was encoded against
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Get the number of records in this page
    pub fn record_count(&self) -> usize {
        self.record_count
    }

    /// Get the record capacity this page was laid out for
    pub fn record_capacity(&self) -> usize {
        self.format.record_capacity
    }

    /// Get the capacity of the backing buffer in bytes
    pub fn byte_size(&self) -> usize {
        self.buffer.capacity()
    }

    /// Borrow the backing buffer
    pub fn buffer(&self) -> &PooledBuffer {
        &self.buffer
    }

    pub(crate) fn format(&self) -> &PageFormat {
        &self.format
    }

    /// Check the null map bit for one column of one record
    pub fn is_null(&self, record: usize, ordinal: usize) -> Result<bool> {
        if record >= self.record_count {
            return Err(Error::IndexOutOfBounds);
        }
        self.schema.column(ordinal)?;
        let byte = self
            .buffer
            .get_u8(self.format.null_map_offset(record) + ordinal / 8);
        Ok(byte & (1 << (ordinal % 8)) != 0)
    }

    /// Return the backing storage to its pool
    #[track_caller]
    pub fn release(mut self) {
        self.buffer.release();
    }

    /// Take the backing buffer out of the page
    pub fn into_buffer(self) -> PooledBuffer {
        self.buffer
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("records", &self.record_count)
            .field("columns", &self.schema.len())
            .field("bytes", &self.byte_size())
            .finish()
    }
}
