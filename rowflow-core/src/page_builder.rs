//! Schema-driven encoder assembling records into pages

use std::sync::Arc;

use static_assertions::const_assert;

use crate::buffer::PooledBuffer;
use crate::error::{Error, Result};
use crate::memory::BufferAllocator;
use crate::page::{Page, PageFormat};
use crate::schema::{Column, ColumnType, Schema};
use crate::sink::PageSink;
use crate::value::{Timestamp, Value};

/// Default number of records per page
const DEFAULT_RECORD_CAPACITY: usize = 1024;

/// Default page byte budget; a page flushes once its heap crosses this
const DEFAULT_PAGE_BYTES: usize = 128 * 1024;

// Heap positions are addressed by u32 pairs in the slot array.
const_assert!(DEFAULT_PAGE_BYTES <= u32::MAX as usize);

/// Configuration for a [`PageBuilder`]
#[derive(Debug, Clone, Copy)]
pub struct PageBuilderConfig {
    /// Maximum records per page; a full page flushes transparently
    pub record_capacity: usize,

    /// Byte budget per page; crossing it on a record boundary flushes even
    /// if the record capacity has not been reached
    pub page_bytes: usize,
}

impl Default for PageBuilderConfig {
    fn default() -> Self {
        Self {
            record_capacity: DEFAULT_RECORD_CAPACITY,
            page_bytes: DEFAULT_PAGE_BYTES,
        }
    }
}

/// Serializes a stream of typed records into pages emitted onto a sink
///
/// Values are written column by column into the record being assembled;
/// [`add_record`](PageBuilder::add_record) finalizes it and flushes a full
/// page transparently. The builder runs single-threaded inside the stage
/// that owns it; only the emitted pages cross threads.
pub struct PageBuilder<S: PageSink> {
    schema: Arc<Schema>,
    allocator: BufferAllocator,
    config: PageBuilderConfig,
    format: PageFormat,
    sink: S,
    buffer: Option<PooledBuffer>,
    record_count: usize,
    heap_pos: usize,
    record_open: bool,
    finished: bool,
}

impl<S: PageSink> PageBuilder<S> {
    /// Create a builder with the default configuration
    pub fn new(schema: Arc<Schema>, allocator: BufferAllocator, sink: S) -> Self {
        Self::with_config(schema, allocator, sink, PageBuilderConfig::default())
    }

    /// Create a builder with the given configuration
    pub fn with_config(
        schema: Arc<Schema>,
        allocator: BufferAllocator,
        sink: S,
        config: PageBuilderConfig,
    ) -> Self {
        assert!(
            config.record_capacity > 0,
            "page record capacity must be nonzero"
        );
        let format = PageFormat::new(&schema, config.record_capacity);
        Self {
            schema,
            allocator,
            config,
            format,
            sink,
            buffer: None,
            record_count: 0,
            heap_pos: 0,
            record_open: false,
            finished: false,
        }
    }

    /// Get the schema this builder encodes against
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Borrow the sink pages are emitted onto
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Consume the builder and return its sink
    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Mark a column of the current record null
    pub fn set_null(&mut self, ordinal: usize) -> Result<()> {
        self.begin_record()?;
        self.schema.column(ordinal)?;
        let buffer = self.buffer.as_mut().expect("page buffer present");
        let at = self.format.null_map_offset(self.record_count) + ordinal / 8;
        let byte = buffer.get_u8(at);
        buffer.put_u8(at, byte | 1 << (ordinal % 8));
        Ok(())
    }

    /// Set a boolean column of the current record
    pub fn set_boolean(&mut self, ordinal: usize, value: bool) -> Result<()> {
        let at = self.open_slot(ordinal, ColumnType::Boolean)?;
        self.buffer_mut().put_u8(at, u8::from(value));
        Ok(())
    }

    /// Set a long column of the current record
    pub fn set_long(&mut self, ordinal: usize, value: i64) -> Result<()> {
        let at = self.open_slot(ordinal, ColumnType::Long)?;
        self.buffer_mut().put_i64(at, value);
        Ok(())
    }

    /// Set a double column of the current record
    pub fn set_double(&mut self, ordinal: usize, value: f64) -> Result<()> {
        let at = self.open_slot(ordinal, ColumnType::Double)?;
        self.buffer_mut().put_f64(at, value);
        Ok(())
    }

    /// Set a timestamp column of the current record
    pub fn set_timestamp(&mut self, ordinal: usize, value: Timestamp) -> Result<()> {
        let at = self.open_slot(ordinal, ColumnType::Timestamp)?;
        let buffer = self.buffer_mut();
        buffer.put_i64(at, value.epoch_second());
        buffer.put_u32(at + 8, value.nanos());
        Ok(())
    }

    /// Set a string column of the current record
    pub fn set_string(&mut self, ordinal: usize, value: &str) -> Result<()> {
        let at = self.open_slot(ordinal, ColumnType::String)?;
        let (offset, len) = self.append_heap(value.as_bytes())?;
        let buffer = self.buffer_mut();
        buffer.put_u32(at, offset);
        buffer.put_u32(at + 4, len);
        Ok(())
    }

    /// Set a json column of the current record, stored as canonical JSON
    /// bytes
    pub fn set_json(&mut self, ordinal: usize, value: &serde_json::Value) -> Result<()> {
        let at = self.open_slot(ordinal, ColumnType::Json)?;
        let bytes = serde_json::to_vec(value)?;
        let (offset, len) = self.append_heap(&bytes)?;
        let buffer = self.buffer_mut();
        buffer.put_u32(at, offset);
        buffer.put_u32(at + 4, len);
        Ok(())
    }

    /// Set any column of the current record from a [`Value`]
    pub fn set_value(&mut self, ordinal: usize, value: &Value) -> Result<()> {
        match value {
            Value::Boolean(v) => self.set_boolean(ordinal, *v),
            Value::Long(v) => self.set_long(ordinal, *v),
            Value::Double(v) => self.set_double(ordinal, *v),
            Value::String(v) => self.set_string(ordinal, v),
            Value::Timestamp(v) => self.set_timestamp(ordinal, *v),
            Value::Json(v) => self.set_json(ordinal, v),
        }
    }

    /// Finalize the current record and advance to the next position,
    /// flushing the page transparently when it is full
    ///
    /// Columns never set since the last record remain null.
    pub fn add_record(&mut self) -> Result<()> {
        self.begin_record()?;
        self.record_open = false;
        self.record_count += 1;
        if self.record_count >= self.format.record_capacity() || self.heap_pos >= self.config.page_bytes
        {
            self.flush()?;
        }
        Ok(())
    }

    /// Force-emit the current partially filled page
    ///
    /// Used at stage-level boundaries (for example the end of one input
    /// file) where records must not mix across a flush unit. A no-op when
    /// no records are buffered.
    pub fn flush(&mut self) -> Result<()> {
        if self.record_open {
            return Err(Error::InvalidArgument(
                "flush called with a record in progress".to_string(),
            ));
        }
        if self.record_count == 0 {
            return Ok(());
        }
        let mut buffer = self.buffer.take().expect("page buffer present");
        buffer.set_limit(self.heap_pos);
        let page = Page::from_parts(
            buffer,
            Arc::clone(&self.schema),
            self.record_count,
            self.format,
        );
        self.record_count = 0;
        self.heap_pos = 0;
        self.sink.add(page)
    }

    /// Flush any buffered records and signal end-of-stream to the sink
    pub fn finish(&mut self) -> Result<()> {
        self.flush()?;
        self.finished = true;
        self.sink.finish()
    }

    /// Lazily allocate the page buffer and initialize the record being
    /// assembled with every column marked null.
    fn begin_record(&mut self) -> Result<()> {
        if self.finished {
            return Err(Error::InvalidArgument(
                "page builder already finished".to_string(),
            ));
        }
        if self.buffer.is_none() {
            let min = self.config.page_bytes.max(self.format.heap_start());
            self.buffer = Some(self.allocator.allocate(min));
            self.heap_pos = self.format.heap_start();
        }
        if !self.record_open {
            let at = self.format.null_map_offset(self.record_count);
            let width = self.schema.null_map_width();
            self.buffer
                .as_mut()
                .expect("page buffer present")
                .fill(at, width, 0xFF);
            self.record_open = true;
        }
        Ok(())
    }

    /// Validate the column, clear its null bit, and return the absolute
    /// offset of its slot in the current record.
    fn open_slot(&mut self, ordinal: usize, expected: ColumnType) -> Result<usize> {
        self.begin_record()?;
        let column = self.schema.column(ordinal)?;
        check_type(column, expected)?;

        let null_at = self.format.null_map_offset(self.record_count) + ordinal / 8;
        let buffer = self.buffer.as_mut().expect("page buffer present");
        let byte = buffer.get_u8(null_at);
        buffer.put_u8(null_at, byte & !(1 << (ordinal % 8)));

        Ok(self.format.slot_row_offset(self.record_count) + self.schema.slot_offset(ordinal)?)
    }

    /// Append bytes to the heap, growing the buffer if needed, and return
    /// the `(offset, length)` pair to store in the slot.
    fn append_heap(&mut self, bytes: &[u8]) -> Result<(u32, u32)> {
        let needed = self.heap_pos + bytes.len();
        if needed > self.buffer_mut().capacity() {
            self.grow(needed);
        }
        let offset = u32::try_from(self.heap_pos).map_err(|_| Error::BufferOverflow {
            requested: needed,
            capacity: u32::MAX as usize,
        })?;
        let len = u32::try_from(bytes.len()).map_err(|_| Error::BufferOverflow {
            requested: bytes.len(),
            capacity: u32::MAX as usize,
        })?;
        let at = self.heap_pos;
        self.buffer_mut().write_slice(at, bytes);
        self.heap_pos = needed;
        Ok((offset, len))
    }

    /// Replace the page buffer with a larger one, copying the used region.
    fn grow(&mut self, min_capacity: usize) {
        let mut old = self.buffer.take().expect("page buffer present");
        let mut new = self.allocator.allocate(min_capacity);
        new.write_slice(0, old.read_slice(0, self.heap_pos));
        old.release();
        self.buffer = Some(new);
    }

    fn buffer_mut(&mut self) -> &mut PooledBuffer {
        self.buffer.as_mut().expect("page buffer present")
    }
}

fn check_type(column: &Column, expected: ColumnType) -> Result<()> {
    if column.column_type() != expected {
        return Err(Error::TypeMismatch {
            column: column.name().to_string(),
            expected,
            actual: column.column_type(),
        });
    }
    Ok(())
}
