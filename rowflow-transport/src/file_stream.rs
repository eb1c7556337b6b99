//! Buffer streaming with file boundaries preserved
//!
//! Multi-file inputs must not let one file's bytes bleed into the next
//! stage's view of another file. The producer marks the end of each file
//! with a reserved zero-capacity sentinel buffer; the consumer advances
//! with [`FileBufferInput::next_file`] and reads each file to its sentinel
//! before moving on.

use std::sync::Arc;

use rowflow_core::PooledBuffer;

use crate::channel::BoundedChannel;
use crate::error::{ChannelError, Result};

/// Create a file-segmented buffer channel and return its producer and
/// consumer handles
pub fn file_buffer_channel(max_queued_bytes: usize) -> (FileBufferOutput, FileBufferInput) {
    let channel = Arc::new(BoundedChannel::new(max_queued_bytes));
    (
        FileBufferOutput {
            channel: Arc::clone(&channel),
        },
        FileBufferInput {
            channel,
            file_open: false,
            pending: None,
            stream_done: false,
        },
    )
}

/// Producer-side handle of a file-segmented buffer channel
#[derive(Clone)]
pub struct FileBufferOutput {
    channel: Arc<BoundedChannel<PooledBuffer>>,
}

impl FileBufferOutput {
    /// Hand a buffer belonging to the current file to the downstream stage
    pub fn add(&self, buffer: PooledBuffer) -> Result<()> {
        self.channel.add(buffer)
    }

    /// Mark the end of the current file
    pub fn end_file(&self) -> Result<()> {
        self.channel.add(PooledBuffer::empty())
    }

    /// Signal that no more files will be produced
    pub fn finish(&self) {
        self.channel.complete_producer();
    }

    /// Abruptly close the channel, unblocking the peer stage
    pub fn close(&self) {
        self.channel.close();
    }
}

/// Consumer-side handle of a file-segmented buffer channel
///
/// Holds the per-file cursor, so it is owned by the single consuming stage
/// rather than cloned.
pub struct FileBufferInput {
    channel: Arc<BoundedChannel<PooledBuffer>>,
    /// A file is being read and its sentinel has not been consumed yet
    file_open: bool,
    /// First buffer of the current file, held back by `next_file`
    pending: Option<PooledBuffer>,
    stream_done: bool,
}

impl FileBufferInput {
    /// Advance to the next file; returns false once the stream is complete
    ///
    /// Must be called before reading each file and only after the previous
    /// file was consumed to its sentinel; calling it early fails with
    /// [`ChannelError::IllegalUse`].
    pub fn next_file(&mut self) -> Result<bool> {
        if self.file_open || self.pending.is_some() {
            return Err(ChannelError::IllegalUse(
                "next_file called before the previous file was fully consumed".to_string(),
            ));
        }
        if self.stream_done {
            return Ok(false);
        }
        match self.channel.poll()? {
            None => {
                self.stream_done = true;
                Ok(false)
            }
            Some(buffer) if is_sentinel(&buffer) => {
                // The file ended before any payload: an empty file.
                Ok(true)
            }
            Some(buffer) => {
                self.pending = Some(buffer);
                self.file_open = true;
                Ok(true)
            }
        }
    }

    /// Take the next buffer of the current file; `Ok(None)` once the
    /// file's sentinel has been consumed
    pub fn poll(&mut self) -> Result<Option<PooledBuffer>> {
        if let Some(buffer) = self.pending.take() {
            return Ok(Some(buffer));
        }
        if !self.file_open {
            return Ok(None);
        }
        match self.channel.poll()? {
            None => {
                // Producer finished without a trailing sentinel; treat it
                // as the end of both the file and the stream.
                self.file_open = false;
                self.stream_done = true;
                Ok(None)
            }
            Some(buffer) if is_sentinel(&buffer) => {
                self.file_open = false;
                Ok(None)
            }
            Some(buffer) => Ok(Some(buffer)),
        }
    }

    /// Signal that the consumer is done; releases anything still queued
    pub fn complete(&mut self) {
        self.pending = None;
        self.channel.complete_consumer();
    }

    /// Block until the producer finished, the stream drained, and the
    /// consumer completed
    pub fn join(&self) -> Result<()> {
        self.channel.join()
    }
}

fn is_sentinel(buffer: &PooledBuffer) -> bool {
    buffer.capacity() == 0
}
