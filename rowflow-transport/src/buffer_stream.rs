//! Named handles for streaming raw buffers between byte-oriented stages

use std::sync::Arc;

use rowflow_core::PooledBuffer;

use crate::channel::{BoundedChannel, ChannelIter};
use crate::error::Result;

/// Create a bounded buffer channel and return its producer and consumer
/// handles
pub fn buffer_channel(max_queued_bytes: usize) -> (BufferOutput, BufferInput) {
    let channel = Arc::new(BoundedChannel::new(max_queued_bytes));
    (
        BufferOutput {
            channel: Arc::clone(&channel),
        },
        BufferInput { channel },
    )
}

/// Producer-side handle of a buffer channel
#[derive(Clone)]
pub struct BufferOutput {
    channel: Arc<BoundedChannel<PooledBuffer>>,
}

impl BufferOutput {
    /// Hand a buffer to the downstream stage, blocking under backpressure
    pub fn add(&self, buffer: PooledBuffer) -> Result<()> {
        self.channel.add(buffer)
    }

    /// Signal that no more buffers will be produced
    pub fn finish(&self) {
        self.channel.complete_producer();
    }

    /// Abruptly close the channel, unblocking the peer stage
    pub fn close(&self) {
        self.channel.close();
    }
}

/// Consumer-side handle of a buffer channel
#[derive(Clone)]
pub struct BufferInput {
    channel: Arc<BoundedChannel<PooledBuffer>>,
}

impl BufferInput {
    /// Take the next buffer, blocking while the stream is empty and open;
    /// `Ok(None)` at end of stream
    pub fn poll(&self) -> Result<Option<PooledBuffer>> {
        self.channel.poll()
    }

    /// Iterate buffers until end of stream
    pub fn iter(&self) -> ChannelIter<'_, PooledBuffer> {
        self.channel.iter()
    }

    /// Signal that the consumer is done; releases anything still queued
    pub fn complete(&self) {
        self.channel.complete_consumer();
    }

    /// Block until the producer finished, the stream drained, and the
    /// consumer completed
    pub fn join(&self) -> Result<()> {
        self.channel.join()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use rowflow_core::BufferAllocator;

    use super::*;

    #[test]
    fn buffers_cross_threads_in_order() {
        let allocator = BufferAllocator::new();
        let (output, input) = buffer_channel(usize::MAX);

        let producer = {
            let allocator = allocator.clone();
            thread::spawn(move || {
                for i in 0..4u8 {
                    let mut buffer = allocator.allocate(16);
                    buffer.put_u8(0, i);
                    buffer.set_limit(1);
                    output.add(buffer).unwrap();
                }
                output.finish();
            })
        };

        let mut seen = Vec::new();
        while let Some(mut buffer) = input.poll().unwrap() {
            seen.push(buffer.get_u8(0));
            buffer.release();
        }
        input.complete();

        producer.join().unwrap();
        input.join().unwrap();
        assert_eq!(seen, vec![0, 1, 2, 3]);
        assert_eq!(allocator.stats().outstanding_bytes, 0);
    }
}
