//! Blocking, bounded transport between rowflow stage threads
//!
//! Every pipeline stage runs on its own thread and exchanges pooled
//! buffers or encoded pages through the bounded channel in this crate.
//! The channel is the only synchronization point in a pipeline: producers
//! block when the queued bytes exceed the channel's budget, consumers
//! block while the queue is empty and the producer has not completed, and
//! an abrupt close unblocks everyone with a distinguishable error.

#![warn(missing_docs)]

pub mod buffer_stream;
pub mod channel;
pub mod error;
pub mod file_stream;
pub mod page_stream;

// Re-export key types for convenience
pub use buffer_stream::{buffer_channel, BufferInput, BufferOutput};
pub use channel::{BoundedChannel, ByteSized, ChannelIter};
pub use error::{ChannelError, Result};
pub use file_stream::{file_buffer_channel, FileBufferInput, FileBufferOutput};
pub use page_stream::{page_channel, PageInput, PageOutput};
