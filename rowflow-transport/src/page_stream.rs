//! Named handles for streaming encoded pages between record-oriented stages

use std::sync::Arc;

use rowflow_core::{Error as CoreError, Page, PageSink};

use crate::channel::{BoundedChannel, ChannelIter};
use crate::error::Result;

/// Create a bounded page channel and return its producer and consumer
/// handles
pub fn page_channel(max_queued_bytes: usize) -> (PageOutput, PageInput) {
    let channel = Arc::new(BoundedChannel::new(max_queued_bytes));
    (
        PageOutput {
            channel: Arc::clone(&channel),
        },
        PageInput { channel },
    )
}

/// Producer-side handle of a page channel
///
/// Implements [`PageSink`], so a
/// [`PageBuilder`](rowflow_core::PageBuilder) can emit straight into the
/// channel.
#[derive(Clone)]
pub struct PageOutput {
    channel: Arc<BoundedChannel<Page>>,
}

impl PageOutput {
    /// Hand a page to the downstream stage, blocking under backpressure
    pub fn add(&self, page: Page) -> Result<()> {
        self.channel.add(page)
    }

    /// Signal that no more pages will be produced
    pub fn finish(&self) {
        self.channel.complete_producer();
    }

    /// Abruptly close the channel, unblocking the peer stage
    pub fn close(&self) {
        self.channel.close();
    }
}

impl PageSink for PageOutput {
    fn add(&mut self, page: Page) -> rowflow_core::Result<()> {
        PageOutput::add(self, page).map_err(|e| CoreError::Sink(Box::new(e)))
    }

    fn finish(&mut self) -> rowflow_core::Result<()> {
        PageOutput::finish(self);
        Ok(())
    }
}

/// Consumer-side handle of a page channel
#[derive(Clone)]
pub struct PageInput {
    channel: Arc<BoundedChannel<Page>>,
}

impl PageInput {
    /// Take the next page, blocking while the stream is empty and open;
    /// `Ok(None)` at end of stream
    pub fn poll(&self) -> Result<Option<Page>> {
        self.channel.poll()
    }

    /// Iterate pages until end of stream
    pub fn iter(&self) -> ChannelIter<'_, Page> {
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
