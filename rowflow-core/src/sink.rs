//! Sink traits and implementations for page output

use crate::error::Result;
use crate::page::Page;

/// A sink that consumes a stream of pages
///
/// This is the emission seam between a
/// [`PageBuilder`](crate::page_builder::PageBuilder) and whatever carries
/// its pages onward, typically a page channel's output handle.
pub trait PageSink: Send {
    /// Consume one page
    fn add(&mut self, page: Page) -> Result<()>;

    /// Signal that no more pages will be produced
    fn finish(&mut self) -> Result<()>;
}

/// A sink that collects pages in memory
pub struct CollectingPageSink {
    /// The collected pages
    pages: Vec<Page>,

    /// Maximum number of pages to keep
    max_pages: Option<usize>,

    /// Whether the producer signaled end-of-stream
    finished: bool,
}

impl CollectingPageSink {
    /// Create a new collecting sink with no limit
    pub fn new() -> Self {
        Self {
            pages: Vec::new(),
            max_pages: None,
            finished: false,
        }
    }

    /// Create a new collecting sink keeping at most `max_pages` pages;
    /// further pages are released on arrival
    pub fn with_max_pages(max_pages: usize) -> Self {
        Self {
            pages: Vec::new(),
            max_pages: Some(max_pages),
            finished: false,
        }
    }

    /// Get the collected pages
    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    /// Take ownership of the collected pages
    pub fn take_pages(self) -> Vec<Page> {
        self.pages
    }

    /// Check whether the producer finished the stream
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Default for CollectingPageSink {
    fn default() -> Self {
        Self::new()
    }
}

impl PageSink for CollectingPageSink {
    fn add(&mut self, page: Page) -> Result<()> {
        if let Some(max) = self.max_pages {
            if self.pages.len() >= max {
                page.release();
                return Ok(());
            }
        }
        self.pages.push(page);
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::memory::BufferAllocator;
    use crate::page_builder::{PageBuilder, PageBuilderConfig};
    use crate::schema::{Column, ColumnType, Schema};

    #[test]
    fn bounded_sink_releases_overflow_pages() {
        let schema = Arc::new(
            Schema::new(vec![Column::new(0, "n", ColumnType::Long)]).unwrap(),
        );
        let mut builder = PageBuilder::with_config(
            schema,
            BufferAllocator::new(),
            CollectingPageSink::with_max_pages(2),
            PageBuilderConfig {
                record_capacity: 1,
                page_bytes: 1024,
            },
        );

        for i in 0..4 {
            builder.set_long(0, i).unwrap();
            builder.add_record().unwrap();
        }
        builder.finish().unwrap();

        let sink = builder.into_sink();
        assert!(sink.is_finished());
        assert_eq!(sink.pages().len(), 2);
    }
}
