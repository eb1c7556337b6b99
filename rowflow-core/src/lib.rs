//! Core data structures for rowflow bulk-loading pipelines
//!
//! This crate provides the pieces every pipeline stage shares: immutable
//! schema and column-type descriptors, pooled byte buffers with an explicit
//! release contract, and the binary page format that carries batches of
//! typed records between stages. The blocking transport that moves pages
//! across threads lives in `rowflow-transport`.

#![warn(missing_docs)]

pub mod buffer;
pub mod error;
pub mod memory;
pub mod page;
pub mod page_builder;
pub mod page_reader;
pub mod schema;
pub mod sink;
pub mod value;

// Re-export key types for convenience
pub use buffer::PooledBuffer;
pub use error::{Error, Result};
pub use memory::{AllocatorConfig, AllocatorStats, BufferAllocator};
pub use page::Page;
pub use page_builder::{PageBuilder, PageBuilderConfig};
pub use page_reader::{PageReader, RecordVisitor};
pub use schema::{Column, ColumnType, Schema};
pub use sink::{CollectingPageSink, PageSink};
pub use value::{Timestamp, TimestampConverter, Value};
