//! Error types for rowflow core operations

use thiserror::Error;

use crate::schema::ColumnType;

/// Result type for rowflow core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for rowflow core operations
#[derive(Error, Debug)]
pub enum Error {
    /// A column accessor was invoked against a column of a different type
    #[error("type mismatch on column '{column}': expected {expected}, got {actual}")]
    TypeMismatch {
        /// Name of the column being accessed
        column: String,
        /// Type the accessor expected
        expected: ColumnType,
        /// Declared type of the column
        actual: ColumnType,
    },

    /// Index out of bounds
    #[error("index out of bounds")]
    IndexOutOfBounds,

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Schema mismatch
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    /// A write would exceed the buffer's capacity and the buffer cannot grow
    #[error("buffer overflow: requested {requested} bytes, capacity {capacity} bytes")]
    BufferOverflow {
        /// Requested size in bytes
        requested: usize,
        /// Available capacity in bytes
        capacity: usize,
    },

    /// Timestamp nanosecond adjustment out of range
    #[error("invalid timestamp: nanosecond adjustment {nanos} is not in 0..=999_999_999")]
    InvalidTimestamp {
        /// The rejected nanosecond value
        nanos: u32,
    },

    /// Schema serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// JSON value encode/decode error
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A downstream sink rejected a page
    #[error("sink error: {0}")]
    Sink(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
}
