//! Error types for channel operations

use thiserror::Error;

/// Result type for channel operations
pub type Result<T> = std::result::Result<T, ChannelError>;

/// Error type for channel operations
#[derive(Error, Debug)]
pub enum ChannelError {
    /// The channel was closed while the caller was using or waiting on it
    #[error("channel closed")]
    Closed,

    /// `add` was called after the producer completed the stream
    #[error("add called after producer completed")]
    ProducerCompleted,

    /// A lifecycle call was made out of order
    #[error("illegal channel use: {0}")]
    IllegalUse(String),

    /// A peer stage thread panicked while holding the channel lock
    #[error("channel lock poisoned by a panicked stage thread")]
    Poisoned,
}
