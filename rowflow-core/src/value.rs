//! Typed record values and the timestamp conversion capability

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::schema::ColumnType;

/// An instant as epoch seconds plus a nanosecond adjustment
///
/// The adjustment is always in `0..=999_999_999`, so instants before the
/// epoch carry a negative second count and a positive nanosecond part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp {
    epoch_second: i64,
    nanos: u32,
}

impl Timestamp {
    /// Create a timestamp, rejecting a nanosecond adjustment outside
    /// `0..=999_999_999`
    pub fn new(epoch_second: i64, nanos: u32) -> Result<Self> {
        if nanos > 999_999_999 {
            return Err(Error::InvalidTimestamp { nanos });
        }
        Ok(Self {
            epoch_second,
            nanos,
        })
    }

    /// Create a timestamp from whole epoch seconds
    pub fn from_epoch_second(epoch_second: i64) -> Self {
        Self {
            epoch_second,
            nanos: 0,
        }
    }

    /// Get the epoch seconds
    pub fn epoch_second(&self) -> i64 {
        self.epoch_second
    }

    /// Get the nanosecond adjustment
    pub fn nanos(&self) -> u32 {
        self.nanos
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.epoch_second, self.nanos)
    }
}

/// String formatting and parsing for timestamps, supplied by a collaborator
///
/// The core never formats timestamps itself; stages that need text
/// conversion receive an implementation of this trait from the pipeline
/// configuration layer.
pub trait TimestampConverter: Send + Sync {
    /// Format a timestamp as a string
    fn format(&self, timestamp: Timestamp) -> String;

    /// Parse a string into a timestamp
    fn parse(&self, text: &str) -> Result<Timestamp>;
}

/// A single typed column value
///
/// One variant per [`ColumnType`]; matching on this enum is how stages
/// handle records without per-column type tests.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Boolean value
    Boolean(bool),

    /// 64-bit signed integer value
    Long(i64),

    /// 64-bit floating point value
    Double(f64),

    /// UTF-8 string value
    String(String),

    /// Instant value
    Timestamp(Timestamp),

    /// Semi-structured value
    Json(serde_json::Value),
}

impl Value {
    /// Get the column type this value stores as
    pub fn column_type(&self) -> ColumnType {
        match self {
            Value::Boolean(_) => ColumnType::Boolean,
            Value::Long(_) => ColumnType::Long,
            Value::Double(_) => ColumnType::Double,
            Value::String(_) => ColumnType::String,
            Value::Timestamp(_) => ColumnType::Timestamp,
            Value::Json(_) => ColumnType::Json,
        }
    }
}
