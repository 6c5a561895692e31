//! Error types for the sighting pipeline.
//!
//! Neither error is fatal: a `LogError` drops one record, a `ScanError`
//! leaves recovery to the liveness monitor.

use thiserror::Error;

/// Failure to persist one log record. The record is dropped.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LogError {
    /// The record did not fit the serialization buffer.
    #[error("record serialization failed")]
    Serialize,

    /// The time sample does not name a real calendar date.
    #[error("time sample is not a calendar date")]
    InvalidTime,

    /// The target file could not be opened for append.
    #[error("cannot open {file} for append: {reason}")]
    Open {
        file: heapless::String<32>,
        reason: alloc::string::String,
    },

    /// The file opened but the write or flush failed.
    #[error("write to {file} failed: {reason}")]
    Write {
        file: heapless::String<32>,
        reason: alloc::string::String,
    },
}

/// Failure to arm a scan window.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ScanError {
    /// The radio refused to start scanning.
    #[error("scan start failed: {0}")]
    Start(alloc::string::String),

    /// The scan thread is gone.
    #[error("scan engine disconnected")]
    Disconnected,
}
