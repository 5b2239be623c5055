//! Error types for the bitstream core.
//!
//! All operations return structured errors rather than panicking.
//! Expected, recoverable conditions are not errors at all: data loss
//! surfaces as `PacketOut::Gap` / `PageOut::Desync` variants and end-of-data
//! as a `None` sentinel, so callers keep running after them.

use thiserror::Error;

/// Top-level error type for all operations in the system.
///
/// Each variant corresponds to a specific failure domain:
/// - Bit packing: invalid field widths while writing bit fields
/// - Stream: pages refused by a stream's decode path
/// - Sync: the synchronizer's ingest buffer misused
#[derive(Debug, Error)]
pub enum Error {
    /// Bit packing operation failed
    #[error("bit packing error: {0}")]
    BitPack(#[from] BitPackError),

    /// Page refused by the stream decode path
    #[error("stream error: {0}")]
    Stream(#[from] StreamError),

    /// Synchronizer buffer error
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),
}

/// Bit packing errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BitPackError {
    /// Requested field width exceeds 32 bits
    #[error("invalid bit count: {0} (fields are 0-32 bits)")]
    InvalidBitCount(usize),

    /// The writer was cleared by an earlier invalid write and must be reset
    #[error("writer cleared by an earlier invalid write")]
    Poisoned,
}

/// Page ingestion errors. The refused page is untouched and may be routed
/// to another stream or dropped.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StreamError {
    /// The page belongs to a different logical stream
    #[error("serial number mismatch: stream {expected:#010x}, page {actual:#010x}")]
    SerialMismatch { expected: u32, actual: u32 },

    /// The page declares a stream structure version we do not speak
    #[error("unsupported stream structure version {0}")]
    UnsupportedVersion(u8),
}

/// Synchronizer errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SyncError {
    /// More bytes committed than the exposed buffer can hold
    #[error("wrote {wrote} bytes at fill {fill} past storage {storage}")]
    BufferOverflow {
        fill: usize,
        wrote: usize,
        storage: usize,
    },
}

/// Type alias for Result with our Error type
pub type Result<T> = std::result::Result<T, Error>;
