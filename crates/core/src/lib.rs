//! ogg-core: the bitstream layer of an Ogg container implementation.
//!
//! This library packs arbitrary-width integers into byte buffers under two
//! bit orderings, segments logically independent packets into self-delimiting
//! checksummed pages for transport, and reverses both on read — including
//! byte-exact resynchronization over corrupted or truncated input.
//!
//! # Architecture
//!
//! The system is designed around clear module boundaries:
//! - `bitpack`: bit-granular writing/reading under two orderings
//! - `crc`: the page checksum (custom 32-bit CRC)
//! - `page`: borrowed view of one wire page
//! - `stream`: per-logical-stream state; packets in/pages out and the reverse
//! - `sync`: capture-pattern scanning and resynchronization over raw bytes
//! - `stats`: observable per-instance counters
//!
//! # Design Principles
//!
//! - **No panics**: expected conditions (data loss, end of data, protocol
//!   mismatches) are structured results, never exceptions
//! - **No I/O**: every operation is a pure computation over in-memory
//!   buffers; the caller owns files, sockets, and decoding
//! - **Borrowed views**: pages and packets borrow the state that produced
//!   them, so a stale view is a compile error rather than a dangling pointer
//! - **Single-threaded state**: instances are independently owned; distinct
//!   instances need no coordination, a shared one must be serialized

pub mod bitpack;
pub mod crc;
pub mod error;
pub mod page;
pub mod stats;
pub mod stream;
pub mod sync;

// Re-export commonly used types
pub use error::{Error, Result};
