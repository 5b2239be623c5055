//! Observable counters for stream and synchronizer instances.
//!
//! Counters are plain fields updated inline where the events happen and
//! read back through `stats()` on the owning state. They observe behavior,
//! never influence it, and follow the owning state's threading rules.

/// Counters for a `StreamState`, covering both directions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Packets accepted by the encode path
    pub packets_submitted: u64,
    /// Pages produced by the encode path
    pub pages_emitted: u64,
    /// Pages accepted by the decode path
    pub pages_accepted: u64,
    /// Pages refused (wrong serial number or version)
    pub pages_rejected: u64,
    /// Whole packets handed back by the decode path
    pub packets_delivered: u64,
    /// Holes reported in place of lost data
    pub gaps_reported: u64,
}

/// Counters for a `SyncState`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Raw bytes committed into the ingest buffer
    pub bytes_buffered: u64,
    /// Validated pages handed back
    pub pages_returned: u64,
    /// Bytes stepped over while hunting for a capture pattern
    pub bytes_skipped: u64,
    /// Loss-of-sync events (each may skip many bytes)
    pub sync_losses: u64,
}
