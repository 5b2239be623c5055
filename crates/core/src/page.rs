//! Borrowed view of one wire page.
//!
//! A page is the self-delimiting, checksummed unit of framing. The view
//! does not own memory: it borrows the header and body from whichever
//! buffer produced it (a stream's internal storage or the synchronizer's
//! ingest buffer) and is invalidated — at compile time — by the next
//! mutating call on that source. Callers copy out any bytes they need to
//! keep.
//!
//! # Wire Format
//!
//! All integers little-endian:
//!
//! ```text
//! +--------------------+
//! | capture (4 bytes)  |  "OggS"
//! +--------------------+
//! | version (1)        |  must be 0
//! +--------------------+
//! | flags (1)          |  bit0 continued, bit1 begin of stream,
//! |                    |  bit2 end of stream
//! +--------------------+
//! | granule pos (8)    |  i64; -1 = no position on this page
//! +--------------------+
//! | serial number (4)  |  u32 logical stream id
//! +--------------------+
//! | page sequence (4)  |  u32, increments per page
//! +--------------------+
//! | checksum (4)       |  CRC over header+body with this field zeroed
//! +--------------------+
//! | segment count (1)  |  0-255
//! +--------------------+
//! | segment table      |  one byte per segment; 255 = packet continues
//! | (segment count)    |
//! +--------------------+
//! | body               |  sum(segment table) bytes
//! | (variable)         |
//! +--------------------+
//! ```

/// Fixed header length before the segment table.
pub const HEADER_BASE: usize = 27;

/// A page carries at most this many segments.
pub const MAX_SEGMENTS: usize = 255;

/// Largest possible header: fixed part plus a full segment table.
pub const MAX_HEADER: usize = HEADER_BASE + MAX_SEGMENTS;

/// Largest possible page on the wire.
pub const MAX_PAGE: usize = MAX_HEADER + MAX_SEGMENTS * 255;

/// The capture pattern marking the start of every page.
pub const CAPTURE: [u8; 4] = *b"OggS";

const FLAG_CONTINUED: u8 = 0x01;
const FLAG_BOS: u8 = 0x02;
const FLAG_EOS: u8 = 0x04;

/// One wire page, borrowed from the state that produced it.
#[derive(Debug, Clone, Copy)]
pub struct Page<'a> {
    header: &'a [u8],
    body: &'a [u8],
}

impl<'a> Page<'a> {
    /// Internal constructor; callers guarantee a structurally valid pair
    /// (header length matches the segment count, body length matches the
    /// segment table sum).
    pub(crate) fn new(header: &'a [u8], body: &'a [u8]) -> Self {
        debug_assert!(header.len() >= HEADER_BASE);
        debug_assert_eq!(header.len(), HEADER_BASE + header[26] as usize);
        debug_assert_eq!(
            body.len(),
            header[HEADER_BASE..].iter().map(|&v| v as usize).sum::<usize>()
        );
        Self { header, body }
    }

    /// Raw header bytes (fixed part plus segment table).
    pub fn header(&self) -> &'a [u8] {
        self.header
    }

    /// Raw body bytes.
    pub fn body(&self) -> &'a [u8] {
        self.body
    }

    /// Stream structure version; only 0 exists.
    pub fn version(&self) -> u8 {
        self.header[4]
    }

    /// Does the first segment continue a packet from the previous page?
    pub fn continued(&self) -> bool {
        self.header[5] & FLAG_CONTINUED != 0
    }

    /// Is this the first page of its logical stream?
    pub fn bos(&self) -> bool {
        self.header[5] & FLAG_BOS != 0
    }

    /// Is this the last page of its logical stream?
    pub fn eos(&self) -> bool {
        self.header[5] & FLAG_EOS != 0
    }

    /// Granule position of the last packet completed on this page,
    /// -1 if no packet completes here.
    pub fn granulepos(&self) -> i64 {
        i64::from_le_bytes(self.header[6..14].try_into().unwrap())
    }

    /// Serial number of the logical stream this page belongs to.
    pub fn serialno(&self) -> u32 {
        u32::from_le_bytes(self.header[14..18].try_into().unwrap())
    }

    /// Position of this page in its stream.
    pub fn pageno(&self) -> u32 {
        u32::from_le_bytes(self.header[18..22].try_into().unwrap())
    }

    /// The stored checksum field.
    pub fn checksum(&self) -> u32 {
        u32::from_le_bytes(self.header[22..26].try_into().unwrap())
    }

    /// Number of entries in the segment table.
    pub fn segments(&self) -> usize {
        self.header[26] as usize
    }

    /// The segment table itself.
    pub fn segment_table(&self) -> &'a [u8] {
        &self.header[HEADER_BASE..]
    }

    /// Number of packets that complete on this page. Packets whose data
    /// began on an earlier page count where they close.
    pub fn packet_count(&self) -> usize {
        self.segment_table().iter().filter(|&&v| v < 255).count()
    }
}
