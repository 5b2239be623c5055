//! Per-logical-stream packet/page state.
//!
//! One [`StreamState`] serves both directions with the same fields. The
//! encode path buffers submitted packets, slices them into 0-255 byte
//! segments, and emits checksummed pages on demand. The decode path
//! ingests validated pages, rebuilds the segment chains, and hands back
//! whole packets — reporting a [`PacketOut::Gap`] where pages went missing
//! instead of silently splicing unrelated data together.
//!
//! # Lacing
//!
//! A packet of `n` bytes becomes `n / 255 + 1` segments: all 255 except
//! the last, which is `n % 255` (possibly 0 — a packet ending exactly on a
//! 255-byte boundary closes with an explicit empty segment). A segment
//! value below 255 therefore always terminates a packet, and 255 always
//! continues one, which is what lets a page boundary fall mid-packet.
//!
//! Segments carry in-memory flags (packet/stream boundaries, loss markers)
//! that never reach the wire; only the length byte does.
//!
//! # Page emission
//!
//! The very first page of a stream carries the opening packet alone, so
//! downstream codecs can rely on a lone header packet per first page.
//! After that, segments accumulate until the body size crosses the fill
//! target with at least four packets closed, or the segment table fills,
//! or the caller forces a flush. Pages close only on packet boundaries
//! unless the segment table itself runs out.

use crate::crc;
use crate::error::{Result, StreamError};
use crate::page::{self, Page};
use crate::stats::StreamStats;

/// Nominal page body fill target in bytes.
const NOMINAL_FILL: usize = 4096;

/// One lacing entry. `len` is the wire value; everything else exists only
/// in memory.
#[derive(Debug, Clone, Copy)]
struct Segment {
    len: u8,
    /// Encode: set on each packet's first segment (drives the continued
    /// flag). Decode: set only where the stream's first packet starts
    /// (surfaces as [`Packet::bos`]).
    begin: bool,
    /// Decode only: the stream's final packet ends in this chain.
    end: bool,
    /// Decode only: data was lost before this point.
    gap: bool,
    /// -1 except at a packet's terminal segment.
    granulepos: i64,
}

impl Segment {
    fn data(len: u8) -> Self {
        Segment {
            len,
            begin: false,
            end: false,
            gap: false,
            granulepos: -1,
        }
    }

    fn hole() -> Self {
        Segment {
            gap: true,
            ..Segment::data(0)
        }
    }
}

/// One logical packet, borrowed from the stream that assembled it.
#[derive(Debug, Clone, Copy)]
pub struct Packet<'a> {
    /// Payload bytes; valid until the next mutating call on the stream.
    pub data: &'a [u8],
    /// First packet of the logical stream?
    pub bos: bool,
    /// Last packet of the logical stream?
    pub eos: bool,
    /// Granule position; -1 when no position is attached.
    pub granulepos: i64,
    /// Position of this packet in the stream, counting gaps.
    pub packetno: i64,
}

/// Outcome of a packet extraction.
#[derive(Debug)]
pub enum PacketOut<'a> {
    /// A whole packet.
    Packet(Packet<'a>),
    /// Pages were lost here; the next packet does not follow the previous
    /// one. Reported once per hole, then extraction continues.
    Gap,
    /// Not enough data buffered to assemble the next packet.
    Incomplete,
}

/// Encoder/decoder state for one logical stream.
pub struct StreamState {
    /// Pending packet payload
    body: Vec<u8>,
    /// Body bytes already exposed to the caller, pending compaction
    body_returned: usize,

    lacing: Vec<Segment>,
    /// Segments already consumed by extraction, pending compaction
    lacing_returned: usize,
    /// One past the last segment known to close a packet (decode)
    lacing_complete: usize,

    /// Scratch for the last emitted page header
    header: [u8; page::MAX_HEADER],
    header_fill: usize,

    serial: u32,
    /// Next page number; -1 means "renumber from 0" (encode) or "no
    /// expectation yet" (decode)
    pageno: i64,
    packetno: i64,
    /// Encode: first page already emitted. Decode: unused.
    bos: bool,
    eos: bool,

    stats: StreamStats,
}

impl StreamState {
    /// Create the state for a logical stream with the given serial number.
    pub fn new(serial: u32) -> Self {
        Self {
            body: Vec::new(),
            body_returned: 0,
            lacing: Vec::new(),
            lacing_returned: 0,
            lacing_complete: 0,
            header: [0; page::MAX_HEADER],
            header_fill: 0,
            serial,
            pageno: -1,
            packetno: 0,
            bos: false,
            eos: false,
            stats: StreamStats::default(),
        }
    }

    /// This stream's serial number.
    pub fn serialno(&self) -> u32 {
        self.serial
    }

    /// Has the end-of-stream marker been seen (decode) or submitted
    /// (encode)?
    pub fn eos(&self) -> bool {
        self.eos
    }

    /// Counters for this stream.
    pub fn stats(&self) -> StreamStats {
        self.stats
    }

    /// Return to the just-initialized state, keeping allocations.
    pub fn reset(&mut self) {
        self.body.clear();
        self.body_returned = 0;
        self.lacing.clear();
        self.lacing_returned = 0;
        self.lacing_complete = 0;
        self.header_fill = 0;
        self.pageno = -1;
        self.packetno = 0;
        self.bos = false;
        self.eos = false;
        self.stats = StreamStats::default();
    }

    /// Reset and adopt a new serial number.
    pub fn reset_serial(&mut self, serial: u32) {
        self.reset();
        self.serial = serial;
    }

    // === encode ===

    /// Submit one packet for framing.
    pub fn submit(&mut self, data: &[u8], eos: bool, granulepos: i64) {
        self.submit_vectored(&[data], eos, granulepos);
    }

    /// Submit one packet given as scattered buffers.
    pub fn submit_vectored(&mut self, parts: &[&[u8]], eos: bool, granulepos: i64) {
        let bytes: usize = parts.iter().map(|p| p.len()).sum();
        let nsegs = bytes / 255 + 1;

        // reclaim space already handed out as page bodies
        if self.body_returned > 0 {
            self.body.drain(..self.body_returned);
            self.body_returned = 0;
        }

        self.body.reserve(bytes);
        for part in parts {
            self.body.extend_from_slice(part);
        }

        let first = self.lacing.len();
        self.lacing.reserve(nsegs);
        for _ in 0..nsegs - 1 {
            self.lacing.push(Segment::data(255));
        }
        let mut last = Segment::data((bytes % 255) as u8);
        last.granulepos = granulepos;
        self.lacing.push(last);
        self.lacing[first].begin = true;

        self.packetno += 1;
        if eos {
            self.eos = true;
        }
        self.stats.packets_submitted += 1;
    }

    /// Emit a page if enough has accumulated (or the stream demands it:
    /// end-of-stream with pending data, or nothing emitted yet).
    pub fn pageout(&mut self) -> Option<Page<'_>> {
        let force = (self.eos || !self.bos) && !self.lacing.is_empty();
        self.try_flush(force, NOMINAL_FILL)
    }

    /// [`StreamState::pageout`] with a caller-chosen fill target.
    pub fn pageout_fill(&mut self, nfill: usize) -> Option<Page<'_>> {
        let force = (self.eos || !self.bos) && !self.lacing.is_empty();
        self.try_flush(force, nfill)
    }

    /// Emit a page whenever any data is pending.
    pub fn flush(&mut self) -> Option<Page<'_>> {
        self.try_flush(true, NOMINAL_FILL)
    }

    /// [`StreamState::flush`] with a caller-chosen fill target.
    pub fn flush_fill(&mut self, nfill: usize) -> Option<Page<'_>> {
        self.try_flush(true, nfill)
    }

    fn try_flush(&mut self, force: bool, nfill: usize) -> Option<Page<'_>> {
        let maxvals = self.lacing.len().min(page::MAX_SEGMENTS);
        if maxvals == 0 {
            return None;
        }

        let mut force = force;
        let mut vals = maxvals;
        let mut granule_pos: i64 = -1;

        if !self.bos {
            // first page: carry the opening packet alone
            granule_pos = 0;
            for (i, seg) in self.lacing[..maxvals].iter().enumerate() {
                if seg.len < 255 {
                    vals = i + 1;
                    break;
                }
            }
        } else {
            let mut acc = 0usize;
            let mut packets_done = 0;
            let mut packet_just_done = 0;
            for (i, seg) in self.lacing[..maxvals].iter().enumerate() {
                if acc > nfill && packet_just_done >= 4 {
                    force = true;
                    vals = i;
                    break;
                }
                acc += seg.len as usize;
                if seg.len < 255 {
                    granule_pos = seg.granulepos;
                    packets_done += 1;
                    packet_just_done = packets_done;
                } else {
                    packet_just_done = 0;
                }
            }
            if vals == page::MAX_SEGMENTS {
                force = true;
            }
        }

        if !force {
            return None;
        }

        self.header[..4].copy_from_slice(&page::CAPTURE);
        self.header[4] = 0;

        let mut flags = 0u8;
        if !self.lacing[0].begin {
            flags |= 0x01; // continued
        }
        if !self.bos {
            flags |= 0x02; // begin of stream
        }
        if self.eos && self.lacing.len() == vals {
            flags |= 0x04; // end of stream
        }
        self.header[5] = flags;
        self.bos = true;

        self.header[6..14].copy_from_slice(&granule_pos.to_le_bytes());
        self.header[14..18].copy_from_slice(&self.serial.to_le_bytes());

        if self.pageno == -1 {
            // someone reset the stream; restart the numbering
            self.pageno = 0;
        }
        self.header[18..22].copy_from_slice(&(self.pageno as u32).to_le_bytes());
        self.pageno += 1;

        self.header[22..26].fill(0);

        self.header[26] = vals as u8;
        let mut body_bytes = 0usize;
        for (i, seg) in self.lacing[..vals].iter().enumerate() {
            self.header[27 + i] = seg.len;
            body_bytes += seg.len as usize;
        }
        self.header_fill = 27 + vals;

        let body_start = self.body_returned;
        let checksum = crc::page_crc(
            &self.header[..self.header_fill],
            &self.body[body_start..body_start + body_bytes],
        );
        self.header[22..26].copy_from_slice(&checksum.to_le_bytes());

        // consume the emitted segments; the body compacts on the next submit
        self.lacing.drain(..vals);
        self.lacing_complete = self.lacing_complete.saturating_sub(vals);
        self.lacing_returned = self.lacing_returned.saturating_sub(vals);
        self.body_returned += body_bytes;
        self.stats.pages_emitted += 1;

        Some(Page::new(
            &self.header[..self.header_fill],
            &self.body[body_start..body_start + body_bytes],
        ))
    }

    // === decode ===

    /// Ingest one validated page.
    ///
    /// # Errors
    /// `StreamError::SerialMismatch` / `StreamError::UnsupportedVersion`;
    /// the stream is unchanged and the page may be routed elsewhere.
    pub fn pagein(&mut self, page: &Page<'_>) -> Result<()> {
        if page.serialno() != self.serial {
            self.stats.pages_rejected += 1;
            return Err(StreamError::SerialMismatch {
                expected: self.serial,
                actual: page.serialno(),
            }
            .into());
        }
        if page.version() != 0 {
            self.stats.pages_rejected += 1;
            return Err(StreamError::UnsupportedVersion(page.version()).into());
        }

        let continued = page.continued();
        let mut mark_bos = page.bos();
        let eos = page.eos();
        let granulepos = page.granulepos();
        let pageno = page.pageno() as i64;
        let mut segs = page.segment_table();
        let mut body = page.body();

        // reclaim body bytes and lacing entries consumed by extraction
        if self.body_returned > 0 {
            self.body.drain(..self.body_returned);
            self.body_returned = 0;
        }
        if self.lacing_returned > 0 {
            self.lacing.drain(..self.lacing_returned);
            self.lacing_complete -= self.lacing_returned;
            self.lacing_returned = 0;
        }

        // out of sequence? unroll the dangling partial packet and note the
        // hole (unless no page has been seen yet)
        if pageno != self.pageno {
            let dangling: usize = self.lacing[self.lacing_complete..]
                .iter()
                .map(|s| s.len as usize)
                .sum();
            self.body.truncate(self.body.len() - dangling);
            self.lacing.truncate(self.lacing_complete);

            if self.pageno != -1 {
                self.lacing.push(Segment::hole());
                self.lacing_complete = self.lacing.len();
            }
        }

        // a continued page with nothing to continue: drop the leading
        // segments of the orphaned packet
        if continued {
            let no_partial = match self.lacing.last() {
                None => true,
                Some(seg) => seg.len < 255,
            };
            if no_partial {
                mark_bos = false;
                let mut skipped = 0;
                for (i, &len) in segs.iter().enumerate() {
                    body = &body[len as usize..];
                    skipped = i + 1;
                    if len < 255 {
                        break;
                    }
                }
                segs = &segs[skipped..];
            }
        }

        if !body.is_empty() {
            self.body.extend_from_slice(body);
        }

        let mut last_closed: Option<usize> = None;
        for &len in segs {
            let mut seg = Segment::data(len);
            if mark_bos {
                seg.begin = true;
                mark_bos = false;
            }
            self.lacing.push(seg);
            if len < 255 {
                last_closed = Some(self.lacing.len() - 1);
                self.lacing_complete = self.lacing.len();
            }
        }
        // the page's position belongs to the last packet completed on it
        if let Some(i) = last_closed {
            self.lacing[i].granulepos = granulepos;
        }

        if eos {
            self.eos = true;
            if let Some(seg) = self.lacing.last_mut() {
                seg.end = true;
            }
        }

        self.pageno = pageno + 1;
        self.stats.pages_accepted += 1;
        Ok(())
    }

    /// Extract the next packet, consuming it.
    pub fn packetout(&mut self) -> PacketOut<'_> {
        self.extract(true)
    }

    /// Extract the next packet without consuming it. Agrees byte-for-byte
    /// with [`StreamState::packetout`] at the same position. A pending gap
    /// is still consumed — it is a report, not data.
    pub fn packetpeek(&mut self) -> PacketOut<'_> {
        self.extract(false)
    }

    fn extract(&mut self, consume: bool) -> PacketOut<'_> {
        let ptr = self.lacing_returned;
        if self.lacing_complete <= ptr {
            return PacketOut::Incomplete;
        }

        if self.lacing[ptr].gap {
            self.lacing_returned += 1;
            self.packetno += 1;
            self.stats.gaps_reported += 1;
            return PacketOut::Gap;
        }

        let mut end_index = ptr;
        let mut bytes = self.lacing[ptr].len as usize;
        let mut eos = self.lacing[ptr].end;
        let bos = self.lacing[ptr].begin;
        while self.lacing[end_index].len == 255 {
            end_index += 1;
            bytes += self.lacing[end_index].len as usize;
            if self.lacing[end_index].end {
                eos = true;
            }
        }

        let start = self.body_returned;
        let granulepos = self.lacing[end_index].granulepos;
        let packetno = self.packetno;

        if consume {
            self.body_returned += bytes;
            self.lacing_returned = end_index + 1;
            self.packetno += 1;
            self.stats.packets_delivered += 1;
        }

        PacketOut::Packet(Packet {
            data: &self.body[start..start + bytes],
            bos,
            eos,
            granulepos,
            packetno,
        })
    }
}
