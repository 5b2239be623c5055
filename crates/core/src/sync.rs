//! Capture and resynchronization over an arbitrary byte stream.
//!
//! The synchronizer owns one growable ingest buffer. The caller asks for
//! write space with [`SyncState::buffer`], fills it from whatever source
//! it owns, commits with [`SyncState::wrote`], then pulls validated pages
//! with [`SyncState::pageout`]. Nothing here performs I/O.
//!
//! Validation is structural (capture pattern, complete header, complete
//! body per the segment table) followed by the checksum. Anything that
//! fails resynchronizes: the scan position jumps to the next plausible
//! capture byte and the skipped span is reported — once per loss event —
//! so the caller can tell corruption from simple hunger for more data.

use crate::crc;
use crate::error::{Result, SyncError};
use crate::page::{self, Page};
use crate::stats::SyncStats;

/// Extra slack when the ingest buffer grows, one nominal page's worth.
const GROW_SLACK: usize = 4096;

/// Outcome of a single page scan.
#[derive(Debug)]
pub enum PageSeek<'a> {
    /// A structurally valid, checksum-verified page.
    Page(Page<'a>),
    /// Not enough buffered bytes to decide; feed more and retry.
    NeedMore,
    /// This many bytes were skipped hunting for a capture pattern.
    Skipped(usize),
}

/// Outcome of the retrying page-out loop.
#[derive(Debug)]
pub enum PageOut<'a> {
    /// A structurally valid, checksum-verified page.
    Page(Page<'a>),
    /// Not enough buffered bytes; feed more and retry.
    NeedMore,
    /// Sync was lost. Reported once per loss event; the scan has already
    /// moved on, so just call again.
    Desync,
}

/// Scanner state for one physical input stream.
pub struct SyncState {
    data: Vec<u8>,
    /// Bytes committed by the caller
    fill: usize,
    /// Bytes already handed out as pages, pending compaction
    returned: usize,
    /// Partial-capture progress: full header length once the segment table
    /// has been seen, 0 while still waiting for it
    headerbytes: usize,
    bodybytes: usize,
    /// A loss-of-sync has been reported and not yet healed
    unsynced: bool,
    stats: SyncStats,
}

impl SyncState {
    /// Create an empty synchronizer; storage grows on demand.
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            fill: 0,
            returned: 0,
            headerbytes: 0,
            bodybytes: 0,
            unsynced: false,
            stats: SyncStats::default(),
        }
    }

    /// Counters for this synchronizer.
    pub fn stats(&self) -> SyncStats {
        self.stats
    }

    /// Forget all buffered state (for seeks); keeps the allocation.
    pub fn reset(&mut self) {
        self.fill = 0;
        self.returned = 0;
        self.headerbytes = 0;
        self.bodybytes = 0;
        self.unsynced = false;
        self.stats = SyncStats::default();
    }

    /// Expose `size` writable bytes at the fill mark. Previously returned
    /// bytes are compacted away first; the buffer grows when free space is
    /// short, with a page of slack so steady feeding settles down.
    pub fn buffer(&mut self, size: usize) -> &mut [u8] {
        if self.returned > 0 {
            self.fill -= self.returned;
            if self.fill > 0 {
                self.data.copy_within(self.returned..self.returned + self.fill, 0);
            }
            self.returned = 0;
        }
        if size > self.data.len() - self.fill {
            let newsize = size + self.fill + GROW_SLACK;
            self.data.resize(newsize, 0);
        }
        &mut self.data[self.fill..self.fill + size]
    }

    /// Commit `bytes` bytes previously written into [`SyncState::buffer`].
    ///
    /// # Errors
    /// `SyncError::BufferOverflow` if the commit would pass the allocated
    /// storage; nothing changes.
    pub fn wrote(&mut self, bytes: usize) -> Result<()> {
        if self.fill + bytes > self.data.len() {
            return Err(SyncError::BufferOverflow {
                fill: self.fill,
                wrote: bytes,
                storage: self.data.len(),
            }
            .into());
        }
        self.fill += bytes;
        self.stats.bytes_buffered += bytes as u64;
        Ok(())
    }

    /// Buffer-and-commit convenience for callers that already hold a slice.
    pub fn write(&mut self, bytes: &[u8]) {
        self.buffer(bytes.len()).copy_from_slice(bytes);
        self.fill += bytes.len();
        self.stats.bytes_buffered += bytes.len() as u64;
    }

    /// Scan for one page at the current position.
    pub fn pageseek(&mut self) -> PageSeek<'_> {
        let ret = self.seek_step();
        if ret > 0 {
            let len = ret as usize;
            PageSeek::Page(self.page_at(self.returned - len, len))
        } else if ret == 0 {
            PageSeek::NeedMore
        } else {
            PageSeek::Skipped(-ret as usize)
        }
    }

    /// Scan for one page, retrying internally across skips. A loss of sync
    /// surfaces as a single [`PageOut::Desync`] per event.
    pub fn pageout(&mut self) -> PageOut<'_> {
        loop {
            let ret = self.seek_step();
            if ret > 0 {
                let len = ret as usize;
                return PageOut::Page(self.page_at(self.returned - len, len));
            }
            if ret == 0 {
                return PageOut::NeedMore;
            }
            // skipped bytes; report the loss once, then keep hunting
            if !self.unsynced {
                self.unsynced = true;
                self.stats.sync_losses += 1;
                return PageOut::Desync;
            }
        }
    }

    /// Core scan step: >0 a page of that many bytes was consumed, 0 need
    /// more data, <0 that many bytes were skipped.
    fn seek_step(&mut self) -> isize {
        let start = self.returned;
        let bytes = self.fill - self.returned;

        if self.headerbytes == 0 {
            if bytes < page::HEADER_BASE {
                return 0; // not enough for a header
            }
            if self.data[start..start + 4] != page::CAPTURE {
                return self.resync(start);
            }
            let headerbytes = page::HEADER_BASE + self.data[start + 26] as usize;
            if bytes < headerbytes {
                return 0; // segment table still arriving
            }
            let body: usize = self.data[start + page::HEADER_BASE..start + headerbytes]
                .iter()
                .map(|&v| v as usize)
                .sum();
            self.bodybytes = body;
            self.headerbytes = headerbytes;
        }

        if self.headerbytes + self.bodybytes > bytes {
            return 0;
        }

        // the whole candidate page is buffered; verify the checksum
        let header = &self.data[start..start + self.headerbytes];
        let body = &self.data[start + self.headerbytes..start + self.headerbytes + self.bodybytes];
        let stored = u32::from_le_bytes(header[22..26].try_into().unwrap());
        if crc::page_crc(header, body) != stored {
            // miscapture or corruption; not a page after all
            return self.resync(start);
        }

        let consumed = self.headerbytes + self.bodybytes;
        self.returned += consumed;
        self.headerbytes = 0;
        self.bodybytes = 0;
        self.unsynced = false;
        self.stats.pages_returned += 1;
        consumed as isize
    }

    fn resync(&mut self, start: usize) -> isize {
        self.headerbytes = 0;
        self.bodybytes = 0;
        // hunt for the next possible capture
        let next = self.data[start + 1..self.fill]
            .iter()
            .position(|&b| b == page::CAPTURE[0])
            .map(|off| start + 1 + off)
            .unwrap_or(self.fill);
        self.returned = next;
        let skipped = next - start;
        self.stats.bytes_skipped += skipped as u64;
        -(skipped as isize)
    }

    fn page_at(&self, start: usize, len: usize) -> Page<'_> {
        let headerbytes = page::HEADER_BASE + self.data[start + 26] as usize;
        Page::new(
            &self.data[start..start + headerbytes],
            &self.data[start + headerbytes..start + len],
        )
    }
}

impl Default for SyncState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::StreamState;

    /// Encode `payloads` one packet per page and return the raw page bytes.
    fn encoded_pages(serial: u32, payloads: &[&[u8]]) -> Vec<Vec<u8>> {
        let mut os = StreamState::new(serial);
        let mut pages = Vec::new();
        for (i, p) in payloads.iter().enumerate() {
            os.submit(p, i == payloads.len() - 1, i as i64);
            let page = os.flush().expect("flush");
            let mut raw = page.header().to_vec();
            raw.extend_from_slice(page.body());
            pages.push(raw);
        }
        pages
    }

    fn expect_page_len(sync: &mut SyncState) -> usize {
        match sync.pageout() {
            PageOut::Page(p) => p.header().len() + p.body().len(),
            other => panic!("expected a page, got {other:?}"),
        }
    }

    #[test]
    fn test_whole_page_capture() {
        let pages = encoded_pages(11, &[b"hello sync"]);
        let mut oy = SyncState::new();
        oy.write(&pages[0]);

        match oy.pageout() {
            PageOut::Page(p) => {
                assert_eq!(p.serialno(), 11);
                assert_eq!(p.pageno(), 0);
                assert_eq!(p.body(), b"hello sync");
            }
            other => panic!("expected page, got {other:?}"),
        }
        assert!(matches!(oy.pageout(), PageOut::NeedMore));
        assert_eq!(oy.stats().pages_returned, 1);
    }

    #[test]
    fn test_dribbled_input() {
        let pages = encoded_pages(1, &[&[0x55; 600]]);
        let raw = &pages[0];

        let mut oy = SyncState::new();
        for (i, &byte) in raw.iter().enumerate() {
            oy.buffer(1)[0] = byte;
            oy.wrote(1).unwrap();
            if i + 1 < raw.len() {
                assert!(matches!(oy.pageout(), PageOut::NeedMore), "byte {i}");
            }
        }
        assert_eq!(expect_page_len(&mut oy), raw.len());
    }

    #[test]
    fn test_garbage_prefix_reports_desync_once() {
        let pages = encoded_pages(2, &[b"payload"]);
        let mut oy = SyncState::new();
        oy.write(b"total garbage");
        oy.write(&pages[0]);

        assert!(matches!(oy.pageout(), PageOut::Desync));
        assert_eq!(expect_page_len(&mut oy), pages[0].len());
        assert_eq!(oy.stats().sync_losses, 1);
        assert_eq!(oy.stats().bytes_skipped, b"total garbage".len() as u64);
    }

    #[test]
    fn test_corrupt_byte_rejects_page() {
        // body bytes of 0x11 so the only 'O' is in each capture pattern
        let pages = encoded_pages(3, &[&[0x11; 100], &[0x22; 100]]);

        // corrupt positions spread over flags, serial, checksum, and body
        for &pos in &[5usize, 15, 23, 40, 99] {
            let mut oy = SyncState::new();
            let mut bad = pages[0].clone();
            bad[pos] ^= 0x01;
            oy.write(&bad);
            oy.write(&pages[1]);

            assert!(matches!(oy.pageout(), PageOut::Desync), "pos {pos}");
            match oy.pageout() {
                PageOut::Page(p) => assert_eq!(p.pageno(), 1, "pos {pos}"),
                other => panic!("pos {pos}: expected second page, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_pageseek_reports_skip_counts() {
        let pages = encoded_pages(4, &[b"abc"]);
        let mut oy = SyncState::new();
        oy.write(b"xx");
        oy.write(&pages[0]);

        match oy.pageseek() {
            PageSeek::Skipped(n) => assert_eq!(n, 2),
            other => panic!("expected skip, got {other:?}"),
        }
        assert!(matches!(oy.pageseek(), PageSeek::Page(_)));
        assert!(matches!(oy.pageseek(), PageSeek::NeedMore));
    }

    #[test]
    fn test_desync_reported_once_per_event() {
        let pages = encoded_pages(5, &[b"one", b"two"]);
        let mut oy = SyncState::new();

        // garbage, first page, more garbage, second page
        oy.write(b"@@@@@@");
        oy.write(&pages[0]);

        assert!(matches!(oy.pageout(), PageOut::Desync));
        assert!(matches!(oy.pageout(), PageOut::Page(_)));

        oy.write(b"######");
        oy.write(&pages[1]);
        assert!(matches!(oy.pageout(), PageOut::Desync));
        assert!(matches!(oy.pageout(), PageOut::Page(_)));
        assert_eq!(oy.stats().sync_losses, 2);
    }

    #[test]
    fn test_wrote_overflow_is_rejected() {
        let mut oy = SyncState::new();
        oy.buffer(16);
        let err = oy.wrote(16 + GROW_SLACK + 1).unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Sync(SyncError::BufferOverflow { .. })
        ));
        assert!(matches!(oy.pageout(), PageOut::NeedMore));
    }

    #[test]
    fn test_reset_discards_partial_capture() {
        let pages = encoded_pages(6, &[&[0x33; 500]]);
        let mut oy = SyncState::new();
        oy.write(&pages[0][..100]); // header plus a little body
        assert!(matches!(oy.pageout(), PageOut::NeedMore));

        oy.reset();
        // a fresh full page parses cleanly after the reset
        oy.write(&pages[0]);
        assert_eq!(expect_page_len(&mut oy), pages[0].len());
    }

    #[test]
    fn test_capture_first_bytes_in_garbage() {
        // plenty of 'O' bytes that do not open a capture pattern; the scan
        // hops from one to the next without extra desync reports
        let pages = encoded_pages(7, &[b"real"]);
        let mut oy = SyncState::new();
        oy.write(b"Oops! Oops! Oops! Oops! Oops! ");
        oy.write(&pages[0]);

        assert!(matches!(oy.pageout(), PageOut::Desync));
        match oy.pageout() {
            PageOut::Page(p) => assert_eq!(p.body(), b"real"),
            other => panic!("expected page, got {other:?}"),
        }
        assert_eq!(oy.stats().sync_losses, 1);
    }
}
