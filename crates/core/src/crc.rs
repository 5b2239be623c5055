//! The page checksum.
//!
//! A 32-bit CRC with generator polynomial 0x04c11db7, zero initial
//! register, no bit reflection and no final xor — not the IEEE/zlib
//! variant, so the usual CRC crates cannot produce it. The 256-entry
//! table is built at compile time.
//!
//! A page's checksum covers its full header and body, with the four
//! checksum bytes of the header taken as zero. [`page_crc`] computes that
//! value from borrowed slices without touching them; producers write the
//! result into header bytes 22..26 (little-endian) and validators compare
//! it against the stored field.

const POLY: u32 = 0x04c11db7;

const TABLE: [u32; 256] = build_table();

const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut r = (i as u32) << 24;
        let mut j = 0;
        while j < 8 {
            r = (r << 1) ^ if r & 0x8000_0000 != 0 { POLY } else { 0 };
            j += 1;
        }
        table[i] = r;
        i += 1;
    }
    table
}

/// Fold `data` into a running register.
pub fn update(reg: u32, data: &[u8]) -> u32 {
    let mut reg = reg;
    for &byte in data {
        reg = (reg << 8) ^ TABLE[(((reg >> 24) as u8) ^ byte) as usize];
    }
    reg
}

/// Checksum of a page, with the header's checksum field read as zero.
pub fn page_crc(header: &[u8], body: &[u8]) -> u32 {
    let mut reg = update(0, &header[..22]);
    reg = update(reg, &[0u8; 4]);
    reg = update(reg, &header[26..]);
    update(reg, body)
}
