//! The 32-byte signature header and the byte-signature scanner.

use crate::{Error, Result};

use super::{SIGNATURE, SIGNATURE_HEADER_SIZE, VERSION_MAJOR, VERSION_MINOR};

/// The signature header at the start of every 7z archive.
///
/// | Offset | Size | Field |
/// |--------|------|-------|
/// | 0 | 6 | magic `37 7A BC AF 27 1C` |
/// | 6 | 2 | version major, minor |
/// | 8 | 4 | CRC-32 of bytes 12..32 |
/// | 12 | 8 | next header offset, relative to the end of this header |
/// | 20 | 8 | next header size |
/// | 28 | 4 | CRC-32 of the next header |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartHeader {
    /// Archive format version - major number.
    pub version_major: u8,
    /// Archive format version - minor number.
    pub version_minor: u8,
    /// Stored CRC of bytes 12..32.
    pub start_header_crc: u32,
    /// Offset from the end of the start header to the next header.
    pub next_header_offset: u64,
    /// Size of the next header blob.
    pub next_header_size: u64,
    /// CRC of the next header blob.
    pub next_header_crc: u32,
}

impl StartHeader {
    /// Parses a 32-byte signature header.
    ///
    /// Only the magic is checked here; CRC validation is left to the caller,
    /// since a zeroed header is recoverable.
    pub fn parse(raw: &[u8; 32]) -> Result<Self> {
        if raw[..6] != SIGNATURE[..] {
            return Err(Error::InvalidFormat("invalid 7z signature".into()));
        }
        let u32_at = |at: usize| u32::from_le_bytes([raw[at], raw[at + 1], raw[at + 2], raw[at + 3]]);
        let u64_at = |at: usize| u64::from(u32_at(at)) | (u64::from(u32_at(at + 4)) << 32);
        Ok(Self {
            version_major: raw[6],
            version_minor: raw[7],
            start_header_crc: u32_at(8),
            next_header_offset: u64_at(12),
            next_header_size: u64_at(20),
            next_header_crc: u32_at(28),
        })
    }

    /// Returns true if the stored CRC covers bytes 12..32.
    pub fn crc_matches(raw: &[u8; 32]) -> bool {
        crc32fast::hash(&raw[12..32]) == u32::from_le_bytes([raw[8], raw[9], raw[10], raw[11]])
    }

    /// Returns true for a header whose CRC and location fields are all zero.
    ///
    /// Interrupted writers leave this shape behind; the next header can then
    /// only be located by scanning the end of the file.
    pub fn is_zeroed(&self) -> bool {
        self.start_header_crc == 0
            && self.next_header_offset == 0
            && self.next_header_size == 0
            && self.next_header_crc == 0
    }

    /// Checks the major version.
    pub fn check_version(&self) -> Result<()> {
        if self.version_major != VERSION_MAJOR {
            return Err(Error::UnsupportedFeature {
                feature: "unsupported archive major version",
            });
        }
        Ok(())
    }

    /// Returns the absolute position of the next header for an archive
    /// starting at `archive_offset`.
    pub fn next_header_position(&self, archive_offset: u64) -> Option<u64> {
        archive_offset
            .checked_add(SIGNATURE_HEADER_SIZE)?
            .checked_add(self.next_header_offset)
    }

    /// Serializes the header, computing the start header CRC.
    pub fn encode(next_header_offset: u64, next_header_size: u64, next_header_crc: u32) -> [u8; 32] {
        let mut out = [0u8; 32];
        out[..6].copy_from_slice(SIGNATURE);
        out[6] = VERSION_MAJOR;
        out[7] = VERSION_MINOR;
        out[12..20].copy_from_slice(&next_header_offset.to_le_bytes());
        out[20..28].copy_from_slice(&next_header_size.to_le_bytes());
        out[28..32].copy_from_slice(&next_header_crc.to_le_bytes());
        let crc = crc32fast::hash(&out[12..32]);
        out[8..12].copy_from_slice(&crc.to_le_bytes());
        out
    }
}

/// Returns true if `raw` can start an archive: the magic matches and either
/// the CRC is valid or the header is zeroed with a nonzero version.
pub fn is_plausible_start(raw: &[u8; 32]) -> bool {
    if raw[..6] != SIGNATURE[..] {
        return false;
    }
    if StartHeader::crc_matches(raw) {
        return true;
    }
    raw[8..].iter().all(|&b| b == 0) && (raw[6] != 0 || raw[7] != 0)
}

/// Finds the leftmost occurrence of the 7z magic starting in `[cursor, limit)`.
///
/// The whole 6-byte magic must lie inside `data`. Returns `limit` (or a value
/// at least as large) when there is no such occurrence.
///
/// Probes every sixth byte: a probe that matches none of the magic bytes rules
/// out all six candidate starts covering it. The magic bytes are distinct, so
/// a hit names exactly one candidate start to verify.
pub fn find_signature(data: &[u8], cursor: usize, limit: usize) -> usize {
    let n = SIGNATURE.len();
    let last_start = limit.min(data.len().saturating_sub(n - 1));
    let mut p = cursor;
    while p < last_start {
        let probe = data[p + n - 1];
        if let Some(k) = SIGNATURE.iter().position(|&m| m == probe) {
            let start = p + n - 1 - k;
            if start < last_start && data[start..start + n] == SIGNATURE[..] {
                return start;
            }
        }
        p += n;
    }
    limit.max(cursor)
}
