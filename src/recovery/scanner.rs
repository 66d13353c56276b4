//! Locating the signature header.
//!
//! The input normally starts with the signature header. When it does not,
//! the scanner reads forward in chunks and tests every magic occurrence for a
//! valid start header CRC.

use std::io::{self, Read, Seek, SeekFrom};

use crate::Result;
use crate::format::SIGNATURE_HEADER_SIZE;
use crate::format::header::{StartHeader, find_signature, is_plausible_start};

/// Bytes read per scan step.
pub const SCAN_CHUNK_SIZE: usize = 1 << 15;

const HEADER_LEN: usize = SIGNATURE_HEADER_SIZE as usize;

/// A located signature header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureMatch {
    /// Absolute position of the signature header.
    pub offset: u64,
    /// The raw 32 bytes.
    pub raw: [u8; 32],
    /// Found by scanning rather than at the starting position.
    pub by_scan: bool,
}

fn read_up_to<R: Read>(source: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Looks for a signature header at `start`, then, within `search_limit`
/// bytes past the first 32, anywhere after it.
///
/// A header at `start` is accepted when its CRC is valid or it is zeroed
/// (see [`is_plausible_start`]); scanned candidates need a valid CRC.
/// Returns `None` when nothing is found.
pub fn find_start_header<R: Read + Seek>(
    source: &mut R,
    start: u64,
    search_limit: Option<u64>,
) -> Result<Option<SignatureMatch>> {
    source.seek(SeekFrom::Start(start))?;
    let mut first = [0u8; HEADER_LEN];
    let got = read_up_to(source, &mut first)?;
    if got == HEADER_LEN && is_plausible_start(&first) {
        return Ok(Some(SignatureMatch {
            offset: start,
            raw: first,
            by_scan: false,
        }));
    }
    let Some(limit) = search_limit.filter(|&l| l > 0) else {
        return Ok(None);
    };

    let mut window = first[..got].to_vec();
    let mut window_start = start;
    let mut cursor = 1usize;
    let mut scanned = 0u64;
    let mut chunk = vec![0u8; SCAN_CHUNK_SIZE];
    loop {
        let want = (limit - scanned).min(SCAN_CHUNK_SIZE as u64) as usize;
        if want == 0 {
            return Ok(None);
        }
        let n = read_up_to(source, &mut chunk[..want])?;
        if n == 0 {
            return Ok(None);
        }
        window.extend_from_slice(&chunk[..n]);
        scanned += n as u64;

        // A candidate needs its whole header inside the window.
        let end = (window.len() + 1).saturating_sub(HEADER_LEN);
        while cursor < end {
            let pos = find_signature(&window, cursor, end);
            if pos >= end {
                break;
            }
            if let Ok(raw) = <[u8; HEADER_LEN]>::try_from(&window[pos..pos + HEADER_LEN]) {
                if StartHeader::crc_matches(&raw) {
                    let offset = window_start + pos as u64;
                    log::debug!("7z signature found by scan at {offset}");
                    return Ok(Some(SignatureMatch {
                        offset,
                        raw,
                        by_scan: true,
                    }));
                }
            }
            cursor = pos + 1;
        }

        let keep_from = end.max(cursor).min(window.len());
        window.drain(..keep_from);
        window_start += keep_from as u64;
        cursor = cursor.saturating_sub(keep_from);
    }
}
