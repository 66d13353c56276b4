//! Tolerant archive opening.
//!
//! [`read_database`] walks from the raw input to a [`Database`], filling an
//! [`OpenReport`] as it goes so callers learn as much as possible about
//! damaged input:
//!
//! 1. **Signature**: at the current position, or by scanning forward within
//!    [`OpenOptions::search_limit`].
//! 2. **Zeroed start header**: an interrupted writer leaves the signature
//!    with all location fields zero; the next header is then found by
//!    scanning the last 512 bytes for the byte pairs that open a header.
//! 3. **Next header**: bounds, size limit and CRC checks, then the section
//!    parser in [`crate::format::parser`].
//!
//! # Example
//!
//! ```rust
//! use zesven_core::read::{OpenOptions, OpenReport};
//! use zesven_core::recovery::read_database;
//! use std::io::Cursor;
//!
//! let mut input = Cursor::new(vec![0u8; 64]);
//! let mut report = OpenReport::default();
//! assert!(read_database(&mut input, &OpenOptions::default(), &mut report).is_err());
//! assert!(!report.is_archive);
//! ```

mod scanner;

pub use scanner::{SCAN_CHUNK_SIZE, SignatureMatch, find_start_header};

use std::io::{Read, Seek, SeekFrom};

use crate::checksum::Crc32;
use crate::format::database::Database;
use crate::format::header::StartHeader;
use crate::format::parser::parse_header_blob;
use crate::format::{SIGNATURE_HEADER_SIZE, property_id};
use crate::read::{OpenOptions, OpenReport};
use crate::{Error, Result};

/// How many trailing bytes are searched for a header when the start header
/// is zeroed.
pub const ZEROED_HEADER_CHECK_SIZE: u64 = 512;

const MAX_NEXT_HEADER_SIZE: u64 = 1 << 62;

/// Location of a next header found at the end of the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveredLocation {
    /// Offset of the header relative to the end of the signature header.
    pub next_header_offset: u64,
    /// Size of the header blob.
    pub next_header_size: u64,
    /// CRC of the header blob as found.
    pub next_header_crc: u32,
}

/// Searches the last [`ZEROED_HEADER_CHECK_SIZE`] bytes for the start of a
/// header: `EncodedHeader, PackInfo` or `Header, MainStreamsInfo`.
///
/// `after_header` is the absolute position following the signature header.
/// The last byte of the input must be zero, the `End` of the header.
pub fn locate_header_at_end<R: Read + Seek>(
    source: &mut R,
    after_header: u64,
    file_end: u64,
) -> Result<Option<RecoveredLocation>> {
    let rem = file_end.saturating_sub(after_header);
    let check = rem.min(ZEROED_HEADER_CHECK_SIZE) as usize;
    if check < 3 {
        return Ok(None);
    }
    let mut buf = vec![0u8; check];
    source.seek(SeekFrom::Start(file_end - check as u64))?;
    source.read_exact(&mut buf)?;
    if buf[check - 1] != 0 {
        return Ok(None);
    }

    let opens_header = |pair: &[u8]| {
        let (a, b) = (u64::from(pair[0]), u64::from(pair[1]));
        (a == property_id::ENCODED_HEADER && b == property_id::PACK_INFO)
            || (a == property_id::HEADER && b == property_id::MAIN_STREAMS_INFO)
    };
    let Some(i) = (0..check - 1).rev().find(|&i| opens_header(&buf[i..i + 2])) else {
        return Ok(None);
    };
    let size = (check - i) as u64;
    Ok(Some(RecoveredLocation {
        next_header_offset: rem - size,
        next_header_size: size,
        next_header_crc: Crc32::compute(&buf[i..]),
    }))
}

/// Reads the archive database from the current position of `source`.
///
/// The report is filled on every path. On error it tells how far the open
/// got; [`OpenReport::error_kind`] classifies the failure.
pub fn read_database<R: Read + Seek>(
    source: &mut R,
    options: &OpenOptions,
    report: &mut OpenReport,
) -> Result<Database> {
    let result = read_database_inner(source, options, report);
    if let Err(err) = &result {
        report.record_error(err);
    }
    result
}

fn read_database_inner<R: Read + Seek>(
    source: &mut R,
    options: &OpenOptions,
    report: &mut OpenReport,
) -> Result<Database> {
    let start = source.stream_position()?;
    let file_end = source.seek(SeekFrom::End(0))?;

    let found = find_start_header(source, start, options.search_limit)?
        .ok_or_else(|| Error::InvalidFormat("no 7z signature header found".into()))?;
    report.archive_offset = found.offset;
    report.header_recovered_by_scan = found.by_scan;
    if found.by_scan {
        log::warn!("archive starts at {} after a signature scan", found.offset);
    }

    let header = StartHeader::parse(&found.raw)?;
    header.check_version()?;
    let version = (header.version_major, header.version_minor);

    let after_header = found.offset + SIGNATURE_HEADER_SIZE;
    report.phys_size = SIGNATURE_HEADER_SIZE;
    report.headers_size = SIGNATURE_HEADER_SIZE;

    let mut next_offset = header.next_header_offset;
    let mut next_size = header.next_header_size;
    let mut next_crc = header.next_header_crc;
    if header.is_zeroed() && options.recover_zeroed_start_header {
        if let Some(location) = locate_header_at_end(source, after_header, file_end)? {
            log::warn!("start header is zeroed; header located at the end of the input");
            report.start_header_recovered = true;
            next_offset = location.next_header_offset;
            next_size = location.next_header_size;
            next_crc = location.next_header_crc;
        }
    }

    if next_offset > i64::MAX as u64 || next_size > MAX_NEXT_HEADER_SIZE {
        return Err(Error::InvalidFormat("next header location out of range".into()));
    }
    if next_size == 0 {
        if next_offset != 0 {
            return Err(Error::InvalidFormat("empty next header at nonzero offset".into()));
        }
        report.is_archive = true;
        report.trailing_data = file_end.saturating_sub(after_header);
        log::debug!("empty archive at {}", found.offset);
        return Ok(Database {
            version,
            ..Database::default()
        });
    }

    if !report.start_header_recovered {
        report.is_archive = true;
    }
    let next_end = next_offset + next_size;
    report.phys_size = SIGNATURE_HEADER_SIZE + next_end;
    report.headers_size += next_size;
    if file_end.saturating_sub(after_header) < next_end {
        report.unexpected_end = true;
        return Err(Error::EndOfData {
            context: "next header",
        });
    }
    report.trailing_data = file_end - after_header - next_end;
    if report.trailing_data > 0 {
        log::warn!("{} bytes after the end of the archive", report.trailing_data);
    }

    if next_size > options.limits.max_header_bytes {
        return Err(Error::ResourceLimitExceeded(format!(
            "next header of {next_size} bytes"
        )));
    }
    let mut blob = vec![0u8; next_size as usize];
    source.seek(SeekFrom::Start(after_header + next_offset))?;
    source.read_exact(&mut blob)?;
    if Crc32::compute(&blob) != next_crc {
        return Err(Error::corrupt_header(0, "next header CRC mismatch"));
    }
    report.is_archive = true;

    let parsed = parse_header_blob(
        source,
        after_header,
        blob,
        next_offset,
        &options.limits,
        &options.pipeline,
    )?;
    report.headers_size += parsed.packed_headers_size;
    let mut db = parsed.db;
    db.version = version;
    report.header_error |= db.header_error;
    report.unsupported_features |= db.unsupported_feature_warning;
    log::debug!(
        "opened archive: {} entries, {} folders, phys size {}",
        db.files.len(),
        db.num_folders(),
        report.phys_size
    );
    Ok(db)
}
