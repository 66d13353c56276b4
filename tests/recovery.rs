//! Integration tests for locating damaged or embedded archives.

mod common;

use std::io::Cursor;

use zesven_core::read::{OpenOptions, probe};
use zesven_core::recovery::{SCAN_CHUNK_SIZE, find_start_header};
use zesven_core::{Archive, ErrorKind};

#[test]
fn test_embedded_archive_needs_scan() {
    let archive = common::copy_archive(&[("readme.txt", b"This is the readme")]);
    let mut embedded = vec![0u8; 256];
    embedded[0] = b'M';
    embedded[1] = b'Z';
    embedded.extend_from_slice(&archive);

    let strict = probe(Cursor::new(embedded.clone()), &OpenOptions::new());
    assert!(!strict.report.is_archive);
    assert_eq!(strict.report.error_kind, Some(ErrorKind::Incorrect));

    let options = OpenOptions::new().search_limit(Some(1 << 16));
    let mut found = Archive::open_with_options(Cursor::new(embedded), options).unwrap();
    assert_eq!(found.report().archive_offset, 256);
    assert!(found.report().header_recovered_by_scan);
    assert_eq!(found.read_entry(0).unwrap(), b"This is the readme");
}

#[test]
fn test_scan_across_chunk_boundary() {
    let archive = common::solid_copy_archive(&[("a", b"abc"), ("b", b"def")]);
    let prefix = common::random_bytes(SCAN_CHUNK_SIZE * 2 - 13, 11);
    let mut data = prefix.clone();
    data.extend_from_slice(&archive);

    let found = find_start_header(&mut Cursor::new(&data), 0, Some(data.len() as u64))
        .unwrap()
        .unwrap();
    assert_eq!(found.offset, prefix.len() as u64);
    assert!(found.by_scan);
}

#[test]
fn test_fake_signature_before_real_one() {
    let archive = common::copy_archive(&[("x", b"payload")]);
    // A bare magic without a valid start header CRC is skipped.
    let mut data = b"junk".to_vec();
    data.extend_from_slice(&[0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C, 0, 4]);
    data.extend_from_slice(&[0x55; 40]);
    let offset = data.len() as u64;
    data.extend_from_slice(&archive);

    let options = OpenOptions::new().search_limit(Some(4096));
    let mut found = Archive::open_with_options(Cursor::new(data), options).unwrap();
    assert_eq!(found.report().archive_offset, offset);
    assert_eq!(found.read_entry(0).unwrap(), b"payload");
}

#[test]
fn test_zeroed_start_header_recovered() {
    let mut bytes = common::copy_archive(&[("kept.txt", b"survives a crash")]);
    bytes[8..32].fill(0);

    let outcome = probe(Cursor::new(bytes.clone()), &OpenOptions::new());
    let mut archive = outcome.archive.expect("recovered archive");
    assert!(outcome.report.start_header_recovered);
    assert!(!outcome.report.is_clean());
    assert_eq!(archive.read_entry(0).unwrap(), b"survives a crash");

    let strict = OpenOptions::new().recover_zeroed_start_header(false);
    let archive = Archive::open_with_options(Cursor::new(bytes), strict).unwrap();
    assert!(archive.is_empty());
}

#[test]
fn test_trailing_data_is_reported() {
    let mut bytes = common::copy_archive(&[("a", b"1234")]);
    let size = bytes.len() as u64;
    bytes.extend_from_slice(&[0xAB; 100]);
    let archive = common::open(bytes);
    assert_eq!(archive.report().trailing_data, 100);
    assert_eq!(archive.report().phys_size, size);
    assert!(archive.report().is_clean());
}
