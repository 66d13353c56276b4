//! Resource limit enforcement on hostile or oversized archives.

mod common;

use std::io::Cursor;

use zesven_core::read::{ItemOutcome, OpenOptions, probe};
use zesven_core::{Archive, Error, ErrorKind, ResourceLimits};

fn names(count: usize) -> Vec<(String, Vec<u8>)> {
    (0..count)
        .map(|i| (format!("entry{i:03}"), vec![i as u8; 3]))
        .collect()
}

fn archive_of(entries: &[(String, Vec<u8>)]) -> Vec<u8> {
    let refs: Vec<(&str, &[u8])> = entries
        .iter()
        .map(|(n, d)| (n.as_str(), d.as_slice()))
        .collect();
    common::solid_copy_archive(&refs)
}

#[test]
fn test_header_size_limit() {
    let bytes = archive_of(&names(20));
    let header_len = (bytes.len() - 32 - common::next_header_offset(&bytes)) as u64;

    let tight = OpenOptions::new().limits(ResourceLimits::new().max_header_bytes(header_len - 1));
    let outcome = probe(Cursor::new(bytes.clone()), &tight);
    assert!(matches!(outcome.error, Some(Error::ResourceLimitExceeded(_))));
    assert!(outcome.report.unsupported_features);
    assert!(outcome.report.is_archive);

    let exact = OpenOptions::new().limits(ResourceLimits::new().max_header_bytes(header_len));
    let archive = Archive::open_with_options(Cursor::new(bytes), exact).unwrap();
    assert_eq!(archive.len(), 20);
}

#[test]
fn test_entry_count_limit() {
    let bytes = archive_of(&names(10));
    let at_limit = OpenOptions::new().limits(ResourceLimits::new().max_entries(10));
    assert!(Archive::open_with_options(Cursor::new(bytes.clone()), at_limit).is_ok());

    let below = OpenOptions::new().limits(ResourceLimits::new().max_entries(9));
    let err = Archive::open_with_options(Cursor::new(bytes), below).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unsupported);
}

#[test]
fn test_pack_read_limit_is_per_folder() {
    let bytes = common::copy_archive(&[("small", &[1u8; 100]), ("large", &[2u8; 5000])]);
    let options = OpenOptions::new().limits(ResourceLimits::new().max_pack_read(1000));
    let mut archive = Archive::open_with_options(Cursor::new(bytes), options).unwrap();

    assert_eq!(archive.read_entry(0).unwrap(), vec![1u8; 100]);
    assert!(matches!(
        archive.read_entry(1),
        Err(Error::ResourceLimitExceeded(_))
    ));
    let report = archive.test().unwrap();
    assert_eq!(
        report.outcomes,
        vec![ItemOutcome::Ok, ItemOutcome::UnsupportedMethod]
    );
}

#[test]
fn test_unlimited_opens_everything() {
    let bytes = archive_of(&names(50));
    let options = OpenOptions::new().limits(ResourceLimits::unlimited());
    let mut archive = Archive::open_with_options(Cursor::new(bytes), options).unwrap();
    assert_eq!(archive.len(), 50);
    assert!(archive.test().unwrap().is_ok());
}
