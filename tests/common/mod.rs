//! Shared test utilities for integration tests.
//!
//! Archives are built either with the crate's `Writer` or by hand from raw
//! header bytes, for inputs the writer never produces.
//!
//! Note: `#![allow(dead_code)]` is required because each integration test file
//! compiles as a separate crate and may only use a subset of these helpers.

#![allow(dead_code)]

use std::io::Cursor;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use zesven_core::format::folder::{CoderInfo, Folder};
use zesven_core::format::header::StartHeader;
use zesven_core::format::property_id;
use zesven_core::format::reader::write_number;
use zesven_core::{Archive, WriteMethod, WriteOptions, Writer};

/// Creates an in-memory archive with the given options and files.
pub fn create_archive_with(options: WriteOptions, entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut bytes = Vec::new();
    {
        let mut writer = Writer::new(Cursor::new(&mut bytes)).options(options);
        for (name, data) in entries {
            writer.add_bytes(name, data).expect("add entry");
        }
        writer.finish().expect("finish archive");
    }
    bytes
}

/// One COPY folder per file.
pub fn copy_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
    create_archive_with(
        WriteOptions::new().method(WriteMethod::Copy).solid(false),
        entries,
    )
}

/// All files in one COPY folder.
pub fn solid_copy_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
    create_archive_with(
        WriteOptions::new().method(WriteMethod::Copy).solid(true),
        entries,
    )
}

/// Opens an in-memory archive.
pub fn open(bytes: Vec<u8>) -> Archive<Cursor<Vec<u8>>> {
    Archive::open(Cursor::new(bytes)).expect("open archive")
}

/// Deterministic pseudo-random bytes.
pub fn random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.r#gen()).collect()
}

/// Bytes resembling x86 code: plenty of CALL, JMP and Jcc opcodes with
/// near targets mixed into text.
pub fn x86_like(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut out = Vec::with_capacity(len + 8);
    while out.len() < len {
        match rng.gen_range(0..6) {
            0 => {
                out.push(0xE8);
                let target: i32 = rng.gen_range(-4096..4096);
                out.extend_from_slice(&target.to_le_bytes());
            }
            1 => {
                out.push(0xE9);
                let target: i32 = rng.gen_range(-65536..65536);
                out.extend_from_slice(&target.to_le_bytes());
            }
            2 => {
                out.push(0x0F);
                out.push(0x80 | rng.gen_range(0..16));
                let target: i32 = rng.gen_range(-256..256);
                out.extend_from_slice(&target.to_le_bytes());
            }
            _ => out.extend_from_slice(b"mov eax, ebx; "),
        }
    }
    out.truncate(len);
    out
}

/// Reads the next-header offset from a signature header at the start of `bytes`.
pub fn next_header_offset(bytes: &[u8]) -> usize {
    u64::from_le_bytes(bytes[12..20].try_into().expect("8 bytes")) as usize
}

/// Assembles an archive from packed data and raw header bytes.
pub fn assemble(packed: &[u8], header: &[u8]) -> Vec<u8> {
    let crc = crc32fast::hash(header);
    let mut bytes = StartHeader::encode(packed.len() as u64, header.len() as u64, crc).to_vec();
    bytes.extend_from_slice(packed);
    bytes.extend_from_slice(header);
    bytes
}

fn utf16_names(names: &[&str]) -> Vec<u8> {
    let mut payload = vec![0u8];
    for name in names {
        for unit in name.encode_utf16() {
            payload.extend_from_slice(&unit.to_le_bytes());
        }
        payload.extend_from_slice(&[0, 0]);
    }
    payload
}

/// Builds an archive with one single-coder folder holding one file.
///
/// The coder need not be one this crate can decode.
pub fn single_coder_archive(coder: CoderInfo, packed: &[u8], unpack_size: u64, name: &str) -> Vec<u8> {
    let folder = Folder::new(vec![coder], Vec::new(), vec![0]).expect("valid folder");
    let mut h = Vec::new();
    write_number(&mut h, property_id::HEADER);
    write_number(&mut h, property_id::MAIN_STREAMS_INFO);
    write_number(&mut h, property_id::PACK_INFO);
    write_number(&mut h, 0);
    write_number(&mut h, 1);
    write_number(&mut h, property_id::SIZE);
    write_number(&mut h, packed.len() as u64);
    write_number(&mut h, property_id::END);
    write_number(&mut h, property_id::UNPACK_INFO);
    write_number(&mut h, property_id::FOLDER);
    write_number(&mut h, 1);
    h.push(0);
    folder.encode(&mut h);
    write_number(&mut h, property_id::CODERS_UNPACK_SIZE);
    write_number(&mut h, unpack_size);
    write_number(&mut h, property_id::END);
    write_number(&mut h, property_id::END);
    write_number(&mut h, property_id::FILES_INFO);
    write_number(&mut h, 1);
    let names = utf16_names(&[name]);
    write_number(&mut h, property_id::NAME);
    write_number(&mut h, names.len() as u64);
    h.extend_from_slice(&names);
    write_number(&mut h, property_id::END);
    write_number(&mut h, property_id::END);
    assemble(packed, &h)
}
