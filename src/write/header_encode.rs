//! Header encoding for 7z archives.
//!
//! This module encodes the main archive header: pack sizes, folder
//! descriptions with their coder unpack sizes, substream sizes and digests,
//! and file metadata. It also encodes the short record that points at a
//! packed header.

use crate::codec::pipeline::EncodedFolder;
use crate::format::property_id;
use crate::format::reader::{write_all_or_bits, write_bool_vector, write_number};

use super::options::EntryMeta;

/// A folder whose pack streams are written, waiting for the header.
#[derive(Debug, Clone)]
pub(crate) struct FolderRecord {
    pub encoded: EncodedFolder,
    /// CRC of the whole folder output, stored in UnpackInfo.
    pub folder_crc: Option<u32>,
    pub sub_sizes: Vec<u64>,
    pub sub_crcs: Vec<u32>,
}

impl FolderRecord {
    /// The folder digest stands in for a lone substream digest.
    fn inherits_digest(&self) -> bool {
        self.sub_sizes.len() == 1 && self.folder_crc.is_some()
    }
}

/// A file table row.
#[derive(Debug, Clone)]
pub(crate) struct FileRecord {
    pub name: String,
    pub has_stream: bool,
    pub is_dir: bool,
    pub is_anti: bool,
    pub meta: EntryMeta,
}

fn property(buf: &mut Vec<u8>, id: u64, payload: &[u8]) {
    write_number(buf, id);
    write_number(buf, payload.len() as u64);
    buf.extend_from_slice(payload);
}

fn encode_pack_info(buf: &mut Vec<u8>, pack_pos: u64, folders: &[FolderRecord]) {
    write_number(buf, property_id::PACK_INFO);
    write_number(buf, pack_pos);
    let sizes: Vec<u64> = folders.iter().flat_map(|f| f.encoded.pack_sizes()).collect();
    write_number(buf, sizes.len() as u64);
    write_number(buf, property_id::SIZE);
    for size in sizes {
        write_number(buf, size);
    }
    write_number(buf, property_id::END);
}

fn encode_unpack_info(buf: &mut Vec<u8>, folders: &[FolderRecord]) {
    write_number(buf, property_id::UNPACK_INFO);
    write_number(buf, property_id::FOLDER);
    write_number(buf, folders.len() as u64);
    buf.push(0); // not external
    for record in folders {
        record.encoded.folder.encode(buf);
    }

    write_number(buf, property_id::CODERS_UNPACK_SIZE);
    for record in folders {
        for &size in &record.encoded.coder_unpack_sizes {
            write_number(buf, size);
        }
    }

    if folders.iter().any(|f| f.folder_crc.is_some()) {
        write_number(buf, property_id::CRC);
        let defined: Vec<bool> = folders.iter().map(|f| f.folder_crc.is_some()).collect();
        write_all_or_bits(buf, &defined);
        for crc in folders.iter().filter_map(|f| f.folder_crc) {
            buf.extend_from_slice(&crc.to_le_bytes());
        }
    }
    write_number(buf, property_id::END);
}

fn encode_substreams_info(buf: &mut Vec<u8>, folders: &[FolderRecord]) {
    let any_count = folders.iter().any(|f| f.sub_sizes.len() != 1);
    let any_digest = folders.iter().any(|f| !f.inherits_digest());
    if !any_count && !any_digest {
        return;
    }
    write_number(buf, property_id::SUBSTREAMS_INFO);

    if any_count {
        write_number(buf, property_id::NUM_UNPACK_STREAM);
        for record in folders {
            write_number(buf, record.sub_sizes.len() as u64);
        }
    }

    if folders.iter().any(|f| f.sub_sizes.len() > 1) {
        write_number(buf, property_id::SIZE);
        for record in folders {
            // The last size of each folder is implied by the folder size.
            for &size in record.sub_sizes.iter().rev().skip(1).rev() {
                write_number(buf, size);
            }
        }
    }

    if any_digest {
        write_number(buf, property_id::CRC);
        let digests: Vec<u32> = folders
            .iter()
            .filter(|f| !f.inherits_digest())
            .flat_map(|f| f.sub_crcs.iter().copied())
            .collect();
        write_all_or_bits(buf, &vec![true; digests.len()]);
        for crc in digests {
            buf.extend_from_slice(&crc.to_le_bytes());
        }
    }
    write_number(buf, property_id::END);
}

/// Appends a streams-info body (without its leading section id).
pub(crate) fn encode_streams_info(buf: &mut Vec<u8>, pack_pos: u64, folders: &[FolderRecord]) {
    encode_pack_info(buf, pack_pos, folders);
    encode_unpack_info(buf, folders);
    encode_substreams_info(buf, folders);
    write_number(buf, property_id::END);
}

fn encode_names(files: &[FileRecord]) -> Vec<u8> {
    let mut payload = vec![0u8]; // not external
    for file in files {
        for unit in file.name.encode_utf16() {
            payload.extend_from_slice(&unit.to_le_bytes());
        }
        payload.extend_from_slice(&[0, 0]);
    }
    payload
}

fn encode_table<T: Copy>(
    files: &[FileRecord],
    value: impl Fn(&EntryMeta) -> Option<T>,
    to_bytes: impl Fn(T, &mut Vec<u8>),
) -> Option<Vec<u8>> {
    let defined: Vec<bool> = files.iter().map(|f| value(&f.meta).is_some()).collect();
    if !defined.contains(&true) {
        return None;
    }
    let mut payload = Vec::new();
    write_all_or_bits(&mut payload, &defined);
    payload.push(0); // not external
    for v in files.iter().filter_map(|f| value(&f.meta)) {
        to_bytes(v, &mut payload);
    }
    Some(payload)
}

fn bits(values: &[bool]) -> Vec<u8> {
    let mut out = Vec::new();
    write_bool_vector(&mut out, values);
    out
}

/// Appends the FilesInfo section.
pub(crate) fn encode_files_info(buf: &mut Vec<u8>, files: &[FileRecord]) {
    write_number(buf, property_id::FILES_INFO);
    write_number(buf, files.len() as u64);

    let empty_stream: Vec<bool> = files.iter().map(|f| !f.has_stream).collect();
    if empty_stream.contains(&true) {
        property(buf, property_id::EMPTY_STREAM, &bits(&empty_stream));
        let empties: Vec<&FileRecord> = files.iter().filter(|f| !f.has_stream).collect();
        let empty_file: Vec<bool> = empties.iter().map(|f| !f.is_dir).collect();
        if empty_file.contains(&true) {
            property(buf, property_id::EMPTY_FILE, &bits(&empty_file));
        }
        let anti: Vec<bool> = empties.iter().map(|f| f.is_anti).collect();
        if anti.contains(&true) {
            property(buf, property_id::ANTI, &bits(&anti));
        }
    }

    property(buf, property_id::NAME, &encode_names(files));
    if let Some(payload) = encode_table(files, |m| m.modification_time, |v: u64, out| {
        out.extend_from_slice(&v.to_le_bytes())
    }) {
        property(buf, property_id::MTIME, &payload);
    }
    if let Some(payload) = encode_table(files, |m| m.attributes, |v: u32, out| {
        out.extend_from_slice(&v.to_le_bytes())
    }) {
        property(buf, property_id::WIN_ATTRIBUTES, &payload);
    }
    write_number(buf, property_id::END);
}

/// Encodes a plain header.
pub(crate) fn encode_header(folders: &[FolderRecord], files: &[FileRecord]) -> Vec<u8> {
    let mut buf = Vec::new();
    write_number(&mut buf, property_id::HEADER);
    if !folders.is_empty() {
        write_number(&mut buf, property_id::MAIN_STREAMS_INFO);
        encode_streams_info(&mut buf, 0, folders);
    }
    if !files.is_empty() {
        encode_files_info(&mut buf, files);
    }
    write_number(&mut buf, property_id::END);
    log::debug!(
        "encoded header: {} folders, {} files, {} bytes",
        folders.len(),
        files.len(),
        buf.len()
    );
    buf
}

/// Encodes the record pointing at a packed header stored at `pack_pos`.
pub(crate) fn encode_encoded_header(pack_pos: u64, header_folder: &FolderRecord) -> Vec<u8> {
    let mut buf = Vec::new();
    write_number(&mut buf, property_id::ENCODED_HEADER);
    encode_streams_info(&mut buf, pack_pos, std::slice::from_ref(header_folder));
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::bcj2::Bcj2EncoderOptions;
    use crate::codec::method;
    use crate::codec::pipeline::{FolderLayout, encode_folder};
    use crate::format::switch::HeaderCursor;
    use crate::format::streams::{ResourceLimits, read_streams_info};
    use std::sync::Arc;

    fn copy_record(data: &[u8], sub_sizes: Vec<u64>, folder_crc: Option<u32>) -> FolderRecord {
        let encoded = encode_folder(
            &FolderLayout::single(method::COPY),
            data,
            0,
            &sub_sizes,
            &Bcj2EncoderOptions::default(),
        )
        .unwrap();
        let mut offset = 0usize;
        let sub_crcs = sub_sizes
            .iter()
            .map(|&s| {
                let crc = crc32fast::hash(&data[offset..offset + s as usize]);
                offset += s as usize;
                crc
            })
            .collect();
        FolderRecord {
            encoded,
            folder_crc,
            sub_sizes,
            sub_crcs,
        }
    }

    fn parse(buf: Vec<u8>) -> crate::format::streams::StreamsInfo {
        let mut cur = HeaderCursor::new(Arc::from(buf));
        read_streams_info(&mut cur, None, u64::MAX, &ResourceLimits::default()).unwrap()
    }

    #[test]
    fn test_streams_info_with_substreams() {
        let folders = vec![
            copy_record(b"0123456789abcdefghij", vec![10, 10], None),
            copy_record(b"xyz", vec![3], None),
        ];
        let mut buf = Vec::new();
        encode_streams_info(&mut buf, 7, &folders);
        let info = parse(buf);
        assert_eq!(info.folders.data_offset, 7);
        assert_eq!(info.folders.num_unpack_streams, vec![2, 1]);
        assert_eq!(info.unpack_sizes, vec![10, 10, 3]);
        assert_eq!(info.digests[2], Some(crc32fast::hash(b"xyz")));
        assert_eq!(info.digests[0], Some(crc32fast::hash(b"0123456789")));
    }

    #[test]
    fn test_single_stream_inherits_folder_crc() {
        let crc = crc32fast::hash(b"header");
        let record = copy_record(b"header", vec![6], Some(crc));
        let mut buf = Vec::new();
        encode_streams_info(&mut buf, 0, std::slice::from_ref(&record));
        let info = parse(buf);
        assert_eq!(info.folders.folder_crcs, vec![Some(crc)]);
        assert_eq!(info.digests, vec![Some(crc)]);
    }

    #[test]
    fn test_files_info_empty_stream_flags() {
        let files = vec![
            FileRecord {
                name: "a".into(),
                has_stream: true,
                is_dir: false,
                is_anti: false,
                meta: EntryMeta::default(),
            },
            FileRecord {
                name: "d".into(),
                has_stream: false,
                is_dir: true,
                is_anti: false,
                meta: EntryMeta::new().modification_time(5),
            },
            FileRecord {
                name: "gone".into(),
                has_stream: false,
                is_dir: false,
                is_anti: true,
                meta: EntryMeta::default(),
            },
        ];
        let mut buf = Vec::new();
        encode_files_info(&mut buf, &files);
        assert_eq!(buf[0], property_id::FILES_INFO as u8);
        assert_eq!(buf[1], 3);
        // EmptyStream block: id, size 1, bits 011
        assert_eq!(&buf[2..5], &[property_id::EMPTY_STREAM as u8, 1, 0b0110_0000]);
        // EmptyFile over the two empty entries: 01
        assert_eq!(&buf[5..8], &[property_id::EMPTY_FILE as u8, 1, 0b0100_0000]);
        assert_eq!(&buf[8..11], &[property_id::ANTI as u8, 1, 0b0100_0000]);
        assert_eq!(*buf.last().unwrap(), property_id::END as u8);
    }

    #[test]
    fn test_empty_header() {
        let header = encode_header(&[], &[]);
        assert_eq!(header, vec![property_id::HEADER as u8, property_id::END as u8]);
    }
}
