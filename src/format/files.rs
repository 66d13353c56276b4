//! The FilesInfo section: names, attributes, timestamps and stream flags.
//!
//! Every property block is read inside a sized sub-window, so a block that
//! declares more bytes than it uses is caught (`Incorrect`), and unknown
//! blocks can be skipped without understanding them.

use std::sync::Arc;

use crate::{Error, Result};

use super::reader::ByteWindow;
use super::streams::ResourceLimits;
use super::switch::HeaderCursor;
use super::{attributes, property_id};

/// One entry of the file table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileEntry {
    /// Path inside the archive, `/` or `\` separated as stored.
    pub name: String,
    /// Unpacked size; 0 for entries without a stream.
    pub size: u64,
    /// Stored CRC of the unpacked data.
    pub crc: Option<u32>,
    /// True when the entry owns a substream.
    pub has_stream: bool,
    /// True for directories.
    pub is_dir: bool,
    /// True for anti-items (deletion markers of update archives).
    pub is_anti: bool,
    /// Windows attribute word, possibly with Unix mode bits in the high half.
    pub attributes: Option<u32>,
    /// Creation time as a Windows FILETIME.
    pub ctime: Option<u64>,
    /// Last access time as a Windows FILETIME.
    pub atime: Option<u64>,
    /// Last modification time as a Windows FILETIME.
    pub mtime: Option<u64>,
    /// Start position, used by some multi-part writers.
    pub start_pos: Option<u64>,
}

impl FileEntry {
    /// Returns true if the attribute word marks a directory.
    pub fn has_directory_attribute(&self) -> bool {
        self.attributes
            .is_some_and(|a| a & attributes::DIRECTORY != 0)
    }
}

/// The decoded file table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilesInfo {
    /// All entries, in archive order.
    pub files: Vec<FileEntry>,
    /// Ids of the property blocks that were present, in order.
    pub property_ids: Vec<u64>,
    /// Set when a block of unknown type was skipped.
    pub unsupported_property: bool,
}

/// Rewrites `/` separators to the host's path separator.
fn to_host_separators(name: String) -> String {
    if std::path::MAIN_SEPARATOR == '/' {
        name
    } else {
        name.replace('/', std::path::MAIN_SEPARATOR_STR)
    }
}

fn read_names(cur: &mut HeaderCursor, num_files: usize) -> Result<Vec<String>> {
    let bytes = cur.read_slice(cur.remaining())?;
    let mut names = Vec::with_capacity(num_files.min(bytes.len() / 2));
    let mut pos = 0;
    for _ in 0..num_files {
        let units: Vec<u16> = bytes[pos..]
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .take_while(|&u| u != 0)
            .collect();
        let end = pos + units.len() * 2;
        if end + 2 > bytes.len() {
            return Err(Error::EndOfData {
                context: "file name",
            });
        }
        names.push(to_host_separators(String::from_utf16_lossy(&units)));
        pos = end + 2;
    }
    let leftover = pos != bytes.len();
    if leftover {
        cur.set_header_error("bytes after the last file name");
    }
    Ok(names)
}

fn read_u64_table(
    cur: &mut HeaderCursor,
    external: Option<&[Arc<[u8]>]>,
    num_files: usize,
) -> Result<Vec<Option<u64>>> {
    let defined = cur.read_all_or_bits(num_files)?;
    let mut sw = cur.switch_external(external)?;
    defined
        .into_iter()
        .map(|d| if d { sw.read_u64_le().map(Some) } else { Ok(None) })
        .collect()
}

fn read_u32_table(
    cur: &mut HeaderCursor,
    external: Option<&[Arc<[u8]>]>,
    num_files: usize,
) -> Result<Vec<Option<u32>>> {
    let defined = cur.read_all_or_bits(num_files)?;
    let mut sw = cur.switch_external(external)?;
    defined
        .into_iter()
        .map(|d| if d { sw.read_u32_le().map(Some) } else { Ok(None) })
        .collect()
}

fn count_set(bits: &[bool]) -> usize {
    bits.iter().filter(|&&b| b).count()
}

/// Reads the FilesInfo section body (after its id) up to its `End`.
///
/// `unpack_sizes` and `digests` are the substream tables of the main streams
/// info; every entry with a stream takes the next one in order.
pub fn read_files_info(
    cur: &mut HeaderCursor,
    external: Option<&[Arc<[u8]>]>,
    unpack_sizes: &[u64],
    digests: &[Option<u32>],
    limits: &ResourceLimits,
) -> Result<FilesInfo> {
    let num_files = cur.read_num()? as usize;
    limits.check_entries("files", num_files)?;

    let mut info = FilesInfo::default();
    let mut names: Vec<String> = Vec::new();
    let mut attribs: Vec<Option<u32>> = Vec::new();
    let mut ctimes: Vec<Option<u64>> = Vec::new();
    let mut atimes: Vec<Option<u64>> = Vec::new();
    let mut mtimes: Vec<Option<u64>> = Vec::new();
    let mut start_pos: Vec<Option<u64>> = Vec::new();
    let mut empty_stream: Vec<bool> = Vec::new();
    let mut empty_file: Vec<bool> = Vec::new();
    let mut anti: Vec<bool> = Vec::new();
    let mut num_empty = 0usize;

    loop {
        let kind = cur.read_id()?;
        if kind == property_id::END {
            break;
        }
        let size = cur.read_number()?;
        let mut block = cur.switch_sub_window(size)?;
        let mut known = true;
        match kind {
            property_id::NAME => {
                let mut sw = block.switch_external(external)?;
                names = read_names(&mut sw, num_files)?;
            }
            property_id::WIN_ATTRIBUTES => {
                attribs = read_u32_table(&mut block, external, num_files)?;
            }
            property_id::EMPTY_STREAM => {
                empty_stream = block.read_bool_vector(num_files)?;
                num_empty = count_set(&empty_stream);
                empty_file.clear();
                anti.clear();
            }
            property_id::EMPTY_FILE => empty_file = block.read_bool_vector(num_empty)?,
            property_id::ANTI => anti = block.read_bool_vector(num_empty)?,
            property_id::START_POS => start_pos = read_u64_table(&mut block, external, num_files)?,
            property_id::CTIME => ctimes = read_u64_table(&mut block, external, num_files)?,
            property_id::ATIME => atimes = read_u64_table(&mut block, external, num_files)?,
            property_id::MTIME => mtimes = read_u64_table(&mut block, external, num_files)?,
            property_id::DUMMY => {
                let padding = block.read_slice(size as usize)?;
                if padding.iter().any(|&b| b != 0) {
                    block.set_header_error("nonzero padding block");
                }
            }
            _ => known = false,
        }
        if known {
            if kind != property_id::DUMMY {
                info.property_ids.push(kind);
            }
        } else {
            log::warn!("skipping unsupported file property {kind:#x}");
            info.unsupported_property = true;
            block.skip_rest();
        }
        block.ensure_consumed()?;
    }

    if num_files - num_empty != unpack_sizes.len() {
        return Err(Error::UnsupportedFeature {
            feature: "file count does not match the substream count",
        });
    }

    let bit = |v: &[bool], i: usize| v.get(i).copied().unwrap_or(false);
    let mut files = Vec::with_capacity(num_files);
    let mut size_index = 0;
    let mut empty_index = 0;
    for i in 0..num_files {
        let mut entry = FileEntry {
            name: names.get(i).cloned().unwrap_or_default(),
            attributes: attribs.get(i).copied().flatten(),
            ctime: ctimes.get(i).copied().flatten(),
            atime: atimes.get(i).copied().flatten(),
            mtime: mtimes.get(i).copied().flatten(),
            start_pos: start_pos.get(i).copied().flatten(),
            ..FileEntry::default()
        };
        if bit(&empty_stream, i) {
            entry.is_dir = !bit(&empty_file, empty_index);
            entry.is_anti = bit(&anti, empty_index);
            empty_index += 1;
        } else {
            entry.has_stream = true;
            entry.size = unpack_sizes[size_index];
            entry.crc = digests.get(size_index).copied().flatten();
            size_index += 1;
        }
        files.push(entry);
    }
    info.files = files;
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use crate::format::reader::{write_bool_vector, write_number};

    fn cursor(bytes: Vec<u8>) -> HeaderCursor {
        HeaderCursor::new(Arc::from(bytes))
    }

    fn block(buf: &mut Vec<u8>, kind: u64, payload: &[u8]) {
        write_number(buf, kind);
        write_number(buf, payload.len() as u64);
        buf.extend_from_slice(payload);
    }

    fn names_payload(names: &[&str]) -> Vec<u8> {
        let mut p = vec![0u8];
        for name in names {
            for unit in name.encode_utf16() {
                p.extend_from_slice(&unit.to_le_bytes());
            }
            p.extend_from_slice(&[0, 0]);
        }
        p
    }

    fn bits(v: &[bool]) -> Vec<u8> {
        let mut out = Vec::new();
        write_bool_vector(&mut out, v);
        out
    }

    #[test]
    fn test_empty_stream_and_empty_file_flags() {
        let mut b = Vec::new();
        write_number(&mut b, 5);
        block(&mut b, property_id::NAME, &names_payload(&["a", "b", "c", "d", "e"]));
        block(
            &mut b,
            property_id::EMPTY_STREAM,
            &bits(&[false, true, false, false, true]),
        );
        block(&mut b, property_id::EMPTY_FILE, &bits(&[true, false]));
        write_number(&mut b, property_id::END);

        let info = read_files_info(
            &mut cursor(b),
            None,
            &[3, 4, 5],
            &[Some(1), None, Some(3)],
            &ResourceLimits::default(),
        )
        .unwrap();
        let has_stream: Vec<bool> = info.files.iter().map(|f| f.has_stream).collect();
        let is_dir: Vec<bool> = info.files.iter().map(|f| f.is_dir).collect();
        assert_eq!(has_stream, [true, false, true, true, false]);
        assert_eq!(is_dir, [false, false, false, false, true]);
        assert_eq!(info.files[2].size, 4);
        assert_eq!(info.files[3].crc, Some(3));
        assert_eq!(info.files[4].name, "e");
        assert!(!info.unsupported_property);
    }

    #[test]
    fn test_names_use_host_separator() {
        let mut b = Vec::new();
        write_number(&mut b, 1);
        block(&mut b, property_id::NAME, &names_payload(&["dir/sub/a.txt"]));
        write_number(&mut b, property_id::END);
        let info =
            read_files_info(&mut cursor(b), None, &[1], &[None], &ResourceLimits::default()).unwrap();
        let sep = std::path::MAIN_SEPARATOR;
        assert_eq!(info.files[0].name, format!("dir{sep}sub{sep}a.txt"));
    }

    #[test]
    fn test_stream_count_mismatch_is_unsupported() {
        let mut b = Vec::new();
        write_number(&mut b, 2);
        write_number(&mut b, property_id::END);
        let err = read_files_info(&mut cursor(b), None, &[1], &[None], &ResourceLimits::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
    }

    #[test]
    fn test_unknown_property_sets_warning() {
        let mut b = Vec::new();
        write_number(&mut b, 1);
        block(&mut b, 0x40, &[1, 2, 3]);
        block(&mut b, property_id::DUMMY, &[0, 0]);
        write_number(&mut b, property_id::END);
        let mut cur = cursor(b);
        let info =
            read_files_info(&mut cur, None, &[7], &[None], &ResourceLimits::default()).unwrap();
        assert!(info.unsupported_property);
        assert!(info.property_ids.is_empty());
        assert!(!cur.header_error());
        assert_eq!(info.files[0].size, 7);
    }

    #[test]
    fn test_block_with_unread_bytes_is_incorrect() {
        let mut b = Vec::new();
        write_number(&mut b, 2);
        block(&mut b, property_id::EMPTY_STREAM, &[0x80, 0x00]);
        write_number(&mut b, property_id::END);
        let err = read_files_info(&mut cursor(b), None, &[1], &[None], &ResourceLimits::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Incorrect);
    }

    #[test]
    fn test_block_larger_than_header() {
        let mut b = Vec::new();
        write_number(&mut b, 1);
        write_number(&mut b, property_id::MTIME);
        write_number(&mut b, 100);
        let err = read_files_info(&mut cursor(b), None, &[1], &[None], &ResourceLimits::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Incorrect);
    }

    #[test]
    fn test_missing_name_terminator() {
        let mut b = Vec::new();
        write_number(&mut b, 1);
        block(&mut b, property_id::NAME, &[0, b'a', 0]);
        write_number(&mut b, property_id::END);
        let err = read_files_info(&mut cursor(b), None, &[1], &[None], &ResourceLimits::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EndOfData);
    }

    #[test]
    fn test_trailing_name_bytes_raise_header_error() {
        let mut payload = names_payload(&["x"]);
        payload.extend_from_slice(&[b'y', 0]);
        let mut b = Vec::new();
        write_number(&mut b, 1);
        block(&mut b, property_id::NAME, &payload);
        write_number(&mut b, property_id::END);
        let mut cur = cursor(b);
        let info =
            read_files_info(&mut cur, None, &[1], &[None], &ResourceLimits::default()).unwrap();
        assert_eq!(info.files[0].name, "x");
        assert!(cur.header_error());
    }

    #[test]
    fn test_external_attributes_and_times() {
        let mut attr_data = Vec::new();
        attr_data.extend_from_slice(&0x20u32.to_le_bytes());
        let external: Vec<Arc<[u8]>> = vec![Arc::from(attr_data)];

        let mut b = Vec::new();
        write_number(&mut b, 2);
        // Only the second file has attributes, stored in external block 0.
        block(&mut b, property_id::WIN_ATTRIBUTES, &[0x00, 0x40, 0x01, 0x00]);
        let mut mtime = vec![0x01, 0x00];
        mtime.extend_from_slice(&11u64.to_le_bytes());
        mtime.extend_from_slice(&22u64.to_le_bytes());
        block(&mut b, property_id::MTIME, &mtime);
        write_number(&mut b, property_id::END);

        let info = read_files_info(
            &mut cursor(b),
            Some(&external),
            &[1, 2],
            &[None, None],
            &ResourceLimits::default(),
        )
        .unwrap();
        assert_eq!(info.files[0].attributes, None);
        assert_eq!(info.files[1].attributes, Some(0x20));
        assert_eq!(info.files[1].mtime, Some(22));
        assert_eq!(
            info.property_ids,
            vec![property_id::WIN_ATTRIBUTES, property_id::MTIME]
        );
    }

    #[test]
    fn test_anti_items() {
        let mut b = Vec::new();
        write_number(&mut b, 2);
        block(&mut b, property_id::EMPTY_STREAM, &bits(&[true, true]));
        block(&mut b, property_id::EMPTY_FILE, &bits(&[true, false]));
        block(&mut b, property_id::ANTI, &bits(&[true, false]));
        write_number(&mut b, property_id::END);
        let info =
            read_files_info(&mut cursor(b), None, &[], &[], &ResourceLimits::default()).unwrap();
        assert!(info.files[0].is_anti && !info.files[0].is_dir);
        assert!(!info.files[1].is_anti && info.files[1].is_dir);
    }
}
