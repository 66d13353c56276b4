//! Streams info: pack streams, folders and substreams.
//!
//! These sections describe where packed data lives and how it unpacks. The
//! folder descriptions are only validated here (see [`scan_folder`]); their
//! raw bytes are kept in [`FolderTable`] and turned into [`Folder`] values on
//! demand.

use std::ops::Range;
use std::sync::Arc;

use crate::{Error, Result};

use super::folder::{Folder, MethodStats, scan_folder};
use super::property_id;
use super::reader::ByteWindow;
use super::switch::HeaderCursor;

/// Resource limits for parsing and extraction operations.
#[derive(Debug, Clone)]
pub struct ResourceLimits {
    /// Maximum number of entries (files, folders, pack streams, substreams).
    pub max_entries: usize,
    /// Maximum size of a header blob, before and after decoding.
    pub max_header_bytes: u64,
    /// Maximum unpack size of a single folder.
    pub max_folder_unpack: u64,
    /// Maximum packed bytes read into memory for a single folder.
    pub max_pack_read: u64,
}

impl Default for ResourceLimits {
    /// Creates resource limits with the following default values:
    ///
    /// | Limit | Default Value |
    /// |-------|---------------|
    /// | `max_entries` | 1,000,000 |
    /// | `max_header_bytes` | 64 MiB |
    /// | `max_folder_unpack` | 4 GiB |
    /// | `max_pack_read` | 4 GiB |
    fn default() -> Self {
        Self {
            max_entries: 1_000_000,
            max_header_bytes: 64 << 20,
            max_folder_unpack: 4 << 30,
            max_pack_read: 4 << 30,
        }
    }
}

impl ResourceLimits {
    /// Creates new resource limits with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates resource limits with no restrictions.
    pub fn unlimited() -> Self {
        Self {
            max_entries: usize::MAX,
            max_header_bytes: u64::MAX,
            max_folder_unpack: u64::MAX,
            max_pack_read: u64::MAX,
        }
    }

    /// Sets the maximum number of entries.
    pub fn max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }

    /// Sets the maximum header bytes.
    pub fn max_header_bytes(mut self, max: u64) -> Self {
        self.max_header_bytes = max;
        self
    }

    /// Sets the maximum folder unpack size.
    pub fn max_folder_unpack(mut self, max: u64) -> Self {
        self.max_folder_unpack = max;
        self
    }

    /// Sets the maximum packed bytes read for one folder.
    pub fn max_pack_read(mut self, max: u64) -> Self {
        self.max_pack_read = max;
        self
    }

    pub(crate) fn check_entries(&self, what: &str, count: usize) -> Result<()> {
        if count > self.max_entries {
            return Err(Error::ResourceLimitExceeded(format!(
                "{what}: {count} exceeds the limit of {}",
                self.max_entries
            )));
        }
        Ok(())
    }
}

/// Per-folder parallel arrays describing pack streams and coder graphs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderTable {
    /// Offset of the first pack stream, relative to the end of the signature header.
    pub data_offset: u64,
    /// Cumulative pack stream positions, `num_pack_streams + 1` entries.
    pub pack_positions: Vec<u64>,
    /// Optional CRC of each pack stream.
    pub pack_crcs: Vec<Option<u32>>,
    /// Index of the first pack stream of each folder, plus the total.
    pub start_pack_stream: Vec<usize>,
    /// Unpack size of every coder, flattened across folders.
    pub coder_unpack_sizes: Vec<u64>,
    /// Index into `coder_unpack_sizes` of each folder's first coder, plus the total.
    pub coder_unpack_offsets: Vec<usize>,
    /// Main coder of each folder.
    pub main_coders: Vec<usize>,
    /// Optional CRC of each folder's output.
    pub folder_crcs: Vec<Option<u32>>,
    /// Number of substreams (files) in each folder.
    pub num_unpack_streams: Vec<u32>,
    /// Method roll-ups from the folder scan.
    pub methods: MethodStats,
    coders_data: Vec<u8>,
    coders_data_offsets: Vec<usize>,
}

impl Default for FolderTable {
    fn default() -> Self {
        Self {
            data_offset: 0,
            pack_positions: vec![0],
            pack_crcs: Vec::new(),
            start_pack_stream: vec![0],
            coder_unpack_sizes: Vec::new(),
            coder_unpack_offsets: vec![0],
            main_coders: Vec::new(),
            folder_crcs: Vec::new(),
            num_unpack_streams: Vec::new(),
            methods: MethodStats::default(),
            coders_data: Vec::new(),
            coders_data_offsets: vec![0],
        }
    }
}

impl FolderTable {
    /// Returns the number of folders.
    pub fn num_folders(&self) -> usize {
        self.main_coders.len()
    }

    /// Returns the number of pack streams.
    pub fn num_pack_streams(&self) -> usize {
        self.pack_positions.len() - 1
    }

    /// Returns the sum of all pack stream sizes.
    pub fn total_pack_size(&self) -> u64 {
        self.pack_positions.last().copied().unwrap_or(0)
    }

    /// Returns the unpack sizes of every coder in `folder`.
    pub fn coder_sizes(&self, folder: usize) -> &[u64] {
        &self.coder_unpack_sizes
            [self.coder_unpack_offsets[folder]..self.coder_unpack_offsets[folder + 1]]
    }

    /// Returns the unpack size of a folder, that of its main coder.
    pub fn folder_unpack_size(&self, folder: usize) -> u64 {
        self.coder_sizes(folder)[self.main_coders[folder]]
    }

    /// Returns the global pack stream indices used by `folder`.
    pub fn folder_pack_streams(&self, folder: usize) -> Range<usize> {
        self.start_pack_stream[folder]..self.start_pack_stream[folder + 1]
    }

    /// Returns the size of pack stream `index`.
    pub fn pack_size(&self, index: usize) -> u64 {
        self.pack_positions[index + 1] - self.pack_positions[index]
    }

    /// Returns the sizes of the pack streams of `folder`, in folder pack order.
    pub fn folder_pack_sizes(&self, folder: usize) -> Vec<u64> {
        self.folder_pack_streams(folder)
            .map(|i| self.pack_size(i))
            .collect()
    }

    /// Returns the byte range of a folder's packed data, relative to the end
    /// of the signature header. Pack streams of one folder are contiguous.
    pub fn folder_data_range(&self, folder: usize) -> Range<u64> {
        let streams = self.folder_pack_streams(folder);
        self.data_offset + self.pack_positions[streams.start]
            ..self.data_offset + self.pack_positions[streams.end]
    }

    /// Returns the raw description bytes recorded for `folder`.
    pub fn folder_description(&self, folder: usize) -> &[u8] {
        &self.coders_data[self.coders_data_offsets[folder]..self.coders_data_offsets[folder + 1]]
    }

    /// Parses the full coder graph of `folder`.
    pub fn parse_folder(&self, folder: usize) -> Result<Folder> {
        let parsed = Folder::parse(self.folder_description(folder))?;
        if parsed.pack_streams.len() != self.folder_pack_streams(folder).len()
            || parsed.main_coder() != self.main_coders[folder]
        {
            return Err(Error::Internal("folder description changed between scans"));
        }
        Ok(parsed)
    }
}

/// A parsed streams-info section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamsInfo {
    /// Folder and pack stream tables.
    pub folders: FolderTable,
    /// Size of every substream, folder by folder.
    pub unpack_sizes: Vec<u64>,
    /// Optional CRC of every substream.
    pub digests: Vec<Option<u32>>,
}

/// Skips sections until `id`; reaching `End` first is a header error.
pub fn wait_id(cur: &mut HeaderCursor, id: u64) -> Result<()> {
    loop {
        let found = cur.read_id()?;
        if found == id {
            return Ok(());
        }
        if found == property_id::END {
            return Err(cur.corrupt(format!("section {id:#x} missing")));
        }
        cur.skip_data()?;
    }
}

fn read_digests(cur: &mut HeaderCursor, count: usize) -> Result<Vec<Option<u32>>> {
    let defined = cur.read_all_or_bits(count)?;
    defined
        .into_iter()
        .map(|d| if d { cur.read_u32_le().map(Some) } else { Ok(None) })
        .collect()
}

/// Reads a streams-info section up to and including its `End`.
///
/// `range_limit` bounds the pack data area (the space before the next
/// header). `external` supplies data blocks for redirected folder tables.
pub fn read_streams_info(
    cur: &mut HeaderCursor,
    external: Option<&[Arc<[u8]>]>,
    range_limit: u64,
    limits: &ResourceLimits,
) -> Result<StreamsInfo> {
    let mut table = FolderTable::default();
    let mut id = cur.read_id()?;

    if id == property_id::PACK_INFO {
        table.data_offset = cur.read_number()?;
        if table.data_offset > range_limit {
            return Err(cur.corrupt("pack data starts past the header"));
        }
        read_pack_info(cur, &mut table, limits)?;
        if table.total_pack_size() > range_limit - table.data_offset {
            return Err(cur.corrupt("pack data overlaps the header"));
        }
        id = cur.read_id()?;
    }

    if id == property_id::UNPACK_INFO {
        read_unpack_info(cur, external, &mut table, limits)?;
        id = cur.read_id()?;
    }

    let (unpack_sizes, digests) = if id == property_id::SUBSTREAMS_INFO {
        let sub = read_substreams_info(cur, &mut table, limits)?;
        id = cur.read_id()?;
        sub
    } else {
        table.num_unpack_streams = vec![1; table.num_folders()];
        let sizes = (0..table.num_folders())
            .map(|f| table.folder_unpack_size(f))
            .collect();
        (sizes, table.folder_crcs.clone())
    };

    if id != property_id::END {
        return Err(cur.corrupt("streams info not terminated"));
    }
    log::debug!(
        "streams info: {} pack streams, {} folders, {} substreams",
        table.num_pack_streams(),
        table.num_folders(),
        unpack_sizes.len()
    );
    Ok(StreamsInfo {
        folders: table,
        unpack_sizes,
        digests,
    })
}

fn read_pack_info(
    cur: &mut HeaderCursor,
    table: &mut FolderTable,
    limits: &ResourceLimits,
) -> Result<()> {
    let num = cur.read_num()? as usize;
    limits.check_entries("pack streams", num)?;
    wait_id(cur, property_id::SIZE)?;
    if num > cur.remaining() {
        return Err(Error::EndOfData {
            context: "pack sizes",
        });
    }

    table.pack_positions = Vec::with_capacity(num + 1);
    table.pack_positions.push(0);
    let mut sum = 0u64;
    for _ in 0..num {
        let size = cur.read_number()?;
        sum = sum
            .checked_add(size)
            .ok_or_else(|| cur.corrupt("pack sizes overflow"))?;
        table.pack_positions.push(sum);
    }
    table.pack_crcs = vec![None; num];

    loop {
        let id = cur.read_id()?;
        if id == property_id::END {
            return Ok(());
        }
        if id == property_id::CRC {
            table.pack_crcs = read_digests(cur, num)?;
            continue;
        }
        cur.skip_data()?;
    }
}

fn read_unpack_info(
    cur: &mut HeaderCursor,
    external: Option<&[Arc<[u8]>]>,
    table: &mut FolderTable,
    limits: &ResourceLimits,
) -> Result<()> {
    wait_id(cur, property_id::FOLDER)?;
    let num_folders = cur.read_num()? as usize;
    limits.check_entries("folders", num_folders)?;

    let total_pack = table.num_pack_streams();
    let mut num_coders = 0usize;
    {
        let mut sw = cur.switch_external(external)?;
        if num_folders > sw.remaining() {
            return Err(Error::EndOfData {
                context: "folder descriptions",
            });
        }
        let start = sw.position();
        for _ in 0..num_folders {
            let scan = scan_folder(&mut *sw, &mut table.methods)?;
            let pack_index = table.start_pack_stream[table.start_pack_stream.len() - 1];
            if scan.num_pack_streams > total_pack - pack_index {
                return Err(sw.corrupt("folder uses more pack streams than declared"));
            }
            num_coders += scan.num_coders;
            table.start_pack_stream.push(pack_index + scan.num_pack_streams);
            table.coder_unpack_offsets.push(num_coders);
            table.coders_data_offsets.push(sw.position() - start);
            table.main_coders.push(scan.main_coder);
        }
        table.coders_data = sw.buffer()[start..sw.position()].to_vec();
    }

    wait_id(cur, property_id::CODERS_UNPACK_SIZE)?;
    if num_coders > cur.remaining() {
        return Err(Error::EndOfData {
            context: "coder unpack sizes",
        });
    }
    table.coder_unpack_sizes = (0..num_coders)
        .map(|_| cur.read_number())
        .collect::<Result<_>>()?;
    table.folder_crcs = vec![None; num_folders];

    loop {
        let id = cur.read_id()?;
        if id == property_id::END {
            return Ok(());
        }
        if id == property_id::CRC {
            table.folder_crcs = read_digests(cur, num_folders)?;
            continue;
        }
        cur.skip_data()?;
    }
}

/// Reads SubStreamsInfo; returns the substream sizes and digests.
fn read_substreams_info(
    cur: &mut HeaderCursor,
    table: &mut FolderTable,
    limits: &ResourceLimits,
) -> Result<(Vec<u64>, Vec<Option<u32>>)> {
    let num_folders = table.num_folders();
    table.num_unpack_streams = vec![1; num_folders];

    let mut id;
    loop {
        id = cur.read_id()?;
        if id == property_id::NUM_UNPACK_STREAM {
            let mut total = 0usize;
            for f in 0..num_folders {
                let n = cur.read_num()?;
                total = total.saturating_add(n as usize);
                table.num_unpack_streams[f] = n;
            }
            limits.check_entries("substreams", total)?;
            continue;
        }
        if id == property_id::CRC || id == property_id::SIZE || id == property_id::END {
            break;
        }
        cur.skip_data()?;
    }

    let mut sizes = Vec::new();
    if id == property_id::SIZE {
        for f in 0..num_folders {
            let count = table.num_unpack_streams[f];
            if count == 0 {
                continue;
            }
            let mut sum = 0u64;
            for _ in 1..count {
                let size = cur.read_number()?;
                sum = sum
                    .checked_add(size)
                    .ok_or_else(|| cur.corrupt("substream sizes overflow"))?;
                sizes.push(size);
            }
            let folder_size = table.folder_unpack_size(f);
            if folder_size < sum {
                return Err(cur.corrupt("substreams larger than their folder"));
            }
            sizes.push(folder_size - sum);
        }
        id = cur.read_id()?;
    } else {
        for f in 0..num_folders {
            match table.num_unpack_streams[f] {
                0 => {}
                1 => sizes.push(table.folder_unpack_size(f)),
                _ => return Err(cur.corrupt("substream sizes missing")),
            }
        }
    }

    let inherits = |table: &FolderTable, f: usize| {
        table.num_unpack_streams[f] == 1 && table.folder_crcs.get(f).copied().flatten().is_some()
    };
    let num_digests: usize = (0..num_folders)
        .filter(|&f| !inherits(table, f))
        .map(|f| table.num_unpack_streams[f] as usize)
        .sum();

    let mut digests: Vec<Option<u32>> = Vec::new();
    while id != property_id::END {
        if id == property_id::CRC {
            let defined = cur.read_all_or_bits(num_digests)?;
            digests.clear();
            let mut k = 0;
            for f in 0..num_folders {
                if inherits(table, f) {
                    digests.push(table.folder_crcs[f]);
                    continue;
                }
                for _ in 0..table.num_unpack_streams[f] {
                    let value = if defined.get(k).copied().unwrap_or(false) {
                        Some(cur.read_u32_le()?)
                    } else {
                        None
                    };
                    digests.push(value);
                    k += 1;
                }
            }
        } else {
            cur.skip_data()?;
        }
        id = cur.read_id()?;
    }

    if digests.len() != sizes.len() {
        digests.clear();
        for f in 0..num_folders {
            if inherits(table, f) {
                digests.push(table.folder_crcs[f]);
            } else {
                digests.extend(std::iter::repeat_n(None, table.num_unpack_streams[f] as usize));
            }
        }
        digests.resize(sizes.len(), None);
    }
    Ok((sizes, digests))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use crate::format::reader::{write_all_or_bits, write_number};

    fn cursor(bytes: Vec<u8>) -> HeaderCursor {
        HeaderCursor::new(Arc::from(bytes))
    }

    fn num(buf: &mut Vec<u8>, v: u64) {
        write_number(buf, v);
    }

    /// PackInfo + UnpackInfo for one COPY folder per size.
    fn copy_streams(sizes: &[u64], folder_crcs: &[Option<u32>]) -> Vec<u8> {
        let mut b = Vec::new();
        num(&mut b, property_id::PACK_INFO);
        num(&mut b, 0);
        num(&mut b, sizes.len() as u64);
        num(&mut b, property_id::SIZE);
        for &s in sizes {
            num(&mut b, s);
        }
        num(&mut b, property_id::END);
        num(&mut b, property_id::UNPACK_INFO);
        num(&mut b, property_id::FOLDER);
        num(&mut b, sizes.len() as u64);
        b.push(0);
        for _ in sizes {
            b.extend_from_slice(&[0x01, 0x01, 0x00]);
        }
        num(&mut b, property_id::CODERS_UNPACK_SIZE);
        for &s in sizes {
            num(&mut b, s);
        }
        if !folder_crcs.is_empty() {
            num(&mut b, property_id::CRC);
            let defined: Vec<bool> = folder_crcs.iter().map(Option::is_some).collect();
            write_all_or_bits(&mut b, &defined);
            for crc in folder_crcs.iter().flatten() {
                b.extend_from_slice(&crc.to_le_bytes());
            }
        }
        num(&mut b, property_id::END);
        b
    }

    #[test]
    fn test_folders_without_substreams() {
        let mut b = copy_streams(&[10, 20], &[Some(0xAA), Some(0xBB)]);
        num(&mut b, property_id::END);
        let info =
            read_streams_info(&mut cursor(b), None, 1000, &ResourceLimits::default()).unwrap();
        assert_eq!(info.folders.num_folders(), 2);
        assert_eq!(info.folders.pack_positions, vec![0, 10, 30]);
        assert_eq!(info.folders.folder_data_range(1), 10..30);
        assert_eq!(info.unpack_sizes, vec![10, 20]);
        assert_eq!(info.digests, vec![Some(0xAA), Some(0xBB)]);
        assert_eq!(info.folders.num_unpack_streams, vec![1, 1]);
        let folder = info.folders.parse_folder(1).unwrap();
        assert_eq!(folder.pack_streams, vec![0]);
    }

    #[test]
    fn test_substream_sizes_and_crc_inheritance() {
        // Folder 0 holds 3 substreams; folder 1 holds 1 and inherits its folder CRC.
        let mut b = copy_streams(&[30, 5], &[None, Some(0x22)]);
        num(&mut b, property_id::SUBSTREAMS_INFO);
        num(&mut b, property_id::NUM_UNPACK_STREAM);
        num(&mut b, 3);
        num(&mut b, 1);
        num(&mut b, property_id::SIZE);
        num(&mut b, 10);
        num(&mut b, 15);
        num(&mut b, property_id::CRC);
        b.push(0);
        b.push(0b1010_0000);
        b.extend_from_slice(&1u32.to_le_bytes());
        b.extend_from_slice(&3u32.to_le_bytes());
        num(&mut b, property_id::END);
        num(&mut b, property_id::END);

        let info =
            read_streams_info(&mut cursor(b), None, 1000, &ResourceLimits::default()).unwrap();
        assert_eq!(info.unpack_sizes, vec![10, 15, 5, 5]);
        assert_eq!(info.digests, vec![Some(1), None, Some(3), Some(0x22)]);
    }

    #[test]
    fn test_substream_sum_exceeds_folder() {
        let mut b = copy_streams(&[10], &[]);
        num(&mut b, property_id::SUBSTREAMS_INFO);
        num(&mut b, property_id::NUM_UNPACK_STREAM);
        num(&mut b, 2);
        num(&mut b, property_id::SIZE);
        num(&mut b, 11);
        num(&mut b, property_id::END);
        num(&mut b, property_id::END);
        let err = read_streams_info(&mut cursor(b), None, 1000, &ResourceLimits::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Incorrect);
    }

    #[test]
    fn test_multiple_substreams_need_sizes() {
        let mut b = copy_streams(&[10], &[]);
        num(&mut b, property_id::SUBSTREAMS_INFO);
        num(&mut b, property_id::NUM_UNPACK_STREAM);
        num(&mut b, 2);
        num(&mut b, property_id::END);
        num(&mut b, property_id::END);
        let err = read_streams_info(&mut cursor(b), None, 1000, &ResourceLimits::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Incorrect);
    }

    #[test]
    fn test_empty_folder_substreams() {
        let mut b = copy_streams(&[10, 4], &[]);
        num(&mut b, property_id::SUBSTREAMS_INFO);
        num(&mut b, property_id::NUM_UNPACK_STREAM);
        num(&mut b, 0);
        num(&mut b, 1);
        num(&mut b, property_id::END);
        num(&mut b, property_id::END);
        let info =
            read_streams_info(&mut cursor(b), None, 1000, &ResourceLimits::default()).unwrap();
        assert_eq!(info.unpack_sizes, vec![4]);
        assert_eq!(info.digests, vec![None]);
    }

    #[test]
    fn test_pack_range_checks() {
        let mut b = copy_streams(&[10, 20], &[]);
        num(&mut b, property_id::END);
        let err = read_streams_info(&mut cursor(b.clone()), None, 29, &ResourceLimits::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Incorrect);
        assert!(
            read_streams_info(&mut cursor(b), None, 30, &ResourceLimits::default()).is_ok()
        );
    }

    #[test]
    fn test_pack_size_overflow() {
        let mut b = Vec::new();
        num(&mut b, property_id::PACK_INFO);
        num(&mut b, 0);
        num(&mut b, 2);
        num(&mut b, property_id::SIZE);
        num(&mut b, u64::MAX);
        num(&mut b, 1);
        num(&mut b, property_id::END);
        let err = read_streams_info(&mut cursor(b), None, u64::MAX, &ResourceLimits::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Incorrect);
    }

    #[test]
    fn test_folder_pack_streams_exceed_pack_info() {
        let mut b = Vec::new();
        num(&mut b, property_id::PACK_INFO);
        num(&mut b, 0);
        num(&mut b, 1);
        num(&mut b, property_id::SIZE);
        num(&mut b, 5);
        num(&mut b, property_id::END);
        num(&mut b, property_id::UNPACK_INFO);
        num(&mut b, property_id::FOLDER);
        num(&mut b, 2);
        b.push(0);
        b.extend_from_slice(&[0x01, 0x01, 0x00, 0x01, 0x01, 0x00]);
        let err = read_streams_info(&mut cursor(b), None, 100, &ResourceLimits::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Incorrect);
    }

    #[test]
    fn test_wait_id_stops_at_end() {
        let mut b = Vec::new();
        num(&mut b, 0x30);
        num(&mut b, 2);
        b.extend_from_slice(&[9, 9]);
        num(&mut b, property_id::END);
        let err = wait_id(&mut cursor(b), property_id::SIZE).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Incorrect);
    }

    #[test]
    fn test_entry_limit() {
        let mut b = copy_streams(&[1, 2, 3], &[]);
        num(&mut b, property_id::END);
        let limits = ResourceLimits::default().max_entries(2);
        let err = read_streams_info(&mut cursor(b), None, 100, &limits).unwrap_err();
        assert!(matches!(err, Error::ResourceLimitExceeded(_)));
    }
}
