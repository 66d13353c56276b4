//! Header section state machine.
//!
//! A next-header blob starts with either `Header` or `EncodedHeader`. An
//! encoded header is a streams-info section whose single folder decodes to
//! the real `Header`. Inside `Header` the sections appear in a fixed order:
//! `ArchiveProperties`, `AdditionalStreamsInfo`, `MainStreamsInfo`,
//! `FilesInfo`, each optional, then `End`.

use std::io::{Read, Seek, SeekFrom};
use std::sync::Arc;

use crate::codec::pipeline::{PipelineOptions, decode_folder};
use crate::progress::NoProgress;
use crate::{Error, ErrorKind, Result};

use super::database::Database;
use super::files::read_files_info;
use super::property_id;
use super::reader::ByteWindow;
use super::streams::{ResourceLimits, read_streams_info};
use super::switch::HeaderCursor;

/// Result of parsing a next-header blob.
#[derive(Debug, Clone, Default)]
pub struct ParsedHeader {
    /// The archive database.
    pub db: Database,
    /// Packed bytes of encoded header and additional streams folders.
    pub packed_headers_size: u64,
    /// The blob was an `EncodedHeader`.
    pub encoded: bool,
}

/// Where the parser reads packed header data from.
struct PackSource<'a, R> {
    source: &'a mut R,
    /// Absolute position of the first byte after the signature header.
    base_offset: u64,
    /// Size of the area before the next header.
    range_limit: u64,
    limits: &'a ResourceLimits,
    pipeline: &'a PipelineOptions,
    packed_headers_size: u64,
}

impl<R: Read + Seek> PackSource<'_, R> {
    /// Reads a streams-info section and decodes every folder it describes
    /// into memory.
    fn decode_packed_streams(&mut self, cur: &mut HeaderCursor) -> Result<Vec<Arc<[u8]>>> {
        let info = read_streams_info(cur, None, self.range_limit, self.limits)?;
        let table = &info.folders;
        let mut buffers = Vec::with_capacity(table.num_folders());

        for f in 0..table.num_folders() {
            let unpack_size = table.folder_unpack_size(f);
            if unpack_size > self.limits.max_header_bytes {
                return Err(Error::ResourceLimitExceeded(format!(
                    "header folder unpacks to {unpack_size} bytes"
                )));
            }
            let range = table.folder_data_range(f);
            let packed_len = range.end - range.start;
            if packed_len > self.limits.max_pack_read {
                return Err(Error::ResourceLimitExceeded(format!(
                    "header folder packs {packed_len} bytes"
                )));
            }

            let mut packed = vec![0u8; packed_len as usize];
            self.source.seek(SeekFrom::Start(self.base_offset + range.start))?;
            self.source.read_exact(&mut packed)?;

            let folder = table.parse_folder(f)?;
            let data = decode_folder(
                &folder,
                table.coder_sizes(f),
                &packed,
                &table.folder_pack_sizes(f),
                table.folder_crcs[f],
                self.pipeline,
                &mut NoProgress,
            )
            .map_err(header_decode_error)?;
            buffers.push(Arc::from(data));
        }

        self.packed_headers_size += table.total_pack_size();
        log::debug!("decoded {} packed header folders", buffers.len());
        Ok(buffers)
    }
}

/// A folder that carries header data and fails to decode means the header
/// is broken, not the payload.
fn header_decode_error(err: Error) -> Error {
    match err.kind() {
        ErrorKind::DataError | ErrorKind::EndOfData => {
            Error::corrupt_header(0, format!("packed header does not decode: {err}"))
        }
        _ => err,
    }
}

/// Parses a next-header blob.
///
/// `base_offset` is the absolute position right after the signature header
/// and `range_limit` the size of the area between it and the blob; packed
/// header folders must lie inside that area.
pub fn parse_header_blob<R: Read + Seek>(
    source: &mut R,
    base_offset: u64,
    blob: Vec<u8>,
    range_limit: u64,
    limits: &ResourceLimits,
    pipeline: &PipelineOptions,
) -> Result<ParsedHeader> {
    let mut pack = PackSource {
        source,
        base_offset,
        range_limit,
        limits,
        pipeline,
        packed_headers_size: 0,
    };

    let mut cur = HeaderCursor::new(Arc::from(blob));
    let mut encoded = false;
    let id = cur.read_id()?;
    if id == property_id::ENCODED_HEADER {
        let mut buffers = pack.decode_packed_streams(&mut cur)?;
        if buffers.is_empty() {
            return Ok(ParsedHeader {
                packed_headers_size: pack.packed_headers_size,
                encoded: true,
                ..ParsedHeader::default()
            });
        }
        if buffers.len() > 1 {
            return Err(cur.corrupt("encoded header decodes to more than one buffer"));
        }
        let header_error = cur.header_error();
        cur = HeaderCursor::new(buffers.remove(0));
        if header_error {
            cur.set_header_error("encoded header wrapper");
        }
        if cur.read_id()? != property_id::HEADER {
            return Err(cur.corrupt("decoded header does not start with Header"));
        }
        encoded = true;
        log::debug!("encoded header decoded");
    } else if id != property_id::HEADER {
        return Err(cur.corrupt(format!("unexpected header type {id:#x}")));
    }

    let mut db = read_header(&mut cur, &mut pack)?;
    db.data_start = base_offset + db.streams.folders.data_offset;
    db.header_error |= cur.header_error();

    Ok(ParsedHeader {
        db,
        packed_headers_size: pack.packed_headers_size,
        encoded,
    })
}

fn read_archive_properties(cur: &mut HeaderCursor) -> Result<()> {
    loop {
        if cur.read_id()? == property_id::END {
            return Ok(());
        }
        cur.skip_data()?;
    }
}

fn read_header<R: Read + Seek>(
    cur: &mut HeaderCursor,
    pack: &mut PackSource<'_, R>,
) -> Result<Database> {
    let mut db = Database::default();
    let mut id = cur.read_id()?;

    if id == property_id::ARCHIVE_PROPERTIES {
        read_archive_properties(cur)?;
        id = cur.read_id()?;
    }

    let mut external: Vec<Arc<[u8]>> = Vec::new();
    if id == property_id::ADDITIONAL_STREAMS_INFO {
        external = pack.decode_packed_streams(cur)?;
        log::debug!("{} additional data blocks", external.len());
        id = cur.read_id()?;
    }

    if id == property_id::MAIN_STREAMS_INFO {
        db.streams =
            read_streams_info(cur, Some(external.as_slice()), pack.range_limit, pack.limits)?;
        id = cur.read_id()?;
    }

    let mut last = Some(id);
    if id == property_id::FILES_INFO {
        let info = read_files_info(
            cur,
            Some(external.as_slice()),
            &db.streams.unpack_sizes,
            &db.streams.digests,
            pack.limits,
        )?;
        db.files = info.files;
        db.file_property_ids = info.property_ids;
        db.unsupported_feature_warning |= info.unsupported_property;
        last = if cur.remaining() == 0 {
            None
        } else {
            Some(cur.read_id()?)
        };
    }

    db.fill_links()?;

    if last != Some(property_id::END) || cur.remaining() != 0 {
        log::warn!("header has no final End marker or trailing bytes");
        db.unsupported_feature_warning = true;
    }
    log::debug!(
        "header: {} files in {} folders",
        db.files.len(),
        db.num_folders()
    );
    Ok(db)
}
