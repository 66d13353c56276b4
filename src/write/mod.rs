//! Archive writing API for 7z archives.
//!
//! The writer collects entries in memory and lays the archive out on
//! [`Writer::finish`]: signature header, pack streams of every folder, an
//! optional packed header, then the header itself.
//!
//! # Example
//!
//! ```rust
//! use zesven_core::write::{EntryMeta, WriteMethod, WriteOptions, Writer};
//! use std::io::Cursor;
//!
//! let mut bytes = Vec::new();
//! let mut writer = Writer::new(Cursor::new(&mut bytes))
//!     .options(WriteOptions::new().method(WriteMethod::Copy).solid(false));
//! writer.add_bytes_with_meta("notes.txt", b"remember", EntryMeta::new().modification_time(1))?;
//! writer.add_directory("empty")?;
//! let summary = writer.finish()?;
//! assert_eq!(summary.entries_written, 2);
//! assert_eq!(summary.archive_size, bytes.len() as u64);
//! # Ok::<(), zesven_core::Error>(())
//! ```

mod header_encode;
pub(crate) mod options;

pub use options::{EntryMeta, WriteMethod, WriteOptions, WriteSummary};

use std::io::{Seek, SeekFrom, Write};

use crate::checksum::Crc32;
use crate::codec::method;
use crate::codec::pipeline::{EncodedFolder, FolderLayout, encode_folder};
use crate::format::SIGNATURE_HEADER_SIZE;
use crate::format::header::StartHeader;
use crate::{Error, Result};

use header_encode::{FileRecord, FolderRecord, encode_encoded_header, encode_header};

#[cfg(feature = "lzma")]
const HEADER_METHOD: u64 = method::LZMA;
#[cfg(not(feature = "lzma"))]
const HEADER_METHOD: u64 = method::COPY;

/// Files buffered for the solid folder.
#[derive(Debug, Default)]
struct SolidBuffer {
    data: Vec<u8>,
    sizes: Vec<u64>,
    crcs: Vec<u32>,
}

/// Builds a 7z archive.
pub struct Writer<W: Write + Seek> {
    sink: W,
    options: WriteOptions,
    files: Vec<FileRecord>,
    folders: Vec<FolderRecord>,
    solid: SolidBuffer,
}

impl<W: Write + Seek> std::fmt::Debug for Writer<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Writer")
            .field("options", &self.options)
            .field("files", &self.files.len())
            .field("folders", &self.folders.len())
            .finish_non_exhaustive()
    }
}

impl<W: Write + Seek> Writer<W> {
    /// Creates a writer. The archive starts at the sink's position when
    /// [`finish`](Self::finish) is called.
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            options: WriteOptions::default(),
            files: Vec::new(),
            folders: Vec::new(),
            solid: SolidBuffer::default(),
        }
    }

    /// Sets the write options.
    ///
    /// Applies to entries added afterwards; the solid folder uses the
    /// options in effect at [`finish`](Self::finish).
    pub fn options(mut self, options: WriteOptions) -> Self {
        self.options = options;
        self
    }

    fn check_name(name: &str) -> Result<()> {
        if name.contains('\0') {
            return Err(Error::UnsupportedFeature {
                feature: "NUL character in entry name",
            });
        }
        Ok(())
    }

    fn encode(&self, data: &[u8], sizes: &[u64]) -> Result<EncodedFolder> {
        encode_folder(
            &self.options.method.layout(),
            data,
            self.options.level,
            sizes,
            &self.options.bcj2,
        )
    }

    /// Adds a file with the given contents. Empty contents make an empty
    /// file entry without data.
    pub fn add_bytes(&mut self, name: &str, data: &[u8]) -> Result<()> {
        self.add_bytes_with_meta(name, data, EntryMeta::default())
    }

    /// Adds a file with metadata.
    pub fn add_bytes_with_meta(&mut self, name: &str, data: &[u8], meta: EntryMeta) -> Result<()> {
        Self::check_name(name)?;
        let has_stream = !data.is_empty();
        if has_stream {
            let crc = Crc32::compute(data);
            if self.options.solid {
                self.solid.data.extend_from_slice(data);
                self.solid.sizes.push(data.len() as u64);
                self.solid.crcs.push(crc);
            } else {
                let sizes = [data.len() as u64];
                let encoded = self.encode(data, &sizes)?;
                self.folders.push(FolderRecord {
                    encoded,
                    folder_crc: None,
                    sub_sizes: sizes.to_vec(),
                    sub_crcs: vec![crc],
                });
            }
        }
        self.files.push(FileRecord {
            name: name.to_owned(),
            has_stream,
            is_dir: false,
            is_anti: false,
            meta,
        });
        Ok(())
    }

    /// Adds an empty file.
    pub fn add_empty_file(&mut self, name: &str) -> Result<()> {
        self.add_bytes(name, &[])
    }

    /// Adds a directory.
    pub fn add_directory(&mut self, name: &str) -> Result<()> {
        self.add_directory_with_meta(name, EntryMeta::default())
    }

    /// Adds a directory with metadata. The directory attribute is always set.
    pub fn add_directory_with_meta(&mut self, name: &str, meta: EntryMeta) -> Result<()> {
        Self::check_name(name)?;
        self.files.push(FileRecord {
            name: name.to_owned(),
            has_stream: false,
            is_dir: true,
            is_anti: false,
            meta: meta.directory_attributes(),
        });
        Ok(())
    }

    /// Adds an anti-item, marking `name` for deletion when the archive is
    /// applied as an update.
    pub fn add_anti(&mut self, name: &str, is_dir: bool) -> Result<()> {
        Self::check_name(name)?;
        self.files.push(FileRecord {
            name: name.to_owned(),
            has_stream: false,
            is_dir,
            is_anti: true,
            meta: EntryMeta::default(),
        });
        Ok(())
    }

    fn flush_solid(&mut self) -> Result<()> {
        if self.solid.sizes.is_empty() {
            return Ok(());
        }
        let solid = std::mem::take(&mut self.solid);
        let encoded = self.encode(&solid.data, &solid.sizes)?;
        let folder_crc = (solid.sizes.len() > 1).then(|| Crc32::compute(&solid.data));
        self.folders.push(FolderRecord {
            encoded,
            folder_crc,
            sub_sizes: solid.sizes,
            sub_crcs: solid.crcs,
        });
        Ok(())
    }

    fn write_pack_streams(&mut self, encoded: &EncodedFolder) -> Result<u64> {
        let mut written = 0;
        for stream in &encoded.pack_streams {
            self.sink.write_all(stream)?;
            written += stream.len() as u64;
        }
        Ok(written)
    }

    /// Writes the archive and returns its statistics.
    pub fn finish(mut self) -> Result<WriteSummary> {
        self.flush_solid()?;
        let base = self.sink.stream_position()?;
        self.sink.write_all(&[0u8; SIGNATURE_HEADER_SIZE as usize])?;

        let folders = std::mem::take(&mut self.folders);
        let mut packed_size = 0u64;
        for record in &folders {
            packed_size += self.write_pack_streams(&record.encoded)?;
        }

        let mut header = Vec::new();
        let mut header_pack_size = 0u64;
        if !self.files.is_empty() {
            let raw = encode_header(&folders, &self.files);
            header = if self.options.compress_header {
                let encoded = encode_folder(
                    &FolderLayout::single(HEADER_METHOD),
                    &raw,
                    self.options.level,
                    &[],
                    &self.options.bcj2,
                )?;
                header_pack_size = self.write_pack_streams(&encoded)?;
                let record = FolderRecord {
                    encoded,
                    folder_crc: Some(Crc32::compute(&raw)),
                    sub_sizes: vec![raw.len() as u64],
                    sub_crcs: Vec::new(),
                };
                log::debug!("header packed from {} to {header_pack_size} bytes", raw.len());
                encode_encoded_header(packed_size, &record)
            } else {
                raw
            };
        }
        self.sink.write_all(&header)?;

        let next_header_offset = packed_size + header_pack_size;
        let next_header_crc = if header.is_empty() {
            0
        } else {
            Crc32::compute(&header)
        };
        let start = StartHeader::encode(next_header_offset, header.len() as u64, next_header_crc);
        let end = base + SIGNATURE_HEADER_SIZE + next_header_offset + header.len() as u64;
        self.sink.seek(SeekFrom::Start(base))?;
        self.sink.write_all(&start)?;
        self.sink.seek(SeekFrom::Start(end))?;
        self.sink.flush()?;

        let summary = WriteSummary {
            entries_written: self.files.len(),
            folders_written: folders.len(),
            unpacked_size: folders.iter().flat_map(|f| &f.sub_sizes).sum(),
            packed_size,
            header_size: header_pack_size + header.len() as u64,
            archive_size: end - base,
        };
        log::debug!(
            "wrote archive: {} entries in {} folders, {} bytes",
            summary.entries_written,
            summary.folders_written,
            summary.archive_size
        );
        Ok(summary)
    }
}
