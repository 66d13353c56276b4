//! Write options and configuration for archive creation.

use crate::codec::bcj2::Bcj2EncoderOptions;
use crate::codec::method;
use crate::codec::pipeline::FolderLayout;
use crate::format::attributes;

/// Folder layout used for file data.
///
/// # Example
///
/// ```rust
/// use zesven_core::write::{WriteMethod, WriteOptions};
///
/// let options = WriteOptions::new().method(WriteMethod::Bcj2).solid(false);
/// assert_eq!(options.method, WriteMethod::Bcj2);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum WriteMethod {
    /// Data stored as is.
    Copy,
    /// LZMA.
    Lzma,
    /// LZMA2.
    #[default]
    Lzma2,
    /// BCJ2 filter over LZMA2, with LZMA on the CALL and JUMP streams.
    ///
    /// Produces a four-coder folder with four pack streams.
    Bcj2,
}

impl WriteMethod {
    /// Returns the folder layout for this method.
    pub fn layout(self) -> FolderLayout {
        match self {
            WriteMethod::Copy => FolderLayout::single(method::COPY),
            WriteMethod::Lzma => FolderLayout::single(method::LZMA),
            WriteMethod::Lzma2 => FolderLayout::single(method::LZMA2),
            WriteMethod::Bcj2 => FolderLayout::bcj2(),
        }
    }
}

/// Options for [`Writer`](super::Writer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOptions {
    /// Folder layout for file data.
    pub method: WriteMethod,
    /// Compression level (0-9).
    pub level: u32,
    /// Pack all files into one folder instead of one folder per file.
    pub solid: bool,
    /// Store the header LZMA-compressed behind an encoded-header record.
    pub compress_header: bool,
    /// BCJ2 encoder settings.
    pub bcj2: Bcj2EncoderOptions,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            method: WriteMethod::default(),
            level: 5,
            solid: true,
            compress_header: false,
            bcj2: Bcj2EncoderOptions::default(),
        }
    }
}

impl WriteOptions {
    /// Creates new write options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the folder layout.
    pub fn method(mut self, method: WriteMethod) -> Self {
        self.method = method;
        self
    }

    /// Sets the compression level, clamping values above 9.
    ///
    /// ```rust
    /// use zesven_core::write::WriteOptions;
    ///
    /// assert_eq!(WriteOptions::new().level(7).level, 7);
    /// assert_eq!(WriteOptions::new().level(15).level, 9);
    /// ```
    pub fn level(mut self, level: u32) -> Self {
        self.level = level.min(9);
        self
    }

    /// Enables or disables solid mode.
    pub fn solid(mut self, solid: bool) -> Self {
        self.solid = solid;
        self
    }

    /// Enables or disables header compression.
    pub fn compress_header(mut self, compress: bool) -> Self {
        self.compress_header = compress;
        self
    }

    /// Sets the BCJ2 encoder settings.
    pub fn bcj2(mut self, options: Bcj2EncoderOptions) -> Self {
        self.bcj2 = options;
        self
    }
}

/// Metadata for an entry being written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryMeta {
    /// Modification time as Windows FILETIME.
    pub modification_time: Option<u64>,
    /// Windows file attributes.
    pub attributes: Option<u32>,
}

impl EntryMeta {
    /// Creates empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets modification time.
    pub fn modification_time(mut self, time: u64) -> Self {
        self.modification_time = Some(time);
        self
    }

    /// Sets attributes.
    pub fn attributes(mut self, attrs: u32) -> Self {
        self.attributes = Some(attrs);
        self
    }

    pub(crate) fn directory_attributes(self) -> Self {
        let attrs = self.attributes.unwrap_or(0) | attributes::DIRECTORY;
        self.attributes(attrs)
    }
}

/// Statistics of a finished archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteSummary {
    /// Number of entries written.
    pub entries_written: usize,
    /// Number of folders written.
    pub folders_written: usize,
    /// Total uncompressed size of file data.
    pub unpacked_size: u64,
    /// Total size of packed file data.
    pub packed_size: u64,
    /// Size of the header as stored, including its packed stream if any.
    pub header_size: u64,
    /// Total archive size in bytes.
    pub archive_size: u64,
}
