//! Archive entry type.

use crate::format::files::FileEntry;

/// An entry in a 7z archive.
///
/// This struct is marked `#[non_exhaustive]` to allow adding new fields
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct Entry {
    /// The path stored in the archive.
    pub path: String,
    /// Whether this entry is a directory.
    pub is_directory: bool,
    /// Uncompressed size in bytes.
    pub size: u64,
    /// CRC-32 of the entry's data, when stored.
    pub crc32: Option<u32>,
    /// Modification time as Windows FILETIME (100-nanosecond intervals since 1601-01-01).
    pub modification_time: Option<u64>,
    /// Creation time as Windows FILETIME.
    pub creation_time: Option<u64>,
    /// Access time as Windows FILETIME.
    pub access_time: Option<u64>,
    /// Windows file attributes.
    pub attributes: Option<u32>,
    /// Whether this is an anti-item (marks a file for deletion in incremental backups).
    pub is_anti: bool,
    /// Position of the entry's data inside a larger stream, when stored.
    pub start_pos: Option<u64>,
    pub(crate) index: usize,
    pub(crate) has_stream: bool,
    pub(crate) folder_index: Option<usize>,
}

impl Entry {
    pub(crate) fn from_file(index: usize, file: &FileEntry, folder_index: Option<usize>) -> Self {
        Self {
            path: file.name.clone(),
            is_directory: file.is_dir || file.has_directory_attribute(),
            size: file.size,
            crc32: file.crc,
            modification_time: file.mtime,
            creation_time: file.ctime,
            access_time: file.atime,
            attributes: file.attributes,
            is_anti: file.is_anti,
            start_pos: file.start_pos,
            index,
            has_stream: file.has_stream,
            folder_index: folder_index.filter(|_| file.has_stream),
        }
    }

    /// Returns the stored path.
    pub fn name(&self) -> &str {
        &self.path
    }

    /// Returns the last path component.
    pub fn file_name(&self) -> &str {
        self.path
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&self.path)
    }

    /// Returns true if this is a file (not a directory).
    pub fn is_file(&self) -> bool {
        !self.is_directory
    }

    /// Returns true if the entry has data in a folder.
    pub fn has_data(&self) -> bool {
        self.has_stream
    }

    /// Returns the index of the entry in the archive.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns the folder holding the entry's data.
    pub fn folder_index(&self) -> Option<usize> {
        self.folder_index
    }
}
