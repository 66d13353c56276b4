//! Archive information types.

use crate::codec::method;

use super::Archive;

/// Information about an opened archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveInfo {
    /// Total number of entries (files and directories).
    pub entry_count: usize,
    /// Number of entries with data.
    pub file_count: usize,
    /// Number of directory entries.
    pub dir_count: usize,
    /// Total uncompressed size of all files.
    pub total_size: u64,
    /// Total compressed size of packed data.
    pub packed_size: u64,
    /// Number of folders (compression blocks).
    pub folder_count: usize,
    /// Whether any folder holds more than one file.
    pub is_solid: bool,
    /// Names of the methods used, in method id order.
    pub methods: Vec<&'static str>,
    /// Ids of methods this build cannot decode.
    pub unsupported_methods: Vec<u64>,
    /// Largest LZMA dictionary size used.
    pub lzma_max_dict: Option<u32>,
    /// Largest LZMA2 dictionary property used.
    pub lzma2_max_prop: Option<u8>,
    /// Size of the headers in bytes.
    pub headers_size: u64,
    /// Physical size of the archive.
    pub phys_size: u64,
}

impl ArchiveInfo {
    /// Returns the compression ratio (packed / unpacked).
    pub fn compression_ratio(&self) -> f64 {
        if self.total_size == 0 {
            1.0
        } else {
            self.packed_size as f64 / self.total_size as f64
        }
    }

    /// Returns the space savings percentage.
    pub fn space_savings(&self) -> f64 {
        if self.total_size == 0 {
            0.0
        } else {
            1.0 - self.compression_ratio()
        }
    }

    /// Returns the LZMA2 dictionary size encoded by [`lzma2_max_prop`](Self::lzma2_max_prop).
    pub fn lzma2_max_dict(&self) -> Option<u32> {
        self.lzma2_max_prop.and_then(method::lzma2_dict_size)
    }
}

impl<R> Archive<R> {
    /// Returns summary information about the archive.
    pub fn info(&self) -> ArchiveInfo {
        let stats = self.db.methods();
        ArchiveInfo {
            entry_count: self.entries.len(),
            file_count: self.entries.iter().filter(|e| e.has_data()).count(),
            dir_count: self.entries.iter().filter(|e| e.is_directory).count(),
            total_size: self.db.total_unpack_size(),
            packed_size: self.db.folders().total_pack_size(),
            folder_count: self.db.num_folders(),
            is_solid: self.db.is_solid(),
            methods: stats.method_ids.iter().map(|&id| method::name(id)).collect(),
            unsupported_methods: stats
                .method_ids
                .iter()
                .copied()
                .filter(|&id| !method::is_supported(id))
                .collect(),
            lzma_max_dict: stats.lzma_max_dict,
            lzma2_max_prop: stats.lzma2_max_prop,
            headers_size: self.report.headers_size,
            phys_size: self.report.phys_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_info_compression_ratio() {
        let info = ArchiveInfo {
            total_size: 1000,
            packed_size: 500,
            ..Default::default()
        };
        assert!((info.compression_ratio() - 0.5).abs() < 0.001);
        assert!((info.space_savings() - 0.5).abs() < 0.001);
    }

    #[test]
    fn test_archive_info_empty() {
        let info = ArchiveInfo::default();
        assert!((info.compression_ratio() - 1.0).abs() < 0.001);
        assert!((info.space_savings() - 0.0).abs() < 0.001);
    }

    #[test]
    fn test_lzma2_dict_from_prop() {
        let dict = |p| ArchiveInfo {
            lzma2_max_prop: Some(p),
            ..Default::default()
        }
        .lzma2_max_dict();
        assert_eq!(dict(0), Some(4096));
        assert_eq!(dict(1), Some(6144));
        assert_eq!(dict(16), Some(1 << 20));
        assert_eq!(dict(40), Some(u32::MAX));
        assert_eq!(dict(41), None);
    }

    #[test]
    fn test_info_of_written_archive() {
        use crate::read::Archive;
        use crate::write::{WriteMethod, WriteOptions, Writer};
        use std::io::Cursor;

        let mut bytes = Vec::new();
        let mut writer = Writer::new(Cursor::new(&mut bytes))
            .options(WriteOptions::new().method(WriteMethod::Copy).solid(true));
        writer.add_bytes("a", b"0123456789").unwrap();
        writer.add_bytes("b", b"abcdef").unwrap();
        writer.add_directory("d").unwrap();
        writer.add_empty_file("e").unwrap();
        writer.finish().unwrap();

        let archive = Archive::open(Cursor::new(bytes)).unwrap();
        let info = archive.info();
        assert_eq!(info.entry_count, 4);
        assert_eq!(info.file_count, 2);
        assert_eq!(info.dir_count, 1);
        assert_eq!(info.total_size, 16);
        assert_eq!(info.packed_size, 16);
        assert_eq!(info.folder_count, 1);
        assert!(info.is_solid);
        assert_eq!(info.methods, vec!["Copy"]);
        assert!(info.unsupported_methods.is_empty());
    }
}
