//! The parsed archive database: folder table, file table and the links
//! between them.

use std::ops::Range;

use crate::Result;

use super::files::FileEntry;
use super::folder::MethodStats;
use super::streams::{FolderTable, StreamsInfo};

/// Everything the header describes about an archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Database {
    /// Format version (major, minor) from the signature header.
    pub version: (u8, u8),
    /// Main streams: folders, substream sizes and digests.
    pub streams: StreamsInfo,
    /// File table in archive order.
    pub files: Vec<FileEntry>,
    /// Folder of each file. Entries without data that sit between files of
    /// one folder share its index; leading ones are `None`.
    pub file_to_folder: Vec<Option<usize>>,
    /// First file index of each folder.
    pub folder_start_file: Vec<usize>,
    /// Ids of the file property blocks present in the header.
    pub file_property_ids: Vec<u64>,
    /// Tolerated inconsistencies were found while parsing.
    pub header_error: bool,
    /// Unknown properties or trailing header data were skipped.
    pub unsupported_feature_warning: bool,
    /// Absolute offset of the pack data area of the main streams.
    pub data_start: u64,
}

impl Database {
    /// Returns the folder table.
    pub fn folders(&self) -> &FolderTable {
        &self.streams.folders
    }

    /// Returns the number of folders.
    pub fn num_folders(&self) -> usize {
        self.streams.folders.num_folders()
    }

    /// Returns the method roll-ups gathered while scanning folders.
    pub fn methods(&self) -> &MethodStats {
        &self.streams.folders.methods
    }

    /// Returns true if any folder holds more than one file.
    pub fn is_solid(&self) -> bool {
        self.streams.folders.num_unpack_streams.iter().any(|&n| n > 1)
    }

    /// Returns the sum of unpacked sizes of all files.
    pub fn total_unpack_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }

    /// Returns the files stored in `folder` with their byte ranges inside the
    /// decoded folder buffer.
    pub fn folder_file_ranges(&self, folder: usize) -> Vec<(usize, Range<u64>)> {
        let Some(&start) = self.folder_start_file.get(folder) else {
            return Vec::new();
        };
        let count = self.streams.folders.num_unpack_streams[folder] as usize;
        let mut ranges = Vec::with_capacity(count);
        let mut offset = 0u64;
        for (index, file) in self.files.iter().enumerate().skip(start) {
            if ranges.len() == count {
                break;
            }
            if !file.has_stream {
                continue;
            }
            if self.file_to_folder[index] != Some(folder) {
                break;
            }
            ranges.push((index, offset..offset + file.size));
            offset += file.size;
        }
        ranges
    }

    /// Assigns every file with a stream to its folder.
    ///
    /// Files are consumed in order, skipping folders that hold no substreams.
    /// Running out of folders is an error; folders left partially filled or
    /// unused with a nonzero substream count raise the header-error flag.
    pub fn fill_links(&mut self) -> Result<()> {
        let folders = &self.streams.folders;
        let num_folders = folders.num_folders();
        let counts = &folders.num_unpack_streams;
        self.folder_start_file = vec![0; num_folders];
        self.file_to_folder = vec![None; self.files.len()];

        let mut folder = 0usize;
        let mut index_in_folder = 0u32;
        for (i, file) in self.files.iter().enumerate() {
            if index_in_folder == 0 {
                if !file.has_stream {
                    continue;
                }
                loop {
                    if folder >= num_folders {
                        return Err(crate::Error::corrupt_header(
                            0,
                            "more files with data than folder substreams",
                        ));
                    }
                    self.folder_start_file[folder] = i;
                    if counts[folder] != 0 {
                        break;
                    }
                    folder += 1;
                }
            }
            self.file_to_folder[i] = Some(folder);
            if !file.has_stream {
                continue;
            }
            index_in_folder += 1;
            if index_in_folder >= counts[folder] {
                folder += 1;
                index_in_folder = 0;
            }
        }

        if index_in_folder != 0 {
            folder += 1;
            self.header_error = true;
            log::warn!("last folder holds fewer files than its substream count");
        }
        while folder < num_folders {
            self.folder_start_file[folder] = self.files.len();
            if counts[folder] != 0 {
                self.header_error = true;
                log::warn!("folder {folder} has substreams but no files");
            }
            folder += 1;
        }
        Ok(())
    }
}
