//! Archive reading API for 7z archives.
//!
//! This module provides the public API for reading 7z archives: opening
//! (strictly or tolerantly through [`probe`]), listing entries, decoding
//! folders and entries, and integrity testing with per-item outcomes.
//!
//! # Example
//!
//! ```rust,no_run
//! use zesven_core::read::{Archive, ItemOutcome};
//!
//! let mut archive = Archive::open_path("archive.7z")?;
//! for entry in archive.entries() {
//!     println!("{}: {} bytes", entry.name(), entry.size);
//! }
//!
//! let report = archive.test()?;
//! for (index, outcome) in report.failures() {
//!     println!("entry {index}: {outcome:?}");
//! }
//! # Ok::<(), zesven_core::Error>(())
//! ```

mod archive_open;
mod entry;
mod extraction;
mod info;
mod options;
mod report;

pub use archive_open::{OpenOutcome, probe};
pub use entry::Entry;
pub use info::ArchiveInfo;
pub use options::OpenOptions;
pub use report::{ItemOutcome, OpenReport, TestReport};

use crate::format::database::Database;

/// A 7z archive reader.
pub struct Archive<R> {
    pub(crate) reader: R,
    pub(crate) db: Database,
    pub(crate) entries: Vec<Entry>,
    pub(crate) report: OpenReport,
    pub(crate) options: OpenOptions,
}

impl<R> std::fmt::Debug for Archive<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archive")
            .field("entries", &self.entries.len())
            .field("folders", &self.db.num_folders())
            .field("report", &self.report)
            .finish_non_exhaustive()
    }
}

impl<R> Archive<R> {
    /// Returns the entries in archive order.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Returns the entry at `index`.
    pub fn entry(&self, index: usize) -> Option<&Entry> {
        self.entries.get(index)
    }

    /// Finds an entry by its stored path.
    pub fn entry_by_name(&self, name: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.path == name)
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the archive has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the parsed database.
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Returns what was found while opening.
    pub fn report(&self) -> &OpenReport {
        &self.report
    }

    /// Returns the options the archive was opened with.
    pub fn options(&self) -> &OpenOptions {
        &self.options
    }

    /// Returns the number of folders.
    pub fn num_folders(&self) -> usize {
        self.db.num_folders()
    }

    /// Consumes the archive and returns the underlying reader.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::header::StartHeader;
    use crate::format::property_id;
    use std::io::Cursor;

    // Minimal valid 7z archive (empty) with proper header structure
    fn make_empty_archive() -> Vec<u8> {
        let header_data = [property_id::HEADER as u8, property_id::END as u8];
        let header_crc = crc32fast::hash(&header_data);
        let mut data = StartHeader::encode(0, header_data.len() as u64, header_crc).to_vec();
        data.extend_from_slice(&header_data);
        data
    }

    #[test]
    fn test_open_empty_archive() {
        let data = make_empty_archive();
        let archive = Archive::open(Cursor::new(data)).unwrap();

        assert!(archive.is_empty());
        assert_eq!(archive.len(), 0);
        assert_eq!(archive.num_folders(), 0);
        assert!(archive.report().is_archive);
    }

    #[test]
    fn test_debug_lists_counts() {
        let archive = Archive::open(Cursor::new(make_empty_archive())).unwrap();
        let text = format!("{archive:?}");
        assert!(text.contains("entries: 0"));
    }
}
