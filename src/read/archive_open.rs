//! Archive opening methods.
//!
//! [`Archive::open`] and friends fail on the first fatal problem.
//! [`probe`] never fails: it returns whatever could be determined together
//! with the error, for callers that need to tell "not an archive" apart from
//! "damaged archive".

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use crate::recovery::read_database;
use crate::{Error, Result};

use super::{Archive, Entry, OpenOptions, OpenReport};

/// Result of [`probe`].
#[derive(Debug)]
pub struct OpenOutcome<R> {
    /// The opened archive, when the open succeeded.
    pub archive: Option<Archive<R>>,
    /// What was found, filled on every path.
    pub report: OpenReport,
    /// The error that stopped the open, if any.
    pub error: Option<Error>,
}

/// Opens `reader` and reports on it without failing.
///
/// # Example
///
/// ```rust
/// use zesven_core::read::{probe, OpenOptions};
/// use std::io::Cursor;
///
/// let outcome = probe(Cursor::new(b"not an archive".to_vec()), &OpenOptions::new());
/// assert!(!outcome.report.is_archive);
/// assert!(outcome.archive.is_none());
/// assert!(outcome.error.is_some());
/// ```
pub fn probe<R: Read + Seek>(mut reader: R, options: &OpenOptions) -> OpenOutcome<R> {
    let mut report = OpenReport::default();
    match read_database(&mut reader, options, &mut report) {
        Ok(db) => {
            let entries = db
                .files
                .iter()
                .enumerate()
                .map(|(i, file)| Entry::from_file(i, file, db.file_to_folder.get(i).copied().flatten()))
                .collect();
            OpenOutcome {
                archive: Some(Archive {
                    reader,
                    db,
                    entries,
                    report: report.clone(),
                    options: options.clone(),
                }),
                report,
                error: None,
            }
        }
        Err(err) => OpenOutcome {
            archive: None,
            report,
            error: Some(err),
        },
    }
}

impl Archive<BufReader<File>> {
    /// Opens an archive from a file path.
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::open(BufReader::new(file))
    }
}

impl<R: Read + Seek> Archive<R> {
    /// Opens an archive with default options.
    ///
    /// The reader must be positioned at the start of the archive.
    pub fn open(reader: R) -> Result<Self> {
        Self::open_with_options(reader, OpenOptions::default())
    }

    /// Opens an archive with custom options.
    pub fn open_with_options(reader: R, options: OpenOptions) -> Result<Self> {
        let outcome = probe(reader, &options);
        match (outcome.archive, outcome.error) {
            (Some(archive), _) => Ok(archive),
            (None, Some(err)) => Err(err),
            (None, None) => Err(Error::Internal("open produced neither archive nor error")),
        }
    }
}
