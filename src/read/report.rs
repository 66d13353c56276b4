//! Open reports and per-item results.

use crate::{Error, ErrorKind};

/// What was learned while opening an input, successful or not.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenReport {
    /// A signature with a valid next header was found.
    pub is_archive: bool,
    /// The signature was found by scanning rather than at the start.
    pub header_recovered_by_scan: bool,
    /// The start header was zeroed and the next header was located by
    /// scanning the end of the input.
    pub start_header_recovered: bool,
    /// Absolute position of the signature header.
    pub archive_offset: u64,
    /// Unknown properties, trailing header bytes or unsupported coders.
    pub unsupported_features: bool,
    /// Tolerated or fatal header inconsistencies.
    pub header_error: bool,
    /// The input ends before the next header.
    pub unexpected_end: bool,
    /// Bytes after the end of the archive.
    pub trailing_data: u64,
    /// Size of the archive from its signature to the end of the next header.
    pub phys_size: u64,
    /// Signature header, next header and packed header folders.
    pub headers_size: u64,
    /// Classification of the error that stopped the open, if any.
    pub error_kind: Option<ErrorKind>,
}

impl OpenReport {
    /// Returns true when nothing was flagged.
    pub fn is_clean(&self) -> bool {
        self.is_archive
            && !self.header_recovered_by_scan
            && !self.start_header_recovered
            && !self.unsupported_features
            && !self.header_error
            && !self.unexpected_end
            && self.error_kind.is_none()
    }

    /// Records a fatal error in the flags.
    pub(crate) fn record_error(&mut self, err: &Error) {
        let kind = err.kind();
        self.error_kind = Some(kind);
        match kind {
            ErrorKind::Unsupported => self.unsupported_features = true,
            ErrorKind::Incorrect | ErrorKind::DataError => self.header_error = true,
            ErrorKind::EndOfData if !self.unexpected_end => self.header_error = true,
            _ => {}
        }
    }
}

/// Result of extracting or testing one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemOutcome {
    /// The item decoded and its checksum, if any, matched.
    Ok,
    /// The item's folder uses a method or feature this build cannot decode.
    UnsupportedMethod,
    /// A coder rejected the packed data.
    DataError,
    /// The decoded bytes do not match the stored CRC.
    CrcError,
    /// The packed data ended early.
    UnexpectedEnd,
    /// The folder description is inconsistent.
    HeaderError,
    /// Decoding was cancelled before the item was complete.
    Cancelled,
}

impl ItemOutcome {
    /// Classifies an error for an item.
    pub fn from_error(err: &Error) -> Self {
        if matches!(err, Error::CrcMismatch { .. }) {
            return ItemOutcome::CrcError;
        }
        match err.kind() {
            ErrorKind::Unsupported => ItemOutcome::UnsupportedMethod,
            ErrorKind::EndOfData => ItemOutcome::UnexpectedEnd,
            ErrorKind::Incorrect => ItemOutcome::HeaderError,
            ErrorKind::Cancelled => ItemOutcome::Cancelled,
            ErrorKind::DataError | ErrorKind::Fail | ErrorKind::Io => ItemOutcome::DataError,
        }
    }

    /// Returns true for [`ItemOutcome::Ok`].
    pub fn is_ok(self) -> bool {
        self == ItemOutcome::Ok
    }
}

/// Per-entry results of an integrity test.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestReport {
    /// Outcome of every entry, by entry index.
    pub outcomes: Vec<ItemOutcome>,
    /// Number of folders decoded.
    pub folders_tested: usize,
    /// Unpacked bytes produced.
    pub bytes_tested: u64,
}

impl TestReport {
    /// Returns true if every entry passed.
    pub fn is_ok(&self) -> bool {
        self.outcomes.iter().all(|o| o.is_ok())
    }

    /// Returns the indices and outcomes of failed entries.
    pub fn failures(&self) -> impl Iterator<Item = (usize, ItemOutcome)> + '_ {
        self.outcomes
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, o)| !o.is_ok())
    }

    /// Counts entries with the given outcome.
    pub fn count(&self, outcome: ItemOutcome) -> usize {
        self.outcomes.iter().filter(|&&o| o == outcome).count()
    }
}
