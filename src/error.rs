//! Error types for 7z container operations.
//!
//! This module provides the [`Error`] enum, the coarse [`ErrorKind`]
//! classification every error maps to, and the [`Result<T>`] alias.
//!
//! # Error Handling
//!
//! All fallible operations in this crate return `Result<T, Error>`. Callers
//! that only care about the class of failure match on [`Error::kind`]:
//!
//! ```rust
//! use zesven_core::{Error, ErrorKind};
//!
//! fn describe(error: &Error) -> &'static str {
//!     match error.kind() {
//!         ErrorKind::EndOfData => "the archive is truncated",
//!         ErrorKind::Incorrect => "the archive header is damaged",
//!         ErrorKind::Unsupported => "the archive needs a newer or different tool",
//!         ErrorKind::DataError => "the archive data failed an integrity check",
//!         ErrorKind::Cancelled => "the operation was cancelled",
//!         ErrorKind::Fail => "internal codec failure",
//!         ErrorKind::Io => "I/O failure",
//!     }
//! }
//! ```
//!
//! Codecs run behind [`std::io::Read`], so errors raised inside a coder travel
//! as an [`std::io::Error`] wrapping an [`Error`]. [`map_io_error`] unwraps
//! them again at the pipeline boundary.

use std::io;

/// Coarse classification of an [`Error`].
///
/// The classes mirror what a user interface needs to tell apart: a damaged
/// archive, an archive this build cannot handle, bad payload data, or a
/// user-requested abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Not enough bytes to satisfy a read.
    EndOfData,
    /// The bytes are present but violate a structural invariant.
    Incorrect,
    /// Well-formed, but exceeds a designed bound or uses an unimplemented feature.
    Unsupported,
    /// Decoded content failed an integrity or consistency check.
    DataError,
    /// The caller requested an abort through a progress callback.
    Cancelled,
    /// Internal bookkeeping failure inside a codec.
    Fail,
    /// Failure of the underlying I/O source or sink.
    Io,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::EndOfData => "unexpected end of data",
            Self::Incorrect => "header error",
            Self::Unsupported => "unsupported feature",
            Self::DataError => "data error",
            Self::Cancelled => "cancelled",
            Self::Fail => "internal failure",
            Self::Io => "I/O error",
        };
        f.write_str(text)
    }
}

/// Helper struct for formatting CrcMismatch error messages.
struct CrcMismatchDisplay<'a> {
    entry_index: Option<usize>,
    entry_name: Option<&'a str>,
    expected: u32,
    actual: u32,
}

impl std::fmt::Display for CrcMismatchDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CRC mismatch")?;
        match (self.entry_index, self.entry_name) {
            (Some(idx), Some(name)) => write!(f, " for entry {} ({})", idx, name)?,
            (Some(idx), None) => write!(f, " for entry {}", idx)?,
            (None, Some(name)) => write!(f, " for '{}'", name)?,
            (None, None) => {}
        }
        write!(f, ": expected {:#x}, got {:#x}", self.expected, self.actual)
    }
}

/// The main error type for 7z container operations.
///
/// # Error Categories
///
/// | Kind | Variants |
/// |------|----------|
/// | End of data | [`EndOfData`][Self::EndOfData], [`Io`][Self::Io] with `UnexpectedEof` |
/// | Incorrect | [`InvalidFormat`][Self::InvalidFormat], [`CorruptHeader`][Self::CorruptHeader] |
/// | Unsupported | [`UnsupportedMethod`][Self::UnsupportedMethod], [`UnsupportedFeature`][Self::UnsupportedFeature], [`ResourceLimitExceeded`][Self::ResourceLimitExceeded] |
/// | Data error | [`CrcMismatch`][Self::CrcMismatch], [`DataError`][Self::DataError] |
/// | Cancelled | [`Cancelled`][Self::Cancelled] |
/// | Fail | [`Internal`][Self::Internal] |
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error occurred while reading the archive or writing output.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A read needed more bytes than the current window holds.
    ///
    /// Always fatal to the parse unit that raised it: header parsing is
    /// aborted as a whole.
    #[error("Unexpected end of data while reading {context}")]
    EndOfData {
        /// What was being read.
        context: &'static str,
    },

    /// The input is not a 7z archive.
    ///
    /// Returned when no valid signature header is found, or when the start
    /// header points outside the input.
    #[error("Invalid 7z format: {0}")]
    InvalidFormat(String),

    /// The archive header violates a structural invariant.
    ///
    /// The offset is relative to the byte window being parsed when the
    /// violation was detected (usually the next-header blob).
    #[error("Corrupt header at offset {offset:#x}: {reason}")]
    CorruptHeader {
        /// The byte offset where corruption was detected.
        offset: u64,
        /// A description of the corruption.
        reason: String,
    },

    /// The archive uses a coder this build does not implement.
    ///
    /// Common method IDs:
    /// - `0x00`: Copy
    /// - `0x21`: LZMA2
    /// - `0x030101`: LZMA
    /// - `0x0303011B`: BCJ2
    #[error("Unsupported method: {method_id:#x}")]
    UnsupportedMethod {
        /// The method ID that is not supported.
        method_id: u64,
    },

    /// A feature or bound required by the archive is not supported.
    ///
    /// Raised for oversized folder graphs (more than 64 coders or streams),
    /// duplicate bonds, numbers above the count bound, and similar.
    #[error("Unsupported feature: {feature}")]
    UnsupportedFeature {
        /// The name of the unsupported feature.
        feature: &'static str,
    },

    /// Decoded data does not match its stored CRC-32.
    ///
    /// Output produced before the check is left untouched; the caller
    /// decides whether to keep it.
    #[error("{}", CrcMismatchDisplay { entry_index: *entry_index, entry_name: entry_name.as_deref(), expected: *expected, actual: *actual })]
    CrcMismatch {
        /// The entry index with the mismatch, `None` for whole folders.
        entry_index: Option<usize>,
        /// The entry name with the mismatch (if known).
        entry_name: Option<String>,
        /// The expected CRC value from the archive.
        expected: u32,
        /// The actual CRC value of the decoded data.
        actual: u32,
    },

    /// A coder rejected its input as malformed.
    ///
    /// This includes failed finish-mode consistency checks of multi-stream
    /// coders and data found after the declared end of a stream.
    #[error("Data error: {0}")]
    DataError(String),

    /// The operation was cancelled through a progress callback.
    #[error("Operation cancelled")]
    Cancelled,

    /// A configured resource limit would be exceeded.
    #[error("Resource limit exceeded: {0}")]
    ResourceLimitExceeded(String),

    /// An internal invariant of a codec was violated.
    ///
    /// This indicates a bug rather than malformed input.
    #[error("Internal codec failure: {0}")]
    Internal(&'static str),
}

impl Error {
    /// Returns the coarse classification of this error.
    ///
    /// # Example
    ///
    /// ```rust
    /// use zesven_core::{Error, ErrorKind};
    ///
    /// let err = Error::UnsupportedFeature { feature: "too many coders" };
    /// assert_eq!(err.kind(), ErrorKind::Unsupported);
    /// ```
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof => ErrorKind::EndOfData,
            Error::Io(_) => ErrorKind::Io,
            Error::EndOfData { .. } => ErrorKind::EndOfData,
            Error::InvalidFormat(_) | Error::CorruptHeader { .. } => ErrorKind::Incorrect,
            Error::UnsupportedMethod { .. }
            | Error::UnsupportedFeature { .. }
            | Error::ResourceLimitExceeded(_) => ErrorKind::Unsupported,
            Error::CrcMismatch { .. } | Error::DataError(_) => ErrorKind::DataError,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Internal(_) => ErrorKind::Fail,
        }
    }

    /// Returns `true` if this is a data corruption error.
    ///
    /// Corruption errors indicate the archive or decoded data is damaged.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Incorrect | ErrorKind::DataError | ErrorKind::EndOfData
        )
    }

    /// Returns `true` if this error is related to unsupported features or methods.
    pub fn is_unsupported(&self) -> bool {
        self.kind() == ErrorKind::Unsupported
    }

    /// Returns the entry index associated with this error, if any.
    pub fn entry_index(&self) -> Option<usize> {
        match self {
            Error::CrcMismatch { entry_index, .. } => *entry_index,
            _ => None,
        }
    }

    /// Returns the method ID if this is an unsupported method error.
    pub fn method_id(&self) -> Option<u64> {
        match self {
            Error::UnsupportedMethod { method_id } => Some(*method_id),
            _ => None,
        }
    }

    /// Creates a CrcMismatch error.
    pub fn crc_mismatch(
        entry_index: Option<usize>,
        entry_name: Option<String>,
        expected: u32,
        actual: u32,
    ) -> Self {
        Error::CrcMismatch {
            entry_index,
            entry_name,
            expected,
            actual,
        }
    }

    /// Creates a CorruptHeader error.
    pub fn corrupt_header(offset: u64, reason: impl Into<String>) -> Self {
        Error::CorruptHeader {
            offset,
            reason: reason.into(),
        }
    }

    /// Wraps this error into an [`io::Error`] so it can cross a `Read` boundary.
    pub(crate) fn into_io(self) -> io::Error {
        let kind = match self.kind() {
            ErrorKind::EndOfData => io::ErrorKind::UnexpectedEof,
            ErrorKind::Cancelled => io::ErrorKind::Interrupted,
            ErrorKind::Io => io::ErrorKind::Other,
            _ => io::ErrorKind::InvalidData,
        };
        match self {
            Error::Io(e) => e,
            other => io::Error::new(kind, other),
        }
    }
}

/// Converts an I/O error raised inside a codec chain back into an [`Error`].
///
/// Errors produced by this crate's own coders are unwrapped unchanged.
/// `InvalidData` from third-party decoders becomes [`Error::DataError`];
/// everything else stays [`Error::Io`].
pub(crate) fn map_io_error(e: io::Error) -> Error {
    if e.get_ref().is_some_and(|inner| inner.is::<Error>()) {
        let kind = e.kind();
        return match e.into_inner().map(|inner| inner.downcast::<Error>()) {
            Some(Ok(inner)) => *inner,
            Some(Err(other)) => Error::Io(io::Error::new(kind, other)),
            None => Error::Io(io::Error::from(kind)),
        };
    }
    if e.kind() == io::ErrorKind::InvalidData {
        return Error::DataError(e.to_string());
    }
    Error::Io(e)
}

/// A specialized Result type for 7z operations.
///
/// # Example
///
/// ```rust
/// use zesven_core::Result;
///
/// fn my_function() -> Result<()> {
///     Ok(())
/// }
/// ```
pub type Result<T> = std::result::Result<T, Error>;
