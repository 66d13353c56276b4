//! CRC-32 helpers for archive integrity checks.
//!
//! Every digest stored in a 7z archive (start header, next header, pack
//! streams, folders and substreams) is an IEEE 802.3 CRC-32.
//!
//! # Example
//!
//! ```rust
//! use zesven_core::checksum::{Crc32, CrcCheck, verify_crc32};
//!
//! let mut crc = Crc32::new();
//! crc.update(b"Hello, ");
//! crc.update(b"World!");
//! assert_eq!(crc.finalize(), 0xEC4AC3D0);
//!
//! assert_eq!(verify_crc32(b"Hello, World!", Some(0xEC4AC3D0)), CrcCheck::Match);
//! assert_eq!(verify_crc32(b"Hello, World!", None), CrcCheck::NotStored);
//! ```

use std::io::{self, Write};

use crate::{Error, Result};

/// Incremental CRC-32 calculator.
#[derive(Clone, Default)]
pub struct Crc32 {
    hasher: crc32fast::Hasher,
}

impl std::fmt::Debug for Crc32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crc32")
            .field("current", &self.finalize())
            .finish()
    }
}

impl Crc32 {
    /// Creates a new calculator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds more bytes.
    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    /// Returns the digest of everything fed so far.
    pub fn finalize(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    /// Computes the digest of a single slice.
    pub fn compute(data: &[u8]) -> u32 {
        crc32fast::hash(data)
    }
}

/// Digests everything written through it on the way to `inner`.
#[derive(Debug)]
pub struct Crc32Writer<W> {
    inner: W,
    crc: Crc32,
}

impl<W> Crc32Writer<W> {
    /// Wraps a writer.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            crc: Crc32::new(),
        }
    }

    /// Returns the digest of the bytes written so far.
    pub fn crc(&self) -> u32 {
        self.crc.finalize()
    }
}

impl<W: Write> Write for Crc32Writer<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.crc.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Outcome of comparing data against an optional stored digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrcCheck {
    /// Digest matches.
    Match,
    /// Digest differs.
    Mismatch {
        /// Stored value.
        expected: u32,
        /// Computed value.
        actual: u32,
    },
    /// The archive stores no digest for this data.
    NotStored,
}

impl CrcCheck {
    /// Returns true unless the digest was stored and differs.
    pub fn is_ok(&self) -> bool {
        !matches!(self, Self::Mismatch { .. })
    }

    /// Converts a mismatch into [`Error::CrcMismatch`].
    pub fn into_result(self, entry_index: Option<usize>, entry_name: Option<&str>) -> Result<()> {
        match self {
            Self::Mismatch { expected, actual } => Err(Error::crc_mismatch(
                entry_index,
                entry_name.map(str::to_owned),
                expected,
                actual,
            )),
            Self::Match | Self::NotStored => Ok(()),
        }
    }
}

/// Compares the digest of `data` with an optional stored value.
pub fn verify_crc32(data: &[u8], expected: Option<u32>) -> CrcCheck {
    match expected {
        Some(expected) => {
            let actual = Crc32::compute(data);
            if actual == expected {
                CrcCheck::Match
            } else {
                CrcCheck::Mismatch { expected, actual }
            }
        }
        None => CrcCheck::NotStored,
    }
}
