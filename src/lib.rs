//! # zesven-core
//!
//! The container layer of the 7z archive format: header parsing, the
//! folder/coder graph model, and the streaming codec pipeline that drives
//! packed bytes through chained coders (including the 4-stream BCJ2 filter).
//!
//! ## Quick Start
//!
//! ### Reading an Archive
//!
//! ```rust,no_run
//! use zesven_core::{Archive, Result};
//! use std::fs::File;
//! use std::io::BufReader;
//!
//! fn main() -> Result<()> {
//!     let file = BufReader::new(File::open("archive.7z")?);
//!     let mut archive = Archive::open(file)?;
//!
//!     for entry in archive.entries() {
//!         println!("{}: {} bytes", entry.name(), entry.size);
//!     }
//!
//!     let first = archive.read_entry(0)?;
//!     println!("first entry has {} bytes", first.len());
//!     Ok(())
//! }
//! ```
//!
//! ### Creating an Archive
//!
//! ```rust
//! use zesven_core::{Archive, Writer, WriteOptions, WriteMethod, Result};
//! use std::io::Cursor;
//!
//! fn main() -> Result<()> {
//!     let mut bytes = Vec::new();
//!     let mut writer = Writer::new(Cursor::new(&mut bytes))
//!         .options(WriteOptions::new().method(WriteMethod::Copy));
//!     writer.add_bytes("hello.txt", b"Hello, World!")?;
//!     writer.add_directory("docs")?;
//!     writer.finish()?;
//!
//!     let mut archive = Archive::open(Cursor::new(bytes))?;
//!     assert_eq!(archive.read_entry(0)?, b"Hello, World!");
//!     Ok(())
//! }
//! ```
//!
//! ### Inspecting a Damaged Archive
//!
//! [`read::probe`] never fails; it reports what could be determined about the
//! input instead of a single pass/fail result:
//!
//! ```rust,no_run
//! use zesven_core::read::{probe, OpenOptions};
//! use std::fs::File;
//!
//! let file = File::open("damaged.7z").unwrap();
//! let outcome = probe(file, &OpenOptions::new().search_limit(Some(1 << 20)));
//! println!("is archive: {}", outcome.report.is_archive);
//! println!("header recovered by scan: {}", outcome.report.header_recovered_by_scan);
//! if let Some(err) = outcome.error {
//!     println!("open failed: {err}");
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `lzma` | Yes | LZMA, LZMA2, BCJ (x86) and Delta via `lzma-rust2` |
//! | `parallel` | Yes | Parallel folder decoding with Rayon |
//! | `deflate` | No | Deflate decoding |
//! | `bzip2` | No | BZip2 decoding |
//!
//! ## Error Taxonomy
//!
//! Every failure maps to an [`ErrorKind`]: unexpected end of data, a
//! structurally incorrect header, an unsupported feature, a data (integrity)
//! error, a caller cancellation, or an internal codec failure. See
//! [`Error::kind`].

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod checksum;
pub mod codec;
mod error;
pub mod format;
pub mod progress;
pub mod read;
pub mod recovery;
pub mod write;

pub use error::{Error, ErrorKind, Result};
pub use format::database::Database;
pub use format::streams::ResourceLimits;
pub use read::{Archive, Entry, ItemOutcome, OpenOptions, OpenReport, TestReport};
pub use write::{WriteMethod, WriteOptions, WriteSummary, Writer};

/// Default buffer size for read operations.
pub(crate) const READ_BUFFER_SIZE: usize = 64 * 1024;
