//! Codec infrastructure for 7z folders.
//!
//! Coders are selected by method id through a closed registry
//! ([`build_decoder`], [`build_encoder`]). Single-stream coders are plain
//! [`Read`]/[`Write`] adapters; the 4-stream BCJ2 coder lives in [`bcj2`].
//! [`pipeline`] wires coders of a folder together.

/// Declares a decoder that forwards reads to a wrapped reader.
macro_rules! forward_decoder {
    ($(#[$meta:meta])* $name:ident<R: $bound:path>($inner:ty) => $id:expr) => {
        $(#[$meta])*
        pub struct $name<R> {
            inner: $inner,
        }

        impl<R> std::fmt::Debug for $name<R> {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($name)).finish_non_exhaustive()
            }
        }

        impl<R: $bound> std::io::Read for $name<R> {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                std::io::Read::read(&mut self.inner, buf)
            }
        }

        impl<R: $bound> $crate::codec::Decoder for $name<R> {
            fn method_id(&self) -> u64 {
                $id
            }
        }
    };
}

pub mod bcj2;
mod copy;
pub mod pipeline;

#[cfg(feature = "lzma")]
pub mod lzma;

#[cfg(feature = "lzma")]
pub mod filters;

#[cfg(feature = "deflate")]
pub mod deflate;

#[cfg(feature = "bzip2")]
pub mod bzip2;

use std::io::{self, Read, Write};

use crate::format::folder::CoderInfo;
use crate::{Error, Result};

/// A decoder that reads coded data and produces decoded output.
pub trait Decoder: Read {
    /// Returns the method ID for this decoder.
    fn method_id(&self) -> u64;
}

/// An encoder that takes raw data and produces coded output.
pub trait Encoder: Write {
    /// Returns the method ID for this encoder.
    fn method_id(&self) -> u64;

    /// Finishes encoding and flushes any remaining data.
    fn finish(self: Box<Self>) -> io::Result<()>;
}

pub use copy::{CopyDecoder, CopyEncoder};

#[cfg(feature = "lzma")]
pub use lzma::{Lzma2Decoder, Lzma2Encoder, LzmaDecoder, LzmaEncoder, LzmaProps};

#[cfg(feature = "lzma")]
pub use filters::{BcjX86Decoder, DeltaDecoder};

#[cfg(feature = "deflate")]
pub use deflate::DeflateDecoder;

#[cfg(feature = "bzip2")]
pub use bzip2::Bzip2Decoder;

pub use bcj2::{Bcj2Decoder, Bcj2EncodedStreams, Bcj2EncoderOptions, Bcj2Options, bcj2_encode};
pub use pipeline::PipelineOptions;

/// Method IDs, assembled big-endian from the id bytes of a coder record.
pub mod method {
    /// Copy (no compression).
    pub const COPY: u64 = 0x00;
    /// Delta filter.
    pub const DELTA: u64 = 0x03;
    /// LZMA2 compression.
    pub const LZMA2: u64 = 0x21;
    /// LZMA compression.
    pub const LZMA: u64 = 0x03_01_01;
    /// BCJ (x86) filter.
    pub const BCJ_X86: u64 = 0x03_03_01_03;
    /// BCJ2 (4-stream x86) filter.
    pub const BCJ2: u64 = 0x03_03_01_1B;
    /// Deflate compression.
    pub const DEFLATE: u64 = 0x04_01_08;
    /// BZip2 compression.
    pub const BZIP2: u64 = 0x04_02_02;
    /// AES-256 + SHA-256 encryption; recognized by name only.
    pub const AES: u64 = 0x06_F1_07_01;

    /// Returns a human-readable name for a method ID.
    pub fn name(id: u64) -> &'static str {
        match id {
            COPY => "Copy",
            DELTA => "Delta",
            LZMA2 => "LZMA2",
            LZMA => "LZMA",
            BCJ_X86 => "BCJ",
            BCJ2 => "BCJ2",
            DEFLATE => "Deflate",
            BZIP2 => "BZip2",
            AES => "7zAES",
            _ => "Unknown",
        }
    }

    /// Returns true if this build can decode the method.
    pub fn is_supported(id: u64) -> bool {
        match id {
            COPY | BCJ2 => true,
            LZMA | LZMA2 | BCJ_X86 | DELTA => cfg!(feature = "lzma"),
            DEFLATE => cfg!(feature = "deflate"),
            BZIP2 => cfg!(feature = "bzip2"),
            _ => false,
        }
    }

    /// Dictionary size encoded by an LZMA2 property byte; `None` above 40.
    pub fn lzma2_dict_size(prop: u8) -> Option<u32> {
        match prop {
            0..40 => Some((2 | u32::from(prop & 1)) << (prop / 2 + 11)),
            40 => Some(u32::MAX),
            _ => None,
        }
    }

    /// Smallest LZMA2 property byte whose dictionary holds `dict_size` bytes.
    pub fn lzma2_dict_prop(dict_size: u32) -> u8 {
        (0..40u8)
            .find(|&p| lzma2_dict_size(p).is_some_and(|size| size >= dict_size))
            .unwrap_or(40)
    }
}

/// Builds a single-stream decoder for `coder`.
///
/// `unpack_size` is the declared output size of the coder. Multi-stream
/// coders are not built here; the pipeline drives them through
/// [`bcj2::Bcj2Decoder`].
///
/// # Errors
///
/// Returns [`Error::UnsupportedMethod`] for unknown or disabled methods and
/// [`Error::UnsupportedFeature`] for property blocks a coder rejects.
pub fn build_decoder<'a>(
    input: Box<dyn Read + 'a>,
    coder: &CoderInfo,
    unpack_size: u64,
) -> Result<Box<dyn Decoder + 'a>> {
    #[allow(unused_variables)]
    let properties = coder.props.as_slice();

    match coder.method_id {
        method::COPY => Ok(Box::new(CopyDecoder::new(input, unpack_size))),

        #[cfg(feature = "lzma")]
        method::LZMA => Ok(Box::new(lzma::LzmaDecoder::new(
            input,
            properties,
            unpack_size,
        )?)),

        #[cfg(feature = "lzma")]
        method::LZMA2 => Ok(Box::new(lzma::Lzma2Decoder::new(input, properties)?)),

        #[cfg(feature = "lzma")]
        method::BCJ_X86 => Ok(Box::new(filters::BcjX86Decoder::new(input))),

        #[cfg(feature = "lzma")]
        method::DELTA => Ok(Box::new(filters::DeltaDecoder::new(input, properties))),

        #[cfg(feature = "deflate")]
        method::DEFLATE => Ok(Box::new(deflate::DeflateDecoder::new(
            io::BufReader::new(input),
        ))),

        #[cfg(feature = "bzip2")]
        method::BZIP2 => Ok(Box::new(bzip2::Bzip2Decoder::new(input))),

        method_id => Err(Error::UnsupportedMethod { method_id }),
    }
}

/// Builds an encoder writing into `output` and returns it with the coder
/// properties to record in the header.
///
/// `level` is a 0-9 preset for methods that take one.
pub fn build_encoder<'a>(
    method_id: u64,
    level: u32,
    output: &'a mut Vec<u8>,
) -> Result<(Box<dyn Encoder + 'a>, Vec<u8>)> {
    #[cfg(not(feature = "lzma"))]
    let _ = level;
    match method_id {
        method::COPY => Ok((Box::new(CopyEncoder::new(output)), Vec::new())),

        #[cfg(feature = "lzma")]
        method::LZMA => {
            let encoder = lzma::LzmaEncoder::new(output, level)?;
            let props = encoder.properties().to_bytes();
            Ok((Box::new(encoder), props))
        }

        #[cfg(feature = "lzma")]
        method::LZMA2 => {
            let encoder = lzma::Lzma2Encoder::new(output, level);
            let props = vec![encoder.properties()];
            Ok((Box::new(encoder), props))
        }

        method_id => Err(Error::UnsupportedMethod { method_id }),
    }
}

/// Encodes `data` in one call with a single-stream method.
pub fn encode_all(method_id: u64, level: u32, data: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
    let mut packed = Vec::new();
    let props = {
        let (mut encoder, props) = build_encoder(method_id, level, &mut packed)?;
        encoder.write_all(data)?;
        encoder.finish()?;
        props
    };
    Ok((packed, props))
}
