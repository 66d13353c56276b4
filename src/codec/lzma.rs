//! LZMA and LZMA2 coders backed by `lzma-rust2`.
//!
//! Encoders write raw streams: LZMA with an end marker and no header, LZMA2
//! as bare chunks. Everything a decoder needs travels in the coder
//! properties of the folder.

use std::io::{self, Read, Write};

use super::{Encoder, method};
use crate::{Error, Result};

/// Largest valid LZMA properties byte: `(pb * 5 + lp) * 9 + lc` with
/// `lc <= 8`, `lp <= 4` and `pb <= 4`.
const MAX_PROPS_BYTE: u8 = 4 * 45 + 4 * 9 + 8;

/// Parsed LZMA coder properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LzmaProps {
    /// Packed `lc`, `lp` and `pb`.
    pub props_byte: u8,
    /// Dictionary size in bytes.
    pub dict_size: u32,
}

impl LzmaProps {
    /// Parses the 5-byte property block of an LZMA coder.
    pub fn parse(properties: &[u8]) -> Result<Self> {
        let [props_byte, d0, d1, d2, d3] = properties[..] else {
            return Err(Error::UnsupportedFeature {
                feature: "LZMA coder properties must be 5 bytes",
            });
        };
        if props_byte > MAX_PROPS_BYTE {
            return Err(Error::UnsupportedFeature {
                feature: "LZMA lc/lp/pb out of range",
            });
        }
        Ok(Self {
            props_byte,
            dict_size: u32::from_le_bytes([d0, d1, d2, d3]),
        })
    }

    /// Returns the wire form.
    pub fn to_bytes(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(5);
        out.push(self.props_byte);
        out.extend_from_slice(&self.dict_size.to_le_bytes());
        out
    }
}

forward_decoder! {
    /// LZMA decoder.
    LzmaDecoder<R: Read>(lzma_rust2::LzmaReader<R>) => method::LZMA
}

impl<R: Read> LzmaDecoder<R> {
    /// Creates a decoder producing `unpack_size` bytes.
    pub fn new(input: R, properties: &[u8], unpack_size: u64) -> Result<Self> {
        let props = LzmaProps::parse(properties)?;
        let inner = lzma_rust2::LzmaReader::new_with_props(
            input,
            unpack_size,
            props.props_byte,
            props.dict_size,
            None,
        )
        .map_err(|e| Error::DataError(format!("LZMA decoder setup: {e}")))?;
        Ok(Self { inner })
    }
}

forward_decoder! {
    /// LZMA2 decoder.
    Lzma2Decoder<R: Read>(lzma_rust2::Lzma2Reader<R>) => method::LZMA2
}

impl<R: Read> Lzma2Decoder<R> {
    /// Creates a decoder from the one-byte LZMA2 property.
    pub fn new(input: R, properties: &[u8]) -> Result<Self> {
        let [prop] = properties[..] else {
            return Err(Error::UnsupportedFeature {
                feature: "LZMA2 coder properties must be 1 byte",
            });
        };
        let dict_size = method::lzma2_dict_size(prop).ok_or(Error::UnsupportedFeature {
            feature: "LZMA2 dictionary property above 40",
        })?;
        Ok(Self {
            inner: lzma_rust2::Lzma2Reader::new(input, dict_size, None),
        })
    }
}

/// LZMA encoder for a preset level.
pub struct LzmaEncoder<W: Write> {
    inner: lzma_rust2::LzmaWriter<W>,
    props: LzmaProps,
}

impl<W: Write> LzmaEncoder<W> {
    /// Creates an encoder; `level` is clamped to 0-9.
    pub fn new(output: W, level: u32) -> Result<Self> {
        let options = lzma_rust2::LzmaOptions::with_preset(level.min(9));
        let props = LzmaProps {
            props_byte: options.get_props(),
            dict_size: options.dict_size,
        };
        let inner = lzma_rust2::LzmaWriter::new_no_header(output, &options, true)
            .map_err(|e| Error::Io(io::Error::other(e.to_string())))?;
        Ok(Self { inner, props })
    }

    /// Returns the coder properties of the stream being written.
    pub fn properties(&self) -> LzmaProps {
        self.props
    }
}

/// LZMA2 encoder for a preset level.
pub struct Lzma2Encoder<W: Write> {
    inner: lzma_rust2::Lzma2Writer<W>,
    prop: u8,
}

impl<W: Write> Lzma2Encoder<W> {
    /// Creates an encoder; `level` is clamped to 0-9.
    pub fn new(output: W, level: u32) -> Self {
        let options = lzma_rust2::Lzma2Options::with_preset(level.min(9));
        let prop = method::lzma2_dict_prop(options.lzma_options.dict_size);
        Self {
            inner: lzma_rust2::Lzma2Writer::new(output, options),
            prop,
        }
    }

    /// Returns the dictionary property byte of the stream being written.
    pub fn properties(&self) -> u8 {
        self.prop
    }
}

macro_rules! impl_encoder {
    ($name:ident, $id:expr) => {
        impl<W: Write> std::fmt::Debug for $name<W> {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($name)).finish_non_exhaustive()
            }
        }

        impl<W: Write> Write for $name<W> {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                self.inner.write(buf)
            }

            fn flush(&mut self) -> io::Result<()> {
                self.inner.flush()
            }
        }

        impl<W: Write> Encoder for $name<W> {
            fn method_id(&self) -> u64 {
                $id
            }

            fn finish(self: Box<Self>) -> io::Result<()> {
                self.inner
                    .finish()
                    .map(drop)
                    .map_err(|e| io::Error::other(e.to_string()))
            }
        }
    };
}

impl_encoder!(LzmaEncoder, method::LZMA);
impl_encoder!(Lzma2Encoder, method::LZMA2);
