//! Copy codec: packed bytes are the unpacked bytes.

use std::io::{self, Read, Take, Write};

use super::{Encoder, method};

forward_decoder! {
    /// Passes through at most the declared number of bytes.
    CopyDecoder<R: Read>(Take<R>) => method::COPY
}

impl<R: Read> CopyDecoder<R> {
    /// Creates a decoder that stops after `size` bytes.
    pub fn new(inner: R, size: u64) -> Self {
        Self {
            inner: inner.take(size),
        }
    }
}

/// Stores data unchanged.
#[derive(Debug)]
pub struct CopyEncoder<W>(W);

impl<W: Write> CopyEncoder<W> {
    /// Creates an encoder writing to `inner`.
    pub fn new(inner: W) -> Self {
        Self(inner)
    }
}

impl<W: Write> Write for CopyEncoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl<W: Write> Encoder for CopyEncoder<W> {
    fn method_id(&self) -> u64 {
        method::COPY
    }

    fn finish(mut self: Box<Self>) -> io::Result<()> {
        self.0.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(mut decoder: CopyDecoder<&[u8]>) -> Vec<u8> {
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn test_copy_limits_to_size() {
        let data: &[u8] = b"Hello, World!";
        assert_eq!(drain(CopyDecoder::new(data, 13)), data);
        assert_eq!(drain(CopyDecoder::new(data, 5)), b"Hello");
    }

    #[test]
    fn test_copy_short_source_stops_early() {
        assert_eq!(drain(CopyDecoder::new(&[1u8, 2][..], 10)), [1, 2]);
    }

    #[test]
    fn test_copy_encoder_passes_bytes() {
        let mut out = Vec::new();
        let mut encoder = Box::new(CopyEncoder::new(&mut out));
        encoder.write_all(b"stored").unwrap();
        assert_eq!(encoder.method_id(), method::COPY);
        encoder.finish().unwrap();
        assert_eq!(out, b"stored");
    }
}
