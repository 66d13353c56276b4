//! Deflate decoding through `flate2`. Archives are only read with this
//! method, never written.

use std::io::BufRead;

use flate2::bufread::DeflateDecoder as RawDeflate;

use super::method;

forward_decoder! {
    /// Raw Deflate decoder over a buffered source.
    DeflateDecoder<R: BufRead>(RawDeflate<R>) => method::DEFLATE
}

impl<R: BufRead> DeflateDecoder<R> {
    /// Creates a decoder.
    pub fn new(input: R) -> Self {
        Self {
            inner: RawDeflate::new(input),
        }
    }
}
