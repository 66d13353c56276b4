//! BZip2 decoding through the `bzip2` crate. Read-only, like Deflate.

use std::io::Read;

use bzip2::read::BzDecoder;

use super::method;

forward_decoder! {
    /// BZip2 decoder.
    Bzip2Decoder<R: Read>(BzDecoder<R>) => method::BZIP2
}

impl<R: Read> Bzip2Decoder<R> {
    /// Creates a decoder.
    pub fn new(input: R) -> Self {
        Self {
            inner: BzDecoder::new(input),
        }
    }
}
