//! Single-stream x86 BCJ and Delta filters from `lzma-rust2`.

use std::io::Read;

use lzma_rust2::filter::bcj::BcjReader;
use lzma_rust2::filter::delta::DeltaReader;

use super::method;

forward_decoder! {
    /// BCJ x86 decoder: turns absolute CALL/JMP targets back into
    /// displacements.
    BcjX86Decoder<R: Read>(BcjReader<R>) => method::BCJ_X86
}

impl<R: Read> BcjX86Decoder<R> {
    /// Creates a decoder starting at stream position 0.
    pub fn new(input: R) -> Self {
        Self {
            inner: BcjReader::new_x86(input, 0),
        }
    }
}

forward_decoder! {
    /// Delta decoder.
    DeltaDecoder<R: Read>(DeltaReader<R>) => method::DELTA
}

impl<R: Read> DeltaDecoder<R> {
    /// The property byte stores `distance - 1`; without one the distance is 1.
    pub fn new(input: R, properties: &[u8]) -> Self {
        let distance = properties.first().map_or(1, |&b| usize::from(b) + 1);
        Self {
            inner: DeltaReader::new(input, distance),
        }
    }
}
