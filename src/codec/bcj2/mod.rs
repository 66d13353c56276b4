//! BCJ2 filter for x86 executables.
//!
//! BCJ2 is a 4-stream filter that improves compression of x86 executable code
//! by separating CALL/JMP instruction destinations into separate streams.
//!
//! # Stream Layout
//!
//! - Stream 0 (Main): code with branch opcodes but without converted operands
//! - Stream 1 (Call): CALL (E8) destinations, big-endian absolute
//! - Stream 2 (Jump): JMP (E9) and Jcc (0F 8x) destinations, big-endian absolute
//! - Stream 3 (Range): range-coded selector bits, one per opcode candidate
//!
//! The decoder is resumable at any byte boundary of any stream, so it can
//! run with arbitrarily small input and output buffers.

mod decoder;
mod encoder;
mod range;

use std::io::{Read, Write};

pub use decoder::{Bcj2Core, Bcj2Decoder, Bcj2Options, Bcj2State, DEFAULT_BUFFER_SIZE};
pub use encoder::{
    Bcj2EncodedStreams, Bcj2EncoderOptions, DEFAULT_RELAT_LIMIT, NoSubStreams, SubStreamSizeHint,
    bcj2_encode, bcj2_encode_with_hint,
};
pub use range::{RangeDecoder, RangeEncoder};

use crate::error::map_io_error;
use crate::{Error, Result};

/// Number of BCJ2 input streams.
pub const NUM_STREAMS: usize = 4;
/// Index of the main stream.
pub const STREAM_MAIN: usize = 0;
/// Index of the CALL stream.
pub const STREAM_CALL: usize = 1;
/// Index of the JUMP stream.
pub const STREAM_JUMP: usize = 2;
/// Index of the range-coder stream.
pub const STREAM_RC: usize = 3;

pub(crate) fn stream_name(index: usize) -> &'static str {
    match index {
        STREAM_MAIN => "main",
        STREAM_CALL => "call",
        STREAM_JUMP => "jump",
        _ => "range coder",
    }
}

/// Decodes four BCJ2 streams into `output`.
///
/// Writes exactly `out_size` bytes or fails. With `in_sizes` every input must
/// be consumed exactly. Returns the number of bytes written.
pub fn code_multi<'a>(
    inputs: [Box<dyn Read + 'a>; NUM_STREAMS],
    in_sizes: Option<[u64; NUM_STREAMS]>,
    output: &mut dyn Write,
    out_size: u64,
    options: &Bcj2Options,
) -> Result<u64> {
    let mut decoder = Bcj2Decoder::new(inputs, in_sizes, out_size, options);
    let mut buf = vec![0u8; crate::READ_BUFFER_SIZE];
    loop {
        let n = decoder.read(&mut buf).map_err(map_io_error)?;
        if n == 0 {
            break;
        }
        output.write_all(&buf[..n])?;
    }
    if decoder.produced() != out_size {
        return Err(Error::EndOfData {
            context: "BCJ2 main stream",
        });
    }
    decoder.finish()?;
    Ok(decoder.produced())
}
