//! Resumable BCJ2 decoding.
//!
//! [`Bcj2Core`] is a pure state machine: each call consumes what it can from
//! four byte windows and fills an output slice, stopping with a
//! [`Bcj2State`] that names the stream it is waiting for. [`Bcj2Decoder`]
//! drives it from four [`Read`] sources and performs the end-of-stream checks.

use std::io::{self, Read};

use super::range::{INITIAL_PROB, RangeDecoder};
use super::{NUM_STREAMS, STREAM_CALL, STREAM_JUMP, STREAM_MAIN, STREAM_RC, stream_name};
use crate::{Error, Result};

/// Selector models: one per previous byte for E8, one for E9, one for Jcc.
pub(crate) const NUM_PROBS: usize = 256 + 2;

/// Default input buffer size per stream.
pub const DEFAULT_BUFFER_SIZE: usize = 1 << 18;

/// What the decoder needs next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bcj2State {
    /// More main-stream bytes.
    Main,
    /// Four more bytes of the CALL stream.
    Call,
    /// Four more bytes of the JUMP stream.
    Jump,
    /// More range-coder bytes.
    Rc,
    /// More output space.
    Orig,
}

impl Bcj2State {
    /// Returns the input stream this state waits on, or `None` for [`Bcj2State::Orig`].
    pub fn stream(self) -> Option<usize> {
        match self {
            Self::Main => Some(STREAM_MAIN),
            Self::Call => Some(STREAM_CALL),
            Self::Jump => Some(STREAM_JUMP),
            Self::Rc => Some(STREAM_RC),
            Self::Orig => None,
        }
    }
}

/// Returns true if `b` following `prev` is a branch opcode candidate.
#[inline]
pub(crate) fn is_jump(prev: u8, b: u8) -> bool {
    (b & 0xFE) == 0xE8 || (prev == 0x0F && (b & 0xF0) == 0x80)
}

/// Selector model index for the opcode `b` following `prev`.
#[inline]
pub(crate) fn prob_index(prev: u8, b: u8) -> usize {
    match b {
        0xE8 => usize::from(prev),
        0xE9 => 256,
        _ => 257,
    }
}

/// The BCJ2 decoding state machine.
#[derive(Debug, Clone)]
pub struct Bcj2Core {
    state: Bcj2State,
    prev: u8,
    ip: u32,
    temp: [u8; 4],
    temp_pos: usize,
    pending_bit: Option<(u8, usize)>,
    pending_address: Option<usize>,
    rc: RangeDecoder,
    probs: [u16; NUM_PROBS],
}

impl Default for Bcj2Core {
    fn default() -> Self {
        Self::new()
    }
}

impl Bcj2Core {
    /// Creates a decoder positioned at the start of all four streams.
    pub fn new() -> Self {
        Self {
            state: Bcj2State::Rc,
            prev: 0,
            ip: 0,
            temp: [0; 4],
            temp_pos: 4,
            pending_bit: None,
            pending_address: None,
            rc: RangeDecoder::new(),
            probs: [INITIAL_PROB; NUM_PROBS],
        }
    }

    /// Returns the state left by the last [`decode`](Self::decode) call.
    pub fn state(&self) -> Bcj2State {
        self.state
    }

    /// Returns true if converted bytes are waiting to be written.
    pub fn has_pending_output(&self) -> bool {
        self.temp_pos < 4 || self.pending_address.is_some()
    }

    /// Returns true if the streams may legally end here.
    pub fn is_finished_ok(&self) -> bool {
        matches!(self.state, Bcj2State::Main | Bcj2State::Orig)
            && !self.has_pending_output()
            && self.pending_bit.is_none()
            && self.rc.is_initialized()
            && self.rc.is_finished_ok()
    }

    /// Decodes into `dest`, advancing the windows in `src` past consumed bytes.
    ///
    /// Returns the number of bytes written. On return [`state`](Self::state)
    /// names the reason decoding stopped. A selector bit owed for an opcode
    /// that ended the previous call is resolved before the output space is
    /// checked, so a trailing opcode is fully accounted for.
    pub fn decode(&mut self, src: &mut [&[u8]; NUM_STREAMS], dest: &mut [u8]) -> Result<usize> {
        let mut written = 0;
        loop {
            if self.temp_pos < 4 {
                let n = (4 - self.temp_pos).min(dest.len() - written);
                dest[written..written + n].copy_from_slice(&self.temp[self.temp_pos..self.temp_pos + n]);
                self.temp_pos += n;
                written += n;
                if self.temp_pos < 4 {
                    self.state = Bcj2State::Orig;
                    return Ok(written);
                }
            }

            if !self.rc.is_initialized() && !self.rc.init(&mut src[STREAM_RC])? {
                self.state = Bcj2State::Rc;
                return Ok(written);
            }

            if let Some((opcode, index)) = self.pending_bit {
                if !self.rc.normalize(&mut src[STREAM_RC]) {
                    self.state = Bcj2State::Rc;
                    return Ok(written);
                }
                self.pending_bit = None;
                if self.rc.decode_bit(&mut self.probs[index]) {
                    self.pending_address = Some(if opcode == 0xE8 {
                        STREAM_CALL
                    } else {
                        STREAM_JUMP
                    });
                } else {
                    self.prev = opcode;
                }
            }

            if let Some(stream) = self.pending_address {
                let data: &[u8] = src[stream];
                if data.len() < 4 {
                    self.state = if stream == STREAM_CALL {
                        Bcj2State::Call
                    } else {
                        Bcj2State::Jump
                    };
                    return Ok(written);
                }
                let absolute = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
                src[stream] = &data[4..];
                self.pending_address = None;
                self.ip = self.ip.wrapping_add(4);
                let relative = absolute.wrapping_sub(self.ip);
                self.temp = relative.to_le_bytes();
                self.temp_pos = 0;
                self.prev = (relative >> 24) as u8;
                continue;
            }

            let main: &[u8] = src[STREAM_MAIN];
            if main.is_empty() {
                self.state = Bcj2State::Main;
                return Ok(written);
            }
            if written == dest.len() {
                self.state = Bcj2State::Orig;
                return Ok(written);
            }

            let limit = main.len().min(dest.len() - written);
            let mut prev = self.prev;
            let mut n = 0;
            while n < limit {
                let b = main[n];
                n += 1;
                if is_jump(prev, b) {
                    self.pending_bit = Some((b, prob_index(prev, b)));
                    break;
                }
                prev = b;
            }
            self.prev = prev;
            dest[written..written + n].copy_from_slice(&main[..n]);
            src[STREAM_MAIN] = &main[n..];
            written += n;
            self.ip = self.ip.wrapping_add(n as u32);
        }
    }
}

/// Per-stream input buffer sizes for [`Bcj2Decoder`].
///
/// CALL and JUMP buffers are rounded down to a multiple of four bytes (at
/// least four); a buffer of any other stream holds at least one byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bcj2Options {
    /// Buffer sizes indexed by stream: main, call, jump, range coder.
    pub buffer_sizes: [usize; NUM_STREAMS],
}

impl Default for Bcj2Options {
    fn default() -> Self {
        Self {
            buffer_sizes: [DEFAULT_BUFFER_SIZE; NUM_STREAMS],
        }
    }
}

impl Bcj2Options {
    /// Uses `size` for every stream buffer.
    pub fn with_buffer_size(size: usize) -> Self {
        Self {
            buffer_sizes: [size; NUM_STREAMS],
        }
    }
}

/// One input buffer. Bytes in `pos..limit` are visible to the core; 32-bit
/// streams keep `limit` on a four-byte boundary and carry the remainder over.
struct InBuffer {
    data: Vec<u8>,
    pos: usize,
    limit: usize,
    filled: usize,
    consumed: u64,
    eof: bool,
    aligned: bool,
}

impl InBuffer {
    fn new(size: usize, aligned: bool) -> Self {
        let size = if aligned { (size & !3).max(4) } else { size.max(1) };
        Self {
            data: vec![0; size],
            pos: 0,
            limit: 0,
            filled: 0,
            consumed: 0,
            eof: false,
            aligned,
        }
    }

    fn window(&self) -> &[u8] {
        &self.data[self.pos..self.limit]
    }

    fn advance(&mut self, n: usize) {
        self.pos += n;
        self.consumed += n as u64;
    }

    /// Refills an exhausted window. Returns false at end of input.
    fn refill(&mut self, reader: &mut dyn Read) -> io::Result<bool> {
        self.data.copy_within(self.pos..self.filled, 0);
        self.filled -= self.pos;
        self.pos = 0;
        let min = if self.aligned { 4 } else { 1 };
        while self.filled < min && !self.eof {
            match reader.read(&mut self.data[self.filled..]) {
                Ok(0) => self.eof = true,
                Ok(n) => self.filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        self.limit = if self.aligned {
            self.filled & !3
        } else {
            self.filled
        };
        Ok(self.limit > 0)
    }
}

/// BCJ2 decoder over four input streams.
///
/// Produces exactly `out_size` bytes. The read that follows the last output
/// byte runs the finish checks: the state machine must stop in the main or
/// output state with nothing buffered, the range coder must end cleanly, and
/// when `in_sizes` are known every stream must be consumed exactly.
pub struct Bcj2Decoder<'a> {
    core: Bcj2Core,
    inputs: [Box<dyn Read + 'a>; NUM_STREAMS],
    buffers: [InBuffer; NUM_STREAMS],
    in_sizes: Option<[u64; NUM_STREAMS]>,
    out_size: u64,
    produced: u64,
    finished: bool,
}

impl std::fmt::Debug for Bcj2Decoder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bcj2Decoder")
            .field("state", &self.core.state())
            .field("out_size", &self.out_size)
            .field("produced", &self.produced)
            .finish_non_exhaustive()
    }
}

impl<'a> Bcj2Decoder<'a> {
    /// Creates a decoder over `[main, call, jump, rc]`.
    pub fn new(
        inputs: [Box<dyn Read + 'a>; NUM_STREAMS],
        in_sizes: Option<[u64; NUM_STREAMS]>,
        out_size: u64,
        options: &Bcj2Options,
    ) -> Self {
        let buffers = std::array::from_fn(|i| {
            InBuffer::new(
                options.buffer_sizes[i],
                i == STREAM_CALL || i == STREAM_JUMP,
            )
        });
        Self {
            core: Bcj2Core::new(),
            inputs,
            buffers,
            in_sizes,
            out_size,
            produced: 0,
            finished: false,
        }
    }

    /// Returns the number of bytes consumed from each stream so far.
    pub fn consumed(&self) -> [u64; NUM_STREAMS] {
        std::array::from_fn(|i| self.buffers[i].consumed)
    }

    /// Returns the number of output bytes produced so far.
    pub fn produced(&self) -> u64 {
        self.produced
    }

    fn run(&mut self, dest: &mut [u8]) -> Result<usize> {
        let mut windows: [&[u8]; NUM_STREAMS] = std::array::from_fn(|i| self.buffers[i].window());
        let before = windows.map(<[u8]>::len);
        let written = self.core.decode(&mut windows, dest)?;
        let after = windows.map(<[u8]>::len);
        for (buffer, (b, a)) in self.buffers.iter_mut().zip(before.into_iter().zip(after)) {
            buffer.advance(b - a);
        }
        Ok(written)
    }

    fn refill(&mut self, stream: usize) -> Result<bool> {
        Ok(self.buffers[stream].refill(self.inputs[stream].as_mut())?)
    }

    fn read_inner(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let remaining = self.out_size - self.produced;
        if remaining == 0 {
            self.finish()?;
            return Ok(0);
        }
        let want = buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));
        loop {
            let written = self.run(&mut buf[..want])?;
            if written > 0 {
                self.produced += written as u64;
                return Ok(written);
            }
            let Some(stream) = self.core.state().stream() else {
                return Err(Error::Internal("BCJ2 decoder stalled with output space left"));
            };
            if !self.refill(stream)? {
                if stream == STREAM_MAIN {
                    return Ok(0);
                }
                return Err(truncated(stream));
            }
        }
    }

    /// Runs the end-of-stream checks. Called automatically by the read that
    /// follows the last output byte; repeated calls are no-ops.
    pub fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;

        let mut no_space = [0u8; 0];
        loop {
            if self.run(&mut no_space)? != 0 {
                return Err(Error::Internal("BCJ2 decoder wrote into an empty buffer"));
            }
            match self.core.state() {
                Bcj2State::Orig => break,
                Bcj2State::Main => {
                    if !self.refill(STREAM_MAIN)? {
                        break;
                    }
                }
                state => {
                    let stream = state.stream().unwrap_or(STREAM_RC);
                    if !self.refill(stream)? {
                        return Err(truncated(stream));
                    }
                }
            }
        }

        if self.core.has_pending_output() {
            return Err(Error::DataError(
                "BCJ2 stream holds converted bytes past the end of output".into(),
            ));
        }
        if !self.core.is_finished_ok() {
            return Err(Error::DataError("BCJ2 streams did not end cleanly".into()));
        }
        for (i, buffer) in self.buffers.iter().enumerate() {
            if !buffer.window().is_empty() || buffer.filled > buffer.limit {
                return Err(Error::DataError(format!(
                    "unused data in BCJ2 {} stream",
                    stream_name(i)
                )));
            }
        }
        if let Some(sizes) = self.in_sizes {
            for (i, &size) in sizes.iter().enumerate() {
                let consumed = self.buffers[i].consumed;
                if consumed != size {
                    return Err(Error::DataError(format!(
                        "BCJ2 {} stream: consumed {consumed} of {size} bytes",
                        stream_name(i)
                    )));
                }
            }
        }
        Ok(())
    }
}

fn truncated(stream: usize) -> Error {
    Error::DataError(format!("BCJ2 {} stream ended early", stream_name(stream)))
}

impl Read for Bcj2Decoder<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_inner(buf).map_err(Error::into_io)
    }
}

impl super::super::Decoder for Bcj2Decoder<'_> {
    fn method_id(&self) -> u64 {
        super::super::method::BCJ2
    }
}
