//! BCJ2 encoding.
//!
//! Splits x86 code into the four BCJ2 streams. A branch opcode is converted
//! when its full 32-bit operand is present, the relative offset lies within
//! the configured limit and, if sub-stream sizes are known, the target falls
//! inside the sub-stream that holds the opcode.

use super::decoder::{NUM_PROBS, is_jump, prob_index};
use super::range::{INITIAL_PROB, RangeEncoder};

/// Default bound on converted relative offsets (64 MiB in either direction).
pub const DEFAULT_RELAT_LIMIT: u32 = 64 << 20;

/// Encoder options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bcj2EncoderOptions {
    /// Only relative offsets in `-relat_limit..relat_limit` are converted.
    pub relat_limit: u32,
}

impl Default for Bcj2EncoderOptions {
    fn default() -> Self {
        Self {
            relat_limit: DEFAULT_RELAT_LIMIT,
        }
    }
}

/// Sizes of the sub-streams (files) packed back to back into the input.
pub trait SubStreamSizeHint {
    /// Returns the size of sub-stream `index`, or `None` when unknown.
    fn sub_stream_size(&self, index: usize) -> Option<u64>;
}

/// A hint that knows nothing, so only the offset limit applies.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSubStreams;

impl SubStreamSizeHint for NoSubStreams {
    fn sub_stream_size(&self, _index: usize) -> Option<u64> {
        None
    }
}

impl SubStreamSizeHint for [u64] {
    fn sub_stream_size(&self, index: usize) -> Option<u64> {
        self.get(index).copied()
    }
}

/// The four output streams of the encoder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bcj2EncodedStreams {
    /// Code with converted operands removed.
    pub main: Vec<u8>,
    /// Absolute CALL targets, big-endian.
    pub call: Vec<u8>,
    /// Absolute JMP and Jcc targets, big-endian.
    pub jump: Vec<u8>,
    /// Range-coded selector bits.
    pub rc: Vec<u8>,
}

impl Bcj2EncodedStreams {
    /// Returns the streams in decoder input order.
    pub fn as_slices(&self) -> [&[u8]; 4] {
        [&self.main, &self.call, &self.jump, &self.rc]
    }

    /// Returns the combined size of all streams.
    pub fn total_size(&self) -> usize {
        self.main.len() + self.call.len() + self.jump.len() + self.rc.len()
    }
}

/// Tracks which sub-stream a position belongs to.
struct SubStreamCursor<'h, H: ?Sized> {
    hint: &'h H,
    index: usize,
    start: u64,
    size: Option<u64>,
}

impl<'h, H: SubStreamSizeHint + ?Sized> SubStreamCursor<'h, H> {
    fn new(hint: &'h H) -> Self {
        Self {
            hint,
            index: 0,
            start: 0,
            size: hint.sub_stream_size(0),
        }
    }

    /// Returns true if a branch at `pos` may target `absolute`.
    fn allows(&mut self, pos: u64, absolute: u32) -> bool {
        while let Some(size) = self.size {
            if pos < self.start + size {
                break;
            }
            self.start += size;
            self.index += 1;
            self.size = self.hint.sub_stream_size(self.index);
        }
        match self.size {
            Some(size) => u64::from(absolute.wrapping_sub(self.start as u32)) < size,
            None => true,
        }
    }
}

/// Encodes `data` without sub-stream information.
///
/// # Example
///
/// ```rust
/// use zesven_core::codec::bcj2::{Bcj2EncoderOptions, bcj2_encode};
///
/// let code = [0x55, 0xE8, 0x10, 0x00, 0x00, 0x00, 0xC3];
/// let streams = bcj2_encode(&code, &Bcj2EncoderOptions::default());
/// assert_eq!(streams.main, [0x55, 0xE8, 0xC3]);
/// assert_eq!(streams.call.len(), 4);
/// ```
pub fn bcj2_encode(data: &[u8], options: &Bcj2EncoderOptions) -> Bcj2EncodedStreams {
    bcj2_encode_with_hint(data, options, &NoSubStreams)
}

/// Encodes `data`, restricting conversions to targets inside the current
/// sub-stream as described by `hint`.
pub fn bcj2_encode_with_hint<H: SubStreamSizeHint + ?Sized>(
    data: &[u8],
    options: &Bcj2EncoderOptions,
    hint: &H,
) -> Bcj2EncodedStreams {
    let limit = i64::from(options.relat_limit);
    let mut out = Bcj2EncodedStreams {
        main: Vec::with_capacity(data.len()),
        ..Bcj2EncodedStreams::default()
    };
    let mut rc = RangeEncoder::new();
    let mut probs = [INITIAL_PROB; NUM_PROBS];
    let mut sub_streams = SubStreamCursor::new(hint);
    let mut prev = 0u8;
    let mut i = 0usize;

    while i < data.len() {
        let b = data[i];
        out.main.push(b);
        if !is_jump(prev, b) {
            prev = b;
            i += 1;
            continue;
        }

        let ip = (i as u64 + 5) as u32;
        let target = data.get(i + 1..i + 5).and_then(|operand| {
            let relative = i32::from_le_bytes([operand[0], operand[1], operand[2], operand[3]]);
            let absolute = (relative as u32).wrapping_add(ip);
            ((-limit..limit).contains(&i64::from(relative))
                && sub_streams.allows(i as u64, absolute))
            .then_some(absolute)
        });

        rc.encode_bit(&mut probs[prob_index(prev, b)], target.is_some());
        match target {
            Some(absolute) => {
                let stream = if b == 0xE8 { &mut out.call } else { &mut out.jump };
                stream.extend_from_slice(&absolute.to_be_bytes());
                prev = data[i + 4];
                i += 5;
            }
            None => {
                prev = b;
                i += 1;
            }
        }
    }

    out.rc = rc.finish();
    log::trace!(
        "BCJ2 encoded {} bytes: main {}, call {}, jump {}, rc {}",
        data.len(),
        out.main.len(),
        out.call.len(),
        out.jump.len(),
        out.rc.len()
    );
    out
}
