//! Adaptive binary range coder used for BCJ2 selector bits.
//!
//! Both sides normalize *before* coding a bit, so the decoder can stop at
//! any bit boundary and resume once more range-coder input arrives.

use crate::{Error, Result};

pub(crate) const NUM_BIT_MODEL_TOTAL_BITS: u32 = 11;
pub(crate) const BIT_MODEL_TOTAL: u16 = 1 << NUM_BIT_MODEL_TOTAL_BITS;
pub(crate) const NUM_MOVE_BITS: u32 = 5;
pub(crate) const TOP_VALUE: u32 = 1 << 24;

/// Initial probability of every selector model.
pub const INITIAL_PROB: u16 = BIT_MODEL_TOTAL / 2;

/// Number of bytes that initialize the decoder.
pub const INIT_BYTES: u8 = 5;

/// Range decoder state. Input is supplied per call as a byte window.
#[derive(Debug, Clone)]
pub struct RangeDecoder {
    range: u32,
    code: u32,
    init_bytes: u8,
}

impl Default for RangeDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl RangeDecoder {
    /// Creates a decoder that still needs its initialization bytes.
    pub fn new() -> Self {
        Self {
            range: 0xFFFF_FFFF,
            code: 0,
            init_bytes: 0,
        }
    }

    /// Returns true once the five initialization bytes were consumed.
    pub fn is_initialized(&self) -> bool {
        self.init_bytes == INIT_BYTES
    }

    /// Returns true if the coder sits on a clean stream end.
    pub fn is_finished_ok(&self) -> bool {
        self.code == 0
    }

    /// Consumes initialization bytes from `src`.
    ///
    /// Returns `Ok(true)` when initialization is complete, `Ok(false)` when
    /// `src` ran dry first. The first byte must be zero and the resulting
    /// code must not be `0xFFFFFFFF`.
    pub fn init(&mut self, src: &mut &[u8]) -> Result<bool> {
        while self.init_bytes < INIT_BYTES {
            let data: &[u8] = *src;
            let Some((&b, rest)) = data.split_first() else {
                return Ok(false);
            };
            *src = rest;
            if self.init_bytes == 0 && b != 0 {
                return Err(Error::DataError(
                    "BCJ2 range coder stream must start with a zero byte".into(),
                ));
            }
            self.code = (self.code << 8) | u32::from(b);
            self.init_bytes += 1;
        }
        if self.code == 0xFFFF_FFFF {
            return Err(Error::DataError("invalid BCJ2 range coder state".into()));
        }
        Ok(true)
    }

    /// Normalizes before a bit. Returns false if a byte was needed but `src`
    /// is empty; the state is unchanged in that case.
    pub fn normalize(&mut self, src: &mut &[u8]) -> bool {
        if self.range < TOP_VALUE {
            let data: &[u8] = *src;
            let Some((&b, rest)) = data.split_first() else {
                return false;
            };
            *src = rest;
            self.range <<= 8;
            self.code = (self.code << 8) | u32::from(b);
        }
        true
    }

    /// Decodes one bit with an adaptive probability. Call [`normalize`](Self::normalize) first.
    pub fn decode_bit(&mut self, prob: &mut u16) -> bool {
        let bound = (self.range >> NUM_BIT_MODEL_TOTAL_BITS) * u32::from(*prob);
        if self.code < bound {
            self.range = bound;
            *prob += (BIT_MODEL_TOTAL - *prob) >> NUM_MOVE_BITS;
            false
        } else {
            self.range -= bound;
            self.code -= bound;
            *prob -= *prob >> NUM_MOVE_BITS;
            true
        }
    }
}

/// Range encoder producing the stream [`RangeDecoder`] consumes.
#[derive(Debug, Clone)]
pub struct RangeEncoder {
    low: u64,
    range: u32,
    cache: u8,
    cache_size: u64,
    output: Vec<u8>,
}

impl Default for RangeEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl RangeEncoder {
    /// Creates a new encoder.
    pub fn new() -> Self {
        Self {
            low: 0,
            range: 0xFFFF_FFFF,
            cache: 0,
            cache_size: 1,
            output: Vec::new(),
        }
    }

    fn shift_low(&mut self) {
        if self.low < 0xFF00_0000 || self.low > 0xFFFF_FFFF {
            let carry = (self.low >> 32) as u8;
            let mut byte = self.cache;
            loop {
                self.output.push(byte.wrapping_add(carry));
                byte = 0xFF;
                self.cache_size -= 1;
                if self.cache_size == 0 {
                    break;
                }
            }
            self.cache = (self.low >> 24) as u8;
        }
        self.cache_size += 1;
        self.low = (self.low & 0x00FF_FFFF) << 8;
    }

    /// Encodes one bit with an adaptive probability.
    pub fn encode_bit(&mut self, prob: &mut u16, bit: bool) {
        if self.range < TOP_VALUE {
            self.range <<= 8;
            self.shift_low();
        }
        let bound = (self.range >> NUM_BIT_MODEL_TOTAL_BITS) * u32::from(*prob);
        if bit {
            self.low += u64::from(bound);
            self.range -= bound;
            *prob -= *prob >> NUM_MOVE_BITS;
        } else {
            self.range = bound;
            *prob += (BIT_MODEL_TOTAL - *prob) >> NUM_MOVE_BITS;
        }
    }

    /// Flushes the coder and returns the encoded bytes.
    pub fn finish(mut self) -> Vec<u8> {
        for _ in 0..INIT_BYTES {
            self.shift_low();
        }
        self.output
    }
}
